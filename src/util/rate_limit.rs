//! Per-session inbound rate limiting

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter type alias
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Create a rate limiter with the specified messages per second
pub fn create_limiter(per_second: NonZeroU32) -> Arc<Limiter> {
    Arc::new(RateLimiter::direct(Quota::per_second(per_second)))
}

/// Inbound message limiter owned by one session.
///
/// A rate of zero disables limiting entirely.
#[derive(Clone)]
pub struct SessionRateLimiter {
    input_limiter: Option<Arc<Limiter>>,
}

impl SessionRateLimiter {
    pub fn new(per_second: u32) -> Self {
        Self {
            input_limiter: NonZeroU32::new(per_second).map(create_limiter),
        }
    }

    /// Check if an inbound message is allowed (returns true if allowed)
    pub fn check_input(&self) -> bool {
        self.input_limiter
            .as_ref()
            .map_or(true, |limiter| limiter.check().is_ok())
    }
}
