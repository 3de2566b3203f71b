//! Fixed-rate simulation loop

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::util::time::Timer;
use crate::ws::protocol::ServerMsg;
use crate::ws::SessionRegistry;

use super::GameState;

/// Drives projectiles forward and pushes the world to every session
pub struct Simulation {
    game: Arc<GameState>,
    sessions: Arc<SessionRegistry>,
    tick_interval: Duration,
    tick: u64,
}

impl Simulation {
    pub fn new(game: Arc<GameState>, sessions: Arc<SessionRegistry>, tick_interval: Duration) -> Self {
        Self {
            game,
            sessions,
            tick_interval,
            tick: 0,
        }
    }

    /// Run the tick loop for the lifetime of the process
    pub async fn run(mut self) {
        info!(tick_ms = self.tick_interval.as_millis() as u64, "Simulation started");

        let mut tick_interval = interval(self.tick_interval);
        // Late ticks are dropped, never bunched up
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tick_interval.tick().await;

            let timer = Timer::new();
            self.step();
            let elapsed = timer.elapsed();

            if elapsed > self.tick_interval {
                warn!(
                    tick = self.tick,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Tick overran its interval"
                );
            }
        }
    }

    /// Perform exactly one tick: advance, snapshot, broadcast
    pub fn step(&mut self) {
        self.tick += 1;

        let expired = self.game.advance_projectiles();
        if expired > 0 {
            debug!(tick = self.tick, expired, "Projectiles expired");
        }

        if self.sessions.is_empty() {
            return;
        }

        let snapshot = self.game.snapshot();
        self.sessions.broadcast(&ServerMsg::State(snapshot));
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }
}
