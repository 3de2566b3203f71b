//! Application state shared across routes, sessions and the simulation

use std::sync::Arc;

use crate::config::Config;
use crate::game::GameState;
use crate::ws::SessionRegistry;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub game: Arc<GameState>,
    pub sessions: Arc<SessionRegistry>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            game: Arc::new(GameState::new()),
            sessions: Arc::new(SessionRegistry::new()),
        }
    }
}
