//! Game simulation modules

pub mod entity;
pub mod simulation;
pub mod state;

pub use simulation::Simulation;
pub use state::GameState;
