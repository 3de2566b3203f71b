//! HTTP surface: WebSocket endpoint, health check, static client

pub mod routes;

pub use routes::build_router;
