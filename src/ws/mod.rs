//! WebSocket transport, wire protocol and session bookkeeping

pub mod handler;
pub mod protocol;
pub mod registry;
pub mod session;

pub use registry::SessionRegistry;
