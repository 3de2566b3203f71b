//! Registry of connected sessions and their outbound queues

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::ws::protocol::ServerMsg;

/// Encoded envelope shared between every recipient of one broadcast
pub type Outbound = Arc<str>;

/// Sending half of a session's outbound queue
pub type OutboundTx = mpsc::Sender<Outbound>;

/// Receiving half, drained into the socket by the session's writer task
pub type OutboundRx = mpsc::Receiver<Outbound>;

/// Create a bounded outbound queue for one session
pub fn outbound_queue(capacity: usize) -> (OutboundTx, OutboundRx) {
    mpsc::channel(capacity)
}

/// Per-recipient delivery failure
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("Session {0} is not connected")]
    NotConnected(String),

    #[error("Outbound queue full for session {0}")]
    QueueFull(String),

    #[error("Outbound queue closed for session {0}")]
    Closed(String),

    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Connected sessions keyed by player id.
///
/// Delivery never blocks: each session has its own bounded queue and a full
/// queue drops the message for that session only.
pub struct SessionRegistry {
    sessions: DashMap<String, OutboundTx>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Bind `session_id` to its outbound queue, replacing any previous binding
    pub fn register(&self, session_id: impl Into<String>, tx: OutboundTx) {
        let session_id = session_id.into();
        if self.sessions.insert(session_id.clone(), tx).is_some() {
            warn!(player_id = %session_id, "Replaced existing session binding");
        }
    }

    /// Idempotent
    pub fn unregister(&self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Deliver one message to one session
    pub fn send(&self, session_id: &str, msg: &ServerMsg) -> Result<(), SendError> {
        let tx = self
            .sessions
            .get(session_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| SendError::NotConnected(session_id.to_string()))?;
        send_on(session_id, &tx, msg)
    }

    /// Deliver one message to every session; returns how many accepted it
    pub fn broadcast(&self, msg: &ServerMsg) -> usize {
        self.fan_out(msg, None)
    }

    /// Deliver one message to every session except `skip`
    pub fn broadcast_except(&self, skip: &str, msg: &ServerMsg) -> usize {
        self.fan_out(msg, Some(skip))
    }

    fn fan_out(&self, msg: &ServerMsg, skip: Option<&str>) -> usize {
        let encoded: Outbound = match msg.encode() {
            Ok(text) => text.into(),
            Err(e) => {
                warn!(kind = msg.kind(), error = %e, "Failed to encode broadcast");
                return 0;
            }
        };

        // Collect first so no shard lock is held while delivering
        let targets: Vec<(String, OutboundTx)> = self
            .sessions
            .iter()
            .filter(|entry| Some(entry.key().as_str()) != skip)
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let mut delivered = 0;
        for (session_id, tx) in targets {
            match deliver(&session_id, &tx, Arc::clone(&encoded)) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(player_id = %session_id, kind = msg.kind(), error = %e, "Broadcast delivery failed");
                }
            }
        }

        debug!(kind = msg.kind(), delivered, "Broadcast sent");
        delivered
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode and queue one message directly on a session's queue,
/// whether or not it is registered yet
pub fn send_on(session_id: &str, tx: &OutboundTx, msg: &ServerMsg) -> Result<(), SendError> {
    let encoded: Outbound = msg.encode()?.into();
    deliver(session_id, tx, encoded)
}

fn deliver(session_id: &str, tx: &OutboundTx, encoded: Outbound) -> Result<(), SendError> {
    tx.try_send(encoded).map_err(|e| match e {
        TrySendError::Full(_) => SendError::QueueFull(session_id.to_string()),
        TrySendError::Closed(_) => SendError::Closed(session_id.to_string()),
    })
}
