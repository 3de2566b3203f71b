//! WebSocket protocol message definitions
//!
//! Every frame carries one `{ "type": ..., "payload": ... }` envelope.
//! Outbound messages are strongly typed. Inbound payloads are validated field
//! by field so one bad field never throws away the rest of an update.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::game::entity::{normalize, PlayerUpdate, Projectile, Vec3};
use crate::game::state::WorldSnapshot;

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerMsg {
    /// First message on a new session, carrying its assigned id
    Welcome { id: String },

    /// Full world state, sent every tick and once on connect
    State(WorldSnapshot),

    PlayerJoined { id: String },

    PlayerLeft { id: String },

    /// A projectile was just fired
    BulletCreated(Projectile),
}

impl ServerMsg {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMsg::Welcome { .. } => "welcome",
            ServerMsg::State(_) => "state",
            ServerMsg::PlayerJoined { .. } => "player_joined",
            ServerMsg::PlayerLeft { .. } => "player_left",
            ServerMsg::BulletCreated(_) => "bullet_created",
        }
    }

    /// Serialize to the JSON text sent on the wire
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Messages sent from client to server, after validation
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMsg {
    /// Partial state of the sender's own aircraft
    Update(PlayerUpdate),

    /// Fire along `direction` (unit length)
    Shoot { direction: Vec3 },
}

/// Why an inbound frame produced no message
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The frame is not an envelope at all; the read is treated as failed
    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(#[from] serde_json::Error),

    /// Valid JSON, but not shaped like an envelope
    #[error("Invalid envelope: {0}")]
    NotAnEnvelope(&'static str),

    #[error("Unknown message type: {0}")]
    UnknownType(String),

    #[error("Malformed {kind} payload: {reason}")]
    MalformedPayload {
        kind: &'static str,
        reason: &'static str,
    },
}

impl ProtocolError {
    /// Whether the session should be closed because of this error
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ProtocolError::InvalidEnvelope(_) | ProtocolError::NotAnEnvelope(_)
        )
    }
}

impl ClientMsg {
    /// Decode one inbound frame
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        Self::from_envelope(serde_json::from_str(text)?)
    }

    /// Decode one inbound binary frame; same envelope as text frames
    pub fn parse_slice(bytes: &[u8]) -> Result<Self, ProtocolError> {
        Self::from_envelope(serde_json::from_slice(bytes)?)
    }

    /// Only objects are envelopes. A missing or null `type` is just an
    /// unrecognized message; any other non-string `type` is unreadable.
    fn from_envelope(frame: Value) -> Result<Self, ProtocolError> {
        let Value::Object(mut fields) = frame else {
            return Err(ProtocolError::NotAnEnvelope("frame is not an object"));
        };

        let kind = match fields.remove("type") {
            Some(Value::String(kind)) => kind,
            None | Some(Value::Null) => return Err(ProtocolError::UnknownType(String::new())),
            Some(_) => return Err(ProtocolError::NotAnEnvelope("type is not a string")),
        };
        let payload = fields.remove("payload").unwrap_or(Value::Null);

        match kind.as_str() {
            "update" => parse_update(&payload).map(ClientMsg::Update),
            "shoot" => parse_shoot(&payload),
            _ => Err(ProtocolError::UnknownType(kind)),
        }
    }
}

fn parse_update(payload: &Value) -> Result<PlayerUpdate, ProtocolError> {
    let fields = payload.as_object().ok_or(ProtocolError::MalformedPayload {
        kind: "update",
        reason: "payload is not an object",
    })?;

    Ok(PlayerUpdate {
        position: fields.get("position").and_then(number_array::<3>),
        rotation: fields.get("rotation").and_then(number_array::<4>),
        speed: fields.get("speed").and_then(Value::as_f64),
    })
}

fn parse_shoot(payload: &Value) -> Result<ClientMsg, ProtocolError> {
    let malformed = |reason| ProtocolError::MalformedPayload {
        kind: "shoot",
        reason,
    };

    let fields = payload
        .as_object()
        .ok_or_else(|| malformed("payload is not an object"))?;
    let raw = fields
        .get("direction")
        .and_then(number_array::<3>)
        .ok_or_else(|| malformed("direction is not a 3-number array"))?;
    let direction = normalize(raw).ok_or_else(|| malformed("direction has zero length"))?;

    Ok(ClientMsg::Shoot { direction })
}

/// `[n; N]` from a JSON array of exactly `N` numbers
fn number_array<const N: usize>(value: &Value) -> Option<[f64; N]> {
    let items = value.as_array()?;
    if items.len() != N {
        return None;
    }
    let mut out = [0.0; N];
    for (slot, item) in out.iter_mut().zip(items) {
        *slot = item.as_f64()?;
    }
    Some(out)
}
