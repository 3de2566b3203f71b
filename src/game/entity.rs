//! Player and projectile entities

use serde::{Deserialize, Serialize};

use crate::util::time::unix_millis;

/// World-space position or direction `[x, y, z]`
pub type Vec3 = [f64; 3];

/// Orientation quaternion `[x, y, z, w]`
pub type Quat = [f64; 4];

pub const IDENTITY_ROTATION: Quat = [0.0, 0.0, 0.0, 1.0];

/// Authoritative state of one connected aircraft
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    pub id: String,
    pub position: Vec3,
    pub rotation: Quat,
    pub speed: f64,
    /// Last time this player was written, in Unix milliseconds
    #[serde(rename = "timestamp")]
    pub updated_at: u64,
}

impl PlayerState {
    /// A freshly spawned, stationary player
    pub fn new(id: impl Into<String>, position: Vec3, rotation: Quat) -> Self {
        Self {
            id: id.into(),
            position,
            rotation,
            speed: 0.0,
            updated_at: unix_millis(),
        }
    }

    /// Apply the fields present in `update`, leaving the rest untouched
    pub fn apply(&mut self, update: &PlayerUpdate) {
        if let Some(position) = update.position {
            self.position = position;
        }
        if let Some(rotation) = update.rotation {
            self.rotation = rotation;
        }
        if let Some(speed) = update.speed {
            self.speed = speed;
        }
        self.updated_at = unix_millis();
    }
}

/// Partial player state sent by the owning client.
///
/// Only fields that passed validation are `Some`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlayerUpdate {
    pub position: Option<Vec3>,
    pub rotation: Option<Quat>,
    pub speed: Option<f64>,
}

/// A bullet in flight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projectile {
    pub id: String,
    /// Player that fired it; may no longer be connected
    #[serde(rename = "playerId")]
    pub owner_id: String,
    pub position: Vec3,
    /// Unit vector
    pub direction: Vec3,
    /// World units per tick
    pub speed: f64,
    /// Creation time in Unix milliseconds
    #[serde(rename = "timestamp")]
    pub created_at: u64,
    /// Remaining ticks before removal
    pub ttl: i32,
}

impl Projectile {
    pub fn new(
        id: String,
        owner_id: impl Into<String>,
        position: Vec3,
        direction: Vec3,
        speed: f64,
        ttl: i32,
    ) -> Self {
        Self {
            id,
            owner_id: owner_id.into(),
            position,
            direction,
            speed,
            created_at: unix_millis(),
            ttl,
        }
    }

    /// Move one tick along `direction` and burn one tick of lifetime.
    /// Returns false once the projectile has expired.
    pub fn step(&mut self) -> bool {
        for (axis, dir) in self.position.iter_mut().zip(self.direction) {
            *axis += dir * self.speed;
        }
        self.ttl -= 1;
        self.ttl > 0
    }
}

/// Scale `v` to unit length; `None` for zero-length or non-finite input
pub fn normalize(v: Vec3) -> Option<Vec3> {
    let len = v.iter().map(|c| c * c).sum::<f64>().sqrt();
    if !len.is_finite() || len <= f64::EPSILON {
        return None;
    }
    Some([v[0] / len, v[1] / len, v[2] / len])
}
