//! Authoritative world state shared by every session and the simulation

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

use crate::util::time::unix_millis;

use super::entity::{PlayerState, PlayerUpdate, Projectile};

/// Point-in-time copy of every entity, detached from the live store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub players: HashMap<String, PlayerState>,
    pub bullets: HashMap<String, Projectile>,
}

#[derive(Debug, Default)]
struct World {
    players: HashMap<String, PlayerState>,
    bullets: HashMap<String, Projectile>,
}

/// Owner of all players and projectiles.
///
/// Every operation takes the lock for its whole duration, so readers never
/// observe a half-applied mutation. The maps themselves are never handed out.
#[derive(Debug, Default)]
pub struct GameState {
    world: RwLock<World>,
    bullet_seq: AtomicU64,
}

impl GameState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a player, replacing any existing entry with the same id
    pub fn add_player(&self, player: PlayerState) {
        let id = player.id.clone();
        self.world.write().players.insert(id.clone(), player);
        info!(player_id = %id, "Player added");
    }

    /// Returns true if a player was removed
    pub fn remove_player(&self, player_id: &str) -> bool {
        let removed = self.world.write().players.remove(player_id).is_some();
        if removed {
            info!(player_id = %player_id, "Player removed");
        }
        removed
    }

    /// Apply a partial update to an existing player.
    /// Unknown ids are ignored; returns whether the update landed.
    pub fn apply_player_update(&self, player_id: &str, update: &PlayerUpdate) -> bool {
        let mut world = self.world.write();
        match world.players.get_mut(player_id) {
            Some(player) => {
                player.apply(update);
                true
            }
            None => {
                debug!(player_id = %player_id, "Update for unknown player ignored");
                false
            }
        }
    }

    pub fn player(&self, player_id: &str) -> Option<PlayerState> {
        self.world.read().players.get(player_id).cloned()
    }

    /// Insert a projectile, replacing any existing entry with the same id
    pub fn add_projectile(&self, projectile: Projectile) {
        self.world
            .write()
            .bullets
            .insert(projectile.id.clone(), projectile);
    }

    pub fn remove_projectile(&self, projectile_id: &str) -> bool {
        self.world.write().bullets.remove(projectile_id).is_some()
    }

    /// Unique id for a projectile fired now by `owner_id`
    pub fn next_projectile_id(&self, owner_id: &str) -> String {
        let seq = self.bullet_seq.fetch_add(1, Ordering::Relaxed);
        format!("bullet-{}-{}-{}", owner_id, unix_millis(), seq)
    }

    /// Deep copy of the whole world
    pub fn snapshot(&self) -> WorldSnapshot {
        let world = self.world.read();
        WorldSnapshot {
            players: world.players.clone(),
            bullets: world.bullets.clone(),
        }
    }

    /// Advance every projectile by one tick and drop the expired ones.
    /// Returns how many expired.
    pub fn advance_projectiles(&self) -> usize {
        let mut world = self.world.write();
        let before = world.bullets.len();
        world.bullets.retain(|_, bullet| bullet.step());
        before - world.bullets.len()
    }

    /// `(players, projectiles)` currently live
    pub fn counts(&self) -> (usize, usize) {
        let world = self.world.read();
        (world.players.len(), world.bullets.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entity::IDENTITY_ROTATION;
    use std::sync::Arc;
    use std::thread;

    fn player(id: &str) -> PlayerState {
        PlayerState::new(id, [0.0, 100.0, 0.0], IDENTITY_ROTATION)
    }

    fn bullet(id: &str, ttl: i32) -> Projectile {
        Projectile::new(id.to_string(), "p1", [0.0; 3], [0.0, 0.0, 1.0], 10.0, ttl)
    }

    #[test]
    fn add_overwrites_and_remove_is_noop_when_missing() {
        let state = GameState::new();
        state.add_player(player("p1"));

        let mut moved = player("p1");
        moved.position = [5.0, 5.0, 5.0];
        state.add_player(moved);

        assert_eq!(state.counts(), (1, 0));
        assert_eq!(state.player("p1").unwrap().position, [5.0, 5.0, 5.0]);

        assert!(state.remove_player("p1"));
        assert!(!state.remove_player("p1"));
        assert!(!state.remove_player("ghost"));
    }

    #[test]
    fn speed_only_update_keeps_pose_and_bumps_timestamp() {
        let state = GameState::new();
        let mut p = player("p1");
        p.position = [1.0, 2.0, 3.0];
        p.rotation = [0.0, 0.7071, 0.0, 0.7071];
        p.updated_at = 0;
        state.add_player(p);

        let applied = state.apply_player_update(
            "p1",
            &PlayerUpdate {
                speed: Some(55.0),
                ..PlayerUpdate::default()
            },
        );

        assert!(applied);
        let p = state.player("p1").unwrap();
        assert_eq!(p.position, [1.0, 2.0, 3.0]);
        assert_eq!(p.rotation, [0.0, 0.7071, 0.0, 0.7071]);
        assert_eq!(p.speed, 55.0);
        assert!(p.updated_at > 0);
    }

    #[test]
    fn update_for_unknown_player_is_ignored() {
        let state = GameState::new();
        let applied = state.apply_player_update(
            "ghost",
            &PlayerUpdate {
                speed: Some(1.0),
                ..PlayerUpdate::default()
            },
        );
        assert!(!applied);
        assert_eq!(state.counts(), (0, 0));
    }

    #[test]
    fn empty_update_still_refreshes_timestamp() {
        let state = GameState::new();
        let mut p = player("p1");
        p.updated_at = 0;
        state.add_player(p);

        assert!(state.apply_player_update("p1", &PlayerUpdate::default()));
        assert!(state.player("p1").unwrap().updated_at > 0);
    }

    #[test]
    fn snapshot_is_detached_from_live_state() {
        let state = GameState::new();
        state.add_player(player("p1"));
        state.add_projectile(bullet("b1", 10));

        let snap = state.snapshot();
        state.remove_player("p1");
        state.advance_projectiles();

        assert!(snap.players.contains_key("p1"));
        assert_eq!(snap.bullets["b1"].position, [0.0, 0.0, 0.0]);
        assert_eq!(snap.bullets["b1"].ttl, 10);
    }

    #[test]
    fn projectile_with_ttl_expires_on_its_last_tick() {
        let state = GameState::new();
        let ttl = 5;
        state.add_projectile(bullet("b1", ttl));

        for tick in 1..ttl {
            assert_eq!(state.advance_projectiles(), 0);
            let snap = state.snapshot();
            let b = &snap.bullets["b1"];
            assert_eq!(b.ttl, ttl - tick);
            assert_eq!(b.position, [0.0, 0.0, 10.0 * f64::from(tick)]);
        }

        assert_eq!(state.advance_projectiles(), 1);
        assert!(state.snapshot().bullets.is_empty());
    }

    #[test]
    fn orphaned_projectiles_outlive_their_owner() {
        let state = GameState::new();
        state.add_player(player("p1"));
        state.add_projectile(bullet("b1", 3));
        state.remove_player("p1");

        state.advance_projectiles();
        assert_eq!(state.counts(), (0, 1));
    }

    #[test]
    fn projectile_ids_are_unique_per_owner() {
        let state = GameState::new();
        let a = state.next_projectile_id("p1");
        let b = state.next_projectile_id("p1");
        assert_ne!(a, b);
        assert!(a.starts_with("bullet-p1-"));
    }

    #[test]
    fn remove_projectile_reports_presence() {
        let state = GameState::new();
        state.add_projectile(bullet("b1", 3));
        assert!(state.remove_projectile("b1"));
        assert!(!state.remove_projectile("b1"));
    }

    #[test]
    fn concurrent_writers_never_produce_torn_snapshots() {
        let state = Arc::new(GameState::new());
        let writers: Vec<_> = (0..4)
            .map(|w| {
                let state = Arc::clone(&state);
                thread::spawn(move || {
                    let id = format!("p{}", w);
                    for i in 0..500 {
                        state.add_player(player(&id));
                        // position and speed move together; a torn read would split them
                        let v = f64::from(i);
                        state.apply_player_update(
                            &id,
                            &PlayerUpdate {
                                position: Some([v, v, v]),
                                rotation: None,
                                speed: Some(v),
                            },
                        );
                        if i % 7 == 0 {
                            state.remove_player(&id);
                        }
                    }
                })
            })
            .collect();

        let reader = {
            let state = Arc::clone(&state);
            thread::spawn(move || {
                for _ in 0..500 {
                    let snap = state.snapshot();
                    for p in snap.players.values() {
                        let fresh = p.speed == 0.0 && p.position == [0.0, 100.0, 0.0];
                        let updated = p.position == [p.speed, p.speed, p.speed];
                        assert!(fresh || updated, "torn player state: {:?}", p);
                    }
                }
            })
        };

        for w in writers {
            w.join().unwrap();
        }
        reader.join().unwrap();
    }
}
