//! Session lifecycle and inbound message dispatch

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::entity::{PlayerState, Projectile, Vec3};
use crate::ws::protocol::{ClientMsg, ServerMsg};
use crate::ws::registry::{outbound_queue, send_on, OutboundRx, OutboundTx};

/// A connected session: its bound player id and the queue its writer drains
pub struct Session {
    pub id: String,
    pub outbound: OutboundRx,
}

fn new_player_id() -> String {
    format!("player-{}", Uuid::new_v4().simple())
}

/// Bring a new connection to the active state.
///
/// The player is spawned, welcome and the initial state are queued, then the
/// session is registered and everyone else hears about the join. Queueing
/// before registering keeps welcome ahead of any tick broadcast.
pub fn open(state: &AppState) -> Session {
    let config = &state.config;
    let id = new_player_id();

    state.game.add_player(PlayerState::new(
        id.clone(),
        config.spawn_position,
        config.spawn_rotation,
    ));

    let (tx, outbound) = outbound_queue(config.session_queue_capacity);
    queue_direct(&id, &tx, &ServerMsg::Welcome { id: id.clone() });
    queue_direct(&id, &tx, &ServerMsg::State(state.game.snapshot()));

    state.sessions.register(id.clone(), tx);
    state
        .sessions
        .broadcast_except(&id, &ServerMsg::PlayerJoined { id: id.clone() });

    info!(player_id = %id, sessions = state.sessions.len(), "Session opened");
    Session { id, outbound }
}

/// Queue a message on a session that is not registered yet
fn queue_direct(session_id: &str, tx: &OutboundTx, msg: &ServerMsg) {
    if let Err(e) = send_on(session_id, tx, msg) {
        warn!(player_id = %session_id, kind = msg.kind(), error = %e, "Failed to queue handshake message");
    }
}

/// Apply one validated inbound message on behalf of `session_id`
pub fn dispatch(state: &AppState, session_id: &str, msg: ClientMsg) {
    match msg {
        ClientMsg::Update(update) => {
            state.game.apply_player_update(session_id, &update);
        }
        ClientMsg::Shoot { direction } => {
            shoot(state, session_id, direction);
        }
    }
}

/// Fire a projectile from the shooter's current position.
/// Returns the projectile, or `None` if the shooter is gone.
pub fn shoot(state: &AppState, shooter_id: &str, direction: Vec3) -> Option<Projectile> {
    let shooter = match state.game.player(shooter_id) {
        Some(player) => player,
        None => {
            debug!(player_id = %shooter_id, "Shoot from unknown player ignored");
            return None;
        }
    };

    let projectile = Projectile::new(
        state.game.next_projectile_id(shooter_id),
        shooter_id,
        shooter.position,
        direction,
        state.config.bullet_speed,
        state.config.bullet_ttl,
    );
    state.game.add_projectile(projectile.clone());

    debug!(player_id = %shooter_id, bullet_id = %projectile.id, "Projectile fired");
    state
        .sessions
        .broadcast(&ServerMsg::BulletCreated(projectile.clone()));

    Some(projectile)
}

/// Tear down a session: unregister, despawn, tell everyone left
pub fn close(state: &AppState, session_id: &str) {
    state.sessions.unregister(session_id);
    state.game.remove_player(session_id);
    state.sessions.broadcast(&ServerMsg::PlayerLeft {
        id: session_id.to_string(),
    });

    info!(player_id = %session_id, sessions = state.sessions.len(), "Session closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::game::entity::PlayerUpdate;
    use serde_json::Value;

    fn test_state() -> AppState {
        AppState::new(Config {
            bullet_ttl: 3,
            ..Config::default()
        })
    }

    fn drain(rx: &mut OutboundRx) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            out.push(serde_json::from_str(&frame).unwrap());
        }
        out
    }

    #[test]
    fn open_queues_welcome_then_state() {
        let state = test_state();
        let mut session = open(&state);

        let frames = drain(&mut session.outbound);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0]["type"], "welcome");
        assert_eq!(frames[0]["payload"]["id"], session.id.as_str());
        assert_eq!(frames[1]["type"], "state");
        assert!(frames[1]["payload"]["players"].get(&session.id).is_some());
        assert!(state.sessions.contains(&session.id));
    }

    #[test]
    fn join_is_announced_to_others_only() {
        let state = test_state();
        let mut a = open(&state);
        drain(&mut a.outbound);

        let mut b = open(&state);

        let a_frames = drain(&mut a.outbound);
        assert_eq!(a_frames.len(), 1);
        assert_eq!(a_frames[0]["type"], "player_joined");
        assert_eq!(a_frames[0]["payload"]["id"], b.id.as_str());

        let b_frames = drain(&mut b.outbound);
        assert!(b_frames.iter().all(|f| f["type"] != "player_joined"));
    }

    #[test]
    fn player_ids_are_unique() {
        let state = test_state();
        let a = open(&state);
        let b = open(&state);
        assert_ne!(a.id, b.id);
        assert_eq!(state.game.counts(), (2, 0));
    }

    #[test]
    fn update_only_moves_the_sender() {
        let state = test_state();
        let a = open(&state);
        let b = open(&state);

        dispatch(
            &state,
            &a.id,
            ClientMsg::Update(PlayerUpdate {
                position: Some([1.0, 2.0, 3.0]),
                ..PlayerUpdate::default()
            }),
        );

        assert_eq!(state.game.player(&a.id).unwrap().position, [1.0, 2.0, 3.0]);
        assert_eq!(state.game.player(&b.id).unwrap().position, [0.0, 100.0, 0.0]);
    }

    #[test]
    fn shoot_spawns_at_shooter_and_broadcasts() {
        let state = test_state();
        let mut a = open(&state);
        let mut b = open(&state);
        drain(&mut a.outbound);
        drain(&mut b.outbound);

        dispatch(
            &state,
            &a.id,
            ClientMsg::Update(PlayerUpdate {
                position: Some([5.0, 6.0, 7.0]),
                ..PlayerUpdate::default()
            }),
        );
        let bullet = shoot(&state, &a.id, [1.0, 0.0, 0.0]).unwrap();

        assert_eq!(bullet.owner_id, a.id);
        assert_eq!(bullet.position, [5.0, 6.0, 7.0]);
        assert_eq!(bullet.speed, 10.0);
        assert_eq!(bullet.ttl, 3);
        assert!(state.game.snapshot().bullets.contains_key(&bullet.id));

        for rx in [&mut a.outbound, &mut b.outbound] {
            let frames = drain(rx);
            assert_eq!(frames.len(), 1);
            assert_eq!(frames[0]["type"], "bullet_created");
            assert_eq!(frames[0]["payload"]["playerId"], a.id.as_str());
        }
    }

    #[test]
    fn shoot_from_departed_player_does_nothing() {
        let state = test_state();
        assert!(shoot(&state, "ghost", [1.0, 0.0, 0.0]).is_none());
        assert_eq!(state.game.counts(), (0, 0));
    }

    #[test]
    fn close_despawns_and_announces_leave() {
        let state = test_state();
        let mut a = open(&state);
        let b = open(&state);
        let bullet = shoot(&state, &b.id, [0.0, 0.0, 1.0]).unwrap();
        drain(&mut a.outbound);

        close(&state, &b.id);

        assert!(!state.sessions.contains(&b.id));
        assert!(state.game.player(&b.id).is_none());
        // orphaned projectile stays until it expires
        assert!(state.game.snapshot().bullets.contains_key(&bullet.id));

        let frames = drain(&mut a.outbound);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["type"], "player_left");
        assert_eq!(frames[0]["payload"]["id"], b.id.as_str());
    }
}
