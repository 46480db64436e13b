//! Headless world consumer.
//!
//! Rendering and input live in the game engine layer; everything the
//! synchronization core needs from a scene is captured by [`WorldConsumer`].
//! [`LocalWorld`] is the shipped implementation: it keeps the roster of
//! remote players, locally simulated asteroid and laser-shot collections,
//! and assembles the outbound state broadcast every tick.

use log::{debug, info};
use shared::{
    EntityState, GameStatePayload, PlayerJoinedPayload, PlayerLeftPayload, PlayerStatePayload,
    RemotePlayerState, SetMapPayload, Vec2,
};
use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::reconcile::{EntityStore, Simulated};
use crate::session::Session;

/// What the session requires from the scene it feeds.
pub trait WorldConsumer {
    fn add_new_player(&mut self, payload: PlayerJoinedPayload);
    fn remove_player(&mut self, payload: PlayerLeftPayload);
    fn update_player(&mut self, payload: RemotePlayerState);
    fn update_game_state(&mut self, payload: GameStatePayload, is_room_leader: bool);
    fn set_map(&mut self, payload: SetMapPayload);
    /// Periodic outbound tick: push the local state through the session.
    fn send_game_events(&mut self, session: &mut Session);
    fn disconnect_session(&mut self);
}

fn integrate(state: &mut EntityState, dt: f32) {
    state.position.x += state.velocity.x * dt;
    state.position.y += state.velocity.y * dt;
    state.rotation += state.angular_velocity * dt;
}

pub struct Asteroid {
    pub state: EntityState,
}

impl Simulated for Asteroid {
    fn materialize(state: &EntityState) -> Self {
        Self { state: *state }
    }

    fn state(&self) -> EntityState {
        self.state
    }

    fn step(&mut self, dt: f32) {
        integrate(&mut self.state, dt);
    }
}

pub struct LaserShot {
    pub state: EntityState,
}

impl Simulated for LaserShot {
    fn materialize(state: &EntityState) -> Self {
        Self { state: *state }
    }

    fn state(&self) -> EntityState {
        self.state
    }

    fn step(&mut self, dt: f32) {
        integrate(&mut self.state, dt);
    }
}

/// A remote player's ship as last reported by its owner.
#[derive(Debug, Clone)]
pub struct RemotePlayer {
    pub player_type: String,
    pub state: EntityState,
    pub emitting: bool,
}

/// Allocates collection-unique names. Seeded from the wall clock so names
/// from different processes in the same room do not collide.
struct NameAllocator {
    next: u64,
}

impl NameAllocator {
    fn new() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::from_secs(0))
            .as_millis() as u64;
        Self { next: millis }
    }

    fn next(&mut self, prefix: &str) -> String {
        let n = self.next;
        self.next += 1;
        format!("{}-{}", prefix, n)
    }
}

pub struct LocalWorld {
    /// The local ship's kinematic state; input handling mutates this.
    pub ship: EntityState,
    pub emitting: bool,
    players: HashMap<String, RemotePlayer>,
    asteroids: EntityStore<Asteroid>,
    laser_shots: EntityStore<LaserShot>,
    remote_lasers: EntityStore<LaserShot>,
    other_laser_shots: Vec<EntityState>,
    map: Option<SetMapPayload>,
    online: bool,
    names: NameAllocator,
}

impl LocalWorld {
    pub fn new(spawn: Vec2) -> Self {
        Self {
            ship: EntityState::at(spawn),
            emitting: false,
            players: HashMap::new(),
            asteroids: EntityStore::new(),
            laser_shots: EntityStore::new(),
            remote_lasers: EntityStore::new(),
            other_laser_shots: Vec::new(),
            map: None,
            online: true,
            names: NameAllocator::new(),
        }
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn player(&self, player_id: &str) -> Option<&RemotePlayer> {
        self.players.get(player_id)
    }

    pub fn asteroids(&self) -> &EntityStore<Asteroid> {
        &self.asteroids
    }

    pub fn laser_shots(&self) -> &EntityStore<LaserShot> {
        &self.laser_shots
    }

    pub fn map(&self) -> Option<&SetMapPayload> {
        self.map.as_ref()
    }

    /// Latest snapshot of laser shots the leader rebroadcast for players
    /// other than their owner.
    pub fn other_laser_shots(&self) -> &[EntityState] {
        &self.other_laser_shots
    }

    /// Fires a laser from the local ship. The shot is announced to peers in
    /// the next captured diff.
    pub fn fire_laser(&mut self, velocity: Vec2) -> String {
        let name = self.names.next("laser");
        let state = EntityState {
            position: self.ship.position,
            velocity,
            rotation: self.ship.rotation,
            angular_velocity: 0.0,
        };
        self.laser_shots.spawn(name.clone(), LaserShot { state });
        name
    }

    /// Leader-side: seeds a new asteroid into the local simulation.
    pub fn spawn_asteroid(&mut self, state: EntityState) -> String {
        let name = self.names.next("ast");
        self.asteroids.spawn(name.clone(), Asteroid { state });
        name
    }

    /// Leader-side: destroys an asteroid (collision resolution).
    pub fn destroy_asteroid(&mut self, name: &str) -> bool {
        self.asteroids.despawn(name)
    }

    pub fn expire_laser(&mut self, name: &str) -> bool {
        self.laser_shots.despawn(name)
    }

    /// Advances the local simulation. Entities untouched by diffs keep
    /// integrating under local physics.
    pub fn step(&mut self, dt: f32) {
        integrate(&mut self.ship, dt);
        self.asteroids.step(dt);
        self.laser_shots.step(dt);
        self.remote_lasers.step(dt);
        for player in self.players.values_mut() {
            integrate(&mut player.state, dt);
        }
    }
}

impl WorldConsumer for LocalWorld {
    fn add_new_player(&mut self, payload: PlayerJoinedPayload) {
        info!("New player {}", payload.player_id);
        self.players.insert(
            payload.player_id,
            RemotePlayer {
                player_type: payload.player_type,
                state: EntityState::at(payload.spawn),
                emitting: false,
            },
        );
    }

    fn remove_player(&mut self, payload: PlayerLeftPayload) {
        info!("Remove player {}", payload.player_id);
        self.players.remove(&payload.player_id);
    }

    fn update_player(&mut self, payload: RemotePlayerState) {
        debug!("update {}", payload.player_id);
        self.remote_lasers.apply(&payload.player.laser_shots);
        match self.players.get_mut(&payload.player_id) {
            Some(player) => {
                player.state = payload.player.state;
                player.emitting = payload.player.emitting;
            }
            // State can outrun the roster; materialize the sender on the fly.
            None => {
                self.players.insert(
                    payload.player_id,
                    RemotePlayer {
                        player_type: String::new(),
                        state: payload.player.state,
                        emitting: payload.player.emitting,
                    },
                );
            }
        }
    }

    fn update_game_state(&mut self, payload: GameStatePayload, is_room_leader: bool) {
        if is_room_leader {
            // The local simulation is the authority; a stray broadcast must
            // not overwrite it.
            debug!("ignoring game state while room leader");
            return;
        }
        self.asteroids.apply(&payload.asteroids);
        self.other_laser_shots = payload.other_laser_shots;
    }

    fn set_map(&mut self, payload: SetMapPayload) {
        info!(
            "map set: {} planets, enemy planet \"{}\"",
            payload.planets.len(),
            payload.enemy_planet.planet_type
        );
        self.map = Some(payload);
    }

    fn send_game_events(&mut self, session: &mut Session) {
        let mut player_state = PlayerStatePayload::new(self.ship);
        player_state.emitting = self.emitting;
        if let Some(diff) = self.laser_shots.capture() {
            player_state.laser_shots = diff;
        }
        session.send_player_state(player_state);

        if session.is_room_leader() {
            let mut state = GameStatePayload {
                other_laser_shots: self.remote_lasers.states(),
                asteroids: Default::default(),
            };
            if let Some(diff) = self.asteroids.capture() {
                state.asteroids = diff;
            }
            if !state.asteroids.is_empty() || !state.other_laser_shots.is_empty() {
                session.send_game_state(state);
            }
        }
    }

    fn disconnect_session(&mut self) {
        info!("session disconnected; world is offline");
        self.online = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use assert_approx_eq::assert_approx_eq;
    use shared::{ClientEvent, EntityDiff, NamedEntity, RoomLeaderPayload, ServerEvent};
    use tokio::sync::mpsc;

    fn harness() -> (Session, EventBus, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut session = Session::new(tx);
        let mut bus = EventBus::new();
        session.handle_open(&mut bus);
        (session, bus, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    fn moving(x: f32, vx: f32) -> EntityState {
        EntityState {
            position: Vec2::new(x, 0.0),
            velocity: Vec2::new(vx, 0.0),
            rotation: 0.0,
            angular_velocity: 0.5,
        }
    }

    #[test]
    fn test_broadcast_tick_sends_one_player_state_frame() {
        let (mut session, _bus, mut rx) = harness();
        let mut world = LocalWorld::new(Vec2::new(100.0, 450.0));
        session.initialize_game(&mut world);

        session.tick_broadcast(&mut world);
        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 1);
        match ClientEvent::decode(&frames[0]).unwrap().unwrap() {
            ClientEvent::PlayerState(payload) => {
                assert_eq!(payload.state.position, Vec2::new(100.0, 450.0));
                assert!(payload.laser_shots.is_empty());
            }
            other => panic!("expected player state, got {:?}", other),
        }
    }

    #[test]
    fn test_fired_laser_is_announced_exactly_once() {
        let (mut session, _bus, mut rx) = harness();
        let mut world = LocalWorld::new(Vec2::zero());
        session.initialize_game(&mut world);

        let name = world.fire_laser(Vec2::new(0.0, -900.0));
        session.tick_broadcast(&mut world);
        let frames = drain(&mut rx);
        match ClientEvent::decode(&frames[0]).unwrap().unwrap() {
            ClientEvent::PlayerState(payload) => {
                assert_eq!(payload.laser_shots.add.len(), 1);
                assert_eq!(payload.laser_shots.add[0].name, name);
                assert_eq!(payload.laser_shots.add[0].state.velocity.y, -900.0);
            }
            other => panic!("expected player state, got {:?}", other),
        }

        // Next tick: nothing new to announce.
        session.tick_broadcast(&mut world);
        let frames = drain(&mut rx);
        match ClientEvent::decode(&frames[0]).unwrap().unwrap() {
            ClientEvent::PlayerState(payload) => assert!(payload.laser_shots.is_empty()),
            other => panic!("expected player state, got {:?}", other),
        }
    }

    #[test]
    fn test_leader_broadcasts_asteroid_diffs() {
        let (mut session, mut bus, mut rx) = harness();
        let mut world = LocalWorld::new(Vec2::zero());
        session.initialize_game(&mut world);
        let leader = ServerEvent::RoomLeader(RoomLeaderPayload {
            secret: "s".to_string(),
        })
        .encode()
        .unwrap();
        session.handle_message(&leader, &mut world, &mut bus);

        let name = world.spawn_asteroid(moving(10.0, 1.0));
        session.tick_broadcast(&mut world);

        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 2);
        match ClientEvent::decode(&frames[1]).unwrap().unwrap() {
            ClientEvent::GameState(signed) => {
                assert_eq!(signed.secret, "s");
                assert_eq!(signed.state.asteroids.add.len(), 1);
                assert_eq!(signed.state.asteroids.add[0].name, name);
            }
            other => panic!("expected game state, got {:?}", other),
        }

        // Destroy it; the next broadcast carries only the removal.
        assert!(world.destroy_asteroid(&name));
        session.tick_broadcast(&mut world);
        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 2);
        match ClientEvent::decode(&frames[1]).unwrap().unwrap() {
            ClientEvent::GameState(signed) => {
                assert_eq!(signed.state.asteroids.remove, vec![name]);
                assert!(signed.state.asteroids.add.is_empty());
            }
            other => panic!("expected game state, got {:?}", other),
        }
    }

    #[test]
    fn test_non_leader_sends_no_game_state() {
        let (mut session, _bus, mut rx) = harness();
        let mut world = LocalWorld::new(Vec2::zero());
        session.initialize_game(&mut world);

        world.spawn_asteroid(moving(10.0, 1.0));
        session.tick_broadcast(&mut world);
        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].starts_with("Event PlayerState:"));
    }

    #[test]
    fn test_follower_applies_asteroid_diffs_from_game_state() {
        let mut world = LocalWorld::new(Vec2::zero());
        world.update_game_state(
            GameStatePayload {
                other_laser_shots: Vec::new(),
                asteroids: EntityDiff {
                    remove: Vec::new(),
                    add: vec![NamedEntity {
                        name: "ast-1".to_string(),
                        state: moving(5.0, 2.0),
                    }],
                },
            },
            false,
        );
        assert!(world.asteroids().contains("ast-1"));

        world.update_game_state(
            GameStatePayload {
                other_laser_shots: vec![moving(9.0, 1.0)],
                asteroids: EntityDiff::default(),
            },
            false,
        );
        assert_eq!(world.other_laser_shots().len(), 1);

        // The same payload while leader must be ignored.
        world.update_game_state(
            GameStatePayload {
                other_laser_shots: Vec::new(),
                asteroids: EntityDiff {
                    remove: vec!["ast-1".to_string()],
                    add: Vec::new(),
                },
            },
            true,
        );
        assert!(world.asteroids().contains("ast-1"));
    }

    #[test]
    fn test_update_player_applies_remote_laser_diffs_and_state() {
        let mut world = LocalWorld::new(Vec2::zero());
        world.add_new_player(PlayerJoinedPayload {
            player_id: "p1".to_string(),
            player_type: "shooter".to_string(),
            spawn: Vec2::new(50.0, 50.0),
        });

        let mut player = PlayerStatePayload::new(moving(60.0, 3.0));
        player.emitting = true;
        player.laser_shots = EntityDiff {
            remove: Vec::new(),
            add: vec![NamedEntity {
                name: "laser-9".to_string(),
                state: moving(60.0, 30.0),
            }],
        };
        world.update_player(RemotePlayerState {
            player_id: "p1".to_string(),
            player,
        });

        let remote = world.player("p1").unwrap();
        assert!(remote.emitting);
        assert_eq!(remote.state.position.x, 60.0);
        assert!(world.remote_lasers.contains("laser-9"));
    }

    #[test]
    fn test_update_player_for_unknown_sender_creates_a_roster_entry() {
        let mut world = LocalWorld::new(Vec2::zero());
        world.update_player(RemotePlayerState {
            player_id: "ghost".to_string(),
            player: PlayerStatePayload::new(moving(1.0, 0.0)),
        });
        assert_eq!(world.player_count(), 1);
    }

    #[test]
    fn test_step_integrates_untouched_entities() {
        let mut world = LocalWorld::new(Vec2::zero());
        world.ship.velocity = Vec2::new(10.0, 0.0);
        let name = world.spawn_asteroid(moving(0.0, 4.0));

        world.step(0.5);
        assert_approx_eq!(world.ship.position.x, 5.0);
        let asteroid = world.asteroids().get(&name).unwrap();
        assert_approx_eq!(asteroid.state.position.x, 2.0);
        assert_approx_eq!(asteroid.state.rotation, 0.25);
    }

    #[test]
    fn test_disconnect_marks_the_world_offline() {
        let mut world = LocalWorld::new(Vec2::zero());
        assert!(world.is_online());
        world.disconnect_session();
        assert!(!world.is_online());
    }
}
