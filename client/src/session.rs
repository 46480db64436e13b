//! Client-side state machine for one multiplayer connection.
//!
//! The session decodes inbound frames, routes them to the world consumer or
//! the event bus, tracks the authority state (room leader + credential),
//! and buffers roster changes that arrive before the local scene exists.
//! It never blocks: outbound frames go into an unbounded channel drained by
//! the transport driver, and the two periodic timers (state broadcast, ping)
//! are driven externally through [`Session::tick_broadcast`] and
//! [`Session::tick_ping`].

use log::{error, info, warn};
use shared::{
    ClientEvent, GameStatePayload, JoinGameRequest, PingPayload, PlayerJoinedPayload,
    PlayerLeftPayload, PlayerStatePayload, ServerEvent, SetMapPayload, SignedGameState,
    StartGamePayload,
};
use std::time::Instant;
use tokio::sync::mpsc;

use crate::events::{EventBus, Signal};
use crate::game::WorldConsumer;

pub struct Session {
    outbound: mpsc::UnboundedSender<String>,
    /// Monotonic reference for ping timestamps. The server echoes them
    /// opaquely, so only this session ever interprets the values.
    epoch: Instant,
    connected: bool,
    is_room_leader: bool,
    secret: Option<String>,
    game_initialized: bool,
    player_joined_events: Vec<PlayerJoinedPayload>,
    player_left_events: Vec<PlayerLeftPayload>,
    map_state: Option<SetMapPayload>,
    game_code: Option<String>,
}

impl Session {
    pub fn new(outbound: mpsc::UnboundedSender<String>) -> Self {
        Self {
            outbound,
            epoch: Instant::now(),
            connected: false,
            is_room_leader: false,
            secret: None,
            game_initialized: false,
            player_joined_events: Vec::new(),
            player_left_events: Vec::new(),
            map_state: None,
            game_code: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_room_leader(&self) -> bool {
        self.is_room_leader
    }

    pub fn is_initialized(&self) -> bool {
        self.game_initialized
    }

    pub fn game_code(&self) -> Option<&str> {
        self.game_code.as_deref()
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn send_event(&self, event: &ClientEvent) {
        if !self.connected {
            warn!("tried to send over a disconnected session");
            return;
        }
        match event.encode() {
            Ok(line) => {
                if self.outbound.send(line).is_err() {
                    warn!("outbound channel closed, dropping frame");
                }
            }
            Err(e) => error!("failed to encode outbound event: {}", e),
        }
    }

    /// Transport finished opening.
    pub fn handle_open(&mut self, bus: &mut EventBus) {
        info!("Connected to server");
        self.connected = true;
        bus.emit(&Signal::ServerConnected);
    }

    /// Transport closed. The session degrades to an inert object; the caller
    /// stops driving the tick methods, which cancels both timers. No
    /// automatic reconnect happens here.
    pub fn handle_close(&mut self, world: &mut dyn WorldConsumer) {
        info!("Disconnected from server");
        self.connected = false;
        world.disconnect_session();
    }

    /// Requests to join the room identified by `code`.
    pub fn connect(&mut self, code: &str) {
        self.game_code = Some(code.to_string());
        self.send_event(&ClientEvent::JoinGame(JoinGameRequest {
            code: code.to_string(),
        }));
    }

    /// Requests a fresh room; the answer arrives as a join-game answer frame
    /// carrying the allocated code.
    pub fn create_game(&mut self) {
        self.send_event(&ClientEvent::CreateGame);
    }

    /// Routes one received line. Malformed frames and unknown tags are
    /// dropped with a diagnostic; they are never fatal to the session.
    pub fn handle_message(&mut self, line: &str, world: &mut dyn WorldConsumer, bus: &mut EventBus) {
        let event = match ServerEvent::decode(line) {
            Ok(Some(event)) => event,
            Ok(None) => return,
            Err(e) => {
                error!("dropping frame: {}", e);
                return;
            }
        };
        match event {
            ServerEvent::GameState(payload) => {
                if self.is_room_leader {
                    warn!("received a game state while room leader");
                }
                world.update_game_state(payload, self.is_room_leader);
            }
            ServerEvent::RoomLeader(payload) => {
                info!("elected room leader");
                self.secret = Some(payload.secret);
                self.is_room_leader = true;
                bus.emit(&Signal::RoomLeader);
            }
            ServerEvent::PlayerJoinedGame(payload) => {
                if self.game_initialized {
                    world.add_new_player(payload);
                } else {
                    self.player_joined_events.push(payload);
                }
            }
            ServerEvent::PlayerLeftGame(payload) => {
                if self.game_initialized {
                    world.remove_player(payload);
                } else {
                    self.player_left_events.push(payload);
                }
            }
            // High-frequency and self-correcting: forwarded even before the
            // scene is ready, never buffered.
            ServerEvent::PlayerState(payload) => world.update_player(payload),
            ServerEvent::SetMap(payload) => {
                // A map is a single mutable snapshot; only the latest matters.
                self.map_state = Some(payload.clone());
                if self.game_initialized {
                    world.set_map(payload);
                }
            }
            ServerEvent::JoinGame(answer) => bus.emit(&Signal::JoinGame(answer)),
            ServerEvent::StartGame => bus.emit(&Signal::StartGame),
            ServerEvent::Ping(payload) => {
                let latency = self.now_ms().saturating_sub(payload.timestamp);
                bus.emit(&Signal::UpdatePing(latency));
            }
        }
    }

    /// Called exactly once when the world consumer is ready: drains the
    /// buffered roster queues in arrival order and applies the cached map
    /// state. Draining twice would re-deliver already-applied events, so a
    /// second call is rejected.
    pub fn initialize_game(&mut self, world: &mut dyn WorldConsumer) {
        if self.game_initialized {
            warn!("initialize_game called twice; ignoring");
            return;
        }
        self.game_initialized = true;
        for event in std::mem::take(&mut self.player_joined_events) {
            world.add_new_player(event);
        }
        for event in std::mem::take(&mut self.player_left_events) {
            world.remove_player(event);
        }
        if let Some(map) = self.map_state.clone() {
            world.set_map(map);
        }
    }

    /// Body of the periodic ping timer. Inert until the game is initialized.
    pub fn tick_ping(&mut self) {
        if !self.game_initialized {
            return;
        }
        self.send_event(&ClientEvent::Ping(PingPayload {
            timestamp: self.now_ms(),
        }));
    }

    /// Body of the periodic outbound state broadcast. Inert until the game
    /// is initialized.
    pub fn tick_broadcast(&mut self, world: &mut dyn WorldConsumer) {
        if !self.game_initialized {
            return;
        }
        world.send_game_events(self);
    }

    pub fn send_player_state(&mut self, payload: PlayerStatePayload) {
        self.send_event(&ClientEvent::PlayerState(payload));
    }

    /// Privileged: suppressed locally unless this session holds the
    /// room-leader credential.
    pub fn send_game_state(&mut self, payload: GameStatePayload) {
        if let Some(secret) = &self.secret {
            self.send_event(&ClientEvent::GameState(SignedGameState {
                state: payload,
                secret: secret.clone(),
            }));
        }
    }

    /// Privileged: suppressed locally unless this session holds the
    /// room-leader credential.
    pub fn send_start_game(&mut self) {
        if let Some(secret) = &self.secret {
            self.send_event(&ClientEvent::StartGame(StartGamePayload {
                secret: secret.clone(),
            }));
        }
    }
}
