use serde::{Deserialize, Serialize};
use std::fmt;

/// Every application frame on the wire starts with this prefix. Anything
/// else on the socket (keepalive text, server chatter) is not a frame.
pub const EVENT_PREFIX: &str = "Event ";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn zero() -> Self {
        Self { x: 0.0, y: 0.0 }
    }
}

/// Minimal kinematic state broadcastable for any moving object.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityState {
    pub position: Vec2,
    pub velocity: Vec2,
    pub rotation: f32,
    pub angular_velocity: f32,
}

impl EntityState {
    pub fn at(position: Vec2) -> Self {
        Self {
            position,
            velocity: Vec2::zero(),
            rotation: 0.0,
            angular_velocity: 0.0,
        }
    }
}

/// Kinematic state plus the stable name identifying it within a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedEntity {
    pub name: String,
    #[serde(flatten)]
    pub state: EntityState,
}

/// Incremental membership change for a named-entity collection.
///
/// `remove` lists names to delete, `add` lists brand-new entities with full
/// kinematic state. A name must not appear in both lists of the same diff.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityDiff {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remove: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub add: Vec<NamedEntity>,
}

impl EntityDiff {
    pub fn is_empty(&self) -> bool {
        self.remove.is_empty() && self.add.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomLeaderPayload {
    pub secret: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerJoinedPayload {
    pub player_id: String,
    pub player_type: String,
    pub spawn: Vec2,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerLeftPayload {
    pub player_id: String,
}

/// Per-tick state of one player's ship plus the delta of its laser shots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStatePayload {
    #[serde(flatten)]
    pub state: EntityState,
    pub emitting: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missile: Option<EntityState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub damage_dealt: Option<f32>,
    #[serde(default, skip_serializing_if = "EntityDiff::is_empty")]
    pub laser_shots: EntityDiff,
}

impl PlayerStatePayload {
    pub fn new(state: EntityState) -> Self {
        Self {
            state,
            emitting: false,
            missile: None,
            damage_dealt: None,
            laser_shots: EntityDiff::default(),
        }
    }
}

/// Inbound player state: the server stamps the sender's id onto the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemotePlayerState {
    pub player_id: String,
    #[serde(flatten)]
    pub player: PlayerStatePayload,
}

/// Authoritative world delta, produced only by the room leader.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStatePayload {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub other_laser_shots: Vec<EntityState>,
    #[serde(default, skip_serializing_if = "EntityDiff::is_empty")]
    pub asteroids: EntityDiff,
}

/// A `GameStatePayload` carrying the room-leader credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedGameState {
    #[serde(flatten)]
    pub state: GameStatePayload,
    pub secret: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanetSpec {
    pub position: Vec2,
    pub radius: f32,
    pub planet_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetMapPayload {
    pub planets: Vec<PlanetSpec>,
    pub enemy_planet: PlanetSpec,
}

/// Echoed back unchanged by the server; only the sender interprets the
/// timestamp, so it is monotonic milliseconds since the session started.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PingPayload {
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinGameRequest {
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinGameAnswer {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spawn: Option<Vec2>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartGamePayload {
    pub secret: String,
}

/// Frames the client decodes (server to client).
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    GameState(GameStatePayload),
    PlayerState(RemotePlayerState),
    RoomLeader(RoomLeaderPayload),
    PlayerJoinedGame(PlayerJoinedPayload),
    PlayerLeftGame(PlayerLeftPayload),
    SetMap(SetMapPayload),
    Ping(PingPayload),
    JoinGame(JoinGameAnswer),
    StartGame,
}

/// Frames the client encodes (client to server).
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    JoinGame(JoinGameRequest),
    CreateGame,
    StartGame(StartGamePayload),
    PlayerState(PlayerStatePayload),
    GameState(SignedGameState),
    Ping(PingPayload),
}

#[derive(Debug)]
pub enum DecodeError {
    /// No leading run of alphabetic characters terminated by `:`.
    MissingTag,
    /// Tag outside the closed set of known kinds. Dropped, never fatal.
    UnknownTag(String),
    /// The JSON body of a recognized tag failed to parse.
    Json(serde_json::Error),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::MissingTag => write!(f, "unable to find event identifier"),
            DecodeError::UnknownTag(tag) => write!(f, "unknown event \"{}\"", tag),
            DecodeError::Json(e) => write!(f, "malformed event payload: {}", e),
        }
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DecodeError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for DecodeError {
    fn from(e: serde_json::Error) -> Self {
        DecodeError::Json(e)
    }
}

fn frame(tag: &str, body: Result<String, serde_json::Error>) -> Result<String, serde_json::Error> {
    Ok(format!("{}{}:{}", EVENT_PREFIX, tag, body?))
}

/// Splits a received line into `(tag, json-body)`.
///
/// Returns `Ok(None)` when the line is not an application frame at all.
fn split_frame(line: &str) -> Result<Option<(&str, &str)>, DecodeError> {
    let rest = match line.strip_prefix(EVENT_PREFIX) {
        Some(rest) => rest,
        None => return Ok(None),
    };
    let tag_len = rest
        .bytes()
        .take_while(|b| b.is_ascii_alphabetic())
        .count();
    if tag_len == 0 || rest.as_bytes().get(tag_len) != Some(&b':') {
        return Err(DecodeError::MissingTag);
    }
    Ok(Some((&rest[..tag_len], &rest[tag_len + 1..])))
}

impl ServerEvent {
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        match self {
            ServerEvent::GameState(p) => frame("GameState", serde_json::to_string(p)),
            ServerEvent::PlayerState(p) => frame("PlayerState", serde_json::to_string(p)),
            ServerEvent::RoomLeader(p) => frame("RoomLeader", serde_json::to_string(p)),
            ServerEvent::PlayerJoinedGame(p) => frame("PlayerJoinedGame", serde_json::to_string(p)),
            ServerEvent::PlayerLeftGame(p) => frame("PlayerLeftGame", serde_json::to_string(p)),
            ServerEvent::SetMap(p) => frame("SetMap", serde_json::to_string(p)),
            ServerEvent::Ping(p) => frame("Ping", serde_json::to_string(p)),
            ServerEvent::JoinGame(p) => frame("JoinGame", serde_json::to_string(p)),
            ServerEvent::StartGame => frame("StartGame", Ok("{}".to_string())),
        }
    }

    /// Decodes one received line. `Ok(None)` means "not a frame, ignore".
    pub fn decode(line: &str) -> Result<Option<Self>, DecodeError> {
        let (tag, body) = match split_frame(line)? {
            Some(parts) => parts,
            None => return Ok(None),
        };
        let event = match tag {
            "GameState" => ServerEvent::GameState(serde_json::from_str(body)?),
            "PlayerState" => ServerEvent::PlayerState(serde_json::from_str(body)?),
            "RoomLeader" => ServerEvent::RoomLeader(serde_json::from_str(body)?),
            "PlayerJoinedGame" => ServerEvent::PlayerJoinedGame(serde_json::from_str(body)?),
            "PlayerLeftGame" => ServerEvent::PlayerLeftGame(serde_json::from_str(body)?),
            "SetMap" => ServerEvent::SetMap(serde_json::from_str(body)?),
            "Ping" => ServerEvent::Ping(serde_json::from_str(body)?),
            "JoinGame" => ServerEvent::JoinGame(serde_json::from_str(body)?),
            "StartGame" => {
                // The broadcast is a bare signal; the body carries nothing we use.
                let _: serde_json::Value = serde_json::from_str(body)?;
                ServerEvent::StartGame
            }
            other => return Err(DecodeError::UnknownTag(other.to_string())),
        };
        Ok(Some(event))
    }
}

impl ClientEvent {
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        match self {
            ClientEvent::JoinGame(p) => frame("JoinGame", serde_json::to_string(p)),
            ClientEvent::CreateGame => frame("CreateGame", Ok("{}".to_string())),
            ClientEvent::StartGame(p) => frame("StartGame", serde_json::to_string(p)),
            ClientEvent::PlayerState(p) => frame("PlayerState", serde_json::to_string(p)),
            ClientEvent::GameState(p) => frame("GameState", serde_json::to_string(p)),
            ClientEvent::Ping(p) => frame("Ping", serde_json::to_string(p)),
        }
    }

    /// Server-direction decode. The client never calls this; test harnesses
    /// standing in for the server do.
    pub fn decode(line: &str) -> Result<Option<Self>, DecodeError> {
        let (tag, body) = match split_frame(line)? {
            Some(parts) => parts,
            None => return Ok(None),
        };
        let event = match tag {
            "JoinGame" => ClientEvent::JoinGame(serde_json::from_str(body)?),
            "CreateGame" => {
                let _: serde_json::Value = serde_json::from_str(body)?;
                ClientEvent::CreateGame
            }
            "StartGame" => ClientEvent::StartGame(serde_json::from_str(body)?),
            "PlayerState" => ClientEvent::PlayerState(serde_json::from_str(body)?),
            "GameState" => ClientEvent::GameState(serde_json::from_str(body)?),
            "Ping" => ClientEvent::Ping(serde_json::from_str(body)?),
            other => return Err(DecodeError::UnknownTag(other.to_string())),
        };
        Ok(Some(event))
    }
}
