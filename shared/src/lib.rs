//! Wire protocol shared by the lobby server and its clients.
//!
//! Every frame is a JSON object. Clients send `{"uuid": ...}` once to join
//! and `{"req": [[command, args...], ...]}` afterwards; the server always
//! answers with `{"res": [[event, args...], ...]}`.

use serde::ser::Serializer;
use serde::Serialize;
use serde_json::{json, Map, Value};
use thiserror::Error;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 42069;

/// `strftime` pattern used for chat timestamps, e.g. `07:42 PM`.
pub const CHAT_TIME_FORMAT: &str = "%I:%M %p";

/// Error code carried by every rejected join.
pub const CONNECTION_REFUSED: &str = "connection_refused";

const JOIN_KEY: &str = "uuid";
const REQUESTS_KEY: &str = "req";

/// Reasons an inbound frame could not be read as an envelope
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("envelope is not a JSON object")]
    NotAnObject,
    #[error("`req` is not an array")]
    RequestsNotArray,
}

/// Top-level message sent by a client
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEnvelope {
    /// Join attempt. `None` when the identity is missing, empty or not a string.
    Join { identity: Option<String> },
    /// Batch of lobby commands, in the order the client listed them.
    Requests(Vec<Command>),
    /// A well-formed object of neither expected shape.
    Other,
}

impl ClientEnvelope {
    /// Reads a frame sent before the connection has joined.
    pub fn decode_join(text: &str) -> Result<Self, DecodeError> {
        let object = parse_object(text)?;

        Ok(match object.get(JOIN_KEY) {
            Some(Value::String(identity)) if !identity.is_empty() => ClientEnvelope::Join {
                identity: Some(identity.clone()),
            },
            Some(_) => ClientEnvelope::Join { identity: None },
            None => ClientEnvelope::Other,
        })
    }

    /// Reads a frame sent by a connection that already joined.
    pub fn decode_requests(text: &str) -> Result<Self, DecodeError> {
        let object = parse_object(text)?;

        match object.get(REQUESTS_KEY) {
            Some(Value::Array(items)) => Ok(ClientEnvelope::Requests(
                items.iter().map(Command::from_value).collect(),
            )),
            Some(_) => Err(DecodeError::RequestsNotArray),
            None => Ok(ClientEnvelope::Other),
        }
    }
}

fn parse_object(text: &str) -> Result<Map<String, Value>, DecodeError> {
    match serde_json::from_str::<Value>(text)? {
        Value::Object(object) => Ok(object),
        _ => Err(DecodeError::NotAnObject),
    }
}

/// Encodes the join envelope for `identity`.
pub fn encode_join(identity: &str) -> String {
    json!({ JOIN_KEY: identity }).to_string()
}

/// Encodes a request envelope carrying `commands`.
pub fn encode_requests(commands: &[Command]) -> String {
    json!({ REQUESTS_KEY: commands }).to_string()
}

/// A single lobby command issued by a joined client
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    GetUserName,
    UpdateIsReady { ready: bool },
    Chat { text: String },
    InitStartGame,
    CancelStartGame,
    StartGame,
    /// Unrecognised name or malformed arguments; carries the raw tuple.
    Unknown(Value),
}

impl Command {
    /// Maps one request tuple onto a command.
    ///
    /// Anything that is not a known name with arguments of the expected
    /// type becomes [`Command::Unknown`], which the server ignores.
    pub fn from_value(value: &Value) -> Self {
        let Some(tuple) = value.as_array() else {
            return Command::Unknown(value.clone());
        };
        let name = tuple.first().and_then(Value::as_str);
        let arg = tuple.get(1);

        match (name, arg) {
            (Some("get_user_name"), _) => Command::GetUserName,
            (Some("update_is_ready"), Some(Value::Bool(ready))) => {
                Command::UpdateIsReady { ready: *ready }
            }
            (Some("chat"), Some(Value::String(text))) => Command::Chat { text: text.clone() },
            (Some("init_start_game"), _) => Command::InitStartGame,
            (Some("cancel_start_game"), _) => Command::CancelStartGame,
            (Some("start_game"), _) => Command::StartGame,
            _ => Command::Unknown(value.clone()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Command::GetUserName => "get_user_name",
            Command::UpdateIsReady { .. } => "update_is_ready",
            Command::Chat { .. } => "chat",
            Command::InitStartGame => "init_start_game",
            Command::CancelStartGame => "cancel_start_game",
            Command::StartGame => "start_game",
            Command::Unknown(_) => "unknown",
        }
    }
}

impl Serialize for Command {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Command::UpdateIsReady { ready } => (self.name(), ready).serialize(serializer),
            Command::Chat { text } => (self.name(), text).serialize(serializer),
            Command::Unknown(raw) => raw.serialize(serializer),
            _ => (self.name(),).serialize(serializer),
        }
    }
}

/// One row of the lobby roster: `[identity, name, ready, leader]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub identity: String,
    pub name: String,
    pub ready: bool,
    pub leader: bool,
}

impl Serialize for RosterEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (&self.identity, &self.name, self.ready, self.leader).serialize(serializer)
    }
}

/// Events pushed from the server to clients
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    JoinServer {
        identity: String,
        name: String,
        leader: bool,
    },
    GetLobbyPlayers(Vec<RosterEntry>),
    UpdateIsReady {
        identity: String,
        ready: bool,
    },
    Chat {
        name: String,
        text: String,
        timestamp: String,
    },
    InitStartGame,
    CancelStartGame,
    StartGame,
    GetUserName {
        name: String,
    },
    Error {
        code: String,
        message: String,
    },
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Event::JoinServer {
                identity,
                name,
                leader,
            } => ("join_server", identity, name, leader).serialize(serializer),
            Event::GetLobbyPlayers(roster) => ("get_lobby_players", roster).serialize(serializer),
            Event::UpdateIsReady { identity, ready } => {
                ("update_is_ready", identity, ready).serialize(serializer)
            }
            Event::Chat {
                name,
                text,
                timestamp,
            } => ("chat", name, text, timestamp).serialize(serializer),
            Event::InitStartGame => ("init_start_game",).serialize(serializer),
            Event::CancelStartGame => ("cancel_start_game",).serialize(serializer),
            Event::StartGame => ("start_game",).serialize(serializer),
            Event::GetUserName { name } => ("get_user_name", name).serialize(serializer),
            Event::Error { code, message } => ("error", code, message).serialize(serializer),
        }
    }
}

/// Outbound frame; `res` is always a list, even for a single event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerEnvelope {
    pub res: Vec<Event>,
}

impl ServerEnvelope {
    pub fn new(res: Vec<Event>) -> Self {
        Self { res }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
