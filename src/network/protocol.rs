//! Protocol Messages
//!
//! Wire format for client-worker communication over WebSocket.
//! Text frames carry JSON, binary frames carry bincode. Enums use serde's
//! default external tagging because bincode cannot decode internally tagged
//! enums; the same types then serve both encodings.
//!
//! Turn data inside a running game is not part of this protocol.

use serde::{Serialize, Deserialize};

use crate::core::id::{ClientId, GameId};
use crate::game::config::GameConfig;
use crate::game::phase::GamePhase;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join (or rejoin) a game.
    Join(JoinRequest),

    /// Private-lobby creator starts the game.
    StartGame,

    /// Ping for latency measurement.
    Ping { timestamp: u64 },

    /// Player is leaving the game.
    Leave,
}

/// Join request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinRequest {
    /// Game to join.
    pub game_id: GameId,
    /// Client identity, stable across reconnects.
    pub client_id: ClientId,
    /// Display name.
    pub username: String,
    /// Last turn the client has; 0 on a fresh join.
    #[serde(default)]
    pub last_turn: u32,
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerMessage {
    /// Join accepted.
    Joined(JoinedInfo),

    /// Game is locking; start loading the map.
    Prestart(PrestartInfo),

    /// Game started.
    Start(StartInfo),

    /// Removed from the game by an operator.
    Kicked { reason: String },

    /// Pong response.
    Pong { timestamp: u64, server_time: u64 },

    /// Error message.
    Error(ServerError),

    /// Server is shutting down.
    Shutdown { reason: String },
}

/// Join acknowledgment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinedInfo {
    /// Game joined.
    pub game_id: GameId,
    /// Phase at join time.
    pub phase: GamePhase,
    /// Connected humans including this client.
    pub num_clients: usize,
    /// Turn the client should resume from.
    pub resume_turn: u32,
    /// Whether this client may start the game.
    pub is_creator: bool,
}

/// Prestart notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrestartInfo {
    /// Game locking.
    pub game_id: GameId,
    /// Configuration to load.
    pub config: GameConfig,
}

/// Start notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartInfo {
    /// Game started.
    pub game_id: GameId,
    /// Final configuration.
    pub config: GameConfig,
    /// Everyone seated at start.
    pub players: Vec<PlayerInfo>,
    /// Start time, epoch ms.
    pub started_at: u64,
}

/// A seated player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerInfo {
    /// Client identity.
    pub client_id: ClientId,
    /// Display name.
    pub username: String,
    /// Computer-controlled.
    pub is_ai: bool,
}

/// Server error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

impl ServerError {
    /// Shorthand constructor.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Frame could not be decoded.
    InvalidMessage,
    /// No such game on this worker.
    GameNotFound,
    /// Lobby is full.
    GameFull,
    /// Game no longer accepts this client.
    NotJoinable,
    /// Client was kicked from this game.
    Kicked,
    /// Only the lobby creator may do this.
    NotCreator,
    /// Message requires a joined game.
    NotInGame,
    /// Internal error.
    InternalError,
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Serialize to binary.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize from binary.
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Serialize to binary.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize from binary.
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}
