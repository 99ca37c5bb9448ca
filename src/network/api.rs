//! HTTP API Types
//!
//! Bodies exchanged on the worker control surface and the dispatcher's
//! public surface. All timestamps are epoch milliseconds.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Serialize, Deserialize};
use tracing::warn;

use super::auth::AuthError;

use crate::core::id::GameId;
use crate::core::shard::WorkerId;
use crate::game::config::GameConfig;
use crate::game::phase::GamePhase;

/// Largest listing the active-games endpoints return.
pub const MAX_PUBLIC_ACTIVE_GAMES: usize = 20;

/// Snapshot of one game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameInfo {
    /// Game identifier.
    pub game_id: GameId,
    /// Connected humans.
    pub num_clients: usize,
    /// Seated bots.
    #[serde(default)]
    pub ai_players_count: usize,
    /// Configuration the game was created with.
    pub game_config: GameConfig,
    /// Creation time.
    pub created_at: u64,
    /// Engine start time, once started.
    #[serde(default)]
    pub started_at: Option<u64>,
    /// When a public lobby locks.
    #[serde(default)]
    pub starts_at: Option<u64>,
    /// Filled in by the dispatcher relative to its own clock.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ms_until_start: Option<i64>,
    /// Whether the engine has started.
    pub has_started: bool,
    /// Lifecycle phase at snapshot time.
    pub phase: GamePhase,
}

impl GameInfo {
    /// Sort key for "most recently started first".
    pub fn recency(&self) -> u64 {
        self.started_at.unwrap_or(self.created_at)
    }
}

/// `GET /api/game/:id/active` body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveResponse {
    /// Exists and has not finished.
    pub active: bool,
}

/// `GET /api/public_lobbies` body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PublicLobbies {
    /// Joinable public lobbies.
    pub lobbies: Vec<GameInfo>,
}

/// `GET /api/public_active_games` body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PublicActiveGames {
    /// Most recently started first.
    pub games: Vec<GameInfo>,
}

/// `?limit=N` query.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct LimitQuery {
    /// Requested listing size.
    pub limit: Option<usize>,
}

impl LimitQuery {
    /// Requested limit clamped to `1..=20`; absent means the maximum.
    pub fn clamped(&self) -> usize {
        self.limit
            .unwrap_or(MAX_PUBLIC_ACTIVE_GAMES)
            .clamp(1, MAX_PUBLIC_ACTIVE_GAMES)
    }
}

/// A session whose teardown failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedEnding {
    /// Game whose teardown failed.
    pub game_id: GameId,
    /// Teardown error.
    pub error: String,
    /// When the failure was recorded.
    pub failed_at: u64,
}

/// `GET /api/status` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerStatus {
    /// Reporting worker.
    pub worker_id: WorkerId,
    /// Sessions not yet finished.
    pub active_games: usize,
    /// Connected clients across those sessions.
    pub active_clients: usize,
    /// Most recent teardown failures, oldest first.
    pub failed_endings: Vec<FailedEnding>,
}

/// Line a worker prints on stdout once its listeners are bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "WorkerNotice", into = "WorkerNotice")]
pub struct ReadyNotice {
    /// Worker that became ready.
    pub worker_id: WorkerId,
}

/// Tagged stdout lines; the tag must match exactly.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WorkerNotice {
    WorkerReady { worker_id: WorkerId },
}

impl From<WorkerNotice> for ReadyNotice {
    fn from(notice: WorkerNotice) -> Self {
        match notice {
            WorkerNotice::WorkerReady { worker_id } => Self { worker_id },
        }
    }
}

impl From<ReadyNotice> for WorkerNotice {
    fn from(notice: ReadyNotice) -> Self {
        WorkerNotice::WorkerReady { worker_id: notice.worker_id }
    }
}

impl ReadyNotice {
    /// Parse a stdout line; anything else is `None`.
    pub fn parse_line(line: &str) -> Option<Self> {
        serde_json::from_str(line.trim()).ok()
    }
}

/// Error body returned by both HTTP surfaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// Response status.
    pub status: StatusCode,
    /// Sent as `{"error": message}`.
    pub message: String,
}

impl ApiError {
    /// 400.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, message: message.into() }
    }

    /// 401.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self { status: StatusCode::UNAUTHORIZED, message: message.into() }
    }

    /// 404.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self { status: StatusCode::NOT_FOUND, message: message.into() }
    }

    /// 409.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self { status: StatusCode::CONFLICT, message: message.into() }
    }

    /// 500.
    pub fn internal(message: impl Into<String>) -> Self {
        Self { status: StatusCode::INTERNAL_SERVER_ERROR, message: message.into() }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        Self::unauthorized(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        warn!(status = %self.status, message = %self.message, "api request failed");
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

/// Merge per-worker listings, most recent start first, capped at `limit`.
pub fn merge_active_games(listings: impl IntoIterator<Item = Vec<GameInfo>>, limit: usize) -> Vec<GameInfo> {
    let mut games: Vec<GameInfo> = listings.into_iter().flatten().collect();
    games.sort_by(|a, b| b.recency().cmp(&a.recency()));
    games.truncate(limit);
    games
}
