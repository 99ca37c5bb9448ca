//! Dispatcher Public Surface
//!
//! Serves the cached lobby listing and fans other reads out to the workers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::future::join_all;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::core::id::{ClientId, GameId};
use crate::network::api::{merge_active_games, ActiveResponse, ApiError, LimitQuery, PublicActiveGames};
use crate::network::auth::AdminAuth;
use crate::network::client::{with_timeout, WorkerClient};

/// Shared handler state.
pub struct DispatcherState<C> {
    /// Worker access.
    pub client: Arc<C>,
    /// Pool layout and timeouts.
    pub config: Arc<ServerConfig>,
    /// Admin header check.
    pub auth: Arc<AdminAuth>,
    /// Serialized lobby listing kept current by the scheduler.
    pub lobbies: Arc<RwLock<String>>,
}

impl<C> Clone for DispatcherState<C> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            config: self.config.clone(),
            auth: self.auth.clone(),
            lobbies: self.lobbies.clone(),
        }
    }
}

/// Build the public router.
pub fn router<C: WorkerClient>(state: DispatcherState<C>) -> Router {
    Router::new()
        .route("/api/public_lobbies", get(public_lobbies::<C>))
        .route("/api/public_active_games", get(public_active_games::<C>))
        .route("/api/game/:game_id/active", get(game_active::<C>))
        .route("/api/kick_player/:game_id/:client_id", post(kick_player::<C>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn public_lobbies<C: WorkerClient>(State(state): State<DispatcherState<C>>) -> impl IntoResponse {
    let body = state.lobbies.read().await.clone();
    ([(header::CONTENT_TYPE, "application/json")], body)
}

async fn public_active_games<C: WorkerClient>(
    State(state): State<DispatcherState<C>>,
    Query(query): Query<LimitQuery>,
) -> Json<PublicActiveGames> {
    let limit = query.clamped();
    let deadline = state.config.worker_request_timeout;

    let calls = state.config.workers().map(|worker| {
        let client = &state.client;
        async move { (worker, with_timeout(deadline, client.public_active_games(worker, limit)).await) }
    });

    let listings = join_all(calls).await.into_iter().filter_map(|(worker, result)| match result {
        Ok(games) => Some(games),
        Err(e) => {
            warn!(%worker, "active games fetch failed: {}", e);
            None
        }
    });

    Json(PublicActiveGames {
        games: merge_active_games(listings, limit),
    })
}

async fn game_active<C: WorkerClient>(
    State(state): State<DispatcherState<C>>,
    Path(game_id): Path<GameId>,
) -> Json<ActiveResponse> {
    let worker = state.config.worker_for(&game_id);
    let deadline = state.config.worker_request_timeout;
    let active = match with_timeout(deadline, state.client.is_active(worker, &game_id)).await {
        Ok(active) => active,
        Err(e) => {
            warn!(%game_id, %worker, "active check failed: {}", e);
            false
        }
    };
    Json(ActiveResponse { active })
}

async fn kick_player<C: WorkerClient>(
    State(state): State<DispatcherState<C>>,
    Path((game_id, client_id)): Path<(GameId, ClientId)>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.auth.verify(&headers)?;

    let worker = state.config.worker_for(&game_id);
    let deadline = state.config.worker_request_timeout;
    with_timeout(deadline, state.client.kick_player(worker, &game_id, &client_id))
        .await
        .map_err(|e| ApiError::internal(format!("kick failed: {e}")))?;

    info!(%game_id, %client_id, %worker, "player kicked");
    Ok(Json(serde_json::json!({ "kicked": client_id })))
}
