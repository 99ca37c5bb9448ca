//! Worker Control Surface
//!
//! Loopback HTTP API the dispatcher uses to create games, read lobby
//! snapshots and kick players. Mutating routes require the admin header.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::registry::{RegistryError, SessionRegistry};
use super::session::SessionError;
use crate::core::id::{ClientId, GameId};
use crate::core::now_ms;
use crate::game::config::GameConfig;
use crate::network::api::{
    ActiveResponse, ApiError, GameInfo, LimitQuery, PublicActiveGames, WorkerStatus,
};
use crate::network::auth::AdminAuth;

/// Shared handler state.
#[derive(Clone)]
pub struct WorkerState {
    /// This worker's sessions.
    pub registry: Arc<RwLock<SessionRegistry>>,
    /// Admin header check.
    pub auth: Arc<AdminAuth>,
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        let message = e.to_string();
        match e {
            RegistryError::GameNotFound(_) => ApiError::not_found(message),
            RegistryError::WrongShard { .. } | RegistryError::Config(_) => ApiError::bad_request(message),
            RegistryError::Session(SessionError::ClientNotFound) => ApiError::not_found(message),
            RegistryError::Session(_) => ApiError::conflict(message),
        }
    }
}

/// Build the control router.
pub fn router(state: WorkerState) -> Router {
    Router::new()
        .route("/api/create_game/:game_id", post(create_game))
        .route("/api/game/:game_id", get(game_info))
        .route("/api/game/:game_id/active", get(game_active))
        .route("/api/kick_player/:game_id/:client_id", post(kick_player))
        .route("/api/public_active_games", get(public_active_games))
        .route("/api/status", get(status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn create_game(
    State(state): State<WorkerState>,
    Path(game_id): Path<GameId>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<GameInfo>, ApiError> {
    state.auth.verify(&headers)?;

    // An empty body means the defaults
    let config: GameConfig = if body.iter().all(u8::is_ascii_whitespace) {
        GameConfig::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::bad_request(format!("invalid game config: {e}")))?
    };

    let info = state.registry.write().await.create_game(game_id, config, now_ms())?;
    Ok(Json(info))
}

async fn game_info(
    State(state): State<WorkerState>,
    Path(game_id): Path<GameId>,
) -> Result<Json<GameInfo>, ApiError> {
    state
        .registry
        .read()
        .await
        .game_info(&game_id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("game {game_id} not found")))
}

async fn game_active(
    State(state): State<WorkerState>,
    Path(game_id): Path<GameId>,
) -> Json<ActiveResponse> {
    let active = state.registry.read().await.is_active(&game_id);
    Json(ActiveResponse { active })
}

async fn kick_player(
    State(state): State<WorkerState>,
    Path((game_id, client_id)): Path<(GameId, ClientId)>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.auth.verify(&headers)?;
    state.registry.write().await.kick_player(&game_id, &client_id)?;
    info!(%game_id, %client_id, "player kicked by admin");
    Ok(Json(serde_json::json!({ "kicked": client_id })))
}

async fn public_active_games(
    State(state): State<WorkerState>,
    Query(query): Query<LimitQuery>,
) -> Json<PublicActiveGames> {
    let games = state.registry.read().await.public_active_games(query.clamped());
    Json(PublicActiveGames { games })
}

async fn status(State(state): State<WorkerState>) -> Json<WorkerStatus> {
    Json(state.registry.read().await.status())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tokio::sync::mpsc;
    use tower::ServiceExt;
    use crate::config::ServerConfig;

    const HEADER: &str = "x-admin-key";
    const TOKEN: &str = "secret-token";

    fn game_id() -> GameId {
        GameId::parse("HttpGame").unwrap()
    }

    fn state() -> WorkerState {
        let mut config = ServerConfig::default();
        config.num_workers = 1;
        config.ai.enabled = false;
        WorkerState {
            registry: Arc::new(RwLock::new(SessionRegistry::new(config.worker_for(&game_id()), config))),
            auth: Arc::new(AdminAuth::new(HEADER, TOKEN)),
        }
    }

    fn create_request(body: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(format!("/api/create_game/{}", game_id()))
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header(HEADER, token);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_create_requires_admin_header() {
        let state = state();
        let app = router(state.clone());

        let response = app.clone().oneshot(create_request("", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app.oneshot(create_request("", Some("wrong"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        assert_eq!(state.registry.read().await.active_games(), 0);
    }

    #[tokio::test]
    async fn test_create_with_empty_body_uses_defaults() {
        let app = router(state());
        let response = app.clone().oneshot(create_request("", Some(TOKEN))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["game_id"], "HttpGame");
        assert_eq!(body["phase"], "lobby");

        let response = app
            .oneshot(Request::builder().uri("/api/game/HttpGame").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_create_rejects_bad_input() {
        let app = router(state());

        let response = app.clone().oneshot(create_request("{not json", Some(TOKEN))).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .clone()
            .oneshot(create_request(r#"{"max_players":0}"#, Some(TOKEN)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bad_id = Request::builder()
            .method("POST")
            .uri("/api/create_game/bad!")
            .header(HEADER, TOKEN)
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(bad_id).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_game() {
        let app = router(state());
        let response = app
            .clone()
            .oneshot(Request::builder().uri("/api/game/Missing1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(Request::builder().uri("/api/game/Missing1/active").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["active"], false);
    }

    #[tokio::test]
    async fn test_kick_player() {
        let state = state();
        let app = router(state.clone());
        app.clone().oneshot(create_request("", Some(TOKEN))).await.unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let client = ClientId::parse("Client01").unwrap();
        state
            .registry
            .write()
            .await
            .add_client(&game_id(), client.clone(), "alice".into(), 0, tx, now_ms())
            .unwrap();

        let kick = |token: &str, target: &str| {
            Request::builder()
                .method("POST")
                .uri(format!("/api/kick_player/HttpGame/{target}"))
                .header(HEADER, token)
                .body(Body::empty())
                .unwrap()
        };

        let response = app.clone().oneshot(kick("nope", "Client01")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app.clone().oneshot(kick(TOKEN, "Client01")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        rx.recv().await.unwrap();
        assert!(matches!(
            rx.recv().await.unwrap(),
            crate::network::protocol::ServerMessage::Kicked { .. }
        ));

        let response = app.oneshot(kick(TOKEN, "Client01")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_status_and_listing() {
        let app = router(state());
        app.clone().oneshot(create_request("", Some(TOKEN))).await.unwrap();

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/api/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["active_games"], 1);
        assert_eq!(body["failed_endings"], serde_json::json!([]));

        let response = app
            .oneshot(Request::builder().uri("/api/public_active_games?limit=3").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_json(response).await["games"], serde_json::json!([]));
    }
}
