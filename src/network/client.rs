//! Internal Worker Client
//!
//! Typed access from the dispatcher to worker control surfaces over
//! loopback HTTP. The trait is the seam the scheduler and the dispatcher
//! routes are generic over; tests substitute in-memory fakes.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use super::api::{ActiveResponse, GameInfo, PublicActiveGames};
use crate::config::ServerConfig;
use crate::core::id::{ClientId, GameId};
use crate::core::shard::WorkerId;
use crate::game::config::GameConfig;

/// Worker call errors.
#[derive(Debug, Error)]
pub enum WorkerClientError {
    /// Transport failure.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Worker answered with a non-success status.
    #[error("worker returned status {0}")]
    Status(u16),
    /// Call exceeded its deadline.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

/// Await a worker call, failing with [`WorkerClientError::Timeout`] after `limit`.
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, WorkerClientError>
where
    F: Future<Output = Result<T, WorkerClientError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| WorkerClientError::Timeout(limit))?
}

/// Operations the dispatcher performs on workers.
pub trait WorkerClient: Send + Sync + 'static {
    /// Lobby snapshot of a game.
    fn game_info(
        &self,
        worker: WorkerId,
        game_id: &GameId,
    ) -> impl Future<Output = Result<GameInfo, WorkerClientError>> + Send;

    /// Register a new game.
    fn create_game(
        &self,
        worker: WorkerId,
        game_id: &GameId,
        config: &GameConfig,
    ) -> impl Future<Output = Result<GameInfo, WorkerClientError>> + Send;

    /// Whether a game is running.
    fn is_active(
        &self,
        worker: WorkerId,
        game_id: &GameId,
    ) -> impl Future<Output = Result<bool, WorkerClientError>> + Send;

    /// Remove a client from a game.
    fn kick_player(
        &self,
        worker: WorkerId,
        game_id: &GameId,
        client_id: &ClientId,
    ) -> impl Future<Output = Result<(), WorkerClientError>> + Send;

    /// A worker's public active-game listing.
    fn public_active_games(
        &self,
        worker: WorkerId,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<GameInfo>, WorkerClientError>> + Send;
}

/// `WorkerClient` over loopback HTTP.
#[derive(Debug, Clone)]
pub struct HttpWorkerClient {
    http: reqwest::Client,
    config: ServerConfig,
}

impl HttpWorkerClient {
    /// Create a client with the configured per-request timeout.
    pub fn new(config: ServerConfig) -> Result<Self, WorkerClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.worker_request_timeout)
            .build()?;
        Ok(Self { http, config })
    }

    fn url(&self, worker: WorkerId, path: &str) -> String {
        format!("{}{}", self.config.worker_url(worker), path)
    }

    fn check(response: reqwest::Response) -> Result<reqwest::Response, WorkerClientError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(WorkerClientError::Status(status.as_u16()))
        }
    }
}

impl WorkerClient for HttpWorkerClient {
    async fn game_info(&self, worker: WorkerId, game_id: &GameId) -> Result<GameInfo, WorkerClientError> {
        let response = self
            .http
            .get(self.url(worker, &format!("/api/game/{game_id}")))
            .send()
            .await?;
        Ok(Self::check(response)?.json().await?)
    }

    async fn create_game(
        &self,
        worker: WorkerId,
        game_id: &GameId,
        config: &GameConfig,
    ) -> Result<GameInfo, WorkerClientError> {
        debug!(%worker, %game_id, map = %config.game_map, "creating game");
        let response = self
            .http
            .post(self.url(worker, &format!("/api/create_game/{game_id}")))
            .header(self.config.admin_header.as_str(), self.config.admin_token.as_str())
            .json(config)
            .send()
            .await?;
        Ok(Self::check(response)?.json().await?)
    }

    async fn is_active(&self, worker: WorkerId, game_id: &GameId) -> Result<bool, WorkerClientError> {
        let response = self
            .http
            .get(self.url(worker, &format!("/api/game/{game_id}/active")))
            .send()
            .await?;
        let body: ActiveResponse = Self::check(response)?.json().await?;
        Ok(body.active)
    }

    async fn kick_player(
        &self,
        worker: WorkerId,
        game_id: &GameId,
        client_id: &ClientId,
    ) -> Result<(), WorkerClientError> {
        let response = self
            .http
            .post(self.url(worker, &format!("/api/kick_player/{game_id}/{client_id}")))
            .header(self.config.admin_header.as_str(), self.config.admin_token.as_str())
            .send()
            .await?;
        Self::check(response)?;
        Ok(())
    }

    async fn public_active_games(
        &self,
        worker: WorkerId,
        limit: usize,
    ) -> Result<Vec<GameInfo>, WorkerClientError> {
        let response = self
            .http
            .get(self.url(worker, &format!("/api/public_active_games?limit={limit}")))
            .send()
            .await?;
        let body: PublicActiveGames = Self::check(response)?.json().await?;
        Ok(body.games)
    }
}
