//! Public Lobby Scheduler
//!
//! Keeps exactly one joinable public lobby available. Every poll fetches the
//! tracked lobbies from their owning workers, drops the ones about to lock,
//! publishes the rest, and creates a new lobby once none remain.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::RwLock;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

use crate::config::ServerConfig;
use crate::core::id::GameId;
use crate::core::now_ms;
use crate::game::playlist::MapPlaylist;
use crate::network::api::{GameInfo, PublicLobbies};
use crate::network::client::{with_timeout, WorkerClient};

/// What one poll did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollOutcome {
    /// Lobbies still listed.
    pub listed: Vec<GameInfo>,
    /// Lobbies dropped from tracking.
    pub dropped: Vec<GameId>,
    /// Lobby created by this poll.
    pub created: Option<GameId>,
}

/// Public lobby scheduler.
pub struct LobbyScheduler<C> {
    client: Arc<C>,
    config: ServerConfig,
    playlist: MapPlaylist,
    lobbies: BTreeSet<GameId>,
    published: Arc<RwLock<String>>,
}

impl<C: WorkerClient> LobbyScheduler<C> {
    /// Scheduler publishing its listing into `published`.
    pub fn new(client: Arc<C>, config: ServerConfig, playlist: MapPlaylist, published: Arc<RwLock<String>>) -> Self {
        Self {
            client,
            config,
            playlist,
            lobbies: BTreeSet::new(),
            published,
        }
    }

    /// Lobby IDs currently tracked.
    pub fn tracked(&self) -> impl Iterator<Item = &GameId> {
        self.lobbies.iter()
    }

    /// Whether a fetched lobby should stay listed at `now_ms`.
    fn keep(&self, info: &GameInfo) -> bool {
        let expiring = info
            .ms_until_start
            .map_or(true, |ms| ms <= self.config.lobby_lock_threshold_ms);
        let full = info.num_clients >= info.game_config.capacity() as usize;
        !expiring && !full
    }

    /// One scheduling cycle.
    pub async fn poll_once(&mut self, now_ms: u64) -> PollOutcome {
        let mut outcome = PollOutcome::default();
        let deadline = self.config.worker_request_timeout;

        let fetches = self.lobbies.iter().map(|game_id| {
            let worker = self.config.worker_for(game_id);
            let client = &self.client;
            async move { (game_id.clone(), with_timeout(deadline, client.game_info(worker, game_id)).await) }
        });
        let results = join_all(fetches).await;

        for (game_id, result) in results {
            match result {
                Ok(mut info) => {
                    info.ms_until_start = info.starts_at.map(|at| at as i64 - now_ms as i64);
                    if self.keep(&info) {
                        outcome.listed.push(info);
                    } else {
                        debug!(%game_id, ms_until_start = ?info.ms_until_start, clients = info.num_clients, "lobby closed to listing");
                        outcome.dropped.push(game_id);
                    }
                }
                Err(e) => {
                    warn!(%game_id, "lobby fetch failed: {}", e);
                    outcome.dropped.push(game_id);
                }
            }
        }
        for game_id in &outcome.dropped {
            self.lobbies.remove(game_id);
        }

        self.publish(&outcome.listed).await;

        if self.lobbies.is_empty() {
            outcome.created = self.create_lobby().await;
        }
        outcome
    }

    async fn publish(&self, lobbies: &[GameInfo]) {
        let body = PublicLobbies { lobbies: lobbies.to_vec() };
        match serde_json::to_string(&body) {
            Ok(json) => *self.published.write().await = json,
            Err(e) => warn!("failed to serialize lobby listing: {}", e),
        }
    }

    async fn create_lobby(&mut self) -> Option<GameId> {
        let game_id = GameId::generate();
        let config = self.playlist.game_config();
        let worker = self.config.worker_for(&game_id);
        self.lobbies.insert(game_id.clone());

        let deadline = self.config.worker_request_timeout;
        match with_timeout(deadline, self.client.create_game(worker, &game_id, &config)).await {
            Ok(_) => {
                info!(%game_id, %worker, map = %config.game_map, max_players = ?config.max_players, "public lobby created");
                Some(game_id)
            }
            Err(e) => {
                warn!(%game_id, %worker, "lobby creation failed: {}", e);
                self.lobbies.remove(&game_id);
                None
            }
        }
    }

    /// Poll forever at the configured interval.
    #[instrument(skip(self), fields(interval = ?self.config.lobby_poll_interval))]
    pub async fn run(mut self) {
        let mut interval = tokio::time::interval(self.config.lobby_poll_interval);
        // Cycles run back to back; a slow cycle swallows the ticks it overran
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            self.poll_once(now_ms()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use crate::core::id::ClientId;
    use crate::core::shard::WorkerId;
    use crate::game::config::GameConfig;
    use crate::game::phase::GamePhase;
    use crate::network::client::WorkerClientError;

    const LOBBY_MS: u64 = 60_000;

    /// In-memory workers; lobbies start `LOBBY_MS` after `now`.
    #[derive(Default)]
    struct FakeWorkers {
        now: u64,
        lobbies: Mutex<BTreeMap<GameId, GameInfo>>,
        creates: Mutex<Vec<(WorkerId, GameId)>>,
        fail_creates: bool,
    }

    impl WorkerClient for FakeWorkers {
        async fn game_info(&self, _: WorkerId, game_id: &GameId) -> Result<GameInfo, WorkerClientError> {
            self.lobbies
                .lock()
                .unwrap()
                .get(game_id)
                .cloned()
                .ok_or(WorkerClientError::Status(404))
        }

        async fn create_game(
            &self,
            worker: WorkerId,
            game_id: &GameId,
            config: &GameConfig,
        ) -> Result<GameInfo, WorkerClientError> {
            self.creates.lock().unwrap().push((worker, game_id.clone()));
            if self.fail_creates {
                return Err(WorkerClientError::Status(500));
            }
            let info = GameInfo {
                game_id: game_id.clone(),
                num_clients: 0,
                ai_players_count: 0,
                game_config: config.clone(),
                created_at: self.now,
                started_at: None,
                starts_at: Some(self.now + LOBBY_MS),
                ms_until_start: None,
                has_started: false,
                phase: GamePhase::Lobby,
            };
            self.lobbies.lock().unwrap().insert(game_id.clone(), info.clone());
            Ok(info)
        }

        async fn is_active(&self, _: WorkerId, game_id: &GameId) -> Result<bool, WorkerClientError> {
            Ok(self.lobbies.lock().unwrap().contains_key(game_id))
        }

        async fn kick_player(&self, _: WorkerId, _: &GameId, _: &ClientId) -> Result<(), WorkerClientError> {
            Ok(())
        }

        async fn public_active_games(&self, _: WorkerId, _: usize) -> Result<Vec<GameInfo>, WorkerClientError> {
            Ok(Vec::new())
        }
    }

    fn scheduler(workers: Arc<FakeWorkers>) -> (LobbyScheduler<FakeWorkers>, Arc<RwLock<String>>) {
        let published = Arc::new(RwLock::new(String::new()));
        let config = ServerConfig { num_workers: 4, ..ServerConfig::default() };
        let scheduler = LobbyScheduler::new(workers, config, MapPlaylist::new(7, true), published.clone());
        (scheduler, published)
    }

    #[tokio::test]
    async fn test_no_lobbies_creates_exactly_one() {
        let workers = Arc::new(FakeWorkers::default());
        let (mut scheduler, _) = scheduler(workers.clone());

        let outcome = scheduler.poll_once(0).await;
        assert!(outcome.created.is_some());
        let creates = workers.creates.lock().unwrap().clone();
        assert_eq!(creates.len(), 1);

        // Created on the worker that owns the ID
        let (worker, game_id) = &creates[0];
        assert_eq!(*worker, scheduler.config.worker_for(game_id));
    }

    #[tokio::test]
    async fn test_live_lobby_creates_nothing() {
        let workers = Arc::new(FakeWorkers::default());
        let (mut scheduler, published) = scheduler(workers.clone());
        scheduler.poll_once(0).await;

        let outcome = scheduler.poll_once(1_000).await;
        assert_eq!(outcome.created, None);
        assert_eq!(outcome.listed.len(), 1);
        assert_eq!(outcome.listed[0].ms_until_start, Some(59_000));
        assert_eq!(workers.creates.lock().unwrap().len(), 1);

        let listing: PublicLobbies = serde_json::from_str(&published.read().await).unwrap();
        assert_eq!(listing.lobbies.len(), 1);
    }

    #[tokio::test]
    async fn test_expiring_lobby_is_replaced() {
        let workers = Arc::new(FakeWorkers::default());
        let (mut scheduler, published) = scheduler(workers.clone());
        let first = scheduler.poll_once(0).await.created.unwrap();

        let outcome = scheduler.poll_once(LOBBY_MS - 250).await;
        assert_eq!(outcome.dropped, vec![first.clone()]);
        let second = outcome.created.unwrap();
        assert_ne!(first, second);

        let listing: PublicLobbies = serde_json::from_str(&published.read().await).unwrap();
        assert!(listing.lobbies.is_empty());
        assert_eq!(scheduler.tracked().collect::<Vec<_>>(), vec![&second]);
    }

    #[tokio::test]
    async fn test_full_lobby_is_dropped() {
        let workers = Arc::new(FakeWorkers::default());
        let (mut scheduler, _) = scheduler(workers.clone());
        let game_id = scheduler.poll_once(0).await.created.unwrap();
        {
            let mut lobbies = workers.lobbies.lock().unwrap();
            let lobby = lobbies.get_mut(&game_id).unwrap();
            lobby.num_clients = lobby.game_config.capacity() as usize;
        }

        let outcome = scheduler.poll_once(1_000).await;
        assert_eq!(outcome.dropped, vec![game_id]);
        assert!(outcome.created.is_some());
    }

    #[tokio::test]
    async fn test_unreachable_lobby_is_dropped() {
        let workers = Arc::new(FakeWorkers::default());
        let (mut scheduler, _) = scheduler(workers.clone());
        let game_id = scheduler.poll_once(0).await.created.unwrap();
        workers.lobbies.lock().unwrap().clear();

        let outcome = scheduler.poll_once(1_000).await;
        assert_eq!(outcome.dropped, vec![game_id]);
    }

    #[tokio::test]
    async fn test_failed_create_is_untracked() {
        let workers = Arc::new(FakeWorkers { fail_creates: true, ..FakeWorkers::default() });
        let (mut scheduler, _) = scheduler(workers.clone());

        let outcome = scheduler.poll_once(0).await;
        assert_eq!(outcome.created, None);
        assert_eq!(scheduler.tracked().count(), 0);

        scheduler.poll_once(100).await;
        assert_eq!(workers.creates.lock().unwrap().len(), 2);
    }
}
