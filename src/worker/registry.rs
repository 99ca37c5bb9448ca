//! Session Registry
//!
//! Per-worker map of game ID to session. The registry is the only place
//! that drives lifecycle transitions: each tick refreshes every session's
//! phase, prestarts and starts sessions that became active, and tears down
//! finished ones. Handlers query and mutate through it, never around it.

use std::collections::{BTreeMap, VecDeque};

use thiserror::Error;
use tracing::{error, info, warn};

use super::engine::{turn_clock_factory, EngineFactory};
use super::session::{ClientSender, GameSession, JoinOutcome, SessionError};
use crate::config::ServerConfig;
use crate::core::id::{ClientId, GameId};
use crate::core::shard::WorkerId;
use crate::game::config::{ConfigError, GameConfig};
use crate::game::phase::GamePhase;
use crate::network::api::{merge_active_games, FailedEnding, GameInfo, WorkerStatus};

/// Failed teardowns kept for operators.
pub const MAX_FAILED_ENDINGS: usize = 100;

/// Registry errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// No session with this ID.
    #[error("Game {0} not found")]
    GameNotFound(GameId),

    /// ID routes to another worker.
    #[error("Game {game_id} belongs to worker {owner}, not {worker}")]
    WrongShard {
        /// Requested game.
        game_id: GameId,
        /// Worker that owns it.
        owner: WorkerId,
        /// This worker.
        worker: WorkerId,
    },

    /// Rejected configuration.
    #[error("Invalid game config: {0}")]
    Config(#[from] ConfigError),

    /// Session refused the operation.
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Sessions prestarted.
    pub prestarted: usize,
    /// Sessions started.
    pub started: usize,
    /// Sessions ended and evicted.
    pub ended: usize,
    /// Lifecycle hooks that failed.
    pub failures: usize,
}

/// All sessions owned by one worker.
pub struct SessionRegistry {
    worker_id: WorkerId,
    config: ServerConfig,
    sessions: BTreeMap<GameId, GameSession>,
    failed_endings: VecDeque<FailedEnding>,
    engine_factory: EngineFactory,
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("worker_id", &self.worker_id)
            .field("sessions", &self.sessions.len())
            .field("failed_endings", &self.failed_endings.len())
            .finish()
    }
}

impl SessionRegistry {
    /// Registry whose sessions run on a [`TurnClock`](super::engine::TurnClock).
    pub fn new(worker_id: WorkerId, config: ServerConfig) -> Self {
        let factory = turn_clock_factory(config.limits.turn_interval);
        Self::with_engine_factory(worker_id, config, factory)
    }

    /// Registry with a custom engine per session.
    pub fn with_engine_factory(worker_id: WorkerId, config: ServerConfig, engine_factory: EngineFactory) -> Self {
        Self {
            worker_id,
            config,
            sessions: BTreeMap::new(),
            failed_endings: VecDeque::new(),
            engine_factory,
        }
    }

    /// This worker's identity.
    pub fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    /// Register a session. An existing ID returns its current snapshot.
    pub fn create_game(
        &mut self,
        game_id: GameId,
        config: GameConfig,
        now_ms: u64,
    ) -> Result<GameInfo, RegistryError> {
        let owner = self.config.worker_for(&game_id);
        if owner != self.worker_id {
            return Err(RegistryError::WrongShard {
                game_id,
                owner,
                worker: self.worker_id,
            });
        }
        if let Some(existing) = self.sessions.get(&game_id) {
            return Ok(existing.info());
        }
        config.validate()?;

        let engine = (self.engine_factory)(&game_id, &config);
        let session = GameSession::new(
            game_id.clone(),
            config,
            now_ms,
            self.config.limits,
            Some(&self.config.ai),
            engine,
        );
        let info = session.info();
        info!(
            worker = %self.worker_id,
            %game_id,
            map = %info.game_config.game_map,
            game_type = ?info.game_config.game_type,
            "game created"
        );
        self.sessions.insert(game_id, session);
        Ok(info)
    }

    /// Look up a session.
    pub fn game(&self, game_id: &GameId) -> Option<&GameSession> {
        self.sessions.get(game_id)
    }

    fn game_mut(&mut self, game_id: &GameId) -> Result<&mut GameSession, RegistryError> {
        self.sessions
            .get_mut(game_id)
            .ok_or_else(|| RegistryError::GameNotFound(game_id.clone()))
    }

    /// Snapshot of a session.
    pub fn game_info(&self, game_id: &GameId) -> Option<GameInfo> {
        self.sessions.get(game_id).map(GameSession::info)
    }

    /// Whether the game exists and has not finished.
    pub fn is_active(&self, game_id: &GameId) -> bool {
        self.sessions
            .get(game_id)
            .is_some_and(|s| s.phase() != GamePhase::Finished)
    }

    /// Seat or reconnect a client.
    pub fn add_client(
        &mut self,
        game_id: &GameId,
        client_id: ClientId,
        username: String,
        last_turn: u32,
        sender: ClientSender,
        now_ms: u64,
    ) -> Result<JoinOutcome, RegistryError> {
        let session = self.game_mut(game_id)?;
        Ok(session.add_client(client_id, username, last_turn, sender, now_ms)?)
    }

    /// Creator asks a private lobby to start.
    pub fn request_start(&mut self, game_id: &GameId, client_id: &ClientId) -> Result<(), RegistryError> {
        Ok(self.game_mut(game_id)?.request_start(client_id)?)
    }

    /// Connection dropped.
    pub fn disconnect(&mut self, game_id: &GameId, client_id: &ClientId, now_ms: u64) {
        if let Some(session) = self.sessions.get_mut(game_id) {
            session.disconnect(client_id, now_ms);
        }
    }

    /// Connection closed; ignored if the client reconnected elsewhere.
    pub fn release(&mut self, game_id: &GameId, client_id: &ClientId, sender: &ClientSender, now_ms: u64) {
        if let Some(session) = self.sessions.get_mut(game_id) {
            session.release(client_id, sender, now_ms);
        }
    }

    /// Client left on purpose.
    pub fn leave(&mut self, game_id: &GameId, client_id: &ClientId, now_ms: u64) {
        if let Some(session) = self.sessions.get_mut(game_id) {
            session.leave(client_id, now_ms);
        }
    }

    /// Operator removes a client.
    pub fn kick_player(&mut self, game_id: &GameId, client_id: &ClientId) -> Result<(), RegistryError> {
        Ok(self.game_mut(game_id)?.kick(client_id)?)
    }

    /// Drive every session one step.
    ///
    /// Hook failures are logged and never stop the tick. A session whose
    /// teardown fails leaves the map and is recorded in the failed list.
    pub fn tick(&mut self, now_ms: u64) -> TickSummary {
        let mut summary = TickSummary::default();
        let mut finished = Vec::new();

        for (game_id, session) in self.sessions.iter_mut() {
            let phase = session.refresh_phase(now_ms);

            if phase == GamePhase::Active && !session.has_prestarted() {
                match session.prestart(now_ms) {
                    Ok(()) => summary.prestarted += 1,
                    Err(e) => {
                        summary.failures += 1;
                        error!(%game_id, "prestart failed: {}", e);
                    }
                }
            }

            if session.should_start(now_ms) {
                match session.start(now_ms) {
                    Ok(()) => summary.started += 1,
                    Err(e) => {
                        summary.failures += 1;
                        error!(%game_id, "start failed: {}", e);
                    }
                }
            }

            if session.phase() == GamePhase::Finished {
                finished.push(game_id.clone());
            }
        }

        for game_id in finished {
            let Some(mut session) = self.sessions.remove(&game_id) else {
                continue;
            };
            match session.end(now_ms) {
                Ok(()) => {
                    summary.ended += 1;
                    info!(worker = %self.worker_id, %game_id, "game evicted");
                }
                Err(e) => {
                    summary.failures += 1;
                    error!(worker = %self.worker_id, %game_id, "end failed: {}", e);
                    self.record_failed_ending(game_id, e.to_string(), now_ms);
                }
            }
        }

        summary
    }

    fn record_failed_ending(&mut self, game_id: GameId, error: String, now_ms: u64) {
        if self.failed_endings.len() >= MAX_FAILED_ENDINGS {
            if let Some(dropped) = self.failed_endings.pop_front() {
                warn!(game_id = %dropped.game_id, "failed-endings list full, forgetting oldest");
            }
        }
        self.failed_endings.push_back(FailedEnding {
            game_id,
            error,
            failed_at: now_ms,
        });
    }

    /// Run one bot population check on every lobby. Returns bots seated.
    pub fn populate_ai(&mut self, now_ms: u64) -> usize {
        let timeout_sec = self.config.ai_timeout_secs();
        self.sessions
            .values_mut()
            .map(|s| s.populate_ai(now_ms, timeout_sec).len())
            .sum()
    }

    /// Sessions held.
    pub fn active_games(&self) -> usize {
        self.sessions.len()
    }

    /// Connected humans across all sessions.
    pub fn active_clients(&self) -> usize {
        self.sessions.values().map(GameSession::num_clients).sum()
    }

    /// Started public games still running, most recent start first.
    pub fn public_active_games(&self, limit: usize) -> Vec<GameInfo> {
        let games = self
            .sessions
            .values()
            .filter(|s| s.is_public() && s.has_started() && s.phase() == GamePhase::Active)
            .map(GameSession::info)
            .collect();
        merge_active_games([games], limit)
    }

    /// Teardowns that failed, oldest first.
    pub fn failed_endings(&self) -> impl Iterator<Item = &FailedEnding> {
        self.failed_endings.iter()
    }

    /// Worker status snapshot.
    pub fn status(&self) -> WorkerStatus {
        WorkerStatus {
            worker_id: self.worker_id,
            active_games: self.active_games(),
            active_clients: self.active_clients(),
            failed_endings: self.failed_endings.iter().cloned().collect(),
        }
    }

    /// Notify everyone and end every session. Returns sessions ended.
    pub fn shutdown_all(&mut self, now_ms: u64) -> usize {
        let sessions = std::mem::take(&mut self.sessions);
        let count = sessions.len();
        for (game_id, mut session) in sessions {
            session.notify_shutdown("server shutting down");
            if let Err(e) = session.end(now_ms) {
                warn!(%game_id, "end during shutdown failed: {}", e);
            }
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use crate::game::config::GameType;
    use crate::worker::engine::{EngineError, SessionEngine, TurnClock};

    const LOBBY_MS: u64 = 60_000;
    const START_DELAY_MS: u64 = 2_000;

    /// Starts fine, fails on teardown.
    struct BrokenTeardown(TurnClock);

    impl SessionEngine for BrokenTeardown {
        fn start(&mut self, now_ms: u64) -> Result<(), EngineError> {
            self.0.start(now_ms)
        }
        fn turn(&self, now_ms: u64) -> u32 {
            self.0.turn(now_ms)
        }
        fn end(&mut self, _: u64) -> Result<(), EngineError> {
            Err(EngineError::Failed("disk full".into()))
        }
    }

    fn server_config() -> ServerConfig {
        let mut config = ServerConfig::default();
        config.num_workers = 2;
        config.limits.lobby_lifetime = Duration::from_millis(LOBBY_MS);
        config.limits.start_delay = Duration::from_millis(START_DELAY_MS);
        config.ai.enabled = false;
        config
    }

    fn owned_registry(game_id: &GameId) -> SessionRegistry {
        let config = server_config();
        SessionRegistry::new(config.worker_for(game_id), config)
    }

    fn public_config() -> GameConfig {
        GameConfig {
            game_type: GameType::Public,
            max_players: Some(8),
            ..GameConfig::default()
        }
    }

    fn game_id() -> GameId {
        GameId::parse("Registry").unwrap()
    }

    fn client(n: u8) -> ClientId {
        ClientId::parse(&format!("Client{:02}", n)).unwrap()
    }

    fn seat(registry: &mut SessionRegistry, n: u8, now: u64) -> mpsc::Receiver<crate::network::protocol::ServerMessage> {
        let (tx, rx) = mpsc::channel(32);
        registry
            .add_client(&game_id(), client(n), format!("p{n}"), 0, tx, now)
            .unwrap();
        rx
    }

    #[test]
    fn test_create_game_is_idempotent() {
        let mut registry = owned_registry(&game_id());
        let first = registry.create_game(game_id(), public_config(), 100).unwrap();
        let second = registry.create_game(game_id(), GameConfig::default(), 500).unwrap();
        assert_eq!(first.created_at, 100);
        assert_eq!(second.created_at, 100);
        assert_eq!(second.game_config.max_players, Some(8));
        assert_eq!(registry.active_games(), 1);
    }

    #[test]
    fn test_create_game_rejects_wrong_shard() {
        let config = server_config();
        let owner = config.worker_for(&game_id());
        let other = WorkerId((owner.0 + 1) % config.num_workers);
        let mut registry = SessionRegistry::new(other, config);
        assert!(matches!(
            registry.create_game(game_id(), public_config(), 0),
            Err(RegistryError::WrongShard { .. })
        ));
        assert_eq!(registry.active_games(), 0);
    }

    #[test]
    fn test_create_game_rejects_invalid_config() {
        let mut registry = owned_registry(&game_id());
        let config = GameConfig { max_players: Some(0), ..GameConfig::default() };
        assert_eq!(
            registry.create_game(game_id(), config, 0),
            Err(RegistryError::Config(ConfigError::InvalidMaxPlayers(0)))
        );
    }

    #[test]
    fn test_tick_drives_full_lifecycle() {
        let mut registry = owned_registry(&game_id());
        registry.create_game(game_id(), public_config(), 0).unwrap();
        let _rx = seat(&mut registry, 1, 10);

        assert_eq!(registry.tick(LOBBY_MS - 1), TickSummary::default());

        let summary = registry.tick(LOBBY_MS);
        assert_eq!(summary.prestarted, 1);
        assert_eq!(summary.started, 0);

        let summary = registry.tick(LOBBY_MS + START_DELAY_MS);
        assert_eq!(summary.started, 1);
        assert_eq!(registry.public_active_games(20).len(), 1);

        registry.disconnect(&game_id(), &client(1), LOBBY_MS + 3_000);
        registry.tick(LOBBY_MS + 3_000);
        let summary = registry.tick(LOBBY_MS + 40_000);
        assert_eq!(summary.ended, 1);
        assert_eq!(registry.active_games(), 0);
        assert!(!registry.is_active(&game_id()));
    }

    #[test]
    fn test_finished_sessions_never_prestart_again() {
        let mut registry = owned_registry(&game_id());
        registry.create_game(game_id(), public_config(), 0).unwrap();
        let _rx = seat(&mut registry, 1, 10);
        registry.tick(LOBBY_MS);
        registry.tick(LOBBY_MS + START_DELAY_MS);
        registry.disconnect(&game_id(), &client(1), LOBBY_MS + 3_000);
        registry.tick(LOBBY_MS + 3_000);
        registry.tick(LOBBY_MS + 40_000);

        for step in 1..10 {
            let summary = registry.tick(LOBBY_MS + 40_000 + step * 1_000);
            assert_eq!(summary, TickSummary::default());
        }
    }

    #[test]
    fn test_failed_ending_is_recorded() {
        let config = server_config();
        let factory: EngineFactory = Arc::new(|_, _| {
            Box::new(BrokenTeardown(TurnClock::new(Duration::from_millis(100))))
        });
        let mut registry = SessionRegistry::with_engine_factory(config.worker_for(&game_id()), config, factory);
        registry.create_game(game_id(), public_config(), 0).unwrap();
        let _rx = seat(&mut registry, 1, 10);
        registry.tick(LOBBY_MS);
        registry.tick(LOBBY_MS + START_DELAY_MS);
        registry.disconnect(&game_id(), &client(1), LOBBY_MS + 3_000);
        registry.tick(LOBBY_MS + 3_000);

        let summary = registry.tick(LOBBY_MS + 40_000);
        assert_eq!(summary.failures, 1);
        assert_eq!(registry.active_games(), 0);

        let status = registry.status();
        assert_eq!(status.failed_endings.len(), 1);
        assert_eq!(status.failed_endings[0].game_id, game_id());
        assert!(status.failed_endings[0].error.contains("disk full"));
    }

    #[test]
    fn test_private_games_are_not_listed() {
        let mut registry = owned_registry(&game_id());
        let config = GameConfig { game_type: GameType::Private, ..public_config() };
        registry.create_game(game_id(), config, 0).unwrap();
        let _rx = seat(&mut registry, 1, 10);
        registry.request_start(&game_id(), &client(1)).unwrap();
        registry.tick(100);
        registry.tick(100 + START_DELAY_MS);
        assert!(registry.game(&game_id()).unwrap().has_started());
        assert!(registry.public_active_games(20).is_empty());
    }

    #[test]
    fn test_unknown_game_errors() {
        let mut registry = owned_registry(&game_id());
        assert_eq!(
            registry.kick_player(&game_id(), &client(1)),
            Err(RegistryError::GameNotFound(game_id()))
        );
        assert!(registry.game_info(&game_id()).is_none());
    }

    #[test]
    fn test_counts_and_kick() {
        let mut registry = owned_registry(&game_id());
        registry.create_game(game_id(), public_config(), 0).unwrap();
        let _a = seat(&mut registry, 1, 1);
        let _b = seat(&mut registry, 2, 2);
        assert_eq!(registry.active_clients(), 2);

        registry.kick_player(&game_id(), &client(2)).unwrap();
        assert_eq!(registry.active_clients(), 1);
        assert_eq!(registry.status().active_games, 1);
    }

    #[test]
    fn test_shutdown_all_notifies() {
        let mut registry = owned_registry(&game_id());
        registry.create_game(game_id(), public_config(), 0).unwrap();
        let mut rx = seat(&mut registry, 1, 1);
        rx.try_recv().unwrap();

        assert_eq!(registry.shutdown_all(5), 1);
        assert!(matches!(
            rx.try_recv().unwrap(),
            crate::network::protocol::ServerMessage::Shutdown { .. }
        ));
        assert_eq!(registry.active_games(), 0);
    }
}
