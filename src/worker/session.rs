//! Game Session
//!
//! One game's lifecycle from lobby to teardown. A session owns its phase,
//! its connected clients, its bot roster and its engine. It never reads the
//! clock: every time-dependent method takes `now_ms`, so the registry drives
//! it and tests can replay exact timelines.

use std::collections::{BTreeMap, HashSet};

use tokio::sync::mpsc;
use tracing::{debug, info};

use super::engine::{EngineError, SessionEngine};
use crate::config::{AiPlayersConfig, SessionLimits};
use crate::core::id::{ClientId, GameId};
use crate::game::ai::{AiPlayer, AiRoster, LobbySnapshot};
use crate::game::config::{GameConfig, GameType};
use crate::game::phase::GamePhase;
use crate::network::api::GameInfo;
use crate::network::protocol::{
    ErrorCode, JoinedInfo, PlayerInfo, PrestartInfo, ServerMessage, StartInfo,
};

/// Outbound message channel to one client connection.
pub type ClientSender = mpsc::Sender<ServerMessage>;

/// Connection state for reconnection support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Client is connected.
    Connected,
    /// Client dropped; its seat is kept for a rejoin.
    Disconnected {
        /// When disconnection occurred (epoch ms).
        since: u64,
    },
}

/// A human seated in a session.
#[derive(Debug)]
pub struct Client {
    /// Client identity.
    pub client_id: ClientId,
    /// Display name.
    pub username: String,
    /// Last turn the client acknowledged.
    pub last_turn: u32,
    /// First join time (epoch ms).
    pub joined_at: u64,
    /// Connection state.
    pub connection: ConnectionState,
    sender: Option<ClientSender>,
}

impl Client {
    /// Check if client is connected.
    pub fn is_connected(&self) -> bool {
        matches!(self.connection, ConnectionState::Connected)
    }

    fn send(&self, message: ServerMessage) {
        let Some(sender) = &self.sender else {
            return;
        };
        if let Err(e) = sender.try_send(message) {
            debug!(client_id = %self.client_id, "dropping outbound message: {}", e);
        }
    }
}

/// Result of a successful join.
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    /// What the client was told.
    pub info: JoinedInfo,
    /// Client already held a seat.
    pub rejoined: bool,
    /// Bot removed to make room.
    pub displaced: Option<AiPlayer>,
}

/// Session errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Every seat is taken.
    #[error("Session is full")]
    SessionFull,

    /// Client was kicked and may not return.
    #[error("Client was kicked from this game")]
    Kicked,

    /// Phase does not accept this client.
    #[error("Game is not joinable in phase {0}")]
    NotJoinable(GamePhase),

    /// Start requested by someone other than the creator.
    #[error("Only the lobby creator can start the game")]
    NotCreator,

    /// Manual start on a non-private game.
    #[error("Only private lobbies can be started manually")]
    NotPrivateLobby,

    /// Operation not valid in the current phase.
    #[error("Invalid session state: {0}")]
    InvalidState(GamePhase),

    /// Client not found.
    #[error("Client not found")]
    ClientNotFound,

    /// Prestart or start already happened.
    #[error("Game already started")]
    AlreadyStarted,

    /// Teardown already happened.
    #[error("Game already ended")]
    AlreadyEnded,

    /// Engine hook failed.
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
}

impl SessionError {
    /// Wire error code for client-facing failures.
    pub fn code(&self) -> ErrorCode {
        match self {
            SessionError::SessionFull => ErrorCode::GameFull,
            SessionError::Kicked => ErrorCode::Kicked,
            SessionError::NotJoinable(_) => ErrorCode::NotJoinable,
            SessionError::NotCreator | SessionError::NotPrivateLobby => ErrorCode::NotCreator,
            SessionError::ClientNotFound => ErrorCode::NotInGame,
            SessionError::InvalidState(_) => ErrorCode::NotJoinable,
            SessionError::AlreadyStarted
            | SessionError::AlreadyEnded
            | SessionError::Engine(_) => ErrorCode::InternalError,
        }
    }
}

/// A game session.
pub struct GameSession {
    id: GameId,
    config: GameConfig,
    limits: SessionLimits,
    created_at: u64,
    phase: GamePhase,
    creator: Option<ClientId>,
    clients: BTreeMap<ClientId, Client>,
    kicked: HashSet<ClientId>,
    ai_config: Option<AiPlayersConfig>,
    roster: Option<AiRoster>,
    start_requested: bool,
    prestarted_at: Option<u64>,
    started_at: Option<u64>,
    empty_since: Option<u64>,
    hook_failed: bool,
    ended: bool,
    engine: Box<dyn SessionEngine>,
}

impl std::fmt::Debug for GameSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameSession")
            .field("id", &self.id)
            .field("phase", &self.phase)
            .field("clients", &self.clients.len())
            .field("started_at", &self.started_at)
            .finish_non_exhaustive()
    }
}

impl GameSession {
    /// Create a new session in the lobby phase.
    ///
    /// Bots are only managed for public games with AI enabled.
    pub fn new(
        id: GameId,
        config: GameConfig,
        created_at: u64,
        limits: SessionLimits,
        ai: Option<&AiPlayersConfig>,
        engine: Box<dyn SessionEngine>,
    ) -> Self {
        let ai_config = ai.filter(|c| c.enabled && config.is_public()).cloned();
        let roster = ai_config.as_ref().map(|c| AiRoster::new(&id, c));

        Self {
            id,
            config,
            limits,
            created_at,
            phase: GamePhase::Lobby,
            creator: None,
            clients: BTreeMap::new(),
            kicked: HashSet::new(),
            ai_config,
            roster,
            start_requested: false,
            prestarted_at: None,
            started_at: None,
            empty_since: None,
            hook_failed: false,
            ended: false,
            engine,
        }
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// Game identifier.
    pub fn id(&self) -> &GameId {
        &self.id
    }

    /// Session configuration.
    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Current phase (as of the last refresh).
    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    /// Creation time.
    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    /// Start time, once started.
    pub fn started_at(&self) -> Option<u64> {
        self.started_at
    }

    /// Whether `start` has run.
    pub fn has_started(&self) -> bool {
        self.started_at.is_some()
    }

    /// Whether `prestart` has run.
    pub fn has_prestarted(&self) -> bool {
        self.prestarted_at.is_some()
    }

    /// Whether the game is listed publicly.
    pub fn is_public(&self) -> bool {
        self.config.is_public()
    }

    /// Lobby size.
    pub fn capacity(&self) -> u32 {
        self.config.capacity()
    }

    /// When a public lobby locks.
    pub fn starts_at(&self) -> Option<u64> {
        self.is_public()
            .then(|| self.created_at + self.limits.lobby_lifetime.as_millis() as u64)
    }

    /// Connected humans.
    pub fn num_clients(&self) -> usize {
        self.clients.values().filter(|c| c.is_connected()).count()
    }

    /// Seated humans, connected or not.
    pub fn seated_humans(&self) -> usize {
        self.clients.len()
    }

    /// Seated bots.
    pub fn ai_players_count(&self) -> usize {
        self.roster.as_ref().map_or(0, AiRoster::len)
    }

    /// Look up a seated human.
    pub fn client(&self, client_id: &ClientId) -> Option<&Client> {
        self.clients.get(client_id)
    }

    /// Lobby creator, for private games.
    pub fn creator(&self) -> Option<&ClientId> {
        self.creator.as_ref()
    }

    /// Current turn.
    pub fn turn(&self, now_ms: u64) -> u32 {
        self.engine.turn(now_ms)
    }

    /// Everyone seated: humans first, then bots in join order.
    pub fn players(&self) -> Vec<PlayerInfo> {
        let humans = self.clients.values().map(|c| PlayerInfo {
            client_id: c.client_id.clone(),
            username: c.username.clone(),
            is_ai: false,
        });
        let bots = self
            .roster
            .iter()
            .flat_map(|r| r.joined())
            .map(|b| PlayerInfo {
                client_id: b.client_id.clone(),
                username: b.name.clone(),
                is_ai: true,
            });
        humans.chain(bots).collect()
    }

    /// Snapshot for the control surface.
    pub fn info(&self) -> GameInfo {
        GameInfo {
            game_id: self.id.clone(),
            num_clients: self.num_clients(),
            ai_players_count: self.ai_players_count(),
            game_config: self.config.clone(),
            created_at: self.created_at,
            started_at: self.started_at,
            starts_at: self.starts_at(),
            ms_until_start: None,
            has_started: self.has_started(),
            phase: self.phase,
        }
    }

    // =========================================================================
    // CLIENTS
    // =========================================================================

    /// Seat a client, or reconnect one that already holds a seat.
    ///
    /// Rejoining clients resume from `min(last_turn, current turn)`. With
    /// human priority, a full lobby frees a seat by removing the most
    /// recently joined bot.
    pub fn add_client(
        &mut self,
        client_id: ClientId,
        username: String,
        last_turn: u32,
        sender: ClientSender,
        now_ms: u64,
    ) -> Result<JoinOutcome, SessionError> {
        if self.kicked.contains(&client_id) {
            return Err(SessionError::Kicked);
        }
        if self.phase == GamePhase::Finished {
            return Err(SessionError::NotJoinable(self.phase));
        }

        let current_turn = self.turn(now_ms);

        if let Some(client) = self.clients.get_mut(&client_id) {
            client.connection = ConnectionState::Connected;
            client.sender = Some(sender);
            client.last_turn = last_turn;
            self.empty_since = None;

            let info = self.joined_info(&client_id, last_turn.min(current_turn));
            self.send_to(&client_id, ServerMessage::Joined(info.clone()));
            info!(game_id = %self.id, %client_id, turn = info.resume_turn, "client rejoined");
            return Ok(JoinOutcome { info, rejoined: true, displaced: None });
        }

        if self.phase != GamePhase::Lobby {
            return Err(SessionError::NotJoinable(self.phase));
        }

        let mut displaced = None;
        let seated = self.clients.len() + self.ai_players_count();
        if seated >= self.capacity() as usize {
            let human_priority = self.ai_config.as_ref().is_some_and(|c| c.human_priority);
            displaced = match (&mut self.roster, human_priority) {
                (Some(roster), true) => roster.displace_latest(),
                _ => None,
            };
            if displaced.is_none() {
                return Err(SessionError::SessionFull);
            }
        }

        if self.config.game_type == GameType::Private && self.creator.is_none() {
            self.creator = Some(client_id.clone());
        }

        self.clients.insert(client_id.clone(), Client {
            client_id: client_id.clone(),
            username,
            last_turn,
            joined_at: now_ms,
            connection: ConnectionState::Connected,
            sender: Some(sender),
        });
        self.empty_since = None;

        if let Some(bot) = &displaced {
            info!(game_id = %self.id, bot = %bot.name, "bot displaced by human");
        }

        let info = self.joined_info(&client_id, 0);
        self.send_to(&client_id, ServerMessage::Joined(info.clone()));
        info!(game_id = %self.id, %client_id, clients = self.clients.len(), "client joined");

        Ok(JoinOutcome { info, rejoined: false, displaced })
    }

    /// Mark a client as disconnected, keeping its seat.
    pub fn disconnect(&mut self, client_id: &ClientId, now_ms: u64) -> bool {
        match self.clients.get_mut(client_id) {
            Some(client) => {
                client.connection = ConnectionState::Disconnected { since: now_ms };
                client.sender = None;
                debug!(game_id = %self.id, %client_id, "client disconnected");
                true
            }
            None => false,
        }
    }

    /// Disconnect only if `sender` is still the client's live connection.
    ///
    /// A stale connection closing after the client rejoined elsewhere
    /// leaves the new connection alone.
    pub fn release(&mut self, client_id: &ClientId, sender: &ClientSender, now_ms: u64) -> bool {
        let owns = self
            .clients
            .get(client_id)
            .and_then(|c| c.sender.as_ref())
            .is_some_and(|s| s.same_channel(sender));
        owns && self.disconnect(client_id, now_ms)
    }

    /// Client left on purpose. Frees the seat while in the lobby.
    ///
    /// A private lobby whose creator leaves passes the role to the
    /// earliest remaining joiner. A mere disconnect keeps the role.
    pub fn leave(&mut self, client_id: &ClientId, now_ms: u64) -> bool {
        if self.phase != GamePhase::Lobby {
            return self.disconnect(client_id, now_ms);
        }
        if self.clients.remove(client_id).is_none() {
            return false;
        }
        if self.creator.as_ref() == Some(client_id) {
            self.creator = self
                .clients
                .values()
                .min_by_key(|c| c.joined_at)
                .map(|c| c.client_id.clone());
            debug!(game_id = %self.id, creator = ?self.creator, "creator role passed on");
        }
        true
    }

    /// Remove a client, notify it, and bar its ID from rejoining.
    pub fn kick(&mut self, client_id: &ClientId) -> Result<(), SessionError> {
        let client = self.clients.remove(client_id).ok_or(SessionError::ClientNotFound)?;
        client.send(ServerMessage::Kicked {
            reason: "kicked by an administrator".to_string(),
        });
        self.kicked.insert(client_id.clone());
        info!(game_id = %self.id, %client_id, "client kicked");
        Ok(())
    }

    /// Private-lobby creator asks to start.
    pub fn request_start(&mut self, client_id: &ClientId) -> Result<(), SessionError> {
        if self.config.game_type != GameType::Private {
            return Err(SessionError::NotPrivateLobby);
        }
        if self.phase != GamePhase::Lobby {
            return Err(SessionError::InvalidState(self.phase));
        }
        if self.creator.as_ref() != Some(client_id) {
            return Err(SessionError::NotCreator);
        }
        self.start_requested = true;
        Ok(())
    }

    // =========================================================================
    // BOTS
    // =========================================================================

    /// Run one bot population check. Returns the bots seated by it.
    pub fn populate_ai(&mut self, now_ms: u64, timeout_sec: f64) -> Vec<AiPlayer> {
        if self.phase != GamePhase::Lobby {
            return Vec::new();
        }
        let (Some(config), Some(roster)) = (&self.ai_config, &mut self.roster) else {
            return Vec::new();
        };

        let reserved: HashSet<String> = self.clients.values().map(|c| c.username.clone()).collect();
        let lobby = LobbySnapshot {
            now_ms,
            created_at: self.created_at,
            humans: self.clients.len() as i64,
            capacity: self.config.capacity() as i64,
            timeout_sec,
        };

        let seated = roster.update(lobby, &reserved, config);
        if !seated.is_empty() {
            debug!(game_id = %self.id, seated = seated.len(), total = roster.len(), "bots joined");
        }
        seated
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Re-evaluate the phase at `now_ms`. Never moves backwards.
    pub fn refresh_phase(&mut self, now_ms: u64) -> GamePhase {
        let current = self.phase;
        let next = match current {
            GamePhase::Lobby if self.lobby_should_lock(now_ms) => GamePhase::Active,
            GamePhase::Active if self.should_finish(now_ms) => GamePhase::Finished,
            phase => phase,
        };

        if next != current {
            info!(game_id = %self.id, from = %current, to = %next, "phase transition");
            self.phase = next;
            if next == GamePhase::Active {
                if let Some(roster) = &mut self.roster {
                    roster.clear_pending();
                }
            }
        }
        self.phase
    }

    fn lobby_should_lock(&self, now_ms: u64) -> bool {
        match self.config.game_type {
            GameType::Public => {
                self.starts_at().is_some_and(|at| now_ms >= at)
                    || self.clients.len() >= self.capacity() as usize
            }
            GameType::Private => {
                let lifetime = self.limits.private_lobby_lifetime.as_millis() as u64;
                self.start_requested || now_ms >= self.created_at + lifetime
            }
            GameType::Singleplayer => !self.clients.is_empty(),
        }
    }

    fn should_finish(&mut self, now_ms: u64) -> bool {
        if self.hook_failed {
            return true;
        }
        let Some(started) = self.started_at else {
            return false;
        };
        if now_ms.saturating_sub(started) >= self.limits.max_game_duration.as_millis() as u64 {
            return true;
        }
        if self.num_clients() > 0 {
            self.empty_since = None;
            return false;
        }
        let since = *self.empty_since.get_or_insert(now_ms);
        now_ms.saturating_sub(since) >= self.limits.empty_game_grace.as_millis() as u64
    }

    /// Tell clients to load the game. Runs once, in the active phase.
    pub fn prestart(&mut self, now_ms: u64) -> Result<(), SessionError> {
        if self.phase != GamePhase::Active {
            return Err(SessionError::InvalidState(self.phase));
        }
        if self.prestarted_at.is_some() {
            return Err(SessionError::AlreadyStarted);
        }
        self.prestarted_at = Some(now_ms);
        if let Some(roster) = &mut self.roster {
            roster.clear_pending();
        }
        self.broadcast(ServerMessage::Prestart(PrestartInfo {
            game_id: self.id.clone(),
            config: self.config.clone(),
        }));
        Ok(())
    }

    /// Whether the start delay after prestart has elapsed.
    pub fn should_start(&self, now_ms: u64) -> bool {
        let delay = self.limits.start_delay.as_millis() as u64;
        self.phase == GamePhase::Active
            && self.started_at.is_none()
            && !self.hook_failed
            && self.prestarted_at.is_some_and(|at| now_ms >= at + delay)
    }

    /// Start the engine and announce the roster.
    ///
    /// An engine failure marks the session so the next refresh finishes it.
    pub fn start(&mut self, now_ms: u64) -> Result<(), SessionError> {
        if self.phase != GamePhase::Active {
            return Err(SessionError::InvalidState(self.phase));
        }
        if self.started_at.is_some() {
            return Err(SessionError::AlreadyStarted);
        }
        if let Err(e) = self.engine.start(now_ms) {
            self.hook_failed = true;
            return Err(e.into());
        }
        self.started_at = Some(now_ms);

        let players = self.players();
        info!(game_id = %self.id, players = players.len(), "game started");
        self.broadcast(ServerMessage::Start(StartInfo {
            game_id: self.id.clone(),
            config: self.config.clone(),
            players,
            started_at: now_ms,
        }));
        Ok(())
    }

    /// Tear the session down. Runs at most once, even if it fails.
    pub fn end(&mut self, now_ms: u64) -> Result<(), SessionError> {
        if self.ended {
            return Err(SessionError::AlreadyEnded);
        }
        self.ended = true;

        self.broadcast(ServerMessage::Shutdown {
            reason: "game finished".to_string(),
        });
        for client in self.clients.values_mut() {
            client.sender = None;
        }

        if self.started_at.is_some() {
            self.engine.end(now_ms)?;
        }
        info!(game_id = %self.id, turn = self.turn(now_ms), "game ended");
        Ok(())
    }

    /// Notify connected clients that the worker is going away.
    pub fn notify_shutdown(&self, reason: &str) {
        self.broadcast(ServerMessage::Shutdown {
            reason: reason.to_string(),
        });
    }

    // =========================================================================
    // MESSAGING
    // =========================================================================

    /// Broadcast a message to all connected clients.
    pub fn broadcast(&self, message: ServerMessage) {
        for client in self.clients.values().filter(|c| c.is_connected()) {
            client.send(message.clone());
        }
    }

    fn send_to(&self, client_id: &ClientId, message: ServerMessage) {
        if let Some(client) = self.clients.get(client_id) {
            client.send(message);
        }
    }

    fn joined_info(&self, client_id: &ClientId, resume_turn: u32) -> JoinedInfo {
        JoinedInfo {
            game_id: self.id.clone(),
            phase: self.phase,
            num_clients: self.num_clients(),
            resume_turn,
            is_creator: self.creator.as_ref() == Some(client_id),
        }
    }
}
