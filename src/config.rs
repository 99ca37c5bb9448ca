//! Server Configuration
//!
//! Defaults per deployment environment, overridable through environment
//! variables. Both the dispatcher and every worker build the same
//! `ServerConfig`, so port layout and sharding agree across processes.

use std::str::FromStr;
use std::time::Duration;

use serde::{Serialize, Deserialize};
use thiserror::Error;
use tracing::warn;

use crate::core::id::GameId;
use crate::core::shard::{worker_index, WorkerId};

/// Admin token used when none is configured. Never valid outside dev.
pub const DEV_ADMIN_TOKEN: &str = "WARNING_DEV_ADMIN_KEY_DO_NOT_USE_IN_PRODUCTION";

/// Rejected server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Worker ports would run past 65535.
    #[error("{name} {base} leaves no room for {workers} workers")]
    PortRange {
        /// Variable holding the base port.
        name: &'static str,
        /// Configured base port.
        base: u16,
        /// Pool size.
        workers: u16,
    },
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameEnv {
    /// Local development.
    Dev,
    /// Staging.
    Preprod,
    /// Production.
    Prod,
}

impl FromStr for GameEnv {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" => Ok(GameEnv::Dev),
            "preprod" | "staging" => Ok(GameEnv::Preprod),
            "prod" | "production" => Ok(GameEnv::Prod),
            other => Err(format!("unknown GAME_ENV {other:?}")),
        }
    }
}

/// Bot name numbering scheme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiNameConfig {
    /// Name prefix, e.g. `Anon`.
    pub prefix: String,
    /// First number.
    pub start: u32,
    /// How many numbers are available.
    pub reserve: u32,
}

/// Randomized bot join delay bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JitterConfig {
    /// Lower bound in milliseconds.
    pub min: i64,
    /// Upper bound in milliseconds (inclusive).
    pub max: i64,
}

/// Lobby bot population settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiPlayersConfig {
    /// Bot injection on/off.
    pub enabled: bool,
    /// Population re-evaluation interval.
    pub tick_ms: u64,
    /// Desired total player count once the lobby timer elapses.
    pub target_total_by_timeout: i64,
    /// Hard cap on bots per lobby.
    pub ai_players_max: i64,
    /// A joining human displaces a bot when the lobby is full.
    pub human_priority: bool,
    /// Seats kept free for humans.
    pub min_human_slots: i64,
    /// Join delay bounds.
    pub join_jitter_ms: JitterConfig,
    /// Bot naming.
    pub name: AiNameConfig,
    /// Ramp timeout override; defaults to the lobby lifetime.
    pub timeout_sec: Option<u64>,
}

impl Default for AiPlayersConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            tick_ms: 500,
            target_total_by_timeout: 12,
            ai_players_max: 20,
            human_priority: true,
            min_human_slots: 1,
            join_jitter_ms: JitterConfig { min: 300, max: 1500 },
            name: AiNameConfig {
                prefix: "Anon".to_string(),
                start: 0,
                reserve: 1000,
            },
            timeout_sec: None,
        }
    }
}

/// Session lifetime limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionLimits {
    /// How long a public lobby stays open.
    pub lobby_lifetime: Duration,
    /// How long a private lobby waits for its creator.
    pub private_lobby_lifetime: Duration,
    /// Started game with no connected humans ends after this.
    pub empty_game_grace: Duration,
    /// Hard cap on a started game.
    pub max_game_duration: Duration,
    /// Delay between prestart and start.
    pub start_delay: Duration,
    /// Turn length used by the turn clock.
    pub turn_interval: Duration,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            lobby_lifetime: Duration::from_secs(60),
            private_lobby_lifetime: Duration::from_secs(60 * 60),
            empty_game_grace: Duration::from_secs(30),
            max_game_duration: Duration::from_secs(3 * 60 * 60),
            start_delay: Duration::from_secs(2),
            turn_interval: Duration::from_millis(100),
        }
    }
}

/// Server configuration shared by dispatcher and workers.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Deployment environment.
    pub env: GameEnv,
    /// Worker pool size.
    pub num_workers: u16,
    /// Public HTTP port of the dispatcher.
    pub dispatcher_port: u16,
    /// Control port of worker 0; worker N listens on base + N.
    pub worker_base_port: u16,
    /// Client WebSocket port of worker 0; worker N listens on base + N.
    pub worker_ws_base_port: u16,
    /// Header carrying the admin token.
    pub admin_header: String,
    /// Shared admin secret.
    pub admin_token: String,
    /// Registry tick period.
    pub registry_tick: Duration,
    /// Dispatcher lobby poll period.
    pub lobby_poll_interval: Duration,
    /// Timeout for each dispatcher → worker call.
    pub worker_request_timeout: Duration,
    /// Lobbies closer than this to locking are no longer listed.
    pub lobby_lock_threshold_ms: i64,
    /// Session lifetime limits.
    pub limits: SessionLimits,
    /// Lobby bot population.
    pub ai: AiPlayersConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::for_env(GameEnv::Dev)
    }
}

impl ServerConfig {
    /// Defaults for a deployment environment.
    pub fn for_env(env: GameEnv) -> Self {
        let (num_workers, lobby_lifetime, ai_enabled) = match env {
            GameEnv::Dev => (2, Duration::from_secs(5), true),
            GameEnv::Preprod => (4, Duration::from_secs(60), true),
            GameEnv::Prod => (20, Duration::from_secs(60), true),
        };

        Self {
            env,
            num_workers,
            dispatcher_port: 3000,
            worker_base_port: 3001,
            worker_ws_base_port: 4001,
            admin_header: "x-admin-key".to_string(),
            admin_token: DEV_ADMIN_TOKEN.to_string(),
            registry_tick: Duration::from_secs(1),
            lobby_poll_interval: Duration::from_millis(100),
            worker_request_timeout: Duration::from_secs(5),
            lobby_lock_threshold_ms: 250,
            limits: SessionLimits {
                lobby_lifetime,
                ..SessionLimits::default()
            },
            ai: AiPlayersConfig {
                enabled: ai_enabled,
                ..AiPlayersConfig::default()
            },
        }
    }

    /// Create config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env = env_parse::<GameEnv>("GAME_ENV").unwrap_or(GameEnv::Dev);
        let mut config = Self::for_env(env);

        if let Some(n) = env_parse::<u16>("NUM_WORKERS") {
            config.num_workers = n.max(1);
        }
        if let Some(port) = env_parse("DISPATCHER_PORT") {
            config.dispatcher_port = port;
        }
        if let Some(port) = env_parse("WORKER_BASE_PORT") {
            config.worker_base_port = port;
        }
        if let Some(port) = env_parse("WORKER_WS_BASE_PORT") {
            config.worker_ws_base_port = port;
        }
        if let Ok(header) = std::env::var("ADMIN_HEADER") {
            config.admin_header = header.to_ascii_lowercase();
        }
        match std::env::var("ADMIN_TOKEN") {
            Ok(token) if !token.trim().is_empty() => config.admin_token = token,
            _ if env != GameEnv::Dev => {
                warn!("ADMIN_TOKEN not set outside dev, using the dev token");
            }
            _ => {}
        }
        if let Some(ms) = env_parse::<u64>("GAME_CREATION_RATE_MS") {
            config.limits.lobby_lifetime = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("TURN_INTERVAL_MS") {
            config.limits.turn_interval = Duration::from_millis(ms.max(1));
        }
        if let Some(enabled) = env_parse::<bool>("AI_PLAYERS_ENABLED") {
            config.ai.enabled = enabled;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check that every worker gets a port on both surfaces.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fits = |base: u16| u32::from(base) + u32::from(self.num_workers) - 1 <= u32::from(u16::MAX);
        for (name, base) in [
            ("WORKER_BASE_PORT", self.worker_base_port),
            ("WORKER_WS_BASE_PORT", self.worker_ws_base_port),
        ] {
            if self.num_workers > 0 && !fits(base) {
                return Err(ConfigError::PortRange { name, base, workers: self.num_workers });
            }
        }
        Ok(())
    }

    /// Worker that owns a game.
    pub fn worker_for(&self, game_id: &GameId) -> WorkerId {
        worker_index(game_id, self.num_workers)
    }

    /// Control port of a worker.
    pub fn worker_port(&self, worker: WorkerId) -> u16 {
        self.worker_base_port.saturating_add(worker.0)
    }

    /// Client WebSocket port of a worker.
    pub fn worker_ws_port(&self, worker: WorkerId) -> u16 {
        self.worker_ws_base_port.saturating_add(worker.0)
    }

    /// Loopback base URL of a worker's control surface.
    pub fn worker_url(&self, worker: WorkerId) -> String {
        format!("http://127.0.0.1:{}", self.worker_port(worker))
    }

    /// All worker identities.
    pub fn workers(&self) -> impl Iterator<Item = WorkerId> {
        (0..self.num_workers).map(WorkerId)
    }

    /// Lobby ramp timeout for bot population, in seconds.
    pub fn ai_timeout_secs(&self) -> f64 {
        self.ai
            .timeout_sec
            .map(|s| s as f64)
            .unwrap_or_else(|| self.limits.lobby_lifetime.as_secs_f64())
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(var = name, value = %raw, "ignoring unparsable environment variable");
            None
        }
    }
}
