//! Game Configuration
//!
//! Per-session settings as sent in a create-game request. Every field has a
//! default so callers may send a partial body.

use serde::{Serialize, Deserialize};
use thiserror::Error;

use super::map::GameMapType;

/// Upper bound for tribe bots and lobby size.
pub const MAX_BOTS: u32 = 400;

/// Upper bound for lobby size.
pub const MAX_LOBBY_PLAYERS: u32 = 400;

/// Game visibility / kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameType {
    /// Listed, auto-scheduled lobby.
    Public,
    /// Invite-only lobby, started by its creator.
    Private,
    /// Solo game against nations and bots.
    Singleplayer,
}

/// Map size variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMapSize {
    /// Full map.
    Normal,
    /// Downscaled map for short games.
    Compact,
}

/// Nation / bot difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    /// Easiest tier.
    Easy,
    /// Default tier.
    Medium,
    /// Hard tier.
    Hard,
    /// Hardest tier.
    Impossible,
}

/// Win condition layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    /// Free for all.
    Ffa,
    /// Teams.
    Team,
}

/// Buildable unit kinds that a lobby may disable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitType {
    /// Population and gold.
    City,
    /// Naval trade.
    Port,
    /// Border defence.
    DefensePost,
    /// Nuclear launch site.
    MissileSilo,
    /// Anti-missile defence.
    SamLauncher,
    /// Naval combat.
    Warship,
    /// Small nuke.
    AtomBomb,
    /// Large nuke.
    HydrogenBomb,
    /// Multi-warhead nuke.
    Mirv,
    /// Unit production.
    Factory,
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Tribe bot count out of range.
    #[error("bots must be at most 400, got {0}")]
    TooManyBots(u32),
    /// Lobby size out of range.
    #[error("max_players must be between 1 and 400, got {0}")]
    InvalidMaxPlayers(u32),
    /// Team count out of range.
    #[error("player_teams must be between 2 and {max}, got {got}")]
    InvalidTeams {
        /// Requested teams.
        got: u32,
        /// Largest allowed.
        max: u32,
    },
    /// Timer out of range.
    #[error("max_timer_value must be between 1 and 120 minutes, got {0}")]
    InvalidTimer(u32),
}

/// Session configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Map to play.
    pub game_map: GameMapType,
    /// Public, private or singleplayer.
    pub game_type: GameType,
    /// Map scale.
    pub game_map_size: GameMapSize,
    /// Nation difficulty.
    pub difficulty: Difficulty,
    /// Free for all or teams.
    pub game_mode: GameMode,
    /// Team count in team mode.
    pub player_teams: Option<u32>,
    /// Tribe bot cap (map NPCs, not lobby AI players).
    pub bots: u32,
    /// Remove map nations.
    pub disable_npcs: bool,
    /// Allow gold donations.
    pub donate_gold: bool,
    /// Allow troop donations.
    pub donate_troops: bool,
    /// Unlimited gold.
    pub infinite_gold: bool,
    /// Unlimited troops.
    pub infinite_troops: bool,
    /// Skip construction time.
    pub instant_build: bool,
    /// Game timer in minutes.
    pub max_timer_value: Option<u32>,
    /// Lobby size; falls back to the map's largest count.
    pub max_players: Option<u32>,
    /// Units players may not build.
    pub disabled_units: Vec<UnitType>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            game_map: GameMapType::World,
            game_type: GameType::Private,
            game_map_size: GameMapSize::Normal,
            difficulty: Difficulty::Medium,
            game_mode: GameMode::Ffa,
            player_teams: None,
            bots: MAX_BOTS,
            disable_npcs: false,
            donate_gold: false,
            donate_troops: false,
            infinite_gold: false,
            infinite_troops: false,
            instant_build: false,
            max_timer_value: None,
            max_players: None,
            disabled_units: Vec::new(),
        }
    }
}

impl GameConfig {
    /// Effective lobby capacity.
    pub fn capacity(&self) -> u32 {
        self.max_players.unwrap_or_else(|| self.game_map.max_players())
    }

    /// Whether the lobby is listed publicly.
    pub fn is_public(&self) -> bool {
        self.game_type == GameType::Public
    }

    /// Check structural validity.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bots > MAX_BOTS {
            return Err(ConfigError::TooManyBots(self.bots));
        }
        if let Some(max) = self.max_players {
            if max == 0 || max > MAX_LOBBY_PLAYERS {
                return Err(ConfigError::InvalidMaxPlayers(max));
            }
        }
        if self.game_mode == GameMode::Team {
            if let Some(teams) = self.player_teams {
                let max = self.capacity();
                if teams < 2 || teams > max {
                    return Err(ConfigError::InvalidTeams { got: teams, max });
                }
            }
        }
        if let Some(timer) = self.max_timer_value {
            if !(1..=120).contains(&timer) {
                return Err(ConfigError::InvalidTimer(timer));
            }
        }
        Ok(())
    }

    /// Whether a unit kind is disabled.
    pub fn is_unit_disabled(&self, unit: UnitType) -> bool {
        self.disabled_units.contains(&unit)
    }
}
