//! Game Logic Module
//!
//! Game-level policy with no I/O. Configuration and maps describe a game;
//! the remaining modules decide what a new game looks like.
//!
//! ## Module Structure
//!
//! - `map`: Map catalogue and per-map lobby sizes
//! - `config`: Game configuration and validation
//! - `phase`: Session lifecycle phases
//! - `ai`: Bot population policy and rosters
//! - `mission`: Singleplayer mission generation
//! - `playlist`: Public lobby map rotation

pub mod ai;
pub mod config;
pub mod map;
pub mod mission;
pub mod phase;
pub mod playlist;

// Re-export key types
pub use ai::{AiPlayer, AiRoster};
pub use config::{Difficulty, GameConfig, GameMode, GameType};
pub use map::GameMapType;
pub use mission::{generate_mission, MissionPlan};
pub use phase::GamePhase;
pub use playlist::MapPlaylist;
