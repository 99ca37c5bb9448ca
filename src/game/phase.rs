//! Session phase.

use std::fmt;

use serde::{Serialize, Deserialize};

/// Lifecycle phase of a game session. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GamePhase {
    /// Accepting players.
    Lobby,
    /// Locked and running (or about to).
    Active,
    /// Over; waiting for teardown.
    Finished,
}

impl GamePhase {
    /// Stable lower-case name.
    pub const fn as_str(self) -> &'static str {
        match self {
            GamePhase::Lobby => "lobby",
            GamePhase::Active => "active",
            GamePhase::Finished => "finished",
        }
    }
}

impl fmt::Display for GamePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
