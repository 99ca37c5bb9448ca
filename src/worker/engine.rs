//! Session Engine
//!
//! The turn simulation lives outside this crate. A session only needs to
//! start it, ask it for the current turn, and stop it; [`SessionEngine`] is
//! that seam. [`TurnClock`] is the stand-in used when no simulation is
//! attached: it derives the turn number from wall time.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::core::id::GameId;
use crate::game::config::GameConfig;

/// Engine lifecycle errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// `start` called twice.
    #[error("engine already started")]
    AlreadyStarted,
    /// `end` called before `start`.
    #[error("engine not started")]
    NotStarted,
    /// Engine-specific failure.
    #[error("engine failure: {0}")]
    Failed(String),
}

/// Simulation attached to one game session.
pub trait SessionEngine: Send + Sync {
    /// Begin simulating at `now_ms`.
    fn start(&mut self, now_ms: u64) -> Result<(), EngineError>;

    /// Turn number at `now_ms`; 0 before start.
    fn turn(&self, now_ms: u64) -> u32;

    /// Stop simulating at `now_ms`.
    fn end(&mut self, now_ms: u64) -> Result<(), EngineError>;
}

/// Builds an engine for each new session.
pub type EngineFactory = Arc<dyn Fn(&GameId, &GameConfig) -> Box<dyn SessionEngine> + Send + Sync>;

/// Factory producing [`TurnClock`]s with the given turn length.
pub fn turn_clock_factory(turn_interval: Duration) -> EngineFactory {
    Arc::new(move |_, _| Box::new(TurnClock::new(turn_interval)))
}

/// Wall-clock turn counter.
#[derive(Debug, Clone)]
pub struct TurnClock {
    interval_ms: u64,
    started_at: Option<u64>,
    ended_at: Option<u64>,
}

impl TurnClock {
    /// Create a clock with the given turn length (at least 1 ms).
    pub fn new(turn_interval: Duration) -> Self {
        Self {
            interval_ms: (turn_interval.as_millis() as u64).max(1),
            started_at: None,
            ended_at: None,
        }
    }
}

impl SessionEngine for TurnClock {
    fn start(&mut self, now_ms: u64) -> Result<(), EngineError> {
        if self.started_at.is_some() {
            return Err(EngineError::AlreadyStarted);
        }
        self.started_at = Some(now_ms);
        Ok(())
    }

    fn turn(&self, now_ms: u64) -> u32 {
        let Some(started) = self.started_at else {
            return 0;
        };
        // Frozen once ended
        let now = self.ended_at.map_or(now_ms, |end| end.min(now_ms));
        let turns = now.saturating_sub(started) / self.interval_ms;
        turns.min(u32::MAX as u64) as u32
    }

    fn end(&mut self, now_ms: u64) -> Result<(), EngineError> {
        if self.started_at.is_none() {
            return Err(EngineError::NotStarted);
        }
        self.ended_at.get_or_insert(now_ms);
        Ok(())
    }
}
