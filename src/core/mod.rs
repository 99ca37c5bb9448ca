//! Core deterministic primitives.
//!
//! Hashes, the seeded RNG, short identifiers and sharding. Everything except
//! [`now_ms`] is pure: identical inputs give identical outputs in every
//! process, which is what lets the dispatcher and workers agree on routing
//! and bot rosters without talking to each other.

pub mod hash;
pub mod id;
pub mod rng;
pub mod shard;

// Re-export core types
pub use hash::{fnv1a_32, simple_hash};
pub use id::{ClientId, GameId, IdError};
pub use rng::DeterministicRng;
pub use shard::{worker_index, WorkerId};

/// Wall-clock time in epoch milliseconds.
pub fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
