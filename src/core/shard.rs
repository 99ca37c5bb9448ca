//! Worker Sharding
//!
//! Maps a game ID to the worker process that owns it. Pure and stable: the
//! result depends only on the ID and the pool size, never on which process
//! currently holds a given worker identity.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::hash::simple_hash;
use super::id::GameId;

/// Stable numeric identity of a worker process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(pub u16);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w{}", self.0)
    }
}

/// Worker that owns `game_id` in a pool of `num_workers`.
///
/// A pool size of zero is treated as one.
pub fn worker_index(game_id: &GameId, num_workers: u16) -> WorkerId {
    let n = num_workers.max(1) as u32;
    WorkerId((simple_hash(game_id.as_str()) % n) as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_index_in_range() {
        for _ in 0..200 {
            let id = GameId::generate();
            assert!(worker_index(&id, 7).0 < 7);
        }
    }

    #[test]
    fn test_worker_index_is_stable() {
        let id = GameId::parse("AbCd1234").unwrap();
        let first = worker_index(&id, 20);
        for _ in 0..10 {
            assert_eq!(worker_index(&id, 20), first);
        }
        assert_eq!(first.0 as u32, simple_hash("AbCd1234") % 20);
    }

    #[test]
    fn test_zero_workers_routes_to_first() {
        let id = GameId::parse("zzzz9999").unwrap();
        assert_eq!(worker_index(&id, 0), WorkerId(0));
    }

    #[test]
    fn test_display() {
        assert_eq!(WorkerId(3).to_string(), "w3");
    }
}
