//! # Geoconflict Session Server
//!
//! Session orchestration for Geoconflict: one dispatcher process, a pool of
//! worker processes, deterministic bots and generated missions.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   GEOCONFLICT SERVER                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  ├── rng.rs      - Xorshift128+ PRNG, SplitMix64 seeding     │
//! │  ├── hash.rs     - String hashes, token digests              │
//! │  ├── id.rs       - Game and client identifiers               │
//! │  └── shard.rs    - Game ID to worker assignment              │
//! │                                                              │
//! │  game/           - Game policy (pure)                        │
//! │  ├── config.rs   - Game configuration                        │
//! │  ├── map.rs      - Map catalogue                             │
//! │  ├── ai.rs       - Lobby bot population                      │
//! │  ├── mission.rs  - Singleplayer missions                     │
//! │  └── playlist.rs - Public lobby rotation                     │
//! │                                                              │
//! │  network/        - Wire types and worker client              │
//! │                                                              │
//! │  worker/         - Worker process                            │
//! │  ├── session.rs  - Game session state machine                │
//! │  ├── registry.rs - Per-worker sessions and tick              │
//! │  ├── http.rs     - Loopback control surface                  │
//! │  └── ws.rs       - Client WebSocket listener                 │
//! │                                                              │
//! │  dispatcher/     - Coordinating process                      │
//! │  ├── supervisor.rs - Worker processes and restarts           │
//! │  ├── scheduler.rs  - Public lobby scheduling                 │
//! │  └── http.rs       - Public HTTP surface                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism Guarantee
//!
//! `core/` and `game/` never read the clock or ambient randomness except
//! where a function says so. Game IDs route to the same worker, and a lobby
//! gets the same bots and a level gets the same mission, in every process.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod core;
pub mod dispatcher;
pub mod game;
pub mod network;
pub mod worker;

// Re-export commonly used types
pub use config::{ConfigError, GameEnv, ServerConfig};
pub use core::id::{ClientId, GameId};
pub use core::rng::DeterministicRng;
pub use core::shard::WorkerId;
pub use game::config::GameConfig;
pub use game::phase::GamePhase;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Resolves on ctrl-c.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
}
