//! Network Layer
//!
//! Wire types and clients shared by the dispatcher and the workers.
//! Servers live with the process that runs them.

pub mod api;
pub mod auth;
pub mod client;
pub mod protocol;

pub use api::{ApiError, GameInfo, ReadyNotice, WorkerStatus};
pub use auth::{AdminAuth, AuthError};
pub use client::{with_timeout, HttpWorkerClient, WorkerClient, WorkerClientError};
pub use protocol::{ClientMessage, ErrorCode, ServerMessage};
