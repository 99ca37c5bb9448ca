//! Worker Process
//!
//! A worker owns the sessions whose game IDs shard to it. It serves the
//! loopback control surface for the dispatcher, the public WebSocket
//! listener for players, and two background loops: the 1 s registry tick
//! and the bot population check.
//!
//! Once both listeners are bound the worker prints a single ready line on
//! stdout; all logging goes to stderr.

pub mod engine;
pub mod http;
pub mod registry;
pub mod session;
pub mod ws;

use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

use crate::config::ServerConfig;
use crate::core::now_ms;
use crate::core::shard::WorkerId;
use crate::network::api::ReadyNotice;
use crate::network::auth::{token_fingerprint, AdminAuth};
use crate::shutdown_signal;

pub use engine::{EngineError, EngineFactory, SessionEngine, TurnClock};
pub use registry::{RegistryError, SessionRegistry};
pub use session::{GameSession, SessionError};

/// Run a worker until ctrl-c.
pub async fn run_worker(config: ServerConfig, worker_id: WorkerId) -> anyhow::Result<()> {
    let registry = Arc::new(RwLock::new(SessionRegistry::new(worker_id, config.clone())));
    let auth = Arc::new(AdminAuth::from_config(&config));
    info!(
        worker = %worker_id,
        header = auth.header(),
        token = %token_fingerprint(&config.admin_token),
        "admin auth configured"
    );

    let http_addr = SocketAddr::from(([127, 0, 0, 1], config.worker_port(worker_id)));
    let http_listener = TcpListener::bind(http_addr)
        .await
        .with_context(|| format!("binding control port {http_addr}"))?;
    let ws_addr = SocketAddr::from(([0, 0, 0, 0], config.worker_ws_port(worker_id)));
    let ws_listener = TcpListener::bind(ws_addr)
        .await
        .with_context(|| format!("binding client port {ws_addr}"))?;
    info!(worker = %worker_id, %http_addr, %ws_addr, "listeners bound");

    let clients = Arc::new(ws::ClientServer::new(registry.clone()));
    let ws_task = {
        let clients = clients.clone();
        tokio::spawn(async move { clients.run(ws_listener).await })
    };

    let tick_task = tokio::spawn(run_tick_loop(registry.clone(), config.registry_tick));
    let population_task = config.ai.enabled.then(|| {
        let period = Duration::from_millis(config.ai.tick_ms);
        tokio::spawn(run_population_loop(registry.clone(), period))
    });

    announce_ready(worker_id).context("writing ready notice")?;

    let app = http::router(http::WorkerState {
        registry: registry.clone(),
        auth,
    });
    axum::serve(http_listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("control server failed")?;

    info!(worker = %worker_id, "worker shutting down");
    tick_task.abort();
    if let Some(task) = population_task {
        task.abort();
    }
    let ended = registry.write().await.shutdown_all(now_ms());
    clients.shutdown();
    match ws_task.await {
        Ok(Err(e)) => warn!("client listener stopped with error: {}", e),
        Err(e) => warn!("client listener task failed: {}", e),
        Ok(Ok(())) => {}
    }
    info!(worker = %worker_id, ended, "worker stopped");
    Ok(())
}

/// Print the handshake line the dispatcher waits for.
fn announce_ready(worker_id: WorkerId) -> anyhow::Result<()> {
    let line = serde_json::to_string(&ReadyNotice { worker_id })?;
    let mut out = std::io::stdout().lock();
    writeln!(out, "{line}")?;
    out.flush()?;
    Ok(())
}

/// Drive session lifecycles.
#[instrument(skip(registry))]
async fn run_tick_loop(registry: Arc<RwLock<SessionRegistry>>, period: Duration) {
    let mut interval = tokio::time::interval(period.max(Duration::from_millis(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        interval.tick().await;
        let summary = registry.write().await.tick(now_ms());
        if summary != Default::default() {
            debug!(?summary, "registry tick");
        }
    }
}

/// Fill public lobbies with bots.
#[instrument(skip(registry))]
async fn run_population_loop(registry: Arc<RwLock<SessionRegistry>>, period: Duration) {
    let mut interval = tokio::time::interval(period.max(Duration::from_millis(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        interval.tick().await;
        let seated = registry.write().await.populate_ai(now_ms());
        if seated > 0 {
            debug!(seated, "bots seated");
        }
    }
}
