//! Dispatcher Process
//!
//! The coordinating process. It forks the worker pool, serves the public
//! HTTP surface, and once every worker is ready runs the lobby scheduler.
//! It holds no game state of its own beyond the published lobby listing.

pub mod http;
pub mod scheduler;
pub mod supervisor;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, RwLock};
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::game::playlist::MapPlaylist;
use crate::network::api::PublicLobbies;
use crate::network::auth::AdminAuth;
use crate::network::client::HttpWorkerClient;
use crate::shutdown_signal;

pub use scheduler::LobbyScheduler;
pub use supervisor::{ProcessLauncher, ReadyBarrier, Supervisor, SupervisorError, WorkerLauncher};

/// Pause before relaunching a crashed worker.
const RESTART_DELAY: Duration = Duration::from_secs(1);

/// Run the dispatcher until ctrl-c.
pub async fn run_dispatcher(config: ServerConfig) -> anyhow::Result<()> {
    info!(env = ?config.env, workers = config.num_workers, "starting dispatcher");

    let client = Arc::new(HttpWorkerClient::new(config.clone()).context("building worker client")?);
    let lobbies = Arc::new(RwLock::new(serde_json::to_string(&PublicLobbies::default())?));

    let launcher = Arc::new(ProcessLauncher::current_exe()?);
    let mut supervisor = Supervisor::new(launcher, config.workers(), RESTART_DELAY);
    let (ready_tx, ready_rx) = oneshot::channel();
    let supervisor_task = tokio::spawn(async move {
        if let Err(e) = supervisor.run(ready_tx).await {
            error!("worker supervision stopped: {}", e);
        }
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.dispatcher_port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding dispatcher port {addr}"))?;
    let app = http::router(http::DispatcherState {
        client: client.clone(),
        config: Arc::new(config.clone()),
        auth: Arc::new(AdminAuth::from_config(&config)),
        lobbies: lobbies.clone(),
    });
    let server_task = tokio::spawn(async move {
        axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await
    });
    info!(%addr, "dispatcher listening");

    // Scheduling waits for the whole pool
    tokio::select! {
        ready = ready_rx => {
            ready.context("worker supervision stopped before all workers were ready")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted before workers were ready");
            supervisor_task.abort();
            return Ok(());
        }
    }

    let playlist = MapPlaylist::from_entropy(true);
    let scheduler = LobbyScheduler::new(client, config.clone(), playlist, lobbies);
    let scheduler_task = tokio::spawn(scheduler.run());

    let served = server_task.await.context("dispatcher server task failed")?;
    scheduler_task.abort();
    supervisor_task.abort();
    served.context("dispatcher server failed")?;
    info!("dispatcher stopped");
    Ok(())
}
