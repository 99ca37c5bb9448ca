//! Worker Supervision
//!
//! Launches one process per worker identity, waits until every worker has
//! announced itself, and relaunches any worker that exits under the same
//! identity so game routing never changes.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, instrument, warn};

use crate::core::shard::WorkerId;
use crate::network::api::ReadyNotice;

/// Supervision errors.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// Process could not be spawned.
    #[error("failed to spawn worker {worker}: {source}")]
    Spawn {
        /// Worker being launched.
        worker: WorkerId,
        /// Underlying error.
        source: std::io::Error,
    },
    /// Executable path unavailable.
    #[error("cannot locate server executable: {0}")]
    Executable(std::io::Error),
    /// Pool is empty.
    #[error("no workers configured")]
    NoWorkers,
}

/// Lifecycle notices from launched workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerEvent {
    /// Worker bound its listeners.
    Ready(WorkerId),
    /// Worker process ended.
    Exited {
        /// Worker that ended.
        worker: WorkerId,
        /// Exit code, if it exited normally.
        code: Option<i32>,
    },
}

/// Starts worker processes.
pub trait WorkerLauncher: Send + Sync + 'static {
    /// Start `worker` and report its lifecycle on `events`.
    fn launch(&self, worker: WorkerId, events: mpsc::UnboundedSender<WorkerEvent>) -> Result<(), SupervisorError>;
}

/// Launches workers as child processes of the current executable.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
}

impl ProcessLauncher {
    /// Launcher re-executing this binary in worker mode.
    pub fn current_exe() -> Result<Self, SupervisorError> {
        let program = std::env::current_exe().map_err(SupervisorError::Executable)?;
        Ok(Self { program })
    }
}

impl WorkerLauncher for ProcessLauncher {
    fn launch(&self, worker: WorkerId, events: mpsc::UnboundedSender<WorkerEvent>) -> Result<(), SupervisorError> {
        let mut child = Command::new(&self.program)
            .arg("worker")
            .arg("--id")
            .arg(worker.0.to_string())
            .env("WORKER_ID", worker.0.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SupervisorError::Spawn { worker, source })?;

        let stdout = child.stdout.take();
        info!(%worker, pid = ?child.id(), "worker launched");

        tokio::spawn(async move {
            if let Some(stdout) = stdout {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    match ReadyNotice::parse_line(&line) {
                        Some(notice) if notice.worker_id == worker => {
                            let _ = events.send(WorkerEvent::Ready(worker));
                        }
                        _ => debug!(%worker, "worker stdout: {}", line),
                    }
                }
            }
            let code = match child.wait().await {
                Ok(status) => status.code(),
                Err(e) => {
                    warn!(%worker, "failed to wait for worker: {}", e);
                    None
                }
            };
            let _ = events.send(WorkerEvent::Exited { worker, code });
        });

        Ok(())
    }
}

/// Releases once every expected worker has reported ready.
#[derive(Debug, Clone)]
pub struct ReadyBarrier {
    pending: BTreeSet<WorkerId>,
    released: bool,
}

impl ReadyBarrier {
    /// Barrier over `workers`.
    pub fn new(workers: impl IntoIterator<Item = WorkerId>) -> Self {
        Self {
            pending: workers.into_iter().collect(),
            released: false,
        }
    }

    /// Record a ready worker. True exactly once: when the last one arrives.
    pub fn mark_ready(&mut self, worker: WorkerId) -> bool {
        self.pending.remove(&worker);
        if self.pending.is_empty() && !self.released {
            self.released = true;
            return true;
        }
        false
    }

    /// Whether every worker has been ready at least once.
    pub fn is_released(&self) -> bool {
        self.released
    }
}

/// Per-identity supervision state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerSlot {
    /// Times relaunched after an exit.
    pub restarts: u32,
    /// Ready since the last launch.
    pub ready: bool,
}

/// Keeps the worker pool running.
pub struct Supervisor<L> {
    launcher: Arc<L>,
    slots: BTreeMap<WorkerId, WorkerSlot>,
    restart_delay: Duration,
}

impl<L: WorkerLauncher> Supervisor<L> {
    /// Supervisor for `workers`, waiting `restart_delay` before a relaunch.
    pub fn new(launcher: Arc<L>, workers: impl IntoIterator<Item = WorkerId>, restart_delay: Duration) -> Self {
        Self {
            launcher,
            slots: workers.into_iter().map(|w| (w, WorkerSlot::default())).collect(),
            restart_delay,
        }
    }

    /// Launch the pool and supervise it until the future is dropped.
    ///
    /// `all_ready` fires once every worker has reported ready. Relaunches
    /// are scheduled off the event loop, so one identity that keeps
    /// failing to spawn never holds up events from the others.
    #[instrument(skip_all, fields(workers = self.slots.len()))]
    pub async fn run(&mut self, all_ready: oneshot::Sender<()>) -> Result<(), SupervisorError> {
        if self.slots.is_empty() {
            return Err(SupervisorError::NoWorkers);
        }

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let (retry_tx, mut retry_rx) = mpsc::unbounded_channel();
        let mut barrier = ReadyBarrier::new(self.slots.keys().copied());
        let mut all_ready = Some(all_ready);

        let workers: Vec<WorkerId> = self.slots.keys().copied().collect();
        for worker in workers {
            self.launcher.launch(worker, events_tx.clone())?;
        }

        loop {
            tokio::select! {
                Some(event) = events_rx.recv() => match event {
                    WorkerEvent::Ready(worker) => {
                        if let Some(slot) = self.slots.get_mut(&worker) {
                            slot.ready = true;
                        }
                        if barrier.mark_ready(worker) {
                            info!("all workers ready");
                            if let Some(tx) = all_ready.take() {
                                let _ = tx.send(());
                            }
                        } else if barrier.is_released() {
                            info!(%worker, "worker back online");
                        } else {
                            debug!(%worker, "worker ready");
                        }
                    }
                    WorkerEvent::Exited { worker, code } => {
                        let Some(slot) = self.slots.get_mut(&worker) else {
                            continue;
                        };
                        slot.ready = false;
                        slot.restarts += 1;
                        warn!(%worker, ?code, restarts = slot.restarts, "worker exited, restarting");
                        self.schedule_retry(worker, &retry_tx);
                    }
                },
                Some(worker) = retry_rx.recv() => {
                    if let Err(e) = self.launcher.launch(worker, events_tx.clone()) {
                        error!(%worker, "relaunch failed: {}", e);
                        self.schedule_retry(worker, &retry_tx);
                    }
                }
            }
        }
    }

    fn schedule_retry(&self, worker: WorkerId, retries: &mpsc::UnboundedSender<WorkerId>) {
        let delay = self.restart_delay;
        let retries = retries.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = retries.send(worker);
        });
    }

    /// Supervision state per identity.
    pub fn slots(&self) -> &BTreeMap<WorkerId, WorkerSlot> {
        &self.slots
    }
}
