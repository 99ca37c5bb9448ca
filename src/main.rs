//! Geoconflict Server
//!
//! One binary, two roles: `dispatcher` forks and supervises the worker
//! pool; `worker --id N` is what it forks.

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use geoconflict::{dispatcher, worker, ServerConfig, WorkerId, VERSION};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    role: Role,
}

#[derive(Subcommand, Debug)]
enum Role {
    /// Run the coordinating process
    Dispatcher,
    /// Run one worker (normally started by the dispatcher)
    Worker {
        /// Worker identity
        #[arg(long, env = "WORKER_ID")]
        id: u16,
    },
}

fn init_tracing(to_stderr: bool) -> anyhow::Result<()> {
    let default_level = if cfg!(feature = "debug-tracing") { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = FmtSubscriber::builder().with_env_filter(filter);

    // Worker stdout carries the ready handshake
    let installed = if to_stderr {
        tracing::subscriber::set_global_default(builder.with_writer(std::io::stderr).finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    installed.context("failed to set tracing subscriber")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(matches!(cli.role, Role::Worker { .. }))?;

    let config = ServerConfig::from_env()?;

    match cli.role {
        Role::Dispatcher => {
            info!("Geoconflict dispatcher v{}", VERSION);
            dispatcher::run_dispatcher(config).await
        }
        Role::Worker { id } => {
            let worker_id = WorkerId(id);
            anyhow::ensure!(
                id < config.num_workers,
                "worker id {} outside pool of {}",
                id,
                config.num_workers
            );
            info!(worker = %worker_id, "Geoconflict worker v{}", VERSION);
            worker::run_worker(config, worker_id).await
        }
    }
}
