//! Runs task store maintenance against `PostgreSQL`.
//!
//! Usage:
//!
//! ```text
//! task_reaper <migrate|sweep|run>
//! ```
//!
//! - `migrate` applies pending schema migrations and exits.
//! - `sweep` shuts down every stale task once and exits.
//! - `run` sweeps on the configured interval until interrupted.
//!
//! Settings are read from the environment (see `StoreConfig::from_env`).

use std::env;
use std::sync::Arc;
use taskstore::config::{ConfigError, StoreConfig};
use taskstore::task::adapters::postgres::PostgresTaskStore;
use taskstore::task::ports::TaskStoreError;
use taskstore::task::services::{StaleTaskReaper, TaskQueueError, TaskQueueService};
use taskstore::telemetry::init_tracing;
use thiserror::Error;
use tokio::sync::watch;

/// Errors that end the maintenance process.
#[derive(Debug, Error)]
enum ReaperError {
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to connect to the task store: {0}")]
    Connect(#[source] TaskStoreError),
    #[error("connection task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("sweep failed: {0}")]
    Sweep(#[from] TaskQueueError),
    #[error("failed to listen for interrupt: {0}")]
    Signal(#[source] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Migrate,
    Sweep,
    Run,
}

impl Operation {
    fn parse(arg: &str) -> Result<Self, ReaperError> {
        match arg {
            "migrate" => Ok(Self::Migrate),
            "sweep" => Ok(Self::Sweep),
            "run" => Ok(Self::Run),
            other => Err(ReaperError::InvalidArgs(format!(
                "unknown operation '{other}'; expected migrate, sweep, or run"
            ))),
        }
    }
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Operation, ReaperError> {
    let _program = args.next();
    let operation = args
        .next()
        .ok_or_else(|| ReaperError::InvalidArgs("missing operation".to_owned()))?;
    if let Some(extra) = args.next() {
        return Err(ReaperError::InvalidArgs(format!(
            "unexpected argument '{extra}'"
        )));
    }
    Operation::parse(&operation)
}

#[tokio::main]
async fn main() -> Result<(), ReaperError> {
    init_tracing();
    let operation = parse_args(env::args())?;
    let loaded = StoreConfig::from_env()?;
    let config = if operation == Operation::Migrate {
        loaded.with_run_migrations(true)
    } else {
        loaded
    };

    let connect_config = config.clone();
    let store = tokio::task::spawn_blocking(move || PostgresTaskStore::connect(&connect_config))
        .await?
        .map_err(ReaperError::Connect)?;

    let reaper = StaleTaskReaper::new(TaskQueueService::new(Arc::new(store)));
    match operation {
        Operation::Migrate => tracing::info!("migrations up to date"),
        Operation::Sweep => {
            let report = reaper.sweep(config.stale_timeout()).await?;
            tracing::info!(
                shut_down = report.shut_down.len(),
                raced = report.raced.len(),
                "sweep complete"
            );
        }
        Operation::Run => {
            let (stop_tx, stop_rx) = watch::channel(false);
            let supervisor = reaper.run(config.sweep_interval(), config.stale_timeout(), stop_rx);
            tokio::pin!(supervisor);
            tokio::select! {
                () = &mut supervisor => {}
                signal = tokio::signal::ctrl_c() => {
                    signal.map_err(ReaperError::Signal)?;
                    tracing::info!("interrupt received, stopping");
                    if stop_tx.send(true).is_err() {
                        tracing::debug!("reaper already stopped");
                    }
                    supervisor.await;
                }
            }
        }
    }
    Ok(())
}
