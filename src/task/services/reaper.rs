//! Periodic supervisor that shuts down tasks whose workers went quiet.

use super::{TaskQueueError, TaskQueueResult, TaskQueueService};
use crate::task::{
    domain::TaskId,
    ports::{TaskStore, TaskStoreError},
};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Shortest period the run loop will tick at.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Tasks force-failed by this sweep.
    pub shut_down: Vec<TaskId>,
    /// Stale tasks that another caller finished or removed first.
    pub raced: Vec<TaskId>,
}

/// Stale-task supervisor.
///
/// Detection is purely timestamp based, so clock skew can cause a live task
/// to be shut down. The worker then sees a conflict on its next heartbeat.
pub struct StaleTaskReaper<S>
where
    S: TaskStore,
{
    service: TaskQueueService<S>,
}

impl<S> StaleTaskReaper<S>
where
    S: TaskStore,
{
    /// Creates a reaper over `service`.
    #[must_use]
    pub const fn new(service: TaskQueueService<S>) -> Self {
        Self { service }
    }

    /// Shuts down every task whose heartbeat is older than `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskQueueError`] when listing fails or a shutdown fails for
    /// a reason other than a lost race.
    pub async fn sweep(&self, timeout: Duration) -> TaskQueueResult<SweepReport> {
        let mut report = SweepReport::default();
        for task_id in self.service.list_stale_tasks(timeout).await? {
            match self.service.shutdown_task(task_id).await {
                Ok(_) => report.shut_down.push(task_id),
                Err(TaskQueueError::Store(
                    TaskStoreError::Conflict { .. } | TaskStoreError::NotFound(_),
                )) => {
                    tracing::debug!(%task_id, "stale task finished before shutdown");
                    report.raced.push(task_id);
                }
                Err(err) => return Err(err),
            }
        }

        if !report.shut_down.is_empty() || !report.raced.is_empty() {
            tracing::info!(
                shut_down = report.shut_down.len(),
                raced = report.raced.len(),
                "stale task sweep finished"
            );
        }
        Ok(report)
    }

    /// Sweeps every `interval` until `shutdown` becomes `true` or its sender
    /// is dropped.
    ///
    /// Sweep failures are logged and the loop keeps going. An `interval`
    /// shorter than one millisecond is raised to one millisecond.
    pub async fn run(
        &self,
        interval: Duration,
        timeout: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(interval.max(MIN_SWEEP_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.sweep(timeout).await {
                        tracing::error!(error = %err, "stale task sweep failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::info!("stale task reaper stopped");
    }
}
