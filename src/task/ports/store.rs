//! Store port for task persistence, claiming, liveness and the event log.

use crate::task::domain::{
    CompletionStatus, EventId, NewTask, Task, TaskEvent, TaskFilter, TaskId, TaskStatus,
};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Result type for task store operations.
pub type TaskStoreResult<T> = Result<T, TaskStoreError>;

/// Durable task queue contract.
///
/// Every mutating operation is atomic with respect to concurrent callers in
/// other processes. Implementations never retry internally; the polling
/// caller owns retry and backoff.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Inserts a new task with status `open`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::Persistence`] on storage failure.
    async fn create_task(&self, task: &NewTask) -> TaskStoreResult<TaskId>;

    /// Loads a task, secrets included while it is still `open`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::NotFound`] when no task exists and
    /// [`TaskStoreError::Corruption`] when the stored row cannot be decoded.
    async fn get_task(&self, id: TaskId) -> TaskStoreResult<Task>;

    /// Lists tasks newest first. Secrets are never included.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::Corruption`] when a stored row cannot be
    /// decoded.
    async fn list_tasks(&self, filter: &TaskFilter) -> TaskStoreResult<Vec<Task>>;

    /// Claims one arbitrary `open` task, moving it to `processing`.
    ///
    /// Returns `None` when nothing is open or a competing claimant won the
    /// race for the selected row. The returned task is the only read that
    /// exposes the secrets after creation; the stored copy is cleared.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::Persistence`] on storage failure.
    async fn claim_task(&self) -> TaskStoreResult<Option<Task>>;

    /// Renews the liveness timestamp of a `processing` task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::Conflict`] when the task is missing or not
    /// `processing`; the worker must stop.
    async fn heartbeat(&self, id: TaskId) -> TaskStoreResult<()>;

    /// Lists `processing` tasks whose heartbeat is older than `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::Persistence`] on storage failure.
    async fn list_stale_tasks(&self, timeout: Duration) -> TaskStoreResult<Vec<TaskId>>;

    /// Moves a `processing` task to a terminal status and appends one
    /// `completion` event carrying `body`.
    ///
    /// A task that is already `cancelled` is left untouched and
    /// [`CompletionOutcome::AlreadyCancelled`] is returned.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::NotFound`] when the task is missing and
    /// [`TaskStoreError::Conflict`] when it is not `processing`.
    async fn complete_task(
        &self,
        id: TaskId,
        status: CompletionStatus,
        body: Value,
    ) -> TaskStoreResult<CompletionOutcome>;

    /// Appends a `cancelled` signal event without changing the status.
    ///
    /// Returns `None` without writing when the task is already terminal.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::NotFound`] when the task is missing.
    async fn cancel_task(&self, id: TaskId, body: Value) -> TaskStoreResult<Option<EventId>>;

    /// Appends a `log` event.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::NotFound`] when the task is missing.
    async fn emit_log_event(&self, id: TaskId, body: Value) -> TaskStoreResult<EventId>;

    /// Lists events in ascending sequence order.
    ///
    /// With `after`, returns events whose id is greater than `after` plus any
    /// `completion` event regardless of its id.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::Corruption`] when a stored event cannot be
    /// decoded.
    async fn list_events(
        &self,
        id: TaskId,
        after: Option<EventId>,
    ) -> TaskStoreResult<Vec<TaskEvent>>;
}

/// What a successful [`TaskStore::complete_task`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// The status changed and a `completion` event was appended.
    Recorded,
    /// The task was already `cancelled`; nothing was written.
    AlreadyCancelled,
}

/// Errors returned by task store implementations.
#[derive(Debug, Clone, Error)]
pub enum TaskStoreError {
    /// The task was not found.
    #[error("task not found: {0}")]
    NotFound(TaskId),

    /// A conditional transition's precondition no longer holds.
    #[error("conflict on task {task_id}: {reason}")]
    Conflict {
        /// Task whose transition was rejected.
        task_id: TaskId,
        /// Description of the failed precondition.
        reason: String,
    },

    /// Stored data could not be decoded.
    #[error("corrupt task data: {0}")]
    Corruption(String),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl TaskStoreError {
    /// Wraps a persistence error.
    #[must_use]
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }

    /// Builds a conflict error.
    #[must_use]
    pub fn conflict(task_id: TaskId, reason: impl Into<String>) -> Self {
        Self::Conflict {
            task_id,
            reason: reason.into(),
        }
    }

    /// Builds a corruption error from a decode failure.
    #[must_use]
    pub fn corruption(err: impl std::fmt::Display) -> Self {
        Self::Corruption(err.to_string())
    }

    /// Builds the conflict raised when a heartbeat matches no `processing` row.
    #[must_use]
    pub fn stale_heartbeat(task_id: TaskId) -> Self {
        Self::conflict(task_id, "heartbeat rejected, task is not processing")
    }

    /// Builds the conflict raised when a completion finds an unexpected status.
    #[must_use]
    pub fn unexpected_status(
        task_id: TaskId,
        status: CompletionStatus,
        current: TaskStatus,
    ) -> Self {
        Self::conflict(
            task_id,
            format!(
                "refusing to move to '{status}' from '{current}', expected '{}'",
                status.expected_prior()
            ),
        )
    }

    /// Builds the conflict raised when a completion update matches no row.
    #[must_use]
    pub fn lost_update(task_id: TaskId, status: CompletionStatus) -> Self {
        Self::conflict(task_id, format!("failed to update status to '{status}'"))
    }
}
