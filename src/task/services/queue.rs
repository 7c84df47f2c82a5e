//! Service layer for task queue operations and stale-task shutdown.

use crate::task::{
    domain::{
        CompletionStatus, EventId, NewTask, StepStatus, StepUpdate, Task, TaskDomainError,
        TaskEvent, TaskFilter, TaskHistory, TaskId, TaskStatus,
    },
    ports::{CompletionOutcome, TaskStore, TaskStoreError},
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Message recorded on steps and tasks force-failed by [`TaskQueueService::shutdown_task`].
pub const STALE_TASK_MESSAGE: &str = "This task was marked as stale as it exceeded its timeout";

/// Service-level errors for task queue operations.
#[derive(Debug, Clone, Error)]
pub enum TaskQueueError {
    /// Caller input was rejected by the domain.
    #[error(transparent)]
    Domain(#[from] TaskDomainError),
    /// Store operation failed.
    #[error(transparent)]
    Store(#[from] TaskStoreError),
}

impl TaskQueueError {
    /// Returns `true` when a competing caller already changed the task.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(TaskStoreError::Conflict { .. }))
    }
}

/// Result type for task queue service operations.
pub type TaskQueueResult<T> = Result<T, TaskQueueError>;

/// Outcome of a forced shutdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Task that was shut down.
    pub task_id: TaskId,
    /// Steps that were marked failed, in first-seen order.
    pub failed_steps: Vec<String>,
}

/// Task queue orchestration service.
pub struct TaskQueueService<S>
where
    S: TaskStore,
{
    store: Arc<S>,
}

impl<S> Clone for TaskQueueService<S>
where
    S: TaskStore,
{
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> TaskQueueService<S>
where
    S: TaskStore,
{
    /// Creates a new task queue service.
    #[must_use]
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Returns the underlying store.
    #[must_use]
    pub const fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Enqueues a task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskQueueError::Store`] when persistence fails.
    #[tracing::instrument(skip_all, fields(task_id = %task.id()))]
    pub async fn create_task(&self, task: NewTask) -> TaskQueueResult<TaskId> {
        let id = self.store.create_task(&task).await?;
        tracing::debug!("task created");
        Ok(id)
    }

    /// Loads a task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskQueueError::Store`] with `NotFound` or `Corruption`.
    pub async fn get_task(&self, id: TaskId) -> TaskQueueResult<Task> {
        Ok(self.store.get_task(id).await?)
    }

    /// Lists tasks newest first, without secrets.
    ///
    /// # Errors
    ///
    /// Returns [`TaskQueueError::Store`] when a read fails.
    pub async fn list_tasks(&self, filter: &TaskFilter) -> TaskQueueResult<Vec<Task>> {
        Ok(self.store.list_tasks(filter).await?)
    }

    /// Claims one open task, if any.
    ///
    /// `None` means "poll again later"; no retry happens here.
    ///
    /// # Errors
    ///
    /// Returns [`TaskQueueError::Store`] when persistence fails.
    pub async fn claim_task(&self) -> TaskQueueResult<Option<Task>> {
        Ok(self.store.claim_task().await?)
    }

    /// Renews the claim on a processing task.
    ///
    /// # Errors
    ///
    /// Returns a conflict when the claim is no longer valid.
    pub async fn heartbeat(&self, id: TaskId) -> TaskQueueResult<()> {
        Ok(self.store.heartbeat(id).await?)
    }

    /// Lists processing tasks whose heartbeat is older than `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskQueueError::Store`] when the query fails.
    pub async fn list_stale_tasks(&self, timeout: Duration) -> TaskQueueResult<Vec<TaskId>> {
        Ok(self.store.list_stale_tasks(timeout).await?)
    }

    /// Finalizes a task with a terminal status.
    ///
    /// Returns [`CompletionOutcome::AlreadyCancelled`] when the worker
    /// acknowledges a cancellation that was already recorded.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidCompletionStatus`] for `open` or
    /// `processing`, and store errors for missing tasks or conflicts.
    #[tracing::instrument(skip(self, body), fields(task_id = %id))]
    pub async fn complete_task(
        &self,
        id: TaskId,
        status: TaskStatus,
        body: Value,
    ) -> TaskQueueResult<CompletionOutcome> {
        let completion = CompletionStatus::try_from(status)?;
        let outcome = self.store.complete_task(id, completion, body).await?;
        match outcome {
            CompletionOutcome::Recorded => tracing::info!(%status, "task completed"),
            CompletionOutcome::AlreadyCancelled => {
                tracing::debug!(%status, "task already cancelled, completion ignored");
            }
        }
        Ok(outcome)
    }

    /// Signals the owning worker to stop.
    ///
    /// # Errors
    ///
    /// Returns [`TaskQueueError::Store`] when the task is missing.
    #[tracing::instrument(skip(self, body), fields(task_id = %id))]
    pub async fn cancel_task(&self, id: TaskId, body: Value) -> TaskQueueResult<Option<EventId>> {
        let signal = self.store.cancel_task(id, body).await?;
        if signal.is_none() {
            tracing::debug!("task already terminal, cancellation ignored");
        }
        Ok(signal)
    }

    /// Appends a log event.
    ///
    /// # Errors
    ///
    /// Returns [`TaskQueueError::Store`] when the task is missing.
    pub async fn emit_log_event(&self, id: TaskId, body: Value) -> TaskQueueResult<EventId> {
        Ok(self.store.emit_log_event(id, body).await?)
    }

    /// Appends a log event reporting a step status.
    ///
    /// # Errors
    ///
    /// Returns [`TaskQueueError::Store`] when the task is missing.
    pub async fn emit_step_update(
        &self,
        id: TaskId,
        update: &StepUpdate,
    ) -> TaskQueueResult<EventId> {
        self.emit_log_event(id, update.to_body()).await
    }

    /// Lists events, optionally after a cursor.
    ///
    /// # Errors
    ///
    /// Returns [`TaskQueueError::Store`] when a read fails.
    pub async fn list_events(
        &self,
        id: TaskId,
        after: Option<EventId>,
    ) -> TaskQueueResult<Vec<TaskEvent>> {
        Ok(self.store.list_events(id, after).await?)
    }

    /// Reconstructs the step, cancellation and completion history of a task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskQueueError::Store`] when a read fails.
    pub async fn history(&self, id: TaskId) -> TaskQueueResult<TaskHistory> {
        let events = self.store.list_events(id, None).await?;
        Ok(TaskHistory::from_events(&events))
    }

    /// Force-fails a stale task.
    ///
    /// Every step that started but never finished receives a `failed` log
    /// event, then the task is completed as `failed`. A worker that finishes
    /// at the same moment races on the same conditional update, so exactly
    /// one of the two completions wins and the loser sees a conflict. When
    /// the worker wins, the step events written before the final update
    /// remain in the log.
    ///
    /// # Errors
    ///
    /// Returns [`TaskQueueError::Store`] when the task is missing or
    /// persistence fails. A task that is not `processing`, or that a worker
    /// finished first (including as `cancelled`), yields a conflict.
    #[tracing::instrument(skip(self), fields(task_id = %id))]
    pub async fn shutdown_task(&self, id: TaskId) -> TaskQueueResult<ShutdownReport> {
        let current = self.store.get_task(id).await?.status();
        if current != TaskStatus::Processing {
            return Err(TaskStoreError::conflict(
                id,
                format!("refusing to shut down a task that is '{current}'"),
            )
            .into());
        }

        let history = self.history(id).await?;
        let failed_steps: Vec<String> = history
            .unfinished_steps()
            .into_iter()
            .map(ToOwned::to_owned)
            .collect();

        for step_id in &failed_steps {
            let update =
                StepUpdate::new(step_id.as_str(), StepStatus::Failed).with_message(STALE_TASK_MESSAGE);
            self.store.emit_log_event(id, update.to_body()).await?;
        }

        let outcome = self
            .store
            .complete_task(
                id,
                CompletionStatus::Failed,
                json!({ "message": STALE_TASK_MESSAGE }),
            )
            .await?;
        if outcome == CompletionOutcome::AlreadyCancelled {
            return Err(
                TaskStoreError::conflict(id, "task was cancelled before shutdown finished").into(),
            );
        }

        tracing::warn!(failed_steps = failed_steps.len(), "stale task shut down");
        Ok(ShutdownReport {
            task_id: id,
            failed_steps,
        })
    }
}
