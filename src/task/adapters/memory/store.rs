//! In-memory task store for tests and single-process embedding.
//!
//! A single lock guards tasks and events together, so each operation is one
//! atomic unit just like a database transaction. The injected clock stands
//! in for the server clock when stamping heartbeats and computing staleness
//! cutoffs.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use mockable::{Clock, DefaultClock};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use crate::task::{
    domain::{
        CompletionStatus, EventId, NewTask, PersistedTaskData, Task, TaskEvent, TaskEventType,
        TaskFilter, TaskId, TaskStatus,
    },
    ports::{CompletionOutcome, TaskStore, TaskStoreError, TaskStoreResult},
};

/// Thread-safe in-memory task store.
pub struct InMemoryTaskStore<C = DefaultClock> {
    state: Arc<RwLock<InMemoryTaskState>>,
    clock: Arc<C>,
}

#[derive(Debug, Default)]
struct InMemoryTaskState {
    tasks: HashMap<TaskId, TaskRecord>,
    events: Vec<TaskEvent>,
    last_event_id: i64,
    inserted: u64,
}

/// Mutable stored shape of a task, mirroring a table row.
#[derive(Debug, Clone)]
struct TaskRecord {
    id: TaskId,
    spec: Value,
    status: TaskStatus,
    secrets: Option<Value>,
    last_heartbeat_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    created_by: Option<String>,
    insertion_order: u64,
}

impl TaskRecord {
    fn to_persisted(&self) -> PersistedTaskData {
        PersistedTaskData {
            id: self.id,
            spec: self.spec.clone(),
            status: self.status,
            secrets: self.secrets.clone(),
            last_heartbeat_at: self.last_heartbeat_at,
            created_at: self.created_at,
            created_by: self.created_by.clone(),
        }
    }

    fn to_task(&self) -> Task {
        Task::from_persisted(self.to_persisted())
    }
}

impl<C> Clone for InMemoryTaskStore<C> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl InMemoryTaskStore<DefaultClock> {
    /// Creates an empty store driven by the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(DefaultClock))
    }
}

impl Default for InMemoryTaskStore<DefaultClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> InMemoryTaskStore<C>
where
    C: Clock + Send + Sync,
{
    /// Creates an empty store driven by `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<C>) -> Self {
        Self {
            state: Arc::new(RwLock::new(InMemoryTaskState::default())),
            clock,
        }
    }

    fn read_state(&self) -> TaskStoreResult<RwLockReadGuard<'_, InMemoryTaskState>> {
        self.state.read().map_err(|err| {
            TaskStoreError::persistence(std::io::Error::other(err.to_string()))
        })
    }

    fn write_state(&self) -> TaskStoreResult<RwLockWriteGuard<'_, InMemoryTaskState>> {
        self.state.write().map_err(|err| {
            TaskStoreError::persistence(std::io::Error::other(err.to_string()))
        })
    }

    /// Computes `now - timeout` against the injected clock.
    fn stale_cutoff(&self, timeout: Duration) -> TaskStoreResult<DateTime<Utc>> {
        let delta = TimeDelta::from_std(timeout).map_err(TaskStoreError::persistence)?;
        self.clock
            .utc()
            .checked_sub_signed(delta)
            .ok_or_else(|| TaskStoreError::persistence(std::io::Error::other("cutoff underflow")))
    }
}

impl InMemoryTaskState {
    fn append_event(
        &mut self,
        task_id: TaskId,
        event_type: TaskEventType,
        body: Value,
        created_at: DateTime<Utc>,
    ) -> EventId {
        self.last_event_id = self.last_event_id.saturating_add(1);
        let id = EventId::new(self.last_event_id);
        self.events.push(TaskEvent {
            id,
            task_id,
            event_type,
            body,
            created_at,
        });
        id
    }

    fn task_status(&self, id: TaskId) -> TaskStoreResult<TaskStatus> {
        self.tasks
            .get(&id)
            .map(|record| record.status)
            .ok_or(TaskStoreError::NotFound(id))
    }
}

#[async_trait]
impl<C> TaskStore for InMemoryTaskStore<C>
where
    C: Clock + Send + Sync,
{
    async fn create_task(&self, task: &NewTask) -> TaskStoreResult<TaskId> {
        let now = self.clock.utc();
        let mut state = self.write_state()?;
        state.inserted = state.inserted.saturating_add(1);
        let record = TaskRecord {
            id: task.id(),
            spec: task.spec().clone(),
            status: TaskStatus::Open,
            secrets: task.secrets().cloned(),
            last_heartbeat_at: None,
            created_at: now,
            created_by: task.created_by().map(ToOwned::to_owned),
            insertion_order: state.inserted,
        };
        state.tasks.insert(task.id(), record);
        Ok(task.id())
    }

    async fn get_task(&self, id: TaskId) -> TaskStoreResult<Task> {
        let state = self.read_state()?;
        state
            .tasks
            .get(&id)
            .map(TaskRecord::to_task)
            .ok_or(TaskStoreError::NotFound(id))
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> TaskStoreResult<Vec<Task>> {
        let state = self.read_state()?;
        let mut records: Vec<&TaskRecord> = state.tasks.values().collect();
        records.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(b.insertion_order.cmp(&a.insertion_order))
        });
        let matching = records
            .into_iter()
            .map(|record| record.to_task().redacted())
            .filter(|task| filter.matches(task));
        Ok(match filter.limit() {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }

    async fn claim_task(&self) -> TaskStoreResult<Option<Task>> {
        let now = self.clock.utc();
        let mut state = self.write_state()?;
        let Some(record) = state
            .tasks
            .values_mut()
            .filter(|record| record.status.can_transition_to(TaskStatus::Processing))
            .min_by_key(|record| record.insertion_order)
        else {
            return Ok(None);
        };

        let secrets = record.secrets.take();
        record.status = TaskStatus::Processing;
        record.last_heartbeat_at = Some(now);

        let claimed = Task::from_persisted(PersistedTaskData {
            secrets,
            ..record.to_persisted()
        });
        Ok(Some(claimed))
    }

    async fn heartbeat(&self, id: TaskId) -> TaskStoreResult<()> {
        let now = self.clock.utc();
        let mut state = self.write_state()?;
        match state.tasks.get_mut(&id) {
            Some(record) if record.status == TaskStatus::Processing => {
                record.last_heartbeat_at = Some(now);
                Ok(())
            }
            _ => Err(TaskStoreError::stale_heartbeat(id)),
        }
    }

    async fn list_stale_tasks(&self, timeout: Duration) -> TaskStoreResult<Vec<TaskId>> {
        let cutoff = self.stale_cutoff(timeout)?;
        let state = self.read_state()?;
        Ok(state
            .tasks
            .values()
            .filter(|record| record.status == TaskStatus::Processing)
            .filter(|record| record.last_heartbeat_at.is_some_and(|beat| beat < cutoff))
            .map(|record| record.id)
            .collect())
    }

    async fn complete_task(
        &self,
        id: TaskId,
        status: CompletionStatus,
        body: Value,
    ) -> TaskStoreResult<CompletionOutcome> {
        let now = self.clock.utc();
        let mut state = self.write_state()?;
        let current = state.task_status(id)?;
        if current == TaskStatus::Cancelled {
            return Ok(CompletionOutcome::AlreadyCancelled);
        }
        if !current.can_transition_to(status.status()) {
            return Err(TaskStoreError::unexpected_status(id, status, current));
        }

        let record = state
            .tasks
            .get_mut(&id)
            .ok_or_else(|| TaskStoreError::lost_update(id, status))?;
        record.status = status.status();
        state.append_event(id, TaskEventType::Completion, body, now);
        Ok(CompletionOutcome::Recorded)
    }

    async fn cancel_task(&self, id: TaskId, body: Value) -> TaskStoreResult<Option<EventId>> {
        let now = self.clock.utc();
        let mut state = self.write_state()?;
        if state.task_status(id)?.is_terminal() {
            return Ok(None);
        }
        Ok(Some(state.append_event(
            id,
            TaskEventType::Cancelled,
            body,
            now,
        )))
    }

    async fn emit_log_event(&self, id: TaskId, body: Value) -> TaskStoreResult<EventId> {
        let now = self.clock.utc();
        let mut state = self.write_state()?;
        state.task_status(id)?;
        Ok(state.append_event(id, TaskEventType::Log, body, now))
    }

    async fn list_events(
        &self,
        id: TaskId,
        after: Option<EventId>,
    ) -> TaskStoreResult<Vec<TaskEvent>> {
        let state = self.read_state()?;
        Ok(state
            .events
            .iter()
            .filter(|event| event.task_id == id)
            .filter(|event| {
                after.is_none_or(|cursor| {
                    event.id > cursor || event.event_type == TaskEventType::Completion
                })
            })
            .cloned()
            .collect())
    }
}
