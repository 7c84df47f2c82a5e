//! Task record and creation types.

use super::{TaskId, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Durable task record.
///
/// `secrets` is only populated while a task is `open`, and on the value
/// returned by a successful claim. Every other read path leaves it empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    id: TaskId,
    spec: Value,
    status: TaskStatus,
    secrets: Option<Value>,
    last_heartbeat_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    created_by: Option<String>,
}

/// Parameter object for reconstructing a persisted task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedTaskData {
    /// Persisted task identifier.
    pub id: TaskId,
    /// Persisted task specification.
    pub spec: Value,
    /// Persisted lifecycle status.
    pub status: TaskStatus,
    /// Persisted secrets, if still present.
    pub secrets: Option<Value>,
    /// Latest heartbeat, absent before the first claim.
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Creator identity, if recorded.
    pub created_by: Option<String>,
}

impl Task {
    /// Reconstructs a task from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedTaskData) -> Self {
        Self {
            id: data.id,
            spec: data.spec,
            status: data.status,
            secrets: data.secrets,
            last_heartbeat_at: data.last_heartbeat_at,
            created_at: data.created_at,
            created_by: data.created_by,
        }
    }

    /// Returns the task identifier.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Returns the opaque task specification.
    #[must_use]
    pub const fn spec(&self) -> &Value {
        &self.spec
    }

    /// Returns the lifecycle status.
    #[must_use]
    pub const fn status(&self) -> TaskStatus {
        self.status
    }

    /// Returns the secrets payload when this read path exposes it.
    #[must_use]
    pub const fn secrets(&self) -> Option<&Value> {
        self.secrets.as_ref()
    }

    /// Returns the latest heartbeat timestamp.
    #[must_use]
    pub const fn last_heartbeat_at(&self) -> Option<DateTime<Utc>> {
        self.last_heartbeat_at
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the creator identity.
    #[must_use]
    pub fn created_by(&self) -> Option<&str> {
        self.created_by.as_deref()
    }

    /// Drops the secrets payload from this value.
    #[must_use]
    pub fn redacted(mut self) -> Self {
        self.secrets = None;
        self
    }
}

/// Request to enqueue a new task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    id: TaskId,
    spec: Value,
    secrets: Option<Value>,
    created_by: Option<String>,
}

impl NewTask {
    /// Creates a request with a freshly generated identifier.
    #[must_use]
    pub fn new(spec: Value) -> Self {
        Self {
            id: TaskId::new(),
            spec,
            secrets: None,
            created_by: None,
        }
    }

    /// Attaches secrets handed to the claiming worker exactly once.
    #[must_use]
    pub fn with_secrets(mut self, secrets: Value) -> Self {
        self.secrets = Some(secrets);
        self
    }

    /// Records the identity that created the task.
    #[must_use]
    pub fn with_created_by(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = Some(created_by.into());
        self
    }

    /// Returns the identifier the task will be stored under.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Returns the task specification.
    #[must_use]
    pub const fn spec(&self) -> &Value {
        &self.spec
    }

    /// Returns the secrets payload.
    #[must_use]
    pub const fn secrets(&self) -> Option<&Value> {
        self.secrets.as_ref()
    }

    /// Returns the creator identity.
    #[must_use]
    pub fn created_by(&self) -> Option<&str> {
        self.created_by.as_deref()
    }
}

/// Filter for listing tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    created_by: Option<String>,
    status: Option<TaskStatus>,
    limit: Option<usize>,
}

impl TaskFilter {
    /// Creates a filter that matches every task.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts results to tasks created by `created_by`.
    #[must_use]
    pub fn with_created_by(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = Some(created_by.into());
        self
    }

    /// Restricts results to tasks currently in `status`.
    #[must_use]
    pub const fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Caps the number of returned tasks.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns the creator restriction.
    #[must_use]
    pub fn created_by(&self) -> Option<&str> {
        self.created_by.as_deref()
    }

    /// Returns the status restriction.
    #[must_use]
    pub const fn status(&self) -> Option<TaskStatus> {
        self.status
    }

    /// Returns the result cap.
    #[must_use]
    pub const fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Returns `true` when `task` satisfies the creator and status restrictions.
    #[must_use]
    pub fn matches(&self, task: &Task) -> bool {
        let creator_matches = self
            .created_by
            .as_deref()
            .is_none_or(|creator| task.created_by() == Some(creator));
        let status_matches = self.status.is_none_or(|status| task.status() == status);
        creator_matches && status_matches
    }
}
