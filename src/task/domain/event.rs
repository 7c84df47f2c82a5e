//! Append-only task events and the step updates carried inside them.

use super::{EventId, ParseEventTypeError, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Kind of a task event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskEventType {
    /// Progress output, including step status updates.
    Log,
    /// Terminal outcome of the task.
    Completion,
    /// Request for the owning worker to stop.
    Cancelled,
}

impl TaskEventType {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Completion => "completion",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for TaskEventType {
    type Error = ParseEventTypeError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "log" => Ok(Self::Log),
            "completion" => Ok(Self::Completion),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(ParseEventTypeError(value.to_owned())),
        }
    }
}

/// Immutable event row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEvent {
    /// Store-assigned sequence number.
    pub id: EventId,
    /// Owning task.
    pub task_id: TaskId,
    /// Event kind.
    pub event_type: TaskEventType,
    /// Structured payload.
    pub body: Value,
    /// Insertion timestamp.
    pub created_at: DateTime<Utc>,
}

impl TaskEvent {
    /// Decodes the step update carried in the body, if there is one.
    #[must_use]
    pub fn step_update(&self) -> Option<StepUpdate> {
        StepUpdate::from_body(&self.body)
    }

    /// Returns the `message` field of the body, if it is a string.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.body.get("message").and_then(Value::as_str)
    }
}

/// Status of one templated step, as reported in log event bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Step started.
    Processing,
    /// Step finished successfully.
    Completed,
    /// Step finished unsuccessfully.
    Failed,
}

impl StepStatus {
    /// Returns the wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Returns `true` for `completed` and `failed`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Step-level status carried in a log event body.
///
/// The body shape is `{"stepId": "...", "status": "...", "message": "..."}`;
/// any other fields are left to the orchestration layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepUpdate {
    /// Identifier of the step within the task.
    pub step_id: String,
    /// Reported step status.
    pub status: StepStatus,
    /// Human-readable detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StepUpdate {
    /// Creates a step update without a message.
    #[must_use]
    pub fn new(step_id: impl Into<String>, status: StepStatus) -> Self {
        Self {
            step_id: step_id.into(),
            status,
            message: None,
        }
    }

    /// Attaches a message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Decodes a step update from an event body.
    ///
    /// Bodies without a string `stepId` or with an unrecognized `status` are
    /// plain log lines and yield `None`.
    #[must_use]
    pub fn from_body(body: &Value) -> Option<Self> {
        body.get("stepId")?;
        Self::deserialize(body).ok()
    }

    /// Encodes the update as an event body.
    #[must_use]
    pub fn to_body(&self) -> Value {
        let mut body = serde_json::Map::new();
        body.insert("stepId".to_owned(), Value::String(self.step_id.clone()));
        body.insert(
            "status".to_owned(),
            Value::String(self.status.as_str().to_owned()),
        );
        if let Some(message) = &self.message {
            body.insert("message".to_owned(), Value::String(message.clone()));
        }
        Value::Object(body)
    }
}
