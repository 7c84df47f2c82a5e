//! Task lifecycle statuses.

use super::{ParseTaskStatusError, TaskDomainError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Task lifecycle status.
///
/// The only valid path is `open -> processing -> {completed | failed |
/// cancelled}`. The three outcomes are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task is waiting to be claimed by a worker.
    Open,
    /// Task is owned by a worker that renews it with heartbeats.
    Processing,
    /// Task finished successfully.
    Completed,
    /// Task finished unsuccessfully or was force-failed after going stale.
    Failed,
    /// Task was stopped by its worker after a cancellation signal.
    Cancelled,
}

impl TaskStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns `true` when no further transition is valid.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns `true` when the state machine permits moving to `target`.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Open, Self::Processing)
                | (
                    Self::Processing,
                    Self::Completed | Self::Failed | Self::Cancelled
                )
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for TaskStatus {
    type Error = ParseTaskStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(ParseTaskStatusError(value.to_owned())),
        }
    }
}

/// Terminal outcome requested when completing a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    /// Task finished successfully.
    Completed,
    /// Task finished unsuccessfully.
    Failed,
    /// Task stopped after a cancellation signal.
    Cancelled,
}

impl CompletionStatus {
    /// Returns the status the task holds after the transition.
    #[must_use]
    pub const fn status(self) -> TaskStatus {
        match self {
            Self::Completed => TaskStatus::Completed,
            Self::Failed => TaskStatus::Failed,
            Self::Cancelled => TaskStatus::Cancelled,
        }
    }

    /// Returns the only status a task may hold before this transition.
    #[must_use]
    pub const fn expected_prior(self) -> TaskStatus {
        match self {
            Self::Completed | Self::Failed | Self::Cancelled => TaskStatus::Processing,
        }
    }

    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        self.status().as_str()
    }
}

impl From<CompletionStatus> for TaskStatus {
    fn from(value: CompletionStatus) -> Self {
        value.status()
    }
}

impl TryFrom<TaskStatus> for CompletionStatus {
    type Error = TaskDomainError;

    fn try_from(value: TaskStatus) -> Result<Self, Self::Error> {
        match value {
            TaskStatus::Completed => Ok(Self::Completed),
            TaskStatus::Failed => Ok(Self::Failed),
            TaskStatus::Cancelled => Ok(Self::Cancelled),
            TaskStatus::Open | TaskStatus::Processing => {
                Err(TaskDomainError::InvalidCompletionStatus(value))
            }
        }
    }
}

impl fmt::Display for CompletionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
