//! Error types for task domain validation and parsing.

use super::TaskStatus;
use thiserror::Error;

/// Errors returned while constructing or converting domain task values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskDomainError {
    /// A completion was requested with a non-terminal status.
    #[error("invalid completion status '{0}', expected completed, failed or cancelled")]
    InvalidCompletionStatus(TaskStatus),
}

/// Error returned while parsing task statuses from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown task status: {0}")]
pub struct ParseTaskStatusError(pub String);

/// Error returned while parsing event types from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown task event type: {0}")]
pub struct ParseEventTypeError(pub String);
