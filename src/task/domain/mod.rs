//! Domain model for the durable task queue.
//!
//! Tasks carry an opaque specification, a lifecycle status and a liveness
//! timestamp. Progress is recorded in an append-only event log. Nothing in
//! this module touches storage; adapters translate between these values and
//! their persisted shape.

mod error;
mod event;
mod history;
mod ids;
mod status;
mod task;

pub use error::{ParseEventTypeError, ParseTaskStatusError, TaskDomainError};
pub use event::{StepStatus, StepUpdate, TaskEvent, TaskEventType};
pub use history::{StepProgress, TaskHistory};
pub use ids::{EventId, TaskId};
pub use status::{CompletionStatus, TaskStatus};
pub use task::{NewTask, PersistedTaskData, Task, TaskFilter};
