//! Application services composed over the task store port.

mod queue;
mod reaper;

pub use queue::{STALE_TASK_MESSAGE, ShutdownReport, TaskQueueError, TaskQueueResult, TaskQueueService};
pub use reaper::{StaleTaskReaper, SweepReport};
