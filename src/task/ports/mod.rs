//! Port contracts for the task queue.
//!
//! Ports define infrastructure-agnostic interfaces used by task services.

pub mod store;

pub use store::{CompletionOutcome, TaskStore, TaskStoreError, TaskStoreResult};
