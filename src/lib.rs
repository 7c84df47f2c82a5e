//! Taskstore: a durable work queue with heartbeats and an event log.
//!
//! Producers enqueue tasks, workers claim them one at a time and keep the
//! claim alive with heartbeats, and a supervisor force-fails tasks whose
//! workers went quiet. Every step report, cancellation signal and final
//! outcome lands in an append-only per-task event log.
//!
//! # Architecture
//!
//! The crate follows hexagonal architecture principles:
//!
//! - **Domain**: Task, status and event types with no infrastructure
//!   dependencies
//! - **Ports**: The [`task::ports::TaskStore`] contract
//! - **Adapters**: `PostgreSQL` and in-memory stores
//! - **Services**: Queue orchestration and the stale-task reaper
//!
//! # Modules
//!
//! - [`config`]: Environment-driven store settings
//! - [`task`]: Task table, claim, liveness, completion and event log
//! - [`telemetry`]: Tracing subscriber setup

pub mod config;
pub mod task;
pub mod telemetry;
