//! Diesel row models for task persistence.

use super::schema::{task_events, tasks};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;

/// Query result row for task records.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = tasks)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TaskRow {
    /// Task identifier.
    pub id: uuid::Uuid,
    /// Task specification.
    pub spec: Value,
    /// Lifecycle status.
    pub status: String,
    /// Latest heartbeat.
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Creator identity.
    pub created_by: Option<String>,
    /// One-time secrets.
    pub secrets: Option<Value>,
}

/// Query result row for task events.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = task_events)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TaskEventRow {
    /// Sequence number.
    pub id: i64,
    /// Owning task.
    pub task_id: uuid::Uuid,
    /// Structured payload.
    pub body: Value,
    /// Event kind.
    pub event_type: String,
    /// Insertion timestamp.
    pub created_at: DateTime<Utc>,
}

/// Heartbeat stamp returned by the claim update.
#[derive(Debug, Clone, QueryableByName)]
pub struct HeartbeatRow {
    /// Timestamp written by the update.
    #[diesel(sql_type = diesel::sql_types::Timestamptz)]
    pub last_heartbeat_at: DateTime<Utc>,
}

/// Single task identifier column.
#[derive(Debug, Clone, QueryableByName)]
pub struct TaskIdRow {
    /// Task identifier.
    #[diesel(sql_type = diesel::sql_types::Uuid)]
    pub id: uuid::Uuid,
}

/// Sequence number assigned to an inserted event.
#[derive(Debug, Clone, QueryableByName)]
pub struct EventIdRow {
    /// Sequence number.
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    pub id: i64,
}
