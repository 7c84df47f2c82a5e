//! `PostgreSQL` task store.
//!
//! Claims and completions are a select followed by an update gated on the
//! status that was read. Under read-committed isolation a competing
//! transaction that already moved the row makes the gated update match zero
//! rows, so each transition has exactly one winner.

use super::{
    clock::StoreClock,
    migrations::run_pending_migrations,
    models::{EventIdRow, HeartbeatRow, TaskEventRow, TaskIdRow, TaskRow},
    schema::{task_events, tasks},
};
use crate::config::StoreConfig;
use crate::task::{
    domain::{
        CompletionStatus, EventId, NewTask, PersistedTaskData, Task, TaskEvent, TaskEventType,
        TaskFilter, TaskId, TaskStatus,
    },
    ports::{CompletionOutcome, TaskStore, TaskStoreError, TaskStoreResult},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sql_types::{BigInt, Jsonb, Nullable, Text, Timestamptz};
use serde_json::Value;
use std::time::Duration;

/// `PostgreSQL` connection pool type used by the task store.
pub type TaskPgPool = Pool<ConnectionManager<PgConnection>>;

/// `PostgreSQL`-backed task store.
#[derive(Debug, Clone)]
pub struct PostgresTaskStore {
    pool: TaskPgPool,
    clock: StoreClock,
}

impl PostgresTaskStore {
    /// Creates a store over an existing pool, using the server clock.
    #[must_use]
    pub fn new(pool: TaskPgPool) -> Self {
        Self::with_clock(pool, StoreClock::Server)
    }

    /// Creates a store over an existing pool with an explicit clock strategy.
    #[must_use]
    pub const fn with_clock(pool: TaskPgPool, clock: StoreClock) -> Self {
        Self { pool, clock }
    }

    /// Builds a pool from configuration and, when enabled, applies pending
    /// migrations before returning the store.
    ///
    /// This call blocks while the pool establishes its connections.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::Persistence`] when the pool cannot be built
    /// or a migration fails.
    pub fn connect(config: &StoreConfig) -> TaskStoreResult<Self> {
        let manager = ConnectionManager::<PgConnection>::new(config.database_url());
        let pool = Pool::builder()
            .max_size(config.pool_size())
            .build(manager)
            .map_err(TaskStoreError::persistence)?;

        if config.run_migrations() {
            let mut connection = pool.get().map_err(TaskStoreError::persistence)?;
            run_pending_migrations(&mut connection)?;
        }

        Ok(Self::with_clock(pool, config.store_clock()))
    }

    /// Returns a reference to the connection pool.
    #[must_use]
    pub const fn pool(&self) -> &TaskPgPool {
        &self.pool
    }

    async fn run_blocking<F, T>(&self, f: F) -> TaskStoreResult<T>
    where
        F: FnOnce(&mut PgConnection) -> TaskStoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(TaskStoreError::persistence)?;
            f(&mut connection)
        })
        .await
        .map_err(TaskStoreError::persistence)?
    }
}

/// Error type threaded through Diesel transactions.
#[derive(Debug)]
enum TransactionError {
    Store(TaskStoreError),
    Database(DieselError),
}

impl From<DieselError> for TransactionError {
    fn from(err: DieselError) -> Self {
        Self::Database(err)
    }
}

impl From<TaskStoreError> for TransactionError {
    fn from(err: TaskStoreError) -> Self {
        Self::Store(err)
    }
}

impl From<TransactionError> for TaskStoreError {
    fn from(err: TransactionError) -> Self {
        match err {
            TransactionError::Store(store_err) => store_err,
            TransactionError::Database(db_err) => Self::persistence(db_err),
        }
    }
}

fn in_transaction<T, F>(connection: &mut PgConnection, f: F) -> TaskStoreResult<T>
where
    F: FnOnce(&mut PgConnection) -> Result<T, TransactionError>,
{
    connection.transaction(f).map_err(TaskStoreError::from)
}

#[async_trait]
impl TaskStore for PostgresTaskStore {
    async fn create_task(&self, task: &NewTask) -> TaskStoreResult<TaskId> {
        let task_id = task.id();
        let spec = task.spec().clone();
        let secrets = task.secrets().cloned();
        let created_by = task.created_by().map(ToOwned::to_owned);
        let now = self.clock.bound_now();

        self.run_blocking(move |connection| {
            diesel::sql_query(concat!(
                "INSERT INTO tasks (id, spec, status, secrets, created_by, created_at) ",
                "VALUES ($1, $2, $3, $4, $5, COALESCE($6::timestamptz, NOW()))",
            ))
            .bind::<diesel::sql_types::Uuid, _>(task_id.into_inner())
            .bind::<Jsonb, _>(spec)
            .bind::<Text, _>(TaskStatus::Open.as_str())
            .bind::<Nullable<Jsonb>, _>(secrets)
            .bind::<Nullable<Text>, _>(created_by)
            .bind::<Nullable<Timestamptz>, _>(now)
            .execute(connection)
            .map_err(TaskStoreError::persistence)?;
            Ok(task_id)
        })
        .await
    }

    async fn get_task(&self, id: TaskId) -> TaskStoreResult<Task> {
        self.run_blocking(move |connection| {
            let row = tasks::table
                .filter(tasks::id.eq(id.into_inner()))
                .select(TaskRow::as_select())
                .first::<TaskRow>(connection)
                .optional()
                .map_err(TaskStoreError::persistence)?;
            row.map(row_to_task)
                .transpose()?
                .ok_or(TaskStoreError::NotFound(id))
        })
        .await
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> TaskStoreResult<Vec<Task>> {
        let created_by = filter.created_by().map(ToOwned::to_owned);
        let status = filter.status();
        let limit = filter
            .limit()
            .map(i64::try_from)
            .transpose()
            .map_err(TaskStoreError::persistence)?;

        self.run_blocking(move |connection| {
            let mut query = tasks::table
                .select(TaskRow::as_select())
                .order((tasks::created_at.desc(), tasks::id.desc()))
                .into_boxed();
            if let Some(creator) = created_by {
                query = query.filter(tasks::created_by.eq(creator));
            }
            if let Some(wanted) = status {
                query = query.filter(tasks::status.eq(wanted.as_str()));
            }
            if let Some(cap) = limit {
                query = query.limit(cap);
            }

            let rows = query
                .load::<TaskRow>(connection)
                .map_err(TaskStoreError::persistence)?;
            rows.into_iter()
                .map(|row| row_to_task(row).map(Task::redacted))
                .collect()
        })
        .await
    }

    async fn claim_task(&self) -> TaskStoreResult<Option<Task>> {
        let now = self.clock.bound_now();
        let claimed = self
            .run_blocking(move |connection| {
                in_transaction(connection, |tx| {
                    let Some(row) = tasks::table
                        .filter(tasks::status.eq(TaskStatus::Open.as_str()))
                        .order((tasks::created_at.asc(), tasks::id.asc()))
                        .select(TaskRow::as_select())
                        .first::<TaskRow>(tx)
                        .optional()?
                    else {
                        return Ok(None);
                    };

                    let stamped = diesel::sql_query(concat!(
                        "UPDATE tasks SET status = $1, ",
                        "last_heartbeat_at = COALESCE($2::timestamptz, NOW()), secrets = NULL ",
                        "WHERE id = $3 AND status = $4 ",
                        "RETURNING last_heartbeat_at",
                    ))
                    .bind::<Text, _>(TaskStatus::Processing.as_str())
                    .bind::<Nullable<Timestamptz>, _>(now)
                    .bind::<diesel::sql_types::Uuid, _>(row.id)
                    .bind::<Text, _>(TaskStatus::Open.as_str())
                    .get_result::<HeartbeatRow>(tx)
                    .optional()?;

                    let Some(HeartbeatRow { last_heartbeat_at }) = stamped else {
                        return Ok(None);
                    };
                    Ok(Some(claimed_task(row, last_heartbeat_at)?))
                })
            })
            .await?;

        match &claimed {
            Some(task) => tracing::debug!(task_id = %task.id(), "claimed task"),
            None => tracing::trace!("no open task claimed"),
        }
        Ok(claimed)
    }

    async fn heartbeat(&self, id: TaskId) -> TaskStoreResult<()> {
        let now = self.clock.bound_now();
        self.run_blocking(move |connection| {
            let updated = diesel::sql_query(concat!(
                "UPDATE tasks SET last_heartbeat_at = COALESCE($1::timestamptz, NOW()) ",
                "WHERE id = $2 AND status = $3",
            ))
            .bind::<Nullable<Timestamptz>, _>(now)
            .bind::<diesel::sql_types::Uuid, _>(id.into_inner())
            .bind::<Text, _>(TaskStatus::Processing.as_str())
            .execute(connection)
            .map_err(TaskStoreError::persistence)?;

            if updated == 0 {
                return Err(TaskStoreError::stale_heartbeat(id));
            }
            Ok(())
        })
        .await
    }

    async fn list_stale_tasks(&self, timeout: Duration) -> TaskStoreResult<Vec<TaskId>> {
        let now = self.clock.bound_now();
        let timeout_ms = i64::try_from(timeout.as_millis()).map_err(TaskStoreError::persistence)?;

        self.run_blocking(move |connection| {
            let rows = diesel::sql_query(concat!(
                "SELECT id FROM tasks WHERE status = $1 ",
                "AND last_heartbeat_at < COALESCE($2::timestamptz, NOW()) ",
                "- ($3::double precision * INTERVAL '1 millisecond')",
            ))
            .bind::<Text, _>(TaskStatus::Processing.as_str())
            .bind::<Nullable<Timestamptz>, _>(now)
            .bind::<BigInt, _>(timeout_ms)
            .load::<TaskIdRow>(connection)
            .map_err(TaskStoreError::persistence)?;
            Ok(rows
                .into_iter()
                .map(|row| TaskId::from_uuid(row.id))
                .collect())
        })
        .await
    }

    async fn complete_task(
        &self,
        id: TaskId,
        status: CompletionStatus,
        body: Value,
    ) -> TaskStoreResult<CompletionOutcome> {
        let now = self.clock.bound_now();
        self.run_blocking(move |connection| {
            in_transaction(connection, |tx| {
                let current = current_status(tx, id)?;
                if current == TaskStatus::Cancelled {
                    return Ok(CompletionOutcome::AlreadyCancelled);
                }
                if !current.can_transition_to(status.status()) {
                    return Err(TaskStoreError::unexpected_status(id, status, current).into());
                }

                let updated = diesel::update(
                    tasks::table
                        .filter(tasks::id.eq(id.into_inner()))
                        .filter(tasks::status.eq(status.expected_prior().as_str())),
                )
                .set(tasks::status.eq(status.as_str()))
                .execute(tx)?;
                if updated != 1 {
                    return Err(TaskStoreError::lost_update(id, status).into());
                }

                insert_event(tx, id, TaskEventType::Completion, body, now)?;
                Ok(CompletionOutcome::Recorded)
            })
        })
        .await
    }

    async fn cancel_task(&self, id: TaskId, body: Value) -> TaskStoreResult<Option<EventId>> {
        let now = self.clock.bound_now();
        self.run_blocking(move |connection| {
            in_transaction(connection, |tx| {
                if current_status(tx, id)?.is_terminal() {
                    return Ok(None);
                }
                let event_id = insert_event(tx, id, TaskEventType::Cancelled, body, now)?;
                Ok(Some(event_id))
            })
        })
        .await
    }

    async fn emit_log_event(&self, id: TaskId, body: Value) -> TaskStoreResult<EventId> {
        let now = self.clock.bound_now();
        self.run_blocking(move |connection| {
            insert_event(connection, id, TaskEventType::Log, body, now).map_err(|err| match err {
                DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _) => {
                    TaskStoreError::NotFound(id)
                }
                _ => TaskStoreError::persistence(err),
            })
        })
        .await
    }

    async fn list_events(
        &self,
        id: TaskId,
        after: Option<EventId>,
    ) -> TaskStoreResult<Vec<TaskEvent>> {
        self.run_blocking(move |connection| {
            let mut query = task_events::table
                .filter(task_events::task_id.eq(id.into_inner()))
                .order(task_events::id.asc())
                .select(TaskEventRow::as_select())
                .into_boxed();
            if let Some(cursor) = after {
                query = query.filter(
                    task_events::id
                        .gt(cursor.value())
                        .or(task_events::event_type.eq(TaskEventType::Completion.as_str())),
                );
            }

            let rows = query
                .load::<TaskEventRow>(connection)
                .map_err(TaskStoreError::persistence)?;
            rows.into_iter().map(row_to_event).collect()
        })
        .await
    }
}

/// Reads the status of `id` inside a transaction.
fn current_status(
    connection: &mut PgConnection,
    id: TaskId,
) -> Result<TaskStatus, TransactionError> {
    let stored = tasks::table
        .filter(tasks::id.eq(id.into_inner()))
        .select(tasks::status)
        .first::<String>(connection)
        .optional()?
        .ok_or(TaskStoreError::NotFound(id))?;
    TaskStatus::try_from(stored.as_str())
        .map_err(|err| TransactionError::Store(TaskStoreError::corruption(err)))
}

fn insert_event(
    connection: &mut PgConnection,
    id: TaskId,
    event_type: TaskEventType,
    body: Value,
    now: Option<DateTime<Utc>>,
) -> Result<EventId, DieselError> {
    let inserted = diesel::sql_query(concat!(
        "INSERT INTO task_events (task_id, event_type, body, created_at) ",
        "VALUES ($1, $2, $3, COALESCE($4::timestamptz, NOW())) ",
        "RETURNING id",
    ))
    .bind::<diesel::sql_types::Uuid, _>(id.into_inner())
    .bind::<Text, _>(event_type.as_str())
    .bind::<Jsonb, _>(body)
    .bind::<Nullable<Timestamptz>, _>(now)
    .get_result::<EventIdRow>(connection)?;
    Ok(EventId::new(inserted.id))
}

fn row_to_task(row: TaskRow) -> TaskStoreResult<Task> {
    Ok(Task::from_persisted(row_to_persisted(row)?))
}

fn row_to_persisted(row: TaskRow) -> TaskStoreResult<PersistedTaskData> {
    let TaskRow {
        id,
        spec,
        status: persisted_status,
        last_heartbeat_at,
        created_at,
        created_by,
        secrets,
    } = row;
    let status =
        TaskStatus::try_from(persisted_status.as_str()).map_err(TaskStoreError::corruption)?;

    Ok(PersistedTaskData {
        id: TaskId::from_uuid(id),
        spec,
        status,
        secrets,
        last_heartbeat_at,
        created_at,
        created_by,
    })
}

/// Builds the value handed to the claiming worker: the row as read before
/// the update, secrets included, with the new status and heartbeat.
fn claimed_task(row: TaskRow, last_heartbeat_at: DateTime<Utc>) -> TaskStoreResult<Task> {
    let data = row_to_persisted(row)?;
    Ok(Task::from_persisted(PersistedTaskData {
        status: TaskStatus::Processing,
        last_heartbeat_at: Some(last_heartbeat_at),
        ..data
    }))
}

fn row_to_event(row: TaskEventRow) -> TaskStoreResult<TaskEvent> {
    let event_type =
        TaskEventType::try_from(row.event_type.as_str()).map_err(TaskStoreError::corruption)?;
    Ok(TaskEvent {
        id: EventId::new(row.id),
        task_id: TaskId::from_uuid(row.task_id),
        event_type,
        body: row.body,
        created_at: row.created_at,
    })
}
