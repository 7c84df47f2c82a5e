//! Shared test helpers for `PostgreSQL` integration tests.

use crate::test_helpers::ManualClock;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool};
use eyre::WrapErr;
use serde_json::json;
use std::sync::Arc;
use taskstore::task::{
    adapters::postgres::{PostgresTaskStore, StoreClock, TaskPgPool, run_pending_migrations},
    domain::{NewTask, TaskId},
    ports::TaskStore,
};
use uuid::Uuid;

/// Environment variable naming the test database.
pub const TEST_DATABASE_URL_KEY: &str = "TASKSTORE_TEST_DATABASE_URL";

/// Pins every pooled connection to one schema.
#[derive(Debug)]
struct SearchPath(String);

impl CustomizeConnection<PgConnection, diesel::r2d2::Error> for SearchPath {
    fn on_acquire(&self, connection: &mut PgConnection) -> Result<(), diesel::r2d2::Error> {
        connection
            .batch_execute(&format!("SET search_path TO {}", self.0))
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Isolated schema plus stores over it. The schema is dropped on drop.
pub struct PgContext {
    pub clock: Arc<ManualClock>,
    pub store: PostgresTaskStore,
    pool: TaskPgPool,
    schema: String,
}

impl PgContext {
    /// Returns a store over the same schema that reads the server clock.
    pub fn server_clock_store(&self) -> PostgresTaskStore {
        PostgresTaskStore::new(self.pool.clone())
    }

    /// Returns the pool bound to the test schema.
    pub const fn pool(&self) -> &TaskPgPool {
        &self.pool
    }
}

impl Drop for PgContext {
    fn drop(&mut self) {
        if let Ok(mut connection) = self.pool.get() {
            let dropped =
                connection.batch_execute(&format!("DROP SCHEMA IF EXISTS {} CASCADE", self.schema));
            debug_assert!(dropped.is_ok(), "failed to drop test schema {}", self.schema);
        }
    }
}

/// Builds a migrated, isolated store, or `None` when no test database is
/// configured.
///
/// # Errors
///
/// Returns an error if the database is configured but unreachable or the
/// migrations fail.
pub async fn pg_context() -> eyre::Result<Option<PgContext>> {
    isolated_context(true).await
}

/// Builds an isolated context whose schema is still empty, or `None` when no
/// test database is configured.
///
/// # Errors
///
/// Returns an error if the database is configured but unreachable.
pub async fn pg_empty_context() -> eyre::Result<Option<PgContext>> {
    isolated_context(false).await
}

async fn isolated_context(migrate: bool) -> eyre::Result<Option<PgContext>> {
    let Ok(url) = std::env::var(TEST_DATABASE_URL_KEY) else {
        return Ok(None);
    };
    let context = tokio::task::spawn_blocking(move || build_context(&url, migrate))
        .await
        .wrap_err("join schema setup")??;
    Ok(Some(context))
}

fn build_context(url: &str, migrate: bool) -> eyre::Result<PgContext> {
    let schema = format!("taskstore_test_{}", Uuid::new_v4().simple());
    let mut admin = PgConnection::establish(url).wrap_err("connect to test database")?;
    admin
        .batch_execute(&format!("CREATE SCHEMA {schema}"))
        .wrap_err("create test schema")?;

    let pool = Pool::builder()
        .max_size(8)
        .connection_customizer(Box::new(SearchPath(schema.clone())))
        .build(ConnectionManager::<PgConnection>::new(url))
        .wrap_err("build test pool")?;
    if migrate {
        let mut connection = pool.get().wrap_err("acquire migration connection")?;
        run_pending_migrations(&mut connection).wrap_err("apply migrations")?;
    }

    let clock = Arc::new(ManualClock::new());
    let store = PostgresTaskStore::with_clock(
        pool.clone(),
        StoreClock::Application(clock.clone()),
    );
    Ok(PgContext {
        clock,
        store,
        pool,
        schema,
    })
}

/// Runs raw SQL against the test schema.
///
/// # Errors
///
/// Returns an error if no connection is available or the SQL fails.
pub async fn execute_sql(pool: &TaskPgPool, sql: &'static str) -> eyre::Result<()> {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let mut connection = pool.get().wrap_err("acquire connection")?;
        connection.batch_execute(sql).wrap_err("execute sql")
    })
    .await
    .wrap_err("join sql execution")?
}

/// Creates a task and claims it, returning its id.
///
/// # Errors
///
/// Returns an error if creation or claiming fails.
pub async fn claimed_task(store: &PostgresTaskStore) -> eyre::Result<TaskId> {
    let id = store
        .create_task(&NewTask::new(json!({"kind": "test"})))
        .await
        .wrap_err("create task")?;
    let claimed = store
        .claim_task()
        .await
        .wrap_err("claim task")?
        .ok_or_else(|| eyre::eyre!("expected an open task"))?;
    eyre::ensure!(claimed.id() == id, "claimed an unexpected task");
    Ok(id)
}
