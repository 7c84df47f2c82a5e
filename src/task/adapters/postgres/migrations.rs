//! Embedded schema migrations.
//!
//! Applying them is a one-time setup step gated by configuration; no store
//! operation runs them implicitly. Applied versions are recorded in
//! `taskstore_schema_migrations`, and an advisory lock serializes concurrent
//! migrators.

use crate::task::ports::{TaskStoreError, TaskStoreResult};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sql_types::Text;

const MIGRATION_LOCK_KEY: i64 = 0x7461_736b_7374_6f72;

/// One forward schema change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Migration {
    /// Directory name under `migrations/`, used as the version key.
    pub version: &'static str,
    /// SQL applied when the version is pending.
    pub up: &'static str,
}

/// Migrations compiled into the binary from `migrations/`, oldest first.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "2026-03-02-000000_create_tasks",
        up: include_str!("../../../../migrations/2026-03-02-000000_create_tasks/up.sql"),
    },
    Migration {
        version: "2026-03-09-000000_structured_payloads",
        up: include_str!("../../../../migrations/2026-03-09-000000_structured_payloads/up.sql"),
    },
    Migration {
        version: "2026-03-16-000000_task_indexes",
        up: include_str!("../../../../migrations/2026-03-16-000000_task_indexes/up.sql"),
    },
];

#[derive(QueryableByName)]
struct VersionRow {
    #[diesel(sql_type = Text)]
    version: String,
}

/// Applies every pending migration in one transaction and returns how many
/// ran.
///
/// # Errors
///
/// Returns [`TaskStoreError::Persistence`] when a migration fails. Nothing
/// is applied in that case.
pub fn run_pending_migrations(connection: &mut PgConnection) -> TaskStoreResult<usize> {
    let count = connection
        .transaction(|tx| {
            diesel::sql_query("SELECT pg_advisory_xact_lock($1)")
                .bind::<diesel::sql_types::BigInt, _>(MIGRATION_LOCK_KEY)
                .execute(tx)?;
            tx.batch_execute(concat!(
                "CREATE TABLE IF NOT EXISTS taskstore_schema_migrations (",
                "version VARCHAR(255) PRIMARY KEY, ",
                "applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW())",
            ))?;
            let applied: Vec<String> =
                diesel::sql_query("SELECT version FROM taskstore_schema_migrations")
                    .load::<VersionRow>(tx)?
                    .into_iter()
                    .map(|row| row.version)
                    .collect();

            let mut count = 0_usize;
            for migration in MIGRATIONS
                .iter()
                .filter(|migration| !applied.iter().any(|version| version == migration.version))
            {
                tx.batch_execute(migration.up)?;
                diesel::sql_query("INSERT INTO taskstore_schema_migrations (version) VALUES ($1)")
                    .bind::<Text, _>(migration.version)
                    .execute(tx)?;
                tracing::debug!(version = migration.version, "applied migration");
                count = count.saturating_add(1);
            }
            Ok::<_, diesel::result::Error>(count)
        })
        .map_err(TaskStoreError::persistence)?;

    tracing::info!(count, "applied pending task store migrations");
    Ok(count)
}
