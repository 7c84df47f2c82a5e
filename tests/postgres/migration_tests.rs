//! `PostgreSQL` integration tests for embedded migrations.

use super::helpers::{pg_context, pg_empty_context};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sql_types::Text;
use rstest::rstest;
use taskstore::task::adapters::postgres::{MIGRATIONS, run_pending_migrations};
use uuid::Uuid;

#[derive(QueryableByName)]
struct ColumnType {
    #[diesel(sql_type = Text)]
    data_type: String,
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn migrations_are_idempotent() -> eyre::Result<()> {
    let Some(context) = pg_context().await? else {
        return Ok(());
    };
    let pool = context.pool().clone();

    let applied = tokio::task::spawn_blocking(move || {
        let mut connection = pool.get()?;
        let count = run_pending_migrations(&mut connection)?;
        Ok::<_, eyre::Report>(count)
    })
    .await??;

    assert_eq!(applied, 0);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn payload_columns_are_jsonb() -> eyre::Result<()> {
    let Some(context) = pg_context().await? else {
        return Ok(());
    };
    let pool = context.pool().clone();

    let types = tokio::task::spawn_blocking(move || {
        let mut connection = pool.get()?;
        let rows = diesel::sql_query(concat!(
            "SELECT data_type::text AS data_type FROM information_schema.columns ",
            "WHERE table_schema = current_schema() ",
            "AND ((table_name = 'tasks' AND column_name IN ('spec', 'secrets')) ",
            "OR (table_name = 'task_events' AND column_name = 'body'))",
        ))
        .load::<ColumnType>(&mut connection)?;
        Ok::<_, eyre::Report>(rows)
    })
    .await??;

    assert_eq!(types.len(), 3);
    assert!(types.iter().all(|column| column.data_type == "jsonb"));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn payload_migration_aborts_on_invalid_json_text() -> eyre::Result<()> {
    let Some(context) = pg_empty_context().await? else {
        return Ok(());
    };
    let pool = context.pool().clone();

    let (outcome, spec_type) = tokio::task::spawn_blocking(move || {
        let mut connection = pool.get()?;
        let [create_tasks, structured_payloads, ..] = MIGRATIONS else {
            eyre::bail!("expected the table and payload migrations");
        };
        connection.batch_execute(create_tasks.up)?;
        diesel::sql_query("INSERT INTO tasks (id, spec) VALUES ($1, 'not json')")
            .bind::<diesel::sql_types::Uuid, _>(Uuid::new_v4())
            .execute(&mut connection)?;

        let outcome = connection.batch_execute(structured_payloads.up);
        let spec_type = diesel::sql_query(concat!(
            "SELECT data_type::text AS data_type FROM information_schema.columns ",
            "WHERE table_schema = current_schema() ",
            "AND table_name = 'tasks' AND column_name = 'spec'",
        ))
        .get_result::<ColumnType>(&mut connection)?;
        Ok::<_, eyre::Report>((outcome, spec_type.data_type))
    })
    .await??;

    assert!(outcome.is_err());
    assert_eq!(spec_type, "text");
    Ok(())
}
