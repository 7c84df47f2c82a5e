//! `PostgreSQL` integration tests for the event log.

use super::helpers::{claimed_task, pg_context};
use rstest::rstest;
use serde_json::json;
use taskstore::task::{
    domain::{CompletionStatus, TaskEventType, TaskId},
    ports::{TaskStore, TaskStoreError},
};

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn cursor_keeps_completion_event() -> eyre::Result<()> {
    let Some(context) = pg_context().await? else {
        return Ok(());
    };
    let id = claimed_task(&context.store).await?;
    for line in 0..3 {
        context.store.emit_log_event(id, json!({"line": line})).await?;
    }
    context
        .store
        .complete_task(id, CompletionStatus::Completed, json!({"message": "ok"}))
        .await?;
    let mut last = None;
    for line in 3..5 {
        last = Some(context.store.emit_log_event(id, json!({"line": line})).await?);
    }

    let tail = context.store.list_events(id, last).await?;
    let everything = context.store.list_events(id, None).await?;

    assert_eq!(tail.len(), 1);
    assert!(
        tail.iter()
            .all(|event| event.event_type == TaskEventType::Completion)
    );
    assert_eq!(everything.len(), 6);
    assert!(everything.windows(2).all(|pair| matches!(pair, [a, b] if a.id < b.id)));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn structured_bodies_round_trip() -> eyre::Result<()> {
    let Some(context) = pg_context().await? else {
        return Ok(());
    };
    let id = claimed_task(&context.store).await?;
    let body = json!({"stepId": "fetch", "status": "processing", "nested": {"n": [1, 2]}});

    let event_id = context.store.emit_log_event(id, body.clone()).await?;
    let events = context.store.list_events(id, None).await?;

    let stored = events
        .iter()
        .find(|event| event.id == event_id)
        .ok_or_else(|| eyre::eyre!("event missing"))?;
    assert_eq!(stored.body, body);
    assert_eq!(stored.event_type, TaskEventType::Log);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn logging_against_missing_task_is_not_found() -> eyre::Result<()> {
    let Some(context) = pg_context().await? else {
        return Ok(());
    };
    let missing = TaskId::new();

    let result = context.store.emit_log_event(missing, json!({})).await;

    assert!(matches!(result, Err(TaskStoreError::NotFound(id)) if id == missing));
    Ok(())
}
