//! In-memory integration tests for the event log.

use super::helpers::{StoreContext, claimed_task, context};
use rstest::rstest;
use serde_json::json;
use taskstore::task::{
    domain::{CompletionStatus, EventId, TaskEventType, TaskId},
    ports::{TaskStore, TaskStoreError},
};

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn event_ids_increase_in_append_order(context: StoreContext) {
    let id = claimed_task(&context.store).await;
    let mut ids = Vec::new();
    for line in 0..4 {
        ids.push(
            context
                .store
                .emit_log_event(id, json!({"line": line}))
                .await
                .expect("log should succeed"),
        );
    }

    let events = context
        .store
        .list_events(id, None)
        .await
        .expect("events should load");

    let listed: Vec<EventId> = events.iter().map(|event| event.id).collect();
    assert_eq!(listed, ids);
    assert!(ids.windows(2).all(|pair| matches!(pair, [a, b] if a < b)));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn cursor_skips_earlier_logs_but_keeps_completion(context: StoreContext) {
    let id = claimed_task(&context.store).await;
    let mut cursor = None;
    for line in 0..3 {
        let event_id = context
            .store
            .emit_log_event(id, json!({"line": line}))
            .await
            .expect("log should succeed");
        cursor.get_or_insert(event_id);
    }
    context
        .store
        .complete_task(id, CompletionStatus::Completed, json!({}))
        .await
        .expect("completion should succeed");
    let mut last = None;
    for line in 3..6 {
        last = Some(
            context
                .store
                .emit_log_event(id, json!({"line": line}))
                .await
                .expect("log should succeed"),
        );
    }

    let tail = context
        .store
        .list_events(id, last)
        .await
        .expect("events should load");
    let after_first = context
        .store
        .list_events(id, cursor)
        .await
        .expect("events should load");

    assert_eq!(tail.len(), 1);
    assert!(
        tail.iter()
            .all(|event| event.event_type == TaskEventType::Completion)
    );
    assert_eq!(after_first.len(), 6);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn events_are_scoped_to_their_task(context: StoreContext) {
    let first = claimed_task(&context.store).await;
    let second = claimed_task(&context.store).await;
    context
        .store
        .emit_log_event(first, json!({"line": "first"}))
        .await
        .expect("log should succeed");

    let events = context
        .store
        .list_events(second, None)
        .await
        .expect("events should load");

    assert!(events.is_empty());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn logging_against_missing_task_is_not_found(context: StoreContext) {
    let missing = TaskId::new();
    let result = context.store.emit_log_event(missing, json!({})).await;
    assert!(matches!(result, Err(TaskStoreError::NotFound(id)) if id == missing));
}
