//! In-memory integration tests for heartbeats and staleness.

use super::helpers::{StoreContext, claimed_task, context};
use rstest::rstest;
use serde_json::json;
use std::time::Duration;
use taskstore::task::{
    domain::{NewTask, TaskId},
    ports::{TaskStore, TaskStoreError},
};

const TIMEOUT: Duration = Duration::from_secs(30);

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn heartbeat_on_open_task_is_a_conflict(context: StoreContext) {
    let id = context
        .store
        .create_task(&NewTask::new(json!({})))
        .await
        .expect("task creation should succeed");

    let result = context.store.heartbeat(id).await;

    assert!(matches!(
        result,
        Err(TaskStoreError::Conflict { task_id, .. }) if task_id == id
    ));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn heartbeat_on_missing_task_is_a_conflict(context: StoreContext) {
    let result = context.store.heartbeat(TaskId::new()).await;
    assert!(matches!(result, Err(TaskStoreError::Conflict { .. })));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn heartbeat_refreshes_timestamp(context: StoreContext) {
    let id = claimed_task(&context.store).await;
    let before = context
        .store
        .get_task(id)
        .await
        .expect("task should exist")
        .last_heartbeat_at();
    context.clock.advance(Duration::from_secs(10));

    context.store.heartbeat(id).await.expect("heartbeat should succeed");

    let after = context
        .store
        .get_task(id)
        .await
        .expect("task should exist")
        .last_heartbeat_at();
    assert!(after > before);
}

#[rstest]
#[case(Duration::from_secs(31), true)]
#[case(Duration::from_secs(29), false)]
#[tokio::test(flavor = "multi_thread")]
async fn stale_listing_uses_heartbeat_age(
    context: StoreContext,
    #[case] elapsed: Duration,
    #[case] stale: bool,
) {
    let id = claimed_task(&context.store).await;
    context.clock.advance(elapsed);

    let found = context
        .store
        .list_stale_tasks(TIMEOUT)
        .await
        .expect("stale listing should succeed");

    assert_eq!(found.contains(&id), stale);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn open_tasks_are_never_stale(context: StoreContext) {
    context
        .store
        .create_task(&NewTask::new(json!({})))
        .await
        .expect("task creation should succeed");
    context.clock.advance(Duration::from_secs(3600));

    let found = context
        .store
        .list_stale_tasks(TIMEOUT)
        .await
        .expect("stale listing should succeed");

    assert!(found.is_empty());
}
