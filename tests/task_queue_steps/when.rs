//! When steps for task queue BDD scenarios.

use super::world::{TaskQueueWorld, run_async};
use eyre::WrapErr;
use rstest_bdd_macros::when;
use serde_json::json;
use std::time::Duration;
use taskstore::task::{domain::TaskStatus, services::StaleTaskReaper};

#[when("a worker claims a task")]
fn worker_claims(world: &mut TaskQueueWorld) -> Result<(), eyre::Report> {
    let claimed = run_async(world.service.claim_task()).wrap_err("claim task")?;
    eyre::ensure!(claimed.is_some(), "expected an open task to claim");
    Ok(())
}

#[when(r#"the worker completes the task as "{status}""#)]
fn worker_completes(world: &mut TaskQueueWorld, status: String) -> Result<(), eyre::Report> {
    let target = TaskStatus::try_from(status.as_str())
        .map_err(|err| eyre::eyre!("invalid status in scenario: {err}"))?;
    let id = world.task_id()?;
    let outcome = run_async(world.service.complete_task(
        id,
        target,
        json!({"message": "finished by scenario"}),
    ));
    world.last_result = Some(outcome.map(|_| ()));
    Ok(())
}

#[when("the worker sends a heartbeat")]
fn worker_heartbeats(world: &mut TaskQueueWorld) -> Result<(), eyre::Report> {
    let id = world.task_id()?;
    world.last_result = Some(run_async(world.service.heartbeat(id)));
    Ok(())
}

#[when("{seconds:u64} seconds pass")]
fn seconds_pass(world: &mut TaskQueueWorld, seconds: u64) -> Result<(), eyre::Report> {
    world.advance(Duration::from_secs(seconds))
}

#[when("the supervisor sweeps with a {seconds:u64} second timeout")]
fn supervisor_sweeps(world: &mut TaskQueueWorld, seconds: u64) -> Result<(), eyre::Report> {
    let reaper = StaleTaskReaper::new(world.service.clone());
    run_async(reaper.sweep(Duration::from_secs(seconds))).wrap_err("sweep stale tasks")?;
    Ok(())
}

#[when("the task is cancelled")]
fn task_is_cancelled(world: &mut TaskQueueWorld) -> Result<(), eyre::Report> {
    let id = world.task_id()?;
    let signal = run_async(world.service.cancel_task(id, json!({"reason": "scenario"})))
        .wrap_err("cancel task")?;
    eyre::ensure!(signal.is_some(), "expected a cancellation event");
    Ok(())
}
