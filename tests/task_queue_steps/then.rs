//! Then steps for task queue BDD scenarios.

use super::world::{TaskQueueWorld, run_async};
use eyre::WrapErr;
use rstest_bdd_macros::then;
use taskstore::task::domain::{StepStatus, TaskEventType, TaskStatus};

#[then(r#"the task status is "{status}""#)]
fn task_status_is(world: &TaskQueueWorld, status: String) -> Result<(), eyre::Report> {
    let expected = TaskStatus::try_from(status.as_str())
        .map_err(|err| eyre::eyre!("invalid expected status in scenario: {err}"))?;
    let task = run_async(world.service.get_task(world.task_id()?)).wrap_err("load task")?;

    if task.status() != expected {
        return Err(eyre::eyre!(
            "expected status {expected}, found {}",
            task.status()
        ));
    }
    Ok(())
}

#[then("the operation fails with a conflict")]
fn operation_conflicts(world: &TaskQueueWorld) -> Result<(), eyre::Report> {
    let result = world
        .last_result
        .as_ref()
        .ok_or_else(|| eyre::eyre!("missing operation result"))?;

    match result {
        Err(err) if err.is_conflict() => Ok(()),
        other => Err(eyre::eyre!("expected a conflict, got {other:?}")),
    }
}

#[then("the task has {count:usize} completion event")]
fn completion_event_count(world: &TaskQueueWorld, count: usize) -> Result<(), eyre::Report> {
    let events =
        run_async(world.service.list_events(world.task_id()?, None)).wrap_err("load events")?;
    let completions = events
        .iter()
        .filter(|event| event.event_type == TaskEventType::Completion)
        .count();

    eyre::ensure!(
        completions == count,
        "expected {count} completion events, found {completions}"
    );
    Ok(())
}

#[then(r#"step "{step_id}" is "{status}""#)]
fn step_is(world: &TaskQueueWorld, step_id: String, status: String) -> Result<(), eyre::Report> {
    let history =
        run_async(world.service.history(world.task_id()?)).wrap_err("load task history")?;
    let latest = history
        .step(&step_id)
        .map(|progress| progress.latest())
        .ok_or_else(|| eyre::eyre!("step {step_id} was never reported"))?;

    let expected = match status.as_str() {
        "processing" => StepStatus::Processing,
        "completed" => StepStatus::Completed,
        "failed" => StepStatus::Failed,
        other => return Err(eyre::eyre!("unknown step status in scenario: {other}")),
    };
    eyre::ensure!(
        latest == expected,
        "expected step {step_id} to be {}, found {}",
        expected.as_str(),
        latest.as_str()
    );
    Ok(())
}
