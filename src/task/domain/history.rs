//! Read-side reconstruction of a task's event log.

use super::{StepStatus, TaskEvent, TaskEventType};

/// Progress of a single step as observed in the event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepProgress {
    latest: StepStatus,
    reached_terminal: bool,
}

impl StepProgress {
    /// Returns the most recently reported status.
    #[must_use]
    pub const fn latest(self) -> StepStatus {
        self.latest
    }

    /// Returns `true` when the step ever reported `completed` or `failed`.
    #[must_use]
    pub const fn reached_terminal(self) -> bool {
        self.reached_terminal
    }
}

/// Summary of a task's events, folded in sequence order.
///
/// The store does not enforce a single completion event, so the earliest one
/// is authoritative and later ones are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskHistory {
    steps: Vec<(String, StepProgress)>,
    completion: Option<TaskEvent>,
    cancellation_requested: bool,
}

impl TaskHistory {
    /// Folds `events` in ascending sequence order.
    #[must_use]
    pub fn from_events(events: &[TaskEvent]) -> Self {
        let mut ordered: Vec<&TaskEvent> = events.iter().collect();
        ordered.sort_by_key(|event| event.id);

        let mut history = Self::default();
        for event in ordered {
            history.apply(event);
        }
        history
    }

    fn apply(&mut self, event: &TaskEvent) {
        match event.event_type {
            TaskEventType::Completion => {
                if self.completion.is_none() {
                    self.completion = Some(event.clone());
                }
            }
            TaskEventType::Cancelled => self.cancellation_requested = true,
            TaskEventType::Log => {
                if let Some(update) = event.step_update() {
                    self.record_step(update.step_id, update.status);
                }
            }
        }
    }

    fn record_step(&mut self, step_id: String, status: StepStatus) {
        if let Some((_, progress)) = self.steps.iter_mut().find(|(id, _)| *id == step_id) {
            progress.latest = status;
            progress.reached_terminal |= status.is_terminal();
            return;
        }
        self.steps.push((
            step_id,
            StepProgress {
                latest: status,
                reached_terminal: status.is_terminal(),
            },
        ));
    }

    /// Returns the authoritative completion event.
    #[must_use]
    pub const fn completion(&self) -> Option<&TaskEvent> {
        self.completion.as_ref()
    }

    /// Returns `true` when a cancellation signal was recorded.
    #[must_use]
    pub const fn cancellation_requested(&self) -> bool {
        self.cancellation_requested
    }

    /// Returns the progress of `step_id`, if it was ever reported.
    #[must_use]
    pub fn step(&self, step_id: &str) -> Option<StepProgress> {
        self.steps
            .iter()
            .find(|(id, _)| id == step_id)
            .map(|(_, progress)| *progress)
    }

    /// Iterates over reported steps in first-seen order.
    pub fn steps(&self) -> impl Iterator<Item = (&str, StepProgress)> {
        self.steps.iter().map(|(id, progress)| (id.as_str(), *progress))
    }

    /// Returns steps that started but never reached a terminal status,
    /// in first-seen order.
    #[must_use]
    pub fn unfinished_steps(&self) -> Vec<&str> {
        self.steps()
            .filter(|(_, progress)| {
                progress.latest == StepStatus::Processing && !progress.reached_terminal
            })
            .map(|(id, _)| id)
            .collect()
    }
}
