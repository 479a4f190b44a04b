// src/model/mod.rs

/// Where a task run currently is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Planning,
    AwaitingConfirmation,
    Cancelled,
    Executing { step: usize },
    AwaitingRetryChoice { step: usize },
    Completed,
    Aborted,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunState::Cancelled | RunState::Completed | RunState::Aborted
        )
    }
}

/// How a task run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Cancelled,
    Aborted,
    DryRun,
}

/// The task being worked on plus its progress. Retrying with new guidance
/// replaces the task text and starts planning again.
#[derive(Clone, Debug)]
pub struct TaskRun {
    pub task: String,
    pub state: RunState,
    pub attempt: u32,
}

impl TaskRun {
    pub fn new(task: &str) -> Self {
        Self {
            task: task.to_string(),
            state: RunState::Planning,
            attempt: 1,
        }
    }

    pub fn transition(&mut self, next: RunState) {
        tracing::debug!(from = ?self.state, to = ?next, attempt = self.attempt, "run state");
        self.state = next;
    }

    pub fn restart(&mut self, task: &str) {
        self.task = task.to_string();
        self.attempt += 1;
        self.transition(RunState::Planning);
    }

    pub fn summary(&self) -> String {
        format!(
            "Task: {}\nAttempt: {}\nState: {:?}",
            self.task, self.attempt, self.state
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restart_replaces_task_and_counts_attempts() {
        let mut run = TaskRun::new("make a folder");
        run.transition(RunState::Executing { step: 1 });
        run.transition(RunState::AwaitingRetryChoice { step: 1 });

        run.restart("make a folder called out");
        assert_eq!(run.task, "make a folder called out");
        assert_eq!(run.attempt, 2);
        assert_eq!(run.state, RunState::Planning);
        assert!(run.summary().contains("Attempt: 2"));
    }

    #[test]
    fn terminal_states() {
        assert!(RunState::Completed.is_terminal());
        assert!(RunState::Cancelled.is_terminal());
        assert!(RunState::Aborted.is_terminal());
        assert!(!RunState::Executing { step: 0 }.is_terminal());
        assert!(!RunState::Planning.is_terminal());
    }
}
