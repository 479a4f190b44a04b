// src/protocol/mod.rs

use crate::context::TargetShell;

pub mod parser;
pub mod planner;

/// One unit of work in a plan.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlanStep {
    pub description: String,
    pub command: Option<String>,
    pub validation: Option<String>,
}

impl PlanStep {
    pub fn new(description: &str, command: &str) -> Self {
        Self {
            description: description.into(),
            command: Some(command.into()),
            validation: None,
        }
    }

    pub fn with_validation(mut self, validation: &str) -> Self {
        self.validation = Some(validation.into());
        self
    }

    pub fn command(&self) -> &str {
        self.command.as_deref().unwrap_or_default()
    }
}

/// Ordered steps; position is execution order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Plan {
    pub steps: Vec<PlanStep>,
}

impl Plan {
    /// The safe single-step plan used when no usable plan could be generated.
    pub fn fallback(target: TargetShell) -> Self {
        let command = match target {
            TargetShell::Windows => "cd",
            TargetShell::Posix => "pwd",
        };
        Plan {
            steps: vec![
                PlanStep::new("Show the current working directory", command)
                    .with_validation("The current directory path is printed"),
            ],
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Exit code reported when the process never produced a status of its own.
pub const INTERNAL_ERROR_EXIT: i32 = -1;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub timed_out: bool,
}

impl ExecutionResult {
    pub fn failure(message: &str) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: message.to_string(),
            exit_code: INTERNAL_ERROR_EXIT,
            timed_out: false,
        }
    }

    pub fn failure_reason(&self) -> &str {
        if self.stderr.trim().is_empty() {
            self.stdout.trim()
        } else {
            self.stderr.trim()
        }
    }
}
