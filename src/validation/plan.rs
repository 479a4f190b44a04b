// src/validation/plan.rs

use crate::protocol::{Plan, PlanStep};
use crate::tools::translate::{CommandTranslator, is_skip_marker};
use thiserror::Error;
use tracing::{debug, warn};

/// Substrings that mark a command as catastrophic. Matched against the
/// lowercased command with whitespace runs collapsed to one space.
pub const DENY_LIST: &[&str] = &[
    "rm -rf /",
    "rm -fr /",
    "rm -rf ~",
    "mkfs",
    ":(){:|:&};:",
    ":(){ :|:& };:",
    "format c:",
    "dd if=/dev/zero of=/dev/sd",
    "> /dev/sda",
    "rd /s /q c:\\",
    "rmdir /s /q c:\\",
    "del /s /q c:\\",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanValidationError {
    #[error("unsafe command detected: {0}")]
    UnsafeCommand(String),

    #[error("no valid steps generated")]
    EmptyPlan,
}

impl PlanValidationError {
    pub fn hint(&self) -> (String, Option<String>) {
        match self {
            PlanValidationError::UnsafeCommand(command) => (
                "The plan contains a destructive command and was rejected.".to_string(),
                Some(format!("Rephrase the task so it does not require `{command}`.")),
            ),
            PlanValidationError::EmptyPlan => (
                "The model reply contained no step with a runnable command.".to_string(),
                None,
            ),
        }
    }
}

pub fn is_safe(command: &str) -> bool {
    let normalized = command
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    !DENY_LIST.iter().any(|pattern| normalized.contains(pattern))
}

/// Translates every command, rejects the plan if any command is unsafe and
/// drops steps that end up with nothing to run.
///
/// Both the command as the model wrote it and its translation are checked,
/// since translation can rewrite a deny-listed idiom into a form the list
/// does not spell out (`rm -rf /` becomes `rmdir /s /q \`).
pub fn finalize_plan(
    steps: Vec<PlanStep>,
    translator: &CommandTranslator,
) -> Result<Plan, PlanValidationError> {
    let mut accepted = Vec::with_capacity(steps.len());

    for step in steps {
        let Some(raw) = step.command.as_deref() else {
            debug!(description = %step.description, "dropping step without a command");
            continue;
        };
        if !is_safe(raw) {
            warn!(command = raw, "rejecting plan with unsafe command");
            return Err(PlanValidationError::UnsafeCommand(raw.to_string()));
        }

        let translated = translator.translate(raw);
        if !is_safe(&translated) {
            warn!(command = %translated, "rejecting plan with unsafe command");
            return Err(PlanValidationError::UnsafeCommand(translated));
        }
        if translated.is_empty() || is_skip_marker(&translated) {
            debug!(command = raw, "dropping step with no runnable command");
            continue;
        }

        accepted.push(PlanStep {
            command: Some(translated),
            ..step
        });
    }

    if accepted.is_empty() {
        return Err(PlanValidationError::EmptyPlan);
    }
    Ok(Plan { steps: accepted })
}
