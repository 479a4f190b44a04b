// src/protocol/planner.rs

use crate::context::{Context, TargetShell};
use crate::protocol::Plan;
use crate::protocol::parser::{extract_plan_text, parse_plan};
use crate::tools::llm::{ClientError, GenerationParams, LLMClient, ReqwestTransport, Transport};
use crate::tools::translate::CommandTranslator;
use crate::validation::plan::{PlanValidationError, finalize_plan};
use std::thread;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Planner errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("model request failed: {0}")]
    Model(#[from] ClientError),

    #[error("no valid steps generated")]
    EmptyPlan,

    #[error("unsafe command detected: {0}")]
    UnsafeCommand(String),
}

impl From<PlanValidationError> for PlanError {
    fn from(err: PlanValidationError) -> Self {
        match err {
            PlanValidationError::UnsafeCommand(command) => PlanError::UnsafeCommand(command),
            PlanValidationError::EmptyPlan => PlanError::EmptyPlan,
        }
    }
}

/// Trait for generating a Plan from a task description.
pub trait Planner {
    /// Returns a usable plan, or `PlanError::UnsafeCommand` when the model
    /// proposed something destructive. Other failures degrade to the
    /// fallback plan.
    fn generate_plan(&mut self, task: &str) -> Result<Plan, PlanError>;
}

/// Planner backed by a remote text-generation model.
pub struct LLMPlanner<T: Transport = ReqwestTransport> {
    llm: LLMClient<T>,
    translator: CommandTranslator,
}

impl LLMPlanner<ReqwestTransport> {
    pub fn from_context(context: &Context) -> Self {
        Self::new(LLMClient::from_context(context), context.target)
    }
}

impl<T: Transport> LLMPlanner<T> {
    pub fn new(llm: LLMClient<T>, target: TargetShell) -> Self {
        Self {
            llm,
            translator: CommandTranslator::new(target),
        }
    }

    pub fn llm(&self) -> &LLMClient<T> {
        &self.llm
    }

    /// Like `generate_plan` but reports every failure instead of degrading.
    pub fn try_generate_plan(&mut self, task: &str) -> Result<Plan, PlanError> {
        let prompt = build_prompt(task, self.translator.target());

        self.llm.ensure_ready();
        let raw = self.request_with_retry(&prompt)?;
        debug!(raw = %raw, "model reply");

        let steps = parse_plan(extract_plan_text(&raw));
        let plan = finalize_plan(steps, &self.translator)?;
        info!(steps = plan.len(), "plan generated");
        Ok(plan)
    }

    fn request_with_retry(&self, prompt: &str) -> Result<String, ClientError> {
        let policy = self.llm.policy();
        let mut attempt = 1;
        loop {
            match self.llm.generate(prompt, GenerationParams::plan()) {
                Err(ClientError::RateLimited) if attempt < policy.attempts => {
                    warn!(attempt, "rate limit reached, waiting before retrying");
                    thread::sleep(policy.rate_limit_delay);
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

impl<T: Transport> Planner for LLMPlanner<T> {
    fn generate_plan(&mut self, task: &str) -> Result<Plan, PlanError> {
        match self.try_generate_plan(task) {
            Ok(plan) => Ok(plan),
            Err(PlanError::UnsafeCommand(command)) => Err(PlanError::UnsafeCommand(command)),
            Err(err) => {
                warn!(error = %err, "plan generation failed, using fallback plan");
                Ok(Plan::fallback(self.translator.target()))
            }
        }
    }
}

pub fn build_prompt(task: &str, target: TargetShell) -> String {
    let (example_list, example_delete, hints) = match target {
        TargetShell::Windows => (
            "dir",
            "del file.txt",
            "- 'dir' to list files (not 'ls')\n\
             - 'del file.txt' to delete files (not 'rm')\n\
             - 'type nul > file.txt' to create empty files\n\
             - 'type file.txt' to view files (not 'cat')\n\
             - 'mkdir folder' to create directories\n\
             - 'cd folder' to change directories\n\
             Do not use Unix/Linux commands.",
        ),
        TargetShell::Posix => (
            "ls -la",
            "rm file.txt",
            "- 'ls' to list files\n\
             - 'rm file.txt' to delete files\n\
             - 'touch file.txt' to create empty files\n\
             - 'cat file.txt' to view files\n\
             - 'mkdir -p folder' to create directories\n\
             - 'cd folder' to change directories\n\
             Do not use Windows commands.",
        ),
    };

    format!(
        r#"<s>[INST] You are a computer task planning assistant. Create a step-by-step plan with shell commands for this task: {task}

Format each step exactly like this example:

Step 1:
Description: List the current directory contents
Command: {example_list}
Validation: Check if the expected files are listed

Step 2:
Description: Delete a file
Command: {example_delete}
Validation: Verify the file is deleted

Only use real, executable {shell} shell commands:
{hints} [/INST]</s>"#,
        shell = target.label(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::llm::RetryPolicy;
    use crate::tools::llm::testing::{ScriptedTransport, generated};

    const TWO_STEPS: &str = "Step 1:\nDescription: List files\nCommand: ls -la\nValidation: files shown\n\nStep 2:\nDescription: Show notes\nCommand: cat notes.txt\n";

    fn planner_with(
        transport: ScriptedTransport,
        target: TargetShell,
    ) -> LLMPlanner<ScriptedTransport> {
        let context = Context::new("hf_test")
            .with_model_url("http://primary")
            .with_fallback_url("http://fallback");
        let llm =
            LLMClient::with_transport(transport, &context).with_policy(RetryPolicy::immediate(3));
        LLMPlanner::new(llm, target)
    }

    #[test]
    fn prompt_embeds_task_and_template() {
        let prompt = build_prompt("clean the temp folder", TargetShell::Windows);
        assert!(prompt.contains("for this task: clean the temp folder"));
        assert!(prompt.contains("Step 1:\nDescription:"));
        assert!(prompt.contains("Command: dir"));
        assert!(prompt.contains("Windows shell commands"));

        let prompt = build_prompt("x", TargetShell::Posix);
        assert!(prompt.contains("Command: ls -la"));
    }

    #[test]
    fn generates_translated_plan() {
        let transport = ScriptedTransport::new()
            .reply(200, "[]")
            .reply(200, &generated(TWO_STEPS));
        let mut planner = planner_with(transport, TargetShell::Windows);

        let plan = planner.generate_plan("show my notes").unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.steps[0].command(), "dir");
        assert_eq!(plan.steps[0].validation.as_deref(), Some("files shown"));
        assert_eq!(plan.steps[1].command(), "type notes.txt");
    }

    #[test]
    fn unsafe_plan_is_reported_not_truncated() {
        let raw = "Description: List files\nCommand: ls\nDescription: Remove file\nCommand: rm -rf /";
        let transport = ScriptedTransport::new()
            .reply(200, "[]")
            .reply(200, &generated(raw));
        let mut planner = planner_with(transport, TargetShell::Windows);

        assert_eq!(
            planner.generate_plan("tidy up"),
            Err(PlanError::UnsafeCommand("rm -rf /".into()))
        );
    }

    #[test]
    fn format_of_system_drive_is_unsafe() {
        let raw = "Step 1:\nDescription: Wipe\nCommand: format c:";
        let transport = ScriptedTransport::new()
            .reply(200, "[]")
            .reply(200, &generated(raw));
        let mut planner = planner_with(transport, TargetShell::Windows);

        assert!(matches!(
            planner.generate_plan("wipe"),
            Err(PlanError::UnsafeCommand(_))
        ));
    }

    #[test]
    fn malformed_response_degrades_to_fallback() {
        let transport = ScriptedTransport::new()
            .reply(200, "[]")
            .reply(200, r#"{"error":"loading"}"#);
        let mut planner = planner_with(transport, TargetShell::Posix);

        assert_eq!(
            planner.generate_plan("anything"),
            Ok(Plan::fallback(TargetShell::Posix))
        );
    }

    #[test]
    fn empty_plan_degrades_to_fallback_but_is_visible_in_try() {
        let transport = ScriptedTransport::new()
            .reply(200, "[]")
            .reply(200, &generated("I cannot help with that."));
        let mut planner = planner_with(transport, TargetShell::Posix);
        assert_eq!(planner.try_generate_plan("x"), Err(PlanError::EmptyPlan));

        let transport = ScriptedTransport::new()
            .reply(200, "[]")
            .reply(200, &generated("Step 1:\nDescription: think\nCommand: n/a"));
        let mut planner = planner_with(transport, TargetShell::Posix);
        assert_eq!(planner.generate_plan("x"), Ok(Plan::fallback(TargetShell::Posix)));
    }

    #[test]
    fn rate_limited_generation_is_retried() {
        let transport = ScriptedTransport::new()
            .reply(200, "[]")
            .reply(429, "")
            .reply(200, &generated(TWO_STEPS));
        let mut planner = planner_with(transport, TargetShell::Posix);

        let plan = planner.try_generate_plan("x").unwrap();
        assert_eq!(plan.steps[0].command(), "ls -la");
    }

    #[test]
    fn exhausted_rate_limit_retries_fall_back() {
        let transport = ScriptedTransport::new()
            .reply(200, "[]")
            .reply(429, "")
            .reply(429, "")
            .reply(429, "");
        let mut planner = planner_with(transport, TargetShell::Posix);

        assert_eq!(
            planner.try_generate_plan("x"),
            Err(PlanError::Model(ClientError::RateLimited))
        );
    }

    #[test]
    fn unavailable_model_switches_to_fallback_endpoint() {
        let transport = ScriptedTransport::new()
            .reply(503, "")
            .reply(503, "")
            .reply(503, "")
            .reply(200, &generated(TWO_STEPS));
        let mut planner = planner_with(transport, TargetShell::Posix);

        let plan = planner.generate_plan("x").unwrap();
        assert_eq!(plan.len(), 2);
        assert!(planner.llm().using_fallback());
        assert_eq!(
            planner.llm().transport().urls().last().map(String::as_str),
            Some("http://fallback")
        );
    }
}
