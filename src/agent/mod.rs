// src/agent/mod.rs

use crate::console;
use crate::context::Context;
use crate::model::{RunOutcome, RunState, TaskRun};
use crate::protocol::Plan;
use crate::protocol::planner::{LLMPlanner, PlanError, Planner};
use crate::tools::{Executor, RunCommandTool};
use crate::validation::plan::PlanValidationError;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input};
use thiserror::Error;
use tracing::info;

const PROCEED_QUESTION: &str = "Do you want to proceed with this plan?";
const RETRY_QUESTION: &str = "Would you like to retry this task with modifications?";
const GUIDANCE_QUESTION: &str = "Please describe what went wrong and how to fix it";
const TASK_QUESTION: &str = "What would you like me to do?";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AgentError {
    #[error("terminal prompt failed: {0}")]
    Prompt(String),
}

impl From<dialoguer::Error> for AgentError {
    fn from(err: dialoguer::Error) -> Self {
        AgentError::Prompt(err.to_string())
    }
}

/// Questions the agent needs answered by the user.
pub trait Prompter {
    fn confirm(&mut self, question: &str) -> Result<bool, AgentError>;
    fn prompt_text(&mut self, question: &str) -> Result<String, AgentError>;
}

/// Interactive prompts on the controlling terminal.
pub struct DialoguerPrompter {
    theme: ColorfulTheme,
}

impl DialoguerPrompter {
    pub fn new() -> Self {
        Self {
            theme: ColorfulTheme::default(),
        }
    }
}

impl Default for DialoguerPrompter {
    fn default() -> Self {
        Self::new()
    }
}

impl Prompter for DialoguerPrompter {
    fn confirm(&mut self, question: &str) -> Result<bool, AgentError> {
        Ok(Confirm::with_theme(&self.theme)
            .with_prompt(question)
            .default(false)
            .interact()?)
    }

    fn prompt_text(&mut self, question: &str) -> Result<String, AgentError> {
        Ok(Input::<String>::with_theme(&self.theme)
            .with_prompt(question)
            .allow_empty(true)
            .interact_text()?)
    }
}

/// What the user chose after a rejected plan or a failed step.
enum RetryChoice {
    Restart(String),
    Abort,
}

/// Plans a task, asks for confirmation and runs the steps one by one.
pub struct TaskAgent<P: Planner, E: Executor, U: Prompter> {
    planner: P,
    executor: E,
    prompter: U,
    dry_run: bool,
    last_run: Option<TaskRun>,
}

impl TaskAgent<LLMPlanner, RunCommandTool, DialoguerPrompter> {
    pub fn from_context(context: &Context) -> Self {
        let agent = Self::new(
            LLMPlanner::from_context(context),
            RunCommandTool::from_context(context),
            DialoguerPrompter::new(),
        );
        if context.dry_run {
            agent.enable_dry_run()
        } else {
            agent
        }
    }
}

impl<P: Planner, E: Executor, U: Prompter> TaskAgent<P, E, U> {
    pub fn new(planner: P, executor: E, prompter: U) -> Self {
        Self {
            planner,
            executor,
            prompter,
            dry_run: false,
            last_run: None,
        }
    }

    pub fn enable_dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    /// Reads tasks until the user types `exit`, `quit` or `q`.
    pub fn run_interactive(&mut self) -> Result<(), AgentError> {
        println!("{}", console::render_banner());
        loop {
            let input = self.prompter.prompt_text(TASK_QUESTION)?;
            let task = input.trim();

            if matches!(task.to_lowercase().as_str(), "exit" | "quit" | "q") {
                println!("{}", console::render_goodbye());
                return Ok(());
            }
            if !task.is_empty() {
                let outcome = self.run_task(task)?;
                info!(?outcome, "task finished");
            }
            println!();
        }
    }

    /// The most recent run, including how many attempts it took.
    pub fn last_run(&self) -> Option<&TaskRun> {
        self.last_run.as_ref()
    }

    pub fn run_task(&mut self, task: &str) -> Result<RunOutcome, AgentError> {
        let mut run = TaskRun::new(task);
        let outcome = self.drive(&mut run)?;
        info!(
            ?outcome,
            terminal = run.state.is_terminal(),
            summary = %run.summary(),
            "run finished"
        );
        self.last_run = Some(run);
        Ok(outcome)
    }

    fn drive(&mut self, run: &mut TaskRun) -> Result<RunOutcome, AgentError> {
        'planning: loop {
            info!(task = %run.task, attempt = run.attempt, "planning task");
            println!("{}", console::render_generating());

            let plan = match self.planner.generate_plan(&run.task) {
                Ok(plan) => plan,
                Err(err) => {
                    let rendered = match err {
                        PlanError::UnsafeCommand(command) => console::render_unsafe(
                            &PlanValidationError::UnsafeCommand(command),
                        ),
                        other => console::render_error(&other.to_string()),
                    };
                    println!("{rendered}");
                    run.transition(RunState::AwaitingRetryChoice { step: 0 });
                    match self.retry_choice(&run.task)? {
                        RetryChoice::Restart(task) => {
                            run.restart(&task);
                            continue 'planning;
                        }
                        RetryChoice::Abort => return Ok(self.abort(run)),
                    }
                }
            };

            println!("{}", console::render_plan(&plan));
            if self.dry_run {
                println!("{}", console::render_dry_run());
                return Ok(RunOutcome::DryRun);
            }

            run.transition(RunState::AwaitingConfirmation);
            if !self.prompter.confirm(PROCEED_QUESTION)? {
                run.transition(RunState::Cancelled);
                println!("{}", console::render_cancelled());
                return Ok(RunOutcome::Cancelled);
            }

            match self.execute_plan(run, &plan)? {
                Some(task) => run.restart(&task),
                None if run.state == RunState::Completed => return Ok(RunOutcome::Completed),
                None => return Ok(RunOutcome::Aborted),
            }
        }
    }

    /// Runs every step in order. Returns new task text when the user asks to
    /// retry after a failure.
    fn execute_plan(
        &mut self,
        run: &mut TaskRun,
        plan: &Plan,
    ) -> Result<Option<String>, AgentError> {
        for (index, step) in plan.steps.iter().enumerate() {
            let number = index + 1;
            run.transition(RunState::Executing { step: number });
            println!("{}", console::render_step_start(number, step));

            let result = self.executor.execute(step.command());
            if result.success {
                println!("{}", console::render_step_success(&result));
                continue;
            }

            println!("{}", console::render_step_failure(&result));
            run.transition(RunState::AwaitingRetryChoice { step: number });
            return match self.retry_choice(&run.task)? {
                RetryChoice::Restart(task) => Ok(Some(task)),
                RetryChoice::Abort => {
                    self.abort(run);
                    Ok(None)
                }
            };
        }

        run.transition(RunState::Completed);
        println!("{}", console::render_completed());
        Ok(None)
    }

    fn retry_choice(&mut self, current_task: &str) -> Result<RetryChoice, AgentError> {
        if !self.prompter.confirm(RETRY_QUESTION)? {
            return Ok(RetryChoice::Abort);
        }
        let guidance = self.prompter.prompt_text(GUIDANCE_QUESTION)?;
        let guidance = guidance.trim();
        // blank guidance retries the same task
        if guidance.is_empty() {
            Ok(RetryChoice::Restart(current_task.to_string()))
        } else {
            Ok(RetryChoice::Restart(guidance.to_string()))
        }
    }

    fn abort(&self, run: &mut TaskRun) -> RunOutcome {
        run.transition(RunState::Aborted);
        println!("{}", console::render_aborted());
        RunOutcome::Aborted
    }
}
