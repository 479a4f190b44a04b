// src/console/mod.rs

//! User-facing terminal output. Everything here returns a `String` so the
//! caller decides where it goes.

use crate::protocol::{ExecutionResult, Plan, PlanStep};
use crate::validation::plan::PlanValidationError;
use colored::Colorize;

pub fn render_banner() -> String {
    format!(
        "{}\nEnter your task in natural language. Type 'exit' to quit.\n",
        "AI Task Agent".blue().bold()
    )
}

pub fn render_generating() -> String {
    "Generating plan...".blue().bold().to_string()
}

pub fn render_plan(plan: &Plan) -> String {
    let mut out = format!("\n{}\n", "Proposed Plan:".green().bold());
    for (i, step) in plan.steps.iter().enumerate() {
        out.push_str(&render_plan_step(i + 1, step));
    }
    out
}

fn render_plan_step(number: usize, step: &PlanStep) -> String {
    let mut out = format!(
        "\n{}\nDescription: {}\nCommand: {}\n",
        format!("Step {number}:").bold(),
        step.description,
        step.command()
    );
    if let Some(validation) = &step.validation {
        out.push_str(&format!("Validation: {validation}\n"));
    }
    out
}

pub fn render_dry_run() -> String {
    "Dry run: no commands were executed.".yellow().to_string()
}

pub fn render_cancelled() -> String {
    "Task cancelled by user.".yellow().to_string()
}

pub fn render_step_start(number: usize, step: &PlanStep) -> String {
    format!(
        "\n{} {}",
        format!("Executing Step {number}:").bold(),
        step.description
    )
}

pub fn render_step_success(result: &ExecutionResult) -> String {
    let mut out = "✓ Step completed successfully".green().to_string();
    let output = result.stdout.trim();
    if !output.is_empty() {
        out.push_str(&format!("\nOutput: {output}"));
    }
    out
}

pub fn render_step_failure(result: &ExecutionResult) -> String {
    format!("✗ Step failed: {}", result.failure_reason())
        .red()
        .to_string()
}

/// Unsafe-plan message with the offending command and what to try instead.
pub fn render_unsafe(err: &PlanValidationError) -> String {
    let (message, hint) = err.hint();
    let mut out = format!("{} {}", "Error:".red().bold(), message.red());
    if let Some(hint) = hint {
        out.push_str(&format!("\n{} {}", "Hint:".yellow(), hint));
    }
    out
}

pub fn render_error(message: &str) -> String {
    format!("{} {}", "Error:".red().bold(), message.red())
}

pub fn render_completed() -> String {
    format!("\n{}", "Task completed successfully!".green().bold())
}

pub fn render_aborted() -> String {
    "Task aborted.".yellow().to_string()
}

pub fn render_goodbye() -> String {
    "Goodbye!".yellow().to_string()
}
