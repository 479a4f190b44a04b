// src/tools/mod.rs

use crate::protocol::ExecutionResult;

pub mod llm;
pub mod run_command;
pub mod script;
pub mod translate;

pub use llm::LLMClient;
pub use run_command::RunCommandTool;
pub use script::ScriptGenerator;
pub use translate::CommandTranslator;

/// Trait for anything that can run a plan step's command.
pub trait Executor {
    fn execute(&self, command: &str) -> ExecutionResult;
}
