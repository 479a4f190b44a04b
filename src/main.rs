use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use taskpilot::agent::TaskAgent;
use taskpilot::context::{Context, TargetShell};
use taskpilot::tools::ScriptGenerator;
use tracing_subscriber::EnvFilter;

/// Turns plain-language tasks into shell command plans and runs them
#[derive(Parser, Debug)]
#[command(name = "taskpilot", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Show the generated plan without running anything
    #[arg(long, global = true)]
    dry_run: bool,

    /// Shell dialect commands are written for (defaults to the host)
    #[arg(long, value_enum, global = true)]
    target: Option<Target>,

    /// Inference endpoint for the primary model
    #[arg(long, value_name = "URL", global = true)]
    model_url: Option<String>,

    /// Inference endpoint used when the primary model is unavailable
    #[arg(long, value_name = "URL", global = true)]
    fallback_url: Option<String>,

    /// Model request timeout in seconds
    #[arg(long, value_name = "SECS", global = true)]
    request_timeout: Option<u64>,

    /// Per-command timeout in seconds
    #[arg(long, value_name = "SECS", global = true)]
    exec_timeout: Option<u64>,

    /// Log more (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Plan and run a single task, then exit
    Run {
        #[arg(required = true)]
        task: Vec<String>,
    },

    /// Write a Python script for a task
    Script {
        #[arg(required = true)]
        task: Vec<String>,

        /// Output file (defaults to a name taken from the task, else script.py)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Target {
    Windows,
    Posix,
}

impl From<Target> for TargetShell {
    fn from(target: Target) -> Self {
        match target {
            Target::Windows => TargetShell::Windows,
            Target::Posix => TargetShell::Posix,
        }
    }
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err}", "Error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn build_context(cli: &Cli) -> Result<Context, Box<dyn Error>> {
    let mut context = Context::from_env()?;

    if let Some(url) = &cli.model_url {
        context = context.with_model_url(url);
    }
    if let Some(url) = &cli.fallback_url {
        context = context.with_fallback_url(url);
    }
    if let Some(secs) = cli.request_timeout {
        context = context.with_request_timeout(Duration::from_secs(secs));
    }
    if let Some(secs) = cli.exec_timeout {
        context = context.with_exec_timeout(Duration::from_secs(secs));
    }
    if let Some(target) = cli.target {
        context = context.with_target(target.into());
    }
    if cli.dry_run {
        context = context.enable_dry_run();
    }
    Ok(context)
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let context = build_context(&cli)?;

    match cli.command {
        None => TaskAgent::from_context(&context).run_interactive()?,
        Some(Commands::Run { task }) => {
            let outcome = TaskAgent::from_context(&context).run_task(&task.join(" "))?;
            tracing::info!(?outcome, "task finished");
        }
        Some(Commands::Script { task, output }) => {
            let generator = ScriptGenerator::from_context(&context);
            let path = generator.create_script_file(&task.join(" "), output.as_deref())?;
            println!("{} {}", "Script written to".green(), path.display());
        }
    }
    Ok(())
}
