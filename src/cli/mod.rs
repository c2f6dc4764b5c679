//! CLI argument parsing for taskgate.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

/// Taskgate: dependency-ordered task orchestration for agentic coding.
///
/// A task list becomes a dependency graph. Ready tasks are handed to worker
/// agents (external coding CLIs), and every result must pass a weighted
/// verification pipeline before the task counts as completed.
#[derive(Parser, Debug)]
#[command(name = "taskgate")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every command.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Increase log verbosity (-v for debug).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Path to taskgate.yaml (default: ./taskgate.yaml if present).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to agents.yaml.
    #[arg(long, global = true, default_value = "agents.yaml")]
    pub agents: PathBuf,
}

/// Available commands for taskgate.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Execute a task list (or resume a snapshot) until no task can progress.
    ///
    /// Exits non-zero when the project is not complete.
    Run(RunArgs),

    /// Show the dependency levels and agent assignments without running.
    Plan(PlanArgs),

    /// Run the verification pipeline against a directory.
    Verify(VerifyArgs),

    /// Show the board of a saved snapshot.
    Status(StatusArgs),

    /// Check that each configured agent's tool is installed.
    Probe(ProbeArgs),
}

/// Arguments for the `run` command.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Task list file (.yaml, .yml or .json).
    #[arg(required_unless_present = "resume")]
    pub tasks: Option<PathBuf>,

    /// Project name (default: the task list's `name`, else the file stem).
    #[arg(long)]
    pub name: Option<String>,

    /// Resume from a snapshot instead of a task list.
    #[arg(long, conflicts_with = "tasks")]
    pub resume: Option<PathBuf>,

    /// Blocked task ids to release before resuming (only with --resume).
    #[arg(long, value_delimiter = ',')]
    pub release: Vec<String>,

    /// Write a snapshot here after the run.
    #[arg(long)]
    pub snapshot: Option<PathBuf>,

    /// Append lifecycle events to this NDJSON file.
    #[arg(long)]
    pub events: Option<PathBuf>,

    /// Directory for worker prompt files and stdout/stderr logs.
    #[arg(long, default_value = ".taskgate/logs")]
    pub logs_dir: PathBuf,

    /// Print the run summary as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `plan` command.
#[derive(Parser, Debug)]
pub struct PlanArgs {
    /// Task list file (.yaml, .yml or .json).
    pub tasks: PathBuf,

    /// Print the plan as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `verify` command.
#[derive(Parser, Debug)]
pub struct VerifyArgs {
    /// Directory to verify.
    #[arg(default_value = ".")]
    pub dir: PathBuf,

    /// Also print the remediation plan when verification fails.
    #[arg(long)]
    pub plan: bool,

    /// Print the result as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `status` command.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Snapshot file written by `taskgate run --snapshot`.
    pub snapshot: PathBuf,

    /// Print the board as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `probe` command.
#[derive(Parser, Debug)]
pub struct ProbeArgs {
    /// Probe only this agent.
    #[arg(long)]
    pub agent: Option<String>,
}

impl Cli {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
