//! Error types for taskgate.
//!
//! Uses thiserror for derive macros. The taxonomy follows how far a failure
//! is allowed to travel:
//!
//! - [`GraphError`] is fatal to project construction and aborts before any
//!   task executes.
//! - [`AssignmentError`] is recovered locally by the fallback agent.
//! - [`ExecutionError`] is recovered at the task level (the task fails, its
//!   siblings continue).
//! - [`VerificationError`] turns the offending step into a zero-score failure.
//!
//! [`TaskgateError`] is what crosses the CLI boundary and carries exit codes.

use crate::exit_codes;
use thiserror::Error;

/// Errors raised while building or mutating the task graph.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// A task references a dependency id that is not in the graph.
    #[error("task '{task}' depends on unknown task '{dependency}'")]
    InvalidDependency { task: String, dependency: String },

    /// The same task id was inserted twice.
    #[error("duplicate task id '{0}'")]
    DuplicateTask(String),

    /// A task id cannot be used as a working directory name.
    #[error("invalid task id '{task}': {reason}")]
    InvalidTaskId { task: String, reason: String },

    /// The dependency edges form a cycle (listed in traversal order).
    #[error("dependency cycle detected: {}", .0.join(" -> "))]
    CycleDetected(Vec<String>),

    /// An operation referenced a task id that does not exist.
    #[error("unknown task '{0}'")]
    UnknownTask(String),
}

/// Errors raised while matching tasks to agents.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssignmentError {
    /// No pooled agent shares a single skill with the task.
    #[error("no agent covers any skill required by task '{task}' (required: {})", .required.join(", "))]
    NoEligibleAgent { task: String, required: Vec<String> },
}

/// Errors raised while invoking the external worker for a task.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    /// The worker ran but reported failure.
    #[error("worker failed for task '{task}': {message}")]
    Worker { task: String, message: String },

    /// The worker exceeded its timeout and was killed.
    #[error("worker timed out for task '{task}' after {seconds}s")]
    Timeout { task: String, seconds: u64 },

    /// The worker tool is not installed or not reachable.
    #[error("worker tool '{tool}' is unavailable: {reason}")]
    Unavailable { tool: String, reason: String },

    /// The task could not be prepared (working directory, prompt file, template).
    #[error("failed to prepare task '{task}': {message}")]
    Setup { task: String, message: String },
}

/// Errors raised by a verification step itself (not by the project under test).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    /// Reading the project tree failed.
    #[error("I/O error in step '{step}': {message}")]
    Io { step: String, message: String },

    /// A configured command could not be parsed.
    #[error("invalid command in step '{step}': {message}")]
    Command { step: String, message: String },

    /// A configured pattern could not be compiled.
    #[error("invalid pattern '{pattern}': {message}")]
    Pattern { pattern: String, message: String },
}

/// Top-level error for taskgate operations.
#[derive(Error, Debug)]
pub enum TaskgateError {
    /// User provided invalid arguments or input files.
    #[error("{0}")]
    UserError(String),

    /// The task graph could not be built.
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    /// A project id was not found in the orchestrator's store.
    #[error("unknown project '{0}'")]
    UnknownProject(String),

    /// A standalone verification run failed.
    #[error("Verification failed: {0}")]
    VerificationFailed(String),

    /// A run finished without completing every task.
    #[error("project '{project}' is incomplete: {detail}")]
    Incomplete { project: String, detail: String },
}

impl TaskgateError {
    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            TaskgateError::UserError(_) => exit_codes::USER_ERROR,
            TaskgateError::UnknownProject(_) => exit_codes::USER_ERROR,
            TaskgateError::Graph(_) => exit_codes::GRAPH_FAILURE,
            TaskgateError::VerificationFailed(_) => exit_codes::VERIFICATION_FAILURE,
            TaskgateError::Incomplete { .. } => exit_codes::INCOMPLETE,
        }
    }
}

/// Result type alias for taskgate operations.
pub type Result<T> = std::result::Result<T, TaskgateError>;
