//! The worker boundary.
//!
//! A [`Worker`] turns a [`WorkRequest`] (prompt, session id, working
//! directory) into files in that directory. The engine only sees the
//! [`WorkOutcome`] or an [`ExecutionError`]; what the worker produced is judged
//! afterwards by the verification pipeline.
//!
//! [`CommandWorker`] invokes an external coding CLI through the command
//! runner. Tests use scripted workers instead.

mod command;
mod report;

pub use command::CommandWorker;
pub use report::{WorkerReport, parse_worker_report};

use super::Agent;
use crate::error::ExecutionError;
use std::path::PathBuf;
use std::time::Duration;

/// One worker invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkRequest {
    pub task_id: String,
    pub title: String,
    /// Full prompt text, including the improvement instruction on retries.
    pub prompt: String,
    /// Unique per invocation.
    pub session_id: String,
    /// Directory the worker writes into; verification runs against it.
    pub workdir: PathBuf,
    /// 1-based attempt number.
    pub attempt: u32,
}

/// What a successful invocation reported.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkOutcome {
    pub report: WorkerReport,
    pub duration: Duration,
    /// Where the worker's stdout was written, if it was logged.
    pub stdout_log: Option<PathBuf>,
    pub stderr_log: Option<PathBuf>,
}

/// Executes tasks for an agent.
pub trait Worker: Send + Sync {
    /// Check that the agent's tool can run at all.
    fn probe(&self, agent: &Agent) -> Result<(), ExecutionError>;

    /// Run one attempt of a task. Blocks until the worker exits or `timeout`
    /// expires.
    fn execute(
        &self,
        agent: &Agent,
        request: &WorkRequest,
        timeout: Duration,
    ) -> Result<WorkOutcome, ExecutionError>;
}
