//! Worker that shells out to an external coding CLI.
//!
//! The agent's command template is split with shell quoting rules first and
//! each word is rendered afterwards, so a multi-line prompt substituted into
//! `{prompt}` stays a single argument. Available variables:
//!
//! | Variable | Value |
//! |---|---|
//! | `{prompt}` | the prompt text |
//! | `{prompt_file}` | path of the prompt written for this attempt |
//! | `{task_id}` / `{title}` | task identity |
//! | `{session_id}` | unique id of this invocation |
//! | `{workdir}` | the task's working directory |
//! | `{attempt}` | 1-based attempt number |

use super::report::parse_worker_report;
use super::{WorkOutcome, WorkRequest, Worker};
use crate::agent::Agent;
use crate::agent::prompt::{Vars, render_template};
use crate::error::ExecutionError;
use crate::runner::{
    CommandOutput, CommandRunner, CommandSpec, REPORT_MAX_CHARS, REPORT_MAX_LINES,
    truncate_output,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const PROBE_TIMEOUT: Duration = Duration::from_secs(15);

/// Runs the agent's command template through a [`CommandRunner`].
pub struct CommandWorker {
    runner: Arc<dyn CommandRunner>,
    /// Prompt files and stdout/stderr logs go under `<logs_dir>/<task_id>/`.
    logs_dir: PathBuf,
}

impl CommandWorker {
    pub fn new(runner: Arc<dyn CommandRunner>, logs_dir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            logs_dir: logs_dir.into(),
        }
    }

    fn task_logs_dir(&self, task_id: &str) -> PathBuf {
        self.logs_dir.join(task_id)
    }

    /// Render the agent's command for a request.
    pub fn render_command(
        &self,
        agent: &Agent,
        request: &WorkRequest,
        prompt_file: &Path,
    ) -> Result<CommandSpec, ExecutionError> {
        let setup = |message: String| ExecutionError::Setup {
            task: request.task_id.clone(),
            message,
        };

        let words = shell_words::split(&agent.command).map_err(|e| {
            setup(format!(
                "failed to parse command template of agent '{}': {}\n\
                 Fix: check for unmatched quotes in agents.yaml.",
                agent.id, e
            ))
        })?;

        let vars = request_vars(request, prompt_file);
        let rendered = words
            .iter()
            .map(|w| render_template(w, &vars))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| {
                setup(format!(
                    "command template of agent '{}' is invalid: {}\n\
                     Available variables: {}",
                    agent.id,
                    e,
                    vars.keys().map(String::as_str).collect::<Vec<_>>().join(", ")
                ))
            })?;

        CommandSpec::from_words(rendered)
            .map(|spec| spec.cwd(&request.workdir).envs(&agent.environment))
            .map_err(|e| setup(format!("agent '{}': {}", agent.id, e)))
    }
}

fn request_vars(request: &WorkRequest, prompt_file: &Path) -> Vars {
    let mut vars = Vars::new();
    vars.insert("prompt".to_string(), request.prompt.clone());
    vars.insert(
        "prompt_file".to_string(),
        prompt_file.display().to_string(),
    );
    vars.insert("task_id".to_string(), request.task_id.clone());
    vars.insert("title".to_string(), request.title.clone());
    vars.insert("session_id".to_string(), request.session_id.clone());
    vars.insert(
        "workdir".to_string(),
        request.workdir.display().to_string(),
    );
    vars.insert("attempt".to_string(), request.attempt.to_string());
    vars
}

fn write_file(task_id: &str, path: &Path, content: &str) -> Result<(), ExecutionError> {
    fs::write(path, content).map_err(|e| ExecutionError::Setup {
        task: task_id.to_string(),
        message: format!("failed to write '{}': {}", path.display(), e),
    })
}

fn create_dir(task_id: &str, dir: &Path) -> Result<(), ExecutionError> {
    fs::create_dir_all(dir).map_err(|e| ExecutionError::Setup {
        task: task_id.to_string(),
        message: format!("failed to create directory '{}': {}", dir.display(), e),
    })
}

impl Worker for CommandWorker {
    fn probe(&self, agent: &Agent) -> Result<(), ExecutionError> {
        let program = shell_words::split(&agent.command)
            .ok()
            .and_then(|words| words.into_iter().next())
            .filter(|p| !p.contains('{'))
            .ok_or_else(|| ExecutionError::Unavailable {
                tool: agent.command.clone(),
                reason: format!("agent '{}' has no runnable program in its command", agent.id),
            })?;

        let spec = CommandSpec::new(program.clone())
            .arg("--version")
            .timeout(PROBE_TIMEOUT)
            .envs(&agent.environment);
        let output = self.runner.run(&spec);

        if output.success {
            tracing::debug!(agent_id = %agent.id, tool = %program, "worker tool available");
            return Ok(());
        }
        Err(ExecutionError::Unavailable {
            tool: program,
            reason: output.failure_reason(),
        })
    }

    fn execute(
        &self,
        agent: &Agent,
        request: &WorkRequest,
        timeout: Duration,
    ) -> Result<WorkOutcome, ExecutionError> {
        let task_id = request.task_id.as_str();
        create_dir(task_id, &request.workdir)?;

        let logs_dir = self.task_logs_dir(task_id);
        create_dir(task_id, &logs_dir)?;

        let prompt_file = logs_dir.join(format!("prompt-{}.md", request.attempt));
        write_file(task_id, &prompt_file, &request.prompt)?;

        let spec = self
            .render_command(agent, request, &prompt_file)?
            .timeout(timeout);

        tracing::info!(
            task_id,
            agent_id = %agent.id,
            attempt = request.attempt,
            session_id = %request.session_id,
            program = %spec.program,
            "invoking worker"
        );
        let output = self.runner.run(&spec);

        let stdout_log = logs_dir.join(format!("stdout-{}.log", request.attempt));
        let stderr_log = logs_dir.join(format!("stderr-{}.log", request.attempt));
        write_file(task_id, &stdout_log, &output.stdout)?;
        write_file(task_id, &stderr_log, &output.stderr)?;

        check_output(task_id, &spec, &output, timeout)?;

        let report = parse_worker_report(&output.stdout);
        if report.is_failure() {
            return Err(ExecutionError::Worker {
                task: task_id.to_string(),
                message: format!("worker reported failure: {}", report.summary),
            });
        }

        Ok(WorkOutcome {
            report,
            duration: output.duration,
            stdout_log: Some(stdout_log),
            stderr_log: Some(stderr_log),
        })
    }
}

fn check_output(
    task_id: &str,
    spec: &CommandSpec,
    output: &CommandOutput,
    timeout: Duration,
) -> Result<(), ExecutionError> {
    if output.success {
        return Ok(());
    }
    if let Some(reason) = &output.spawn_error {
        return Err(ExecutionError::Unavailable {
            tool: spec.program.clone(),
            reason: reason.clone(),
        });
    }
    if output.timed_out {
        return Err(ExecutionError::Timeout {
            task: task_id.to_string(),
            seconds: timeout.as_secs(),
        });
    }

    let tail = truncate_output(&output.stderr, REPORT_MAX_LINES, REPORT_MAX_CHARS);
    let message = if tail.trim().is_empty() {
        output.failure_reason()
    } else {
        format!("{}\n{}", output.failure_reason(), tail)
    };
    Err(ExecutionError::Worker {
        task: task_id.to_string(),
        message,
    })
}
