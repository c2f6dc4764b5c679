use crate::agent::Agent;
use crate::agent::dispatch::{WorkOutcome, WorkRequest, Worker, WorkerReport};
use crate::error::ExecutionError;
use crate::runner::{CommandOutput, CommandRunner, CommandSpec};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

/// Write `(relative path, content)` pairs under `root`, creating directories.
pub(crate) fn write_files(root: &Path, files: &[(&str, &str)]) {
    for (rel, content) in files {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }
}

/// A [`CommandRunner`] that answers from a script instead of spawning processes.
///
/// Rules match when their needle is a substring of the command's display
/// line; the first matching rule wins.
pub(crate) struct ScriptedRunner {
    rules: Vec<(String, CommandOutput)>,
    fallback: CommandOutput,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    pub(crate) fn new() -> Self {
        Self {
            rules: Vec::new(),
            fallback: CommandOutput::ok(""),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn on(mut self, needle: &str, output: CommandOutput) -> Self {
        self.rules.push((needle.to_string(), output));
        self
    }

    /// Output for commands no rule matches (default: success, empty output).
    pub(crate) fn fallback(mut self, output: CommandOutput) -> Self {
        self.fallback = output;
        self
    }

    pub(crate) fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn call_lines(&self) -> Vec<String> {
        self.calls().iter().map(CommandSpec::display_line).collect()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, spec: &CommandSpec) -> CommandOutput {
        self.calls.lock().unwrap().push(spec.clone());
        let line = spec.display_line();
        self.rules
            .iter()
            .find(|(needle, _)| line.contains(needle.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_else(|| self.fallback.clone())
    }
}

/// One scripted worker attempt.
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeAttempt {
    files: Vec<(String, String)>,
    delay: Duration,
    error: Option<String>,
    panic: Option<String>,
}

impl FakeAttempt {
    /// Succeed after writing files into the request's working directory.
    pub(crate) fn writes(files: &[(&str, &str)]) -> Self {
        Self {
            files: files
                .iter()
                .map(|(p, c)| (p.to_string(), c.to_string()))
                .collect(),
            ..Default::default()
        }
    }

    /// Fail with a worker error.
    pub(crate) fn error(message: &str) -> Self {
        Self {
            error: Some(message.to_string()),
            ..Default::default()
        }
    }

    /// Panic inside `Worker::execute`.
    pub(crate) fn panics(message: &str) -> Self {
        Self {
            panic: Some(message.to_string()),
            ..Default::default()
        }
    }

    pub(crate) fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// A recorded worker invocation.
#[derive(Debug, Clone)]
pub(crate) struct FakeCall {
    pub(crate) task_id: String,
    pub(crate) agent_id: String,
    pub(crate) attempt: u32,
    pub(crate) prompt: String,
}

/// A [`Worker`] whose attempts are scripted per task.
///
/// Each task's queue is consumed one attempt per call; once it is empty the
/// default attempt is used.
pub(crate) struct FakeWorker {
    scripts: Mutex<HashMap<String, VecDeque<FakeAttempt>>>,
    default: FakeAttempt,
    unavailable: Vec<String>,
    calls: Mutex<Vec<FakeCall>>,
}

impl FakeWorker {
    /// Every attempt succeeds after writing `files`.
    pub(crate) fn new(files: &[(&str, &str)]) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            default: FakeAttempt::writes(files),
            unavailable: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn script(self, task_id: &str, attempts: Vec<FakeAttempt>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(task_id.to_string(), attempts.into());
        self
    }

    /// Make `probe` fail for an agent.
    pub(crate) fn unavailable(mut self, agent_id: &str) -> Self {
        self.unavailable.push(agent_id.to_string());
        self
    }

    pub(crate) fn calls(&self) -> Vec<FakeCall> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn calls_for(&self, task_id: &str) -> Vec<FakeCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.task_id == task_id)
            .collect()
    }
}

impl Worker for FakeWorker {
    fn probe(&self, agent: &Agent) -> Result<(), ExecutionError> {
        if self.unavailable.contains(&agent.id) {
            return Err(ExecutionError::Unavailable {
                tool: agent.command.clone(),
                reason: "not installed".to_string(),
            });
        }
        Ok(())
    }

    fn execute(
        &self,
        agent: &Agent,
        request: &WorkRequest,
        _timeout: Duration,
    ) -> Result<WorkOutcome, ExecutionError> {
        self.calls.lock().unwrap().push(FakeCall {
            task_id: request.task_id.clone(),
            agent_id: agent.id.clone(),
            attempt: request.attempt,
            prompt: request.prompt.clone(),
        });

        let attempt = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&request.task_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| self.default.clone());

        if !attempt.delay.is_zero() {
            std::thread::sleep(attempt.delay);
        }
        if let Some(message) = attempt.panic {
            panic!("{}", message);
        }
        if let Some(message) = attempt.error {
            return Err(ExecutionError::Worker {
                task: request.task_id.clone(),
                message,
            });
        }

        std::fs::create_dir_all(&request.workdir).unwrap();
        let files: Vec<(&str, &str)> = attempt
            .files
            .iter()
            .map(|(p, c)| (p.as_str(), c.as_str()))
            .collect();
        write_files(&request.workdir, &files);

        Ok(WorkOutcome {
            report: WorkerReport {
                summary: format!("wrote {} files", files.len()),
                ..Default::default()
            },
            ..Default::default()
        })
    }
}
