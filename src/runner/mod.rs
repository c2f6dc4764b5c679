//! Command runner.
//!
//! Executes an external command with a timeout and captures its output.
//! [`CommandRunner::run`] never returns an error: spawn failures, timeouts,
//! and I/O problems are all recorded in the returned [`CommandOutput`].

use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;


/// Maximum number of lines kept when output is quoted in a report.
pub const REPORT_MAX_LINES: usize = 50;

/// Maximum total characters kept when output is quoted in a report.
pub const REPORT_MAX_CHARS: usize = 4096;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long to wait for pipes to drain after the child has exited.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Errors from parsing a command line into a [`CommandSpec`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("command is empty")]
    Empty,

    #[error("failed to parse command '{command}': {message}")]
    Syntax { command: String, message: String },
}

/// A command to execute.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Working directory. Inherits the current directory when `None`.
    pub cwd: Option<PathBuf>,
    pub timeout: Duration,
    /// Extra environment variables, merged over the inherited environment.
    pub env: BTreeMap<String, String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            timeout: Duration::from_secs(600),
            env: BTreeMap::new(),
        }
    }

    /// Split a command line with shell quoting rules.
    pub fn parse(command: &str) -> Result<Self, CommandParseError> {
        let words = shell_words::split(command.trim()).map_err(|e| CommandParseError::Syntax {
            command: command.to_string(),
            message: e.to_string(),
        })?;
        Self::from_words(words)
    }

    /// Build a spec from already-split words: the first is the program.
    pub fn from_words(words: Vec<String>) -> Result<Self, CommandParseError> {
        let mut words = words.into_iter();
        let program = words.next().ok_or(CommandParseError::Empty)?;
        if program.trim().is_empty() {
            return Err(CommandParseError::Empty);
        }
        Ok(Self::new(program).args(words))
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs<'a, I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        for (k, v) in vars {
            self.env.insert(k.clone(), v.clone());
        }
        self
    }

    /// The command line, quoted so it can be pasted into a shell.
    pub fn display_line(&self) -> String {
        let mut words = Vec::with_capacity(self.args.len() + 1);
        words.push(self.program.as_str());
        words.extend(self.args.iter().map(String::as_str));
        shell_words::join(words)
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_line())
    }
}

/// Captured result of a command execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandOutput {
    /// True iff the process exited on its own with status 0.
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    /// Exit code, `None` when killed or when the process never started.
    pub exit_code: Option<i32>,
    /// The timeout expired and the process was killed.
    pub timed_out: bool,
    pub duration: Duration,
    /// Why the process could not be started, if it could not.
    pub spawn_error: Option<String>,
}

impl CommandOutput {
    /// A successful run with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            exit_code: Some(0),
            ..Default::default()
        }
    }

    /// A run that exited with a non-zero code.
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stderr: stderr.into(),
            exit_code: Some(exit_code),
            ..Default::default()
        }
    }

    /// A run that was killed at its timeout.
    pub fn timed_out(duration: Duration) -> Self {
        Self {
            timed_out: true,
            duration,
            ..Default::default()
        }
    }

    /// A command that never started.
    pub fn not_started(reason: impl Into<String>) -> Self {
        Self {
            spawn_error: Some(reason.into()),
            ..Default::default()
        }
    }

    /// Stdout followed by stderr, skipping empty streams.
    pub fn combined(&self) -> String {
        match (self.stdout.trim().is_empty(), self.stderr.trim().is_empty()) {
            (false, false) => format!("{}\n{}", self.stdout, self.stderr),
            (false, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (true, true) => String::new(),
        }
    }

    /// One-line description of why the command did not succeed.
    pub fn failure_reason(&self) -> String {
        if let Some(err) = &self.spawn_error {
            return format!("failed to start: {}", err);
        }
        if self.timed_out {
            return format!("timed out after {}s", self.duration.as_secs());
        }
        match self.exit_code {
            Some(code) => format!("exited with code {}", code),
            None => "terminated by signal".to_string(),
        }
    }

    /// Multi-line failure message with the tail of the output, for reports.
    pub fn failure_report(&self, command: &str) -> String {
        let mut msg = format!("Command {}\nCommand: {}\n", self.failure_reason(), command);
        let truncated = truncate_output(&self.combined(), REPORT_MAX_LINES, REPORT_MAX_CHARS);
        if !truncated.is_empty() {
            msg.push_str("\nOutput (truncated):\n```\n");
            msg.push_str(&truncated);
            msg.push_str("\n```\n");
        }
        msg
    }
}

/// Keep the last `max_lines` lines and at most `max_chars` trailing characters.
pub fn truncate_output(output: &str, max_lines: usize, max_chars: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();

    let relevant = if lines.len() > max_lines {
        &lines[lines.len() - max_lines..]
    } else {
        &lines[..]
    };

    let result = relevant.join("\n");
    let char_count = result.chars().count();
    if char_count <= max_chars {
        return result;
    }

    let skip = char_count - max_chars;
    let tail: String = result.chars().skip(skip).collect();
    format!("...(truncated)...\n{}", tail)
}

/// Executes commands. Implemented by [`SystemRunner`] and by scripted fakes in tests.
pub trait CommandRunner: Send + Sync {
    fn run(&self, spec: &CommandSpec) -> CommandOutput;
}

/// Runs commands as real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> CommandOutput {
        let start = Instant::now();

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }
        for (key, value) in &spec.env {
            command.env(key, value);
        }

        // Own process group, so a timeout can take down anything the command forked.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::debug!(program = %spec.program, error = %e, "command failed to start");
                return CommandOutput {
                    duration: start.elapsed(),
                    ..CommandOutput::not_started(format!(
                        "{}: {}\nFix: ensure '{}' is installed and in PATH.",
                        spec.program, e, spec.program
                    ))
                };
            }
        };

        let stdout = child.stdout.take().map(capture);
        let stderr = child.stderr.take().map(capture);

        let (exit_code, timed_out, wait_error) = wait_with_timeout(&mut child, spec.timeout);
        let duration = start.elapsed();

        let drain_deadline = Instant::now() + DRAIN_TIMEOUT;
        let stdout = stdout.map(|c| c.finish(drain_deadline)).unwrap_or_default();
        let mut stderr = stderr.map(|c| c.finish(drain_deadline)).unwrap_or_default();

        if let Some(err) = wait_error {
            if !stderr.is_empty() {
                stderr.push('\n');
            }
            stderr.push_str(&format!("failed to check process status: {}", err));
        }

        if timed_out {
            tracing::warn!(
                command = %spec,
                timeout_secs = spec.timeout.as_secs(),
                "command timed out and was killed"
            );
        }

        CommandOutput {
            success: !timed_out && exit_code == Some(0),
            stdout,
            stderr,
            exit_code,
            timed_out,
            duration,
            spawn_error: None,
        }
    }
}

/// Output being collected from one pipe on a background thread.
struct Capture {
    buffer: Arc<Mutex<Vec<u8>>>,
    done: Receiver<()>,
}

impl Capture {
    /// Wait until the pipe closes or the deadline passes, then take what was read.
    fn finish(self, deadline: Instant) -> String {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let _ = self.done.recv_timeout(remaining);
        let bytes = self
            .buffer
            .lock()
            .map(|buf| buf.clone())
            .unwrap_or_else(|poison| poison.into_inner().clone());
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

fn capture<R: Read + Send + 'static>(mut reader: R) -> Capture {
    let buffer = Arc::new(Mutex::new(Vec::new()));
    let (tx, done) = mpsc::channel();
    let sink = Arc::clone(&buffer);

    std::thread::spawn(move || {
        let mut chunk = [0u8; 8192];
        loop {
            match reader.read(&mut chunk) {
                Ok(0) | Err(_) => break,
                Ok(n) => match sink.lock() {
                    Ok(mut buf) => buf.extend_from_slice(&chunk[..n]),
                    Err(poison) => poison.into_inner().extend_from_slice(&chunk[..n]),
                },
            }
        }
        let _ = tx.send(());
    });

    Capture { buffer, done }
}

/// Poll the child until it exits or the timeout expires.
///
/// Returns (exit_code, timed_out, wait_error).
fn wait_with_timeout(child: &mut Child, timeout: Duration) -> (Option<i32>, bool, Option<String>) {
    let start = Instant::now();

    loop {
        match child.try_wait() {
            Ok(Some(status)) => return (status.code(), false, None),
            Ok(None) => {
                if start.elapsed() >= timeout {
                    kill_process(child);
                    return (None, true, None);
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                kill_process(child);
                return (None, false, Some(e.to_string()));
            }
        }
    }
}

/// Kill the child (and its process group on Unix) and reap it.
fn kill_process(child: &mut Child) {
    #[cfg(unix)]
    {
        let group = format!("-{}", child.id());
        let _ = Command::new("kill")
            .args(["-KILL", "--", &group])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }
    let _ = child.kill();
    let _ = child.wait();
}
