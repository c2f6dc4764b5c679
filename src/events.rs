//! Lifecycle events emitted by the engine and the verification pipeline.
//!
//! The engine writes [`EngineEvent`]s to an [`EventSink`]. Delivery is
//! best-effort: `emit` is infallible and must not block, and control flow
//! never depends on which sink is attached.
//!
//! [`NdjsonSink`] keeps an append-only audit log, one JSON object per line:
//!
//! ```text
//! {"ts":"2026-01-05T10:00:00Z","event":"task_started","task_id":"api","agent_id":"backend","attempt":1}
//! ```

use crate::config::StepId;
use crate::task::CompletionKind;
use crate::verify::{Severity, StepKind, StepStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::mpsc::{self, Receiver, Sender};

/// A lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    ProjectStarted {
        project_id: String,
        name: String,
        total_tasks: usize,
    },
    ProjectFinished {
        project_id: String,
        complete: bool,
        completed: usize,
        failed: usize,
        blocked: usize,
        stranded: usize,
        elapsed_ms: u64,
    },
    TaskStarted {
        task_id: String,
        agent_id: String,
        attempt: u32,
    },
    /// The worker finished and verification is starting.
    TaskInReview {
        task_id: String,
        attempt: u32,
    },
    TaskCompleted {
        task_id: String,
        kind: CompletionKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        score: Option<f64>,
    },
    TaskNeedsRevision {
        task_id: String,
        attempt: u32,
        score: f64,
        severity: Severity,
        issues: Vec<String>,
    },
    TaskFailed {
        task_id: String,
        reason: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        score: Option<f64>,
    },
    TaskBlocked {
        task_id: String,
        reason: String,
        score: f64,
    },
    AgentStatusChanged {
        agent_id: String,
        active: usize,
        max_concurrent: u32,
    },
    VerificationStepStarted {
        task_id: String,
        step: StepId,
        kind: StepKind,
    },
    VerificationStepCompleted {
        task_id: String,
        step: StepId,
        status: StepStatus,
        achieved: f64,
        max_score: f64,
    },
}

impl EngineEvent {
    /// The task this event concerns, if any.
    pub fn task_id(&self) -> Option<&str> {
        match self {
            EngineEvent::TaskStarted { task_id, .. }
            | EngineEvent::TaskInReview { task_id, .. }
            | EngineEvent::TaskCompleted { task_id, .. }
            | EngineEvent::TaskNeedsRevision { task_id, .. }
            | EngineEvent::TaskFailed { task_id, .. }
            | EngineEvent::TaskBlocked { task_id, .. }
            | EngineEvent::VerificationStepStarted { task_id, .. }
            | EngineEvent::VerificationStepCompleted { task_id, .. } => Some(task_id),
            _ => None,
        }
    }
}

/// An event with its timestamp, as written to the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// RFC3339 timestamp when the event occurred.
    pub ts: DateTime<Utc>,

    #[serde(flatten)]
    pub event: EngineEvent,
}

impl EventRecord {
    pub fn now(event: EngineEvent) -> Self {
        Self {
            ts: Utc::now(),
            event,
        }
    }
}

/// Receiver of engine events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &EngineEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &EngineEvent) {}
}

/// Forwards events over an unbounded channel.
#[derive(Debug)]
pub struct ChannelSink {
    tx: Sender<EventRecord>,
}

impl ChannelSink {
    pub fn new() -> (Self, Receiver<EventRecord>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: &EngineEvent) {
        // A dropped receiver only means nobody is listening.
        let _ = self.tx.send(EventRecord::now(event.clone()));
    }
}

/// Appends events to an NDJSON file.
///
/// Write failures are logged once and never reach the caller.
#[derive(Debug)]
pub struct NdjsonSink {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl NdjsonSink {
    /// Open (or create) the log file, creating parent directories.
    pub fn open<P: AsRef<Path>>(path: P) -> crate::error::Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                crate::error::TaskgateError::UserError(format!(
                    "failed to create events directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                crate::error::TaskgateError::UserError(format!(
                    "failed to open events file '{}': {}",
                    path.display(),
                    e
                ))
            })?;

        Ok(Self {
            path,
            file: Mutex::new(Some(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventSink for NdjsonSink {
    fn emit(&self, event: &EngineEvent) {
        let line = match serde_json::to_string(&EventRecord::now(event.clone())) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize event");
                return;
            }
        };

        let mut guard = self.file.lock().unwrap_or_else(|p| p.into_inner());
        let Some(file) = guard.as_mut() else {
            return;
        };
        if let Err(e) = writeln!(file, "{}", line) {
            tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "failed to write event log, disabling it for this run"
            );
            *guard = None;
        }
    }
}

/// Read every record from an NDJSON event log, skipping malformed lines.
pub fn read_events<P: AsRef<Path>>(path: P) -> crate::error::Result<Vec<EventRecord>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| {
        crate::error::TaskgateError::UserError(format!(
            "failed to read events file '{}': {}",
            path.display(),
            e
        ))
    })?;

    Ok(content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| serde_json::from_str(l).ok())
        .collect())
}

/// Keeps events in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<EngineEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events emitted so far.
    pub fn events(&self) -> Vec<EngineEvent> {
        self.events
            .lock()
            .map(|e| e.clone())
            .unwrap_or_else(|p| p.into_inner().clone())
    }
}

impl EventSink for CollectingSink {
    fn emit(&self, event: &EngineEvent) {
        self.events
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn started(id: &str) -> EngineEvent {
        EngineEvent::TaskStarted {
            task_id: id.to_string(),
            agent_id: "backend".to_string(),
            attempt: 1,
        }
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let json = serde_json::to_string(&EventRecord::now(started("api"))).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["event"], "task_started");
        assert_eq!(value["task_id"], "api");
        assert!(value.get("ts").is_some());
        assert!(!json.contains('\n'));
    }

    #[test]
    fn test_completed_event_uses_completion_name() {
        let event = EngineEvent::TaskCompleted {
            task_id: "a".to_string(),
            kind: CompletionKind::Timeout,
            score: None,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("completed-via-timeout"));
        assert!(!json.contains("score"));
    }

    #[test]
    fn test_ndjson_sink_appends_lines() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("logs").join("events.ndjson");

        let sink = NdjsonSink::open(&path).unwrap();
        sink.emit(&started("a"));
        sink.emit(&started("b"));

        let records = read_events(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].event.task_id(), Some("b"));
    }

    #[test]
    fn test_read_events_skips_malformed_lines() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("events.ndjson");
        let good = serde_json::to_string(&EventRecord::now(started("a"))).unwrap();
        std::fs::write(&path, format!("{}\nnot json\n\n", good)).unwrap();

        assert_eq!(read_events(&path).unwrap().len(), 1);
    }

    #[test]
    fn test_channel_sink_survives_dropped_receiver() {
        let (sink, rx) = ChannelSink::new();
        sink.emit(&started("a"));
        assert_eq!(rx.recv().unwrap().event, started("a"));

        drop(rx);
        sink.emit(&started("b"));
    }

    #[test]
    fn test_collecting_sink() {
        let sink = CollectingSink::new();
        sink.emit(&started("a"));
        NullSink.emit(&started("b"));
        assert_eq!(sink.events(), vec![started("a")]);
    }
}
