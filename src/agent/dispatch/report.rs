//! Adapter for free-text worker output.
//!
//! Coding CLIs print whatever they like. If the last non-empty line of stdout
//! is a JSON object it is read as a structured report:
//!
//! ```text
//! {"status": "done", "summary": "added /health", "files_changed": ["src/main.rs"]}
//! ```
//!
//! Anything else is kept verbatim (truncated) as a plain summary.

use crate::runner::truncate_output;
use serde::{Deserialize, Serialize};

const SUMMARY_MAX_LINES: usize = 20;
const SUMMARY_MAX_CHARS: usize = 2000;

/// What a worker said about its own run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerReport {
    /// Self-reported status (`done`, `failed`, ...). `None` for free text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(default)]
    pub summary: String,

    #[serde(default, alias = "files")]
    pub files_changed: Vec<String>,

    /// Whether the report came from a JSON line.
    #[serde(skip)]
    pub structured: bool,
}

impl WorkerReport {
    /// The worker explicitly reported that it did not finish.
    pub fn is_failure(&self) -> bool {
        self.status.as_deref().is_some_and(|s| {
            matches!(
                s.to_ascii_lowercase().as_str(),
                "failed" | "failure" | "error" | "aborted"
            )
        })
    }
}

/// Parse worker stdout into a report. Never fails.
pub fn parse_worker_report(stdout: &str) -> WorkerReport {
    let last = stdout.lines().map(str::trim).rfind(|l| !l.is_empty());

    if let Some(line) = last.filter(|l| l.starts_with('{') && l.ends_with('}'))
        && let Ok(mut report) = serde_json::from_str::<WorkerReport>(line)
    {
        report.structured = true;
        return report;
    }

    WorkerReport {
        status: None,
        summary: truncate_output(stdout.trim(), SUMMARY_MAX_LINES, SUMMARY_MAX_CHARS),
        files_changed: Vec::new(),
        structured: false,
    }
}
