//! Core types for verification results.

use super::severity::Severity;
use crate::config::StepId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Whether a step failure blocks the verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Failure fails verification regardless of score.
    Gate,
    /// Contributes score only.
    Weighted,
}

/// Status of a verification step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pass,
    Fail,
    /// Not executed; excluded from the aggregate.
    Skip,
}

/// Result of a single verification step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step: StepId,
    pub kind: StepKind,
    pub status: StepStatus,
    pub achieved: f64,
    pub max_score: f64,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    /// Tail of command output, when the step ran a command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, rename = "duration_ms", with = "duration_ms")]
    pub duration: Duration,
}

impl StepResult {
    /// Full marks.
    pub fn pass(step: StepId, kind: StepKind, max_score: f64) -> Self {
        Self {
            step,
            kind,
            status: StepStatus::Pass,
            achieved: max_score,
            max_score,
            issues: Vec::new(),
            recommendations: Vec::new(),
            output: None,
            duration: Duration::ZERO,
        }
    }

    /// Zero score, failing.
    pub fn fail(step: StepId, kind: StepKind, max_score: f64, issue: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Fail,
            achieved: 0.0,
            issues: vec![issue.into()],
            ..Self::pass(step, kind, max_score)
        }
    }

    /// Not executed. The reason is kept as an issue-free note in `output`.
    pub fn skip(step: StepId, kind: StepKind, reason: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Skip,
            achieved: 0.0,
            max_score: 0.0,
            output: Some(reason.into()),
            ..Self::pass(step, kind, 0.0)
        }
    }

    /// A passing step with partial credit: `fraction` of `max_score`, clamped to [0, 1].
    pub fn scored(step: StepId, kind: StepKind, max_score: f64, fraction: f64) -> Self {
        Self {
            achieved: max_score * fraction.clamp(0.0, 1.0),
            ..Self::pass(step, kind, max_score)
        }
    }

    pub fn with_issue(mut self, issue: impl Into<String>) -> Self {
        self.issues.push(issue.into());
        self
    }

    pub fn with_issues<I: IntoIterator<Item = String>>(mut self, issues: I) -> Self {
        self.issues.extend(issues);
        self
    }

    pub fn with_recommendation(mut self, rec: impl Into<String>) -> Self {
        let rec = rec.into();
        if !self.recommendations.contains(&rec) {
            self.recommendations.push(rec);
        }
        self
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        let output = output.into();
        if !output.trim().is_empty() {
            self.output = Some(output);
        }
        self
    }

    pub fn is_skipped(&self) -> bool {
        self.status == StepStatus::Skip
    }

    /// A failed gate. Any blocking failure fails the verdict.
    pub fn is_blocking_failure(&self) -> bool {
        self.kind == StepKind::Gate && self.status == StepStatus::Fail
    }
}

/// Outcome of one verification run for one task attempt.
///
/// Immutable once created; the engine appends it to the task's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub passed: bool,
    /// Aggregate score in [0, 1] over executed steps.
    pub score: f64,
    pub steps: Vec<StepResult>,
    /// Failure severity; absent on pass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    pub deployment_ready: bool,
    pub attempt: u32,
    pub timestamp: DateTime<Utc>,
}

impl VerificationResult {
    pub fn step(&self, id: StepId) -> Option<&StepResult> {
        self.steps.iter().find(|s| s.step == id)
    }

    /// Steps that failed as gates, in pipeline order.
    pub fn gate_failures(&self) -> impl Iterator<Item = &StepResult> {
        self.steps.iter().filter(|s| s.is_blocking_failure())
    }

    /// All issues, in step order.
    pub fn issues(&self) -> Vec<String> {
        self.steps.iter().flat_map(|s| s.issues.clone()).collect()
    }

    /// All recommendations, in step order, without duplicates.
    pub fn recommendations(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for rec in self.steps.iter().flat_map(|s| &s.recommendations) {
            if !out.contains(rec) {
                out.push(rec.clone());
            }
        }
        out
    }

    /// One-line description, e.g. for a failed `verify` command.
    pub fn summary(&self) -> String {
        let gates: Vec<&str> = self.gate_failures().map(|s| s.step.as_str()).collect();
        let verdict = if self.passed { "passed" } else { "failed" };
        if gates.is_empty() {
            format!("{} with score {:.2}", verdict, self.score)
        } else {
            format!(
                "{} with score {:.2} (gate failures: {})",
                verdict,
                self.score,
                gates.join(", ")
            )
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
