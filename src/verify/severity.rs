//! Failure severity classification.

use super::types::{StepResult, StepStatus};
use crate::config::StepId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Below this aggregate score a failure is critical.
pub const CRITICAL_SCORE: f64 = 0.3;

/// Below this aggregate score a failure is at least moderate.
pub const MODERATE_SCORE: f64 = 0.6;

/// How bad a failed verification is. Drives the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Minor,
    Moderate,
    /// Never retried automatically; the task is blocked.
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Minor => "minor",
            Severity::Moderate => "moderate",
            Severity::Critical => "critical",
        })
    }
}

/// Classify a failed verification from its step results and aggregate score.
///
/// Critical when the build or runtime step failed, when the security step
/// failed (only hard findings fail it), or when the score is below 0.3.
/// Moderate below 0.6, minor otherwise.
pub fn classify_severity(steps: &[StepResult], score: f64) -> Severity {
    let critical_step_failed = steps.iter().any(|s| {
        s.status == StepStatus::Fail
            && matches!(s.step, StepId::Build | StepId::Runtime | StepId::Security)
    });

    if critical_step_failed || score < CRITICAL_SCORE {
        Severity::Critical
    } else if score < MODERATE_SCORE {
        Severity::Moderate
    } else {
        Severity::Minor
    }
}
