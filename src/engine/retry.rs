//! What happens to a task after verification fails.

use crate::config::ExecutionConfig;
use crate::verify::{Severity, VerificationResult};

/// Routing for a failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// `revision -> inProgress` with an improvement instruction.
    Retry,
    /// Critical failure; needs outside intervention.
    Block,
    /// Retries exhausted or score below the floor.
    Fail,
}

/// Bounded automatic retry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_auto_retries: u32,
    pub score_floor: f64,
}

impl RetryPolicy {
    pub fn from_config(config: &ExecutionConfig) -> Self {
        Self {
            max_auto_retries: config.max_auto_retries,
            score_floor: config.retry_score_floor,
        }
    }

    /// Route a failed result given the retries the task already spent.
    ///
    /// Critical failures never retry. Anything else retries while the score
    /// reaches the floor and the budget lasts.
    pub fn decide(&self, result: &VerificationResult, retries_used: u32) -> RetryDecision {
        if result.severity == Some(Severity::Critical) {
            return RetryDecision::Block;
        }
        if result.score >= self.score_floor && retries_used < self.max_auto_retries {
            return RetryDecision::Retry;
        }
        RetryDecision::Fail
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn failed(score: f64, severity: Severity) -> VerificationResult {
        VerificationResult {
            passed: false,
            score,
            steps: Vec::new(),
            severity: Some(severity),
            deployment_ready: false,
            attempt: 1,
            timestamp: Utc::now(),
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::from_config(&ExecutionConfig::default())
    }

    #[test]
    fn test_moderate_failure_retries_exactly_once() {
        let result = failed(0.5, Severity::Moderate);
        assert_eq!(policy().decide(&result, 0), RetryDecision::Retry);
        assert_eq!(policy().decide(&result, 1), RetryDecision::Fail);
    }

    #[test]
    fn test_critical_never_retries() {
        let result = failed(0.9, Severity::Critical);
        assert_eq!(policy().decide(&result, 0), RetryDecision::Block);
    }

    #[test]
    fn test_below_floor_fails() {
        let result = failed(0.35, Severity::Moderate);
        assert_eq!(policy().decide(&result, 0), RetryDecision::Fail);
    }

    #[test]
    fn test_floor_is_inclusive() {
        let result = failed(0.4, Severity::Moderate);
        assert_eq!(policy().decide(&result, 0), RetryDecision::Retry);
    }

    #[test]
    fn test_zero_budget() {
        let policy = RetryPolicy {
            max_auto_retries: 0,
            score_floor: 0.4,
        };
        assert_eq!(
            policy.decide(&failed(0.8, Severity::Minor), 0),
            RetryDecision::Fail
        );
    }
}
