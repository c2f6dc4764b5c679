//! Verification pipeline.
//!
//! Runs the configured steps in order against a project directory and
//! aggregates them into a [`VerificationResult`].

use super::severity::classify_severity;
use super::steps::{StepContext, VerificationStep, step_for};
use super::tree::FileTree;
use super::types::{StepKind, StepResult, VerificationResult};
use crate::config::{StepId, VerificationConfig};
use crate::events::{EngineEvent, EventSink, NullSink};
use crate::runner::CommandRunner;
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// An ordered list of steps plus the configuration they run with.
pub struct VerificationPipeline {
    steps: Vec<Box<dyn VerificationStep>>,
    config: VerificationConfig,
    runner: Arc<dyn CommandRunner>,
}

impl VerificationPipeline {
    /// Pipeline with the steps listed in `config.steps`, in that order.
    pub fn from_config(config: VerificationConfig, runner: Arc<dyn CommandRunner>) -> Self {
        let steps = config.steps.iter().map(|id| step_for(*id)).collect();
        Self {
            steps,
            config,
            runner,
        }
    }

    /// Pipeline with an explicit step list.
    pub fn with_steps(
        steps: Vec<Box<dyn VerificationStep>>,
        config: VerificationConfig,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            steps,
            config,
            runner,
        }
    }

    pub fn config(&self) -> &VerificationConfig {
        &self.config
    }

    pub fn step_ids(&self) -> Vec<StepId> {
        self.steps.iter().map(|s| s.id()).collect()
    }

    /// Verify a directory outside of any engine run.
    pub fn verify_dir(&self, dir: &Path) -> VerificationResult {
        self.verify("-", dir, 1, &NullSink)
    }

    /// Run every step against `dir` for one task attempt.
    ///
    /// Never fails: a step that errors becomes a zero-score failing step. The
    /// first gate failure stops the run; the steps after it are recorded as
    /// skipped.
    pub fn verify(
        &self,
        task_id: &str,
        dir: &Path,
        attempt: u32,
        sink: &dyn EventSink,
    ) -> VerificationResult {
        let tree = FileTree::scan(dir, &self.config.ignore_dirs);
        let ctx = StepContext {
            tree: &tree,
            config: &self.config,
            runner: self.runner.as_ref(),
        };

        let mut results: Vec<StepResult> = Vec::with_capacity(self.steps.len());
        let mut blocked_by: Option<StepId> = None;

        for step in &self.steps {
            if let Some(gate) = blocked_by {
                results.push(StepResult::skip(
                    step.id(),
                    step.kind(),
                    format!("not run: gate '{}' failed", gate),
                ));
                continue;
            }

            sink.emit(&EngineEvent::VerificationStepStarted {
                task_id: task_id.to_string(),
                step: step.id(),
                kind: step.kind(),
            });

            let start = Instant::now();
            let mut result = match step.run(&ctx) {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!(
                        task_id,
                        step = step.name(),
                        error = %e,
                        "verification step errored"
                    );
                    StepResult::fail(
                        step.id(),
                        step.kind(),
                        step.max_score(&self.config),
                        format!("{} check could not run: {}", step.name(), e),
                    )
                }
            };
            result.duration = start.elapsed();

            tracing::debug!(
                task_id,
                step = step.name(),
                status = ?result.status,
                achieved = result.achieved,
                max = result.max_score,
                "verification step finished"
            );

            sink.emit(&EngineEvent::VerificationStepCompleted {
                task_id: task_id.to_string(),
                step: result.step,
                status: result.status,
                achieved: result.achieved,
                max_score: result.max_score,
            });

            if result.is_blocking_failure() {
                blocked_by = Some(result.step);
            }
            results.push(result);
        }

        aggregate(results, &self.config, attempt)
    }
}

/// Combine step results into a verdict.
///
/// The score is Σachieved / Σmaximum over executed steps, clamped to
/// [0, 1], and 0 when nothing ran. A pass needs the score to reach
/// `pass_threshold` and no gate to have failed.
pub fn aggregate(
    mut steps: Vec<StepResult>,
    config: &VerificationConfig,
    attempt: u32,
) -> VerificationResult {
    if steps.iter().all(StepResult::is_skipped) {
        steps.push(
            StepResult::fail(
                StepId::Structure,
                StepKind::Gate,
                0.0,
                "no verification step ran against the project",
            )
            .with_recommendation("Enable at least one verification step"),
        );
    }

    let (achieved, maximum) = steps
        .iter()
        .filter(|s| !s.is_skipped())
        .fold((0.0, 0.0), |(a, m), s| (a + s.achieved, m + s.max_score));

    let score = if maximum > 0.0 {
        (achieved / maximum).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let gate_failed = steps.iter().any(StepResult::is_blocking_failure);
    let passed = !gate_failed && score >= config.pass_threshold;

    let severity = (!passed).then(|| classify_severity(&steps, score));

    VerificationResult {
        passed,
        score,
        deployment_ready: passed && score >= config.deploy_threshold,
        severity,
        steps,
        attempt,
        timestamp: Utc::now(),
    }
}
