use super::{MAX_LISTED_FINDINGS, StepContext, VerificationStep, output_tail};
use crate::config::StepId;
use crate::error::VerificationError;
use crate::verify::patterns::{CompiledPatterns, findings_to_issues};
use crate::verify::types::{StepKind, StepResult};

/// Score lost when the lint command fails.
const LINT_COMMAND_PENALTY: f64 = 0.5;

/// Score lost per unfinished-code marker, capped at `MARKER_PENALTY_CAP`.
const MARKER_PENALTY: f64 = 0.05;
const MARKER_PENALTY_CAP: f64 = 0.5;

/// Weighted: optional lint command plus a scan for unfinished-code markers.
pub struct LintStep;

impl VerificationStep for LintStep {
    fn id(&self) -> StepId {
        StepId::Lint
    }

    fn kind(&self) -> StepKind {
        StepKind::Weighted
    }

    fn run(&self, ctx: &StepContext<'_>) -> Result<StepResult, VerificationError> {
        let max = ctx.weight(self.id());
        let mut fraction = 1.0;
        let mut issues = Vec::new();
        let mut recommendations = Vec::new();
        let mut output = None;

        let command = ctx
            .config
            .lint_command
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty());
        if let Some(command) = command {
            let out = ctx.run_command(self.id(), command, ctx.config.command_timeout())?;
            if !out.success {
                fraction -= LINT_COMMAND_PENALTY;
                issues.push(format!("lint command `{}` {}", command, out.failure_reason()));
                recommendations.push("Fix the warnings reported by the linter".to_string());
                output = Some(output_tail(&out));
            }
        }

        let markers = CompiledPatterns::compile(&ctx.config.marker_patterns)?;
        let extensions = ctx.config.normalized_extensions();
        let findings = markers.scan(self.id(), ctx.tree, ctx.config.max_file_bytes, |e| {
            e.extension().is_some_and(|ext| extensions.contains(&ext))
        })?;

        if !findings.is_empty() {
            fraction -= (MARKER_PENALTY * findings.len() as f64).min(MARKER_PENALTY_CAP);
            issues.extend(findings_to_issues(
                "unfinished code",
                &findings,
                MAX_LISTED_FINDINGS,
            ));
            recommendations
                .push("Complete or remove TODO/FIXME markers and placeholder code".to_string());
        }

        let mut result = StepResult::scored(self.id(), self.kind(), max, fraction).with_issues(issues);
        for rec in recommendations {
            result = result.with_recommendation(rec);
        }
        if let Some(output) = output {
            result = result.with_output(output);
        }
        Ok(result)
    }
}
