use super::{MAX_LISTED_FINDINGS, StepContext, VerificationStep};
use crate::config::StepId;
use crate::error::VerificationError;
use crate::verify::patterns::{CompiledPatterns, findings_to_issues};
use crate::verify::tree::FileEntry;
use crate::verify::types::{StepKind, StepResult};

/// Score lost per soft finding.
const SOFT_PENALTY: f64 = 0.1;

/// Soft findings never take the step below this fraction.
const SOFT_FLOOR: f64 = 0.5;

/// Extensions scanned for secrets on top of the source extensions.
const CONFIG_EXTENSIONS: &[&str] = &[
    "env",
    "json",
    "yaml",
    "yml",
    "toml",
    "ini",
    "cfg",
    "conf",
    "properties",
];

/// Gate on hard findings (committed secrets, private keys). Soft findings
/// (dangerous calls) only cost score.
pub struct SecurityStep;

impl VerificationStep for SecurityStep {
    fn id(&self) -> StepId {
        StepId::Security
    }

    fn kind(&self) -> StepKind {
        StepKind::Gate
    }

    fn run(&self, ctx: &StepContext<'_>) -> Result<StepResult, VerificationError> {
        let max = ctx.weight(self.id());
        let hard = CompiledPatterns::compile(&ctx.config.hard_security_patterns)?;
        let soft = CompiledPatterns::compile(&ctx.config.soft_security_patterns)?;
        let source = ctx.config.normalized_extensions();

        let scannable = |entry: &FileEntry| {
            entry.file_name().starts_with(".env")
                || entry.extension().is_some_and(|ext| {
                    source.contains(&ext) || CONFIG_EXTENSIONS.contains(&ext.as_str())
                })
        };

        let hard_findings = hard.scan(self.id(), ctx.tree, ctx.config.max_file_bytes, scannable)?;
        if !hard_findings.is_empty() {
            return Ok(StepResult::fail(
                self.id(),
                self.kind(),
                max,
                format!("{} hard security finding(s)", hard_findings.len()),
            )
            .with_issues(findings_to_issues(
                "secret",
                &hard_findings,
                MAX_LISTED_FINDINGS,
            ))
            .with_recommendation(
                "Remove hard-coded secrets and load credentials from the environment",
            ));
        }

        let soft_findings = soft.scan(self.id(), ctx.tree, ctx.config.max_file_bytes, |e| {
            e.extension().is_some_and(|ext| source.contains(&ext))
        })?;
        let committed_env: Vec<&FileEntry> = ctx
            .tree
            .files()
            .iter()
            .filter(|f| f.file_name() == ".env")
            .collect();

        let penalties = soft_findings.len() + committed_env.len();
        let fraction = (1.0 - SOFT_PENALTY * penalties as f64).max(SOFT_FLOOR);
        let mut result = StepResult::scored(self.id(), self.kind(), max, fraction);

        if !soft_findings.is_empty() {
            result = result
                .with_issues(findings_to_issues(
                    "risky call",
                    &soft_findings,
                    MAX_LISTED_FINDINGS,
                ))
                .with_recommendation("Replace dynamic evaluation and shell calls with safe APIs");
        }
        for env in committed_env {
            result = result
                .with_issue(format!("environment file committed: {}", env.path))
                .with_recommendation("Do not commit .env files; provide a .env.example instead");
        }

        Ok(result)
    }
}
