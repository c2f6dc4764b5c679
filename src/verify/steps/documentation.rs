use super::{StepContext, VerificationStep};
use crate::config::StepId;
use crate::error::VerificationError;
use crate::verify::types::{StepKind, StepResult};

const README_NAMES: &[&str] = &["README.md", "README", "README.rst", "README.txt"];

/// Share of the step carried by the README; the rest is comment density.
const README_SHARE: f64 = 0.6;

/// Comment lines per source line at or above which density earns full marks.
const TARGET_COMMENT_DENSITY: f64 = 0.05;

/// Weighted: a substantive README and a reasonable density of comments.
pub struct DocumentationStep;

impl VerificationStep for DocumentationStep {
    fn id(&self) -> StepId {
        StepId::Documentation
    }

    fn kind(&self) -> StepKind {
        StepKind::Weighted
    }

    fn run(&self, ctx: &StepContext<'_>) -> Result<StepResult, VerificationError> {
        let max = ctx.weight(self.id());
        let tree = ctx.tree;
        let mut issues = Vec::new();
        let mut recommendations = Vec::new();

        let readme_score = match tree.find_top_level(README_NAMES) {
            None => {
                issues.push("README is missing".to_string());
                recommendations
                    .push("Add a README describing setup, usage, and configuration".to_string());
                0.0
            }
            Some(entry) => {
                let text = tree.read_text(self.id(), entry)?.unwrap_or_default();
                let chars = text.trim().chars().count();
                if chars >= ctx.config.min_readme_chars {
                    1.0
                } else {
                    issues.push(format!(
                        "README is too short ({} characters, expected at least {})",
                        chars, ctx.config.min_readme_chars
                    ));
                    recommendations.push("Expand the README with usage instructions".to_string());
                    0.5
                }
            }
        };

        let extensions = ctx.config.normalized_extensions();
        let mut code_lines = 0usize;
        let mut comment_lines = 0usize;
        for entry in tree.files_with_extensions(&extensions) {
            if entry.size > ctx.config.max_file_bytes {
                continue;
            }
            let Some(text) = tree.read_text(self.id(), entry)? else {
                continue;
            };
            for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
                code_lines += 1;
                if is_comment(line) {
                    comment_lines += 1;
                }
            }
        }

        let density_score = if code_lines == 0 {
            1.0
        } else {
            let density = comment_lines as f64 / code_lines as f64;
            if density < TARGET_COMMENT_DENSITY {
                issues.push(format!(
                    "low comment density ({:.1}% of source lines)",
                    density * 100.0
                ));
                recommendations
                    .push("Document public functions and non-obvious logic".to_string());
            }
            (density / TARGET_COMMENT_DENSITY).min(1.0)
        };

        let fraction = README_SHARE * readme_score + (1.0 - README_SHARE) * density_score;
        let mut result =
            StepResult::scored(self.id(), self.kind(), max, fraction).with_issues(issues);
        for rec in recommendations {
            result = result.with_recommendation(rec);
        }
        Ok(result)
    }
}

fn is_comment(line: &str) -> bool {
    ["//", "#", "/*", "*", "\"\"\"", "'''", "--"]
        .iter()
        .any(|prefix| line.starts_with(prefix))
        && !line.starts_with("#[")
        && !line.starts_with("#!")
        && !line.starts_with("#include")
}
