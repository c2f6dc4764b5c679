use super::{MAX_LISTED_FINDINGS, StepContext, VerificationStep};
use crate::config::StepId;
use crate::error::VerificationError;
use crate::verify::types::{StepKind, StepResult};

const OVERSIZED_PENALTY: f64 = 0.1;
const NESTED_PENALTY: f64 = 0.05;

/// Spaces per indentation level; a tab counts as one level.
const INDENT_WIDTH: usize = 4;

/// Weighted: oversized source files and deeply nested code.
pub struct PerformanceStep;

impl VerificationStep for PerformanceStep {
    fn id(&self) -> StepId {
        StepId::Performance
    }

    fn kind(&self) -> StepKind {
        StepKind::Weighted
    }

    fn run(&self, ctx: &StepContext<'_>) -> Result<StepResult, VerificationError> {
        let max = ctx.weight(self.id());
        let config = ctx.config;
        let extensions = config.normalized_extensions();

        let mut oversized = Vec::new();
        let mut nested = Vec::new();

        for entry in ctx.tree.files_with_extensions(&extensions) {
            if entry.size > config.max_file_bytes {
                oversized.push(format!("{} ({} bytes)", entry.path, entry.size));
                continue;
            }
            let Some(text) = ctx.tree.read_text(self.id(), entry)? else {
                continue;
            };

            let lines = text.lines().count();
            if lines > config.max_file_lines {
                oversized.push(format!("{} ({} lines)", entry.path, lines));
            }

            let deepest = text
                .lines()
                .enumerate()
                .filter(|(_, l)| !l.trim().is_empty())
                .map(|(i, l)| (i + 1, nesting_depth(l)))
                .max_by_key(|(_, depth)| *depth);
            if let Some((line, depth)) = deepest
                && depth > config.max_nesting_depth
            {
                nested.push(format!("{}:{} (depth {})", entry.path, line, depth));
            }
        }

        let fraction = 1.0
            - OVERSIZED_PENALTY * oversized.len() as f64
            - NESTED_PENALTY * nested.len() as f64;
        let mut result = StepResult::scored(self.id(), self.kind(), max, fraction);

        if !oversized.is_empty() {
            result = result
                .with_issues(
                    oversized
                        .iter()
                        .take(MAX_LISTED_FINDINGS)
                        .map(|f| format!("oversized file: {}", f)),
                )
                .with_recommendation(format!(
                    "Split files longer than {} lines into smaller modules",
                    config.max_file_lines
                ));
        }
        if !nested.is_empty() {
            result = result
                .with_issues(
                    nested
                        .iter()
                        .take(MAX_LISTED_FINDINGS)
                        .map(|f| format!("deeply nested code: {}", f)),
                )
                .with_recommendation("Flatten deeply nested logic with early returns or helpers");
        }

        Ok(result)
    }
}

/// Indentation level of a line.
pub(crate) fn nesting_depth(line: &str) -> usize {
    let mut spaces = 0;
    let mut tabs = 0;
    for c in line.chars() {
        match c {
            ' ' => spaces += 1,
            '\t' => tabs += 1,
            _ => break,
        }
    }
    tabs + spaces / INDENT_WIDTH
}
