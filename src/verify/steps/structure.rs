use super::{StepContext, VerificationStep};
use crate::config::StepId;
use crate::error::VerificationError;
use crate::verify::tree::build_globset;
use crate::verify::types::{StepKind, StepResult};

/// Gate: the project directory exists, has files, and every required glob matches.
pub struct StructureStep;

impl VerificationStep for StructureStep {
    fn id(&self) -> StepId {
        StepId::Structure
    }

    fn kind(&self) -> StepKind {
        StepKind::Gate
    }

    fn run(&self, ctx: &StepContext<'_>) -> Result<StepResult, VerificationError> {
        let max = ctx.weight(self.id());
        let tree = ctx.tree;

        if !tree.exists() {
            return Ok(StepResult::fail(
                self.id(),
                self.kind(),
                max,
                format!("project directory '{}' does not exist", tree.root().display()),
            )
            .with_recommendation("Create the project files in the task working directory"));
        }

        if tree.is_empty() {
            return Ok(StepResult::fail(
                self.id(),
                self.kind(),
                max,
                "project directory contains no files",
            )
            .with_recommendation("Generate the project files before finishing the task"));
        }

        let mut missing = Vec::new();
        for pattern in &ctx.config.required_files {
            let globs = build_globset(std::slice::from_ref(pattern))?;
            if !tree.any_match(&globs) {
                missing.push(pattern.clone());
            }
        }

        let mut result = if missing.is_empty() {
            StepResult::pass(self.id(), self.kind(), max)
        } else {
            let mut result = StepResult::fail(
                self.id(),
                self.kind(),
                max,
                format!("required files missing: {}", missing.join(", ")),
            );
            for pattern in &missing {
                result = result.with_recommendation(format!("Add a file matching '{}'", pattern));
            }
            result
        };

        for err in tree.walk_errors() {
            result = result.with_issue(format!("could not read part of the tree: {}", err));
        }

        Ok(result)
    }
}
