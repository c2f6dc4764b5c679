//! Verification steps.
//!
//! Each step is a pure function of a [`FileTree`] snapshot and the
//! [`VerificationConfig`]; command-driven steps reach the outside world only
//! through the [`CommandRunner`] in the context.

mod build;
mod dependencies;
mod documentation;
mod lint;
mod performance;
mod runtime;
mod security;
mod structure;

#[cfg(test)]
mod tests;

pub use build::{CommandGate, detect_command};
pub use dependencies::DependenciesStep;
pub use documentation::DocumentationStep;
pub use lint::LintStep;
pub use performance::PerformanceStep;
pub use runtime::RuntimeStep;
pub use security::SecurityStep;
pub use structure::StructureStep;

use super::tree::FileTree;
use super::types::{StepKind, StepResult};
use crate::config::{StepId, VerificationConfig};
use crate::error::VerificationError;
use crate::runner::{
    CommandOutput, CommandRunner, CommandSpec, REPORT_MAX_CHARS, REPORT_MAX_LINES,
    truncate_output,
};
use std::time::Duration;

/// Findings listed individually before the rest are summarized as a count.
pub(crate) const MAX_LISTED_FINDINGS: usize = 10;

/// Inputs shared by every step in one run.
pub struct StepContext<'a> {
    pub tree: &'a FileTree,
    pub config: &'a VerificationConfig,
    pub runner: &'a dyn CommandRunner,
}

impl StepContext<'_> {
    /// Maximum score for a step, from the configured weights.
    pub fn weight(&self, id: StepId) -> f64 {
        self.config.weights.weight(id)
    }

    /// Parse and run a command line in the project root.
    pub fn run_command(
        &self,
        step: StepId,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, VerificationError> {
        let spec = CommandSpec::parse(command)
            .map_err(|e| VerificationError::Command {
                step: step.to_string(),
                message: e.to_string(),
            })?
            .cwd(self.tree.root())
            .timeout(timeout);

        tracing::debug!(step = %step, command = %spec, "running verification command");
        Ok(self.runner.run(&spec))
    }
}

/// One stage of the verification pipeline.
pub trait VerificationStep: Send + Sync {
    fn id(&self) -> StepId;

    fn kind(&self) -> StepKind;

    fn name(&self) -> &'static str {
        self.id().as_str()
    }

    fn max_score(&self, config: &VerificationConfig) -> f64 {
        config.weights.weight(self.id())
    }

    fn run(&self, ctx: &StepContext<'_>) -> Result<StepResult, VerificationError>;
}

/// The step implementation for an id.
pub fn step_for(id: StepId) -> Box<dyn VerificationStep> {
    match id {
        StepId::Structure => Box::new(StructureStep),
        StepId::Build => Box::new(CommandGate::build()),
        StepId::Tests => Box::new(CommandGate::tests()),
        StepId::Runtime => Box::new(RuntimeStep),
        StepId::Security => Box::new(SecurityStep),
        StepId::Lint => Box::new(LintStep),
        StepId::Dependencies => Box::new(DependenciesStep),
        StepId::Documentation => Box::new(DocumentationStep),
        StepId::Performance => Box::new(PerformanceStep),
    }
}

/// Command output tail for a step report.
pub(crate) fn output_tail(output: &CommandOutput) -> String {
    truncate_output(&output.combined(), REPORT_MAX_LINES, REPORT_MAX_CHARS)
}
