use super::{StepContext, VerificationStep, output_tail};
use crate::config::StepId;
use crate::error::VerificationError;
use crate::verify::types::{StepKind, StepResult};

/// Gate: the configured start command exits 0, or is still running when the
/// grace period ends (a server that came up). Skipped when not configured.
pub struct RuntimeStep;

impl VerificationStep for RuntimeStep {
    fn id(&self) -> StepId {
        StepId::Runtime
    }

    fn kind(&self) -> StepKind {
        StepKind::Gate
    }

    fn run(&self, ctx: &StepContext<'_>) -> Result<StepResult, VerificationError> {
        let Some(command) = ctx
            .config
            .runtime_command
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
        else {
            return Ok(StepResult::skip(
                self.id(),
                self.kind(),
                "no runtime command configured",
            ));
        };

        let max = ctx.weight(self.id());
        let output = ctx.run_command(self.id(), command, ctx.config.runtime_grace())?;

        // Killed at the grace period means it started and stayed up.
        if output.success || (output.timed_out && output.spawn_error.is_none()) {
            return Ok(StepResult::pass(self.id(), self.kind(), max));
        }

        Ok(StepResult::fail(
            self.id(),
            self.kind(),
            max,
            format!("runtime command `{}` {}", command, output.failure_reason()),
        )
        .with_recommendation("Make sure the application starts without crashing")
        .with_output(output_tail(&output)))
    }
}
