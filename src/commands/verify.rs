//! Implementation of the `taskgate verify` command.

use super::{Settings, print_json};
use crate::cli::{GlobalArgs, VerifyArgs};
use serde_json::json;
use std::sync::Arc;
use taskgate::error::{Result, TaskgateError};
use taskgate::runner::SystemRunner;
use taskgate::verify::{RemediationPlan, StepStatus, VerificationPipeline, VerificationResult};

/// Execute the `taskgate verify` command.
///
/// Runs the configured steps against a directory and fails with the
/// verification exit code when the result does not pass.
pub fn cmd_verify(global: &GlobalArgs, args: VerifyArgs) -> Result<()> {
    let Settings { config, .. } = Settings::load(global)?;

    if !args.dir.is_dir() {
        return Err(TaskgateError::UserError(format!(
            "'{}' is not a directory",
            args.dir.display()
        )));
    }

    let pipeline = VerificationPipeline::from_config(config.verification, Arc::new(SystemRunner));
    let result = pipeline.verify_dir(&args.dir);
    let plan = (!result.passed && args.plan).then(|| RemediationPlan::from_result(&result, &[]));

    if args.json {
        print_json(&json!({ "result": result, "plan": plan }))?;
    } else {
        print_result(&result);
        if let Some(plan) = &plan {
            print_plan(plan);
        }
    }

    if !result.passed {
        return Err(TaskgateError::VerificationFailed(result.summary()));
    }
    Ok(())
}

fn print_result(result: &VerificationResult) {
    println!("Verification");
    println!("============");
    for step in &result.steps {
        let marker = match step.status {
            StepStatus::Pass => "PASS",
            StepStatus::Fail => "FAIL",
            StepStatus::Skip => "SKIP",
        };
        println!(
            "  [{}] {:14} {:>5.2}/{:<5.2}",
            marker,
            step.step.as_str(),
            step.achieved,
            step.max_score
        );
        for issue in &step.issues {
            println!("         - {}", issue);
        }
    }
    println!();
    println!("Score: {:.2}", result.score);
    if let Some(severity) = result.severity {
        println!("Severity: {}", severity);
    }
    println!(
        "Deployment ready: {}",
        if result.deployment_ready { "yes" } else { "no" }
    );
}

fn print_plan(plan: &RemediationPlan) {
    println!();
    println!("Remediation plan (~{} min):", plan.estimated_minutes);
    for fix in &plan.fixes {
        println!("  {}. [{}] {}", fix.priority, fix.category.as_str(), fix.description);
    }
}
