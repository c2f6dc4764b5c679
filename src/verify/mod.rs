//! Quality verification for task output.
//!
//! A task's working directory goes through an ordered list of steps. Gates
//! (structure, build, tests, runtime, security) fail the verdict outright;
//! weighted checks (lint, dependencies, documentation, performance) only
//! contribute score. Failed results are classified by [`Severity`] and turned
//! into a [`RemediationPlan`] that drives the retry.

mod patterns;
mod pipeline;
mod remediation;
mod severity;
pub mod steps;
mod tree;
mod types;


pub use patterns::{CompiledPatterns, Finding};
pub use pipeline::{VerificationPipeline, aggregate};
pub use remediation::{Fix, IssueCategory, RemediationPlan};
pub use severity::{Severity, classify_severity};
pub use tree::{FileEntry, FileTree};
pub use types::{StepKind, StepResult, StepStatus, VerificationResult};
