//! Remediation plans for failed verifications.
//!
//! A plan groups a result's issues by category, orders fixes so the ones
//! that unblock everything else come first, estimates the effort, and renders
//! an improvement instruction for the next worker attempt.

use super::types::{StepStatus, VerificationResult};
use crate::config::StepId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Issue category. Declaration order is fix priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCategory {
    Security,
    Build,
    Tests,
    Runtime,
    Structure,
    Lint,
    Dependencies,
    Documentation,
    Performance,
    Other,
}

impl IssueCategory {
    pub fn from_step(step: StepId) -> Self {
        match step {
            StepId::Security => IssueCategory::Security,
            StepId::Build => IssueCategory::Build,
            StepId::Tests => IssueCategory::Tests,
            StepId::Runtime => IssueCategory::Runtime,
            StepId::Structure => IssueCategory::Structure,
            StepId::Lint => IssueCategory::Lint,
            StepId::Dependencies => IssueCategory::Dependencies,
            StepId::Documentation => IssueCategory::Documentation,
            StepId::Performance => IssueCategory::Performance,
        }
    }

    /// Estimated minutes to fix one issue in this category.
    pub fn minutes_per_issue(&self) -> u32 {
        match self {
            IssueCategory::Security => 30,
            IssueCategory::Build => 20,
            IssueCategory::Tests => 25,
            IssueCategory::Runtime => 20,
            IssueCategory::Structure => 10,
            IssueCategory::Lint => 5,
            IssueCategory::Dependencies => 10,
            IssueCategory::Documentation => 10,
            IssueCategory::Performance => 15,
            IssueCategory::Other => 10,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IssueCategory::Security => "security",
            IssueCategory::Build => "build",
            IssueCategory::Tests => "tests",
            IssueCategory::Runtime => "runtime",
            IssueCategory::Structure => "structure",
            IssueCategory::Lint => "lint",
            IssueCategory::Dependencies => "dependencies",
            IssueCategory::Documentation => "documentation",
            IssueCategory::Performance => "performance",
            IssueCategory::Other => "other",
        }
    }
}

impl fmt::Display for IssueCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ordered fix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fix {
    /// 1-based position in the plan.
    pub priority: u32,
    pub category: IssueCategory,
    pub description: String,
}

/// Structured guidance derived from a failed verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationPlan {
    pub issues: BTreeMap<IssueCategory, Vec<String>>,
    pub fixes: Vec<Fix>,
    pub estimated_minutes: u32,
    /// Text appended to the worker prompt on the next attempt.
    pub instruction: String,
}

impl RemediationPlan {
    /// Build a plan from a verification result.
    ///
    /// `extra_issues` (for example a worker error) land in the `other` category.
    pub fn from_result(result: &VerificationResult, extra_issues: &[String]) -> Self {
        let mut issues: BTreeMap<IssueCategory, Vec<String>> = BTreeMap::new();
        let mut recommendations: BTreeMap<IssueCategory, Vec<String>> = BTreeMap::new();

        for step in result.steps.iter().filter(|s| s.status != StepStatus::Skip) {
            let category = IssueCategory::from_step(step.step);
            if !step.issues.is_empty() {
                issues
                    .entry(category)
                    .or_default()
                    .extend(step.issues.iter().cloned());
            }
            if !step.recommendations.is_empty() {
                recommendations
                    .entry(category)
                    .or_default()
                    .extend(step.recommendations.iter().cloned());
            }
        }
        if !extra_issues.is_empty() {
            issues
                .entry(IssueCategory::Other)
                .or_default()
                .extend(extra_issues.iter().cloned());
        }

        Self::assemble(issues, recommendations, result)
    }

    /// A plan for a task that failed before verification could run.
    pub fn from_error(message: &str, attempt: u32) -> Self {
        let mut issues = BTreeMap::new();
        issues.insert(IssueCategory::Other, vec![message.to_string()]);
        let fixes = vec![Fix {
            priority: 1,
            category: IssueCategory::Other,
            description: format!("Resolve: {}", message),
        }];
        let instruction = format!(
            "Attempt {} did not produce a result: {}\nInvestigate the failure, then redo the task.",
            attempt, message
        );
        Self {
            issues,
            fixes,
            estimated_minutes: IssueCategory::Other.minutes_per_issue(),
            instruction,
        }
    }

    fn assemble(
        issues: BTreeMap<IssueCategory, Vec<String>>,
        recommendations: BTreeMap<IssueCategory, Vec<String>>,
        result: &VerificationResult,
    ) -> Self {
        let mut fixes = Vec::new();

        // BTreeMap iteration follows IssueCategory order, which is fix priority.
        for (category, category_issues) in &issues {
            let recs = recommendations.get(category).cloned().unwrap_or_default();
            let descriptions = if recs.is_empty() {
                category_issues
                    .iter()
                    .map(|i| format!("Resolve: {}", i))
                    .collect()
            } else {
                recs
            };
            for description in descriptions {
                if fixes.iter().any(|f: &Fix| f.description == description) {
                    continue;
                }
                fixes.push(Fix {
                    priority: fixes.len() as u32 + 1,
                    category: *category,
                    description,
                });
            }
        }

        let estimated_minutes = issues
            .iter()
            .map(|(category, list)| category.minutes_per_issue() * list.len() as u32)
            .sum();

        let instruction = improvement_instruction(result, &issues, &fixes);

        Self {
            issues,
            fixes,
            estimated_minutes,
            instruction,
        }
    }

    pub fn issue_count(&self) -> usize {
        self.issues.values().map(Vec::len).sum()
    }
}

fn improvement_instruction(
    result: &VerificationResult,
    issues: &BTreeMap<IssueCategory, Vec<String>>,
    fixes: &[Fix],
) -> String {
    let mut text = format!(
        "Verification of attempt {} failed with score {:.2}.",
        result.attempt, result.score
    );

    let gates: Vec<&str> = result.gate_failures().map(|s| s.step.as_str()).collect();
    if !gates.is_empty() {
        text.push_str(&format!(" Blocking checks failed: {}.", gates.join(", ")));
    }

    if !issues.is_empty() {
        text.push_str("\n\nIssues found:\n");
        for (category, list) in issues {
            for issue in list {
                text.push_str(&format!("- [{}] {}\n", category, issue));
            }
        }
    }

    if !fixes.is_empty() {
        text.push_str("\nFix them in this order:\n");
        for fix in fixes {
            text.push_str(&format!("{}. {}\n", fix.priority, fix.description));
        }
    }

    text.push_str("\nKeep the parts that already work; change only what is needed to resolve these issues.");
    text
}
