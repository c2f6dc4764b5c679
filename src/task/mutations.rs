//! Mutation helpers for engine-driven task transitions.
//!
//! Once a task is on a board, its status is changed only through
//! `Project::transition` so that the kanban board and the task stay in step;
//! these helpers cover the other fields that move alongside a transition.

use super::{CompletionKind, Task, TaskStatus};
use chrono::{DateTime, Utc};

impl Task {
    /// Record the agent the task was bound to.
    pub fn set_assigned(&mut self, agent_id: &str) {
        self.assigned_agent = Some(agent_id.to_string());
    }

    /// Stamp the first start time. Retries keep the original start.
    pub fn mark_started(&mut self, time: DateTime<Utc>) {
        if self.started_at.is_none() {
            self.started_at = Some(time);
        }
    }

    /// Record how and when the task reached `completed`.
    pub fn mark_completed(&mut self, kind: CompletionKind, time: DateTime<Utc>) {
        self.completion = Some(kind);
        self.completed_at = Some(time);
    }

    /// Clear everything the engine records on a task, leaving it in `todo`.
    ///
    /// Task lists come from an upstream decomposition and may carry stale
    /// engine fields; a new project starts every task from scratch.
    pub fn reset_engine_state(&mut self) {
        self.status = TaskStatus::Todo;
        self.assigned_agent = None;
        self.verification_score = None;
        self.issues.clear();
        self.recommendations.clear();
        self.retry_count = 0;
        self.completion = None;
        self.started_at = None;
        self.completed_at = None;
    }

    pub fn increment_retry(&mut self) {
        self.retry_count += 1;
    }

    /// Store the latest score and merge findings into the accumulated lists.
    ///
    /// Findings already present are not repeated, so a retry that hits the
    /// same problem does not grow the lists.
    pub fn record_findings(&mut self, score: f64, issues: &[String], recommendations: &[String]) {
        self.verification_score = Some(score);
        self.add_issues(issues.iter().cloned());
        for rec in recommendations {
            if !self.recommendations.contains(rec) {
                self.recommendations.push(rec.clone());
            }
        }
    }

    /// Append issues that are not already recorded.
    pub fn add_issues<I>(&mut self, issues: I)
    where
        I: IntoIterator<Item = String>,
    {
        for issue in issues {
            if !self.issues.contains(&issue) {
                self.issues.push(issue);
            }
        }
    }

    /// Attempt number of the next (or current) worker invocation, 1-based.
    pub fn attempt(&self) -> u32 {
        self.retry_count + 1
    }
}
