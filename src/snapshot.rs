//! Project snapshots.
//!
//! A snapshot is the whole in-memory state of one project written as a single
//! JSON document: tasks with their scores and findings, dependency edges, the
//! kanban board with its move log, assignments, verification histories and
//! remediation plans.
//!
//! Saves go through [`atomic_write_json`], so a crash never leaves a torn
//! file behind. Loads are validated before anything is rebuilt from them.

use crate::agent::Agent;
use crate::error::{Result, TaskgateError};
use crate::fs::atomic_write_json;
use crate::graph::Edge;
use crate::kanban::KanbanBoard;
use crate::task::Task;
use crate::verify::{RemediationPlan, VerificationResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Format version written by this build.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Persisted state of one project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSnapshot {
    pub version: u32,
    pub project_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub saved_at: DateTime<Utc>,
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    pub board: KanbanBoard,
    /// Task id -> agent id.
    #[serde(default)]
    pub assignments: BTreeMap<String, String>,
    /// The project's agent pool, without running slots.
    #[serde(default)]
    pub agents: Vec<Agent>,
    #[serde(default)]
    pub histories: BTreeMap<String, Vec<VerificationResult>>,
    #[serde(default)]
    pub plans: BTreeMap<String, RemediationPlan>,
}

impl ProjectSnapshot {
    /// Write the snapshot atomically as pretty JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        atomic_write_json(path.as_ref(), self)?;
        tracing::debug!(
            project_id = %self.project_id,
            path = %path.as_ref().display(),
            "snapshot saved"
        );
        Ok(())
    }

    /// Read and validate a snapshot file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            TaskgateError::UserError(format!(
                "failed to read snapshot '{}': {}",
                path.display(),
                e
            ))
        })?;

        let snapshot: ProjectSnapshot = serde_json::from_str(&content).map_err(|e| {
            TaskgateError::UserError(format!(
                "failed to parse snapshot '{}': {}",
                path.display(),
                e
            ))
        })?;

        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Check the version and that the board agrees with the tasks.
    ///
    /// The board must hold every task id exactly once, and each task must sit
    /// in the column that matches its status.
    pub fn validate(&self) -> Result<()> {
        if self.version != SNAPSHOT_VERSION {
            return Err(invalid(format!(
                "unsupported snapshot version {} (expected {})",
                self.version, SNAPSHOT_VERSION
            )));
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for task in &self.tasks {
            if !seen.insert(task.id.as_str()) {
                return Err(invalid(format!("duplicate task id '{}'", task.id)));
            }
        }

        if !self
            .board
            .is_partition(self.tasks.iter().map(|t| t.id.as_str()))
        {
            return Err(invalid(
                "board columns do not partition the task ids".to_string(),
            ));
        }

        for task in &self.tasks {
            let column = self.board.column(&task.id);
            if column != Some(task.status) {
                return Err(invalid(format!(
                    "task '{}' has status {} but sits in column {}",
                    task.id,
                    task.status,
                    column.map_or("none", |c| c.as_str())
                )));
            }
        }

        for (task_id, agent_id) in &self.assignments {
            if !seen.contains(task_id.as_str()) {
                return Err(invalid(format!(
                    "assignment for unknown task '{}' (agent '{}')",
                    task_id, agent_id
                )));
            }
        }

        Ok(())
    }
}

fn invalid(message: String) -> TaskgateError {
    TaskgateError::UserError(format!(
        "invalid snapshot: {}\n\nFix: re-save the project or restore from an earlier snapshot.",
        message
    ))
}
