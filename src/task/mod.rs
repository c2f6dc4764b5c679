//! Task model for taskgate.
//!
//! A task is one unit of decomposed work: it names the skills it needs, the
//! tasks it depends on, and carries the mutable state the engine and the
//! verification pipeline write back (status, score, findings, retries).
//!
//! Task lists come from an upstream decomposition step as YAML or JSON:
//!
//! ```text
//! tasks:
//!   - id: api
//!     title: Build the REST API
//!     type: backend
//!     priority: high
//!     estimated_hours: 4
//!     required_skills: [rust, http]
//!     dependencies: [schema]
//! ```
//!
//! Every optional field is defaulted at deserialization time so the rest of
//! the crate never deals with missing values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

mod io;
mod mutations;

pub use io::{TaskList, load_tasks, parse_tasks};

/// Lifecycle state of a task. Each state is also a kanban column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Revision,
    Review,
    Completed,
    Blocked,
    Failed,
}

impl TaskStatus {
    /// All statuses in board order.
    pub const ALL: [TaskStatus; 7] = [
        TaskStatus::Todo,
        TaskStatus::InProgress,
        TaskStatus::Revision,
        TaskStatus::Review,
        TaskStatus::Completed,
        TaskStatus::Blocked,
        TaskStatus::Failed,
    ];

    /// Column name as used on the board and in snapshots.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "inProgress",
            TaskStatus::Revision => "revision",
            TaskStatus::Review => "review",
            TaskStatus::Completed => "completed",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Failed => "failed",
        }
    }

    /// Whether the task will not move again without outside intervention.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Blocked
        )
    }

    /// Whether the task is currently held by a worker or the verifier.
    pub fn is_active(&self) -> bool {
        matches!(self, TaskStatus::InProgress | TaskStatus::Review)
    }

    /// Whether a transition from `self` to `to` is part of the state machine.
    pub fn can_transition_to(&self, to: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, to),
            (Todo, InProgress)
                | (InProgress, Review)
                | (InProgress, Completed)
                | (InProgress, Revision)
                | (InProgress, Failed)
                | (InProgress, Blocked)
                | (Review, Completed)
                | (Review, Revision)
                | (Review, Failed)
                | (Review, Blocked)
                | (Revision, InProgress)
                | (Revision, Failed)
                | (Revision, Blocked)
                | (Blocked, Todo)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task priority. Ready tasks are dispatched high first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[serde(alias = "critical", alias = "urgent")]
    High,
    #[default]
    #[serde(alias = "normal")]
    Medium,
    Low,
}

impl Priority {
    /// Sort rank, lower runs first.
    pub fn rank(&self) -> u32 {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }
}

/// How a task reached `completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompletionKind {
    /// Verification passed.
    Verified,
    /// The per-task deadline expired and completion was forced.
    #[serde(rename = "completed-via-timeout")]
    Timeout,
}

/// A single task node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    // =========================================================================
    // Decomposition input
    // =========================================================================
    /// Unique task identifier.
    pub id: String,

    /// Short title.
    pub title: String,

    /// Full description handed to the worker.
    #[serde(default)]
    pub description: String,

    /// Category tag (e.g. "backend", "frontend", "docs").
    #[serde(default = "default_task_type", rename = "type", alias = "task_type")]
    pub task_type: String,

    #[serde(default)]
    pub priority: Priority,

    /// Estimated effort in hours.
    #[serde(default = "default_estimated_hours")]
    pub estimated_hours: f64,

    #[serde(default)]
    pub required_skills: Vec<String>,

    /// Ids of tasks that must complete before this one starts.
    #[serde(default, alias = "depends_on")]
    pub dependencies: Vec<String>,

    /// Explicit agent id, bypassing skill scoring.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,

    // =========================================================================
    // Engine state
    // =========================================================================
    #[serde(default)]
    pub status: TaskStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_agent: Option<String>,

    /// Score of the most recent verification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_score: Option<f64>,

    #[serde(default)]
    pub issues: Vec<String>,

    #[serde(default)]
    pub recommendations: Vec<String>,

    /// Automatic retries already spent.
    #[serde(default)]
    pub retry_count: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion: Option<CompletionKind>,

    // =========================================================================
    // Lifecycle timestamps
    // =========================================================================
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

fn default_task_type() -> String {
    "general".to_string()
}

fn default_estimated_hours() -> f64 {
    1.0
}

impl Task {
    /// Create a task with defaults for every optional field.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            task_type: default_task_type(),
            priority: Priority::default(),
            estimated_hours: default_estimated_hours(),
            required_skills: Vec::new(),
            dependencies: Vec::new(),
            agent: None,
            status: TaskStatus::Todo,
            assigned_agent: None,
            verification_score: None,
            issues: Vec::new(),
            recommendations: Vec::new(),
            retry_count: 0,
            completion: None,
            created_at: None,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_type(mut self, task_type: impl Into<String>) -> Self {
        self.task_type = task_type.into();
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_skills<I, S>(mut self, skills: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_skills = skills.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent = Some(agent_id.into());
        self
    }

    /// Required skills normalized to lowercase, without blanks or duplicates.
    pub fn normalized_skills(&self) -> Vec<String> {
        let mut skills: Vec<String> = Vec::new();
        for skill in &self.required_skills {
            let skill = skill.trim().to_lowercase();
            if !skill.is_empty() && !skills.contains(&skill) {
                skills.push(skill);
            }
        }
        skills
    }
}
