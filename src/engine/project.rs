//! One project: its graph, board, agent pool and verification records.

use crate::agent::{Agent, AgentPool};
use crate::error::{GraphError, Result};
use crate::graph::TaskGraph;
use crate::kanban::KanbanBoard;
use crate::snapshot::{ProjectSnapshot, SNAPSHOT_VERSION};
use crate::task::{Task, TaskStatus};
use crate::verify::{RemediationPlan, VerificationResult};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Key of the orchestrator's project store.
pub type ProjectId = String;

/// State of one project.
///
/// Task status lives both in the graph (on each [`Task`]) and on the kanban
/// board. [`Project::transition`] is the only place that changes it, and it
/// changes both or neither.
#[derive(Debug, Clone)]
pub struct Project {
    id: ProjectId,
    name: String,
    created_at: DateTime<Utc>,
    graph: TaskGraph,
    board: KanbanBoard,
    pool: AgentPool,
    assignments: BTreeMap<String, String>,
    queues: BTreeMap<String, Vec<String>>,
    histories: BTreeMap<String, Vec<VerificationResult>>,
    plans: BTreeMap<String, RemediationPlan>,
}

impl Project {
    /// Build the graph, put every task in `todo` and assign agents.
    pub fn new(
        id: impl Into<ProjectId>,
        name: impl Into<String>,
        mut tasks: Vec<Task>,
        mut pool: AgentPool,
    ) -> std::result::Result<Self, GraphError> {
        for task in &mut tasks {
            if task.status != TaskStatus::Todo {
                tracing::warn!(task_id = %task.id, status = %task.status, "input status ignored");
            }
            task.reset_engine_state();
        }
        let mut graph = TaskGraph::build(tasks)?;
        let board = KanbanBoard::new(graph.tasks().iter().map(|t| t.id.clone()));
        let queues = pool.assign_all(graph.tasks());

        let mut assignments = BTreeMap::new();
        for (agent_id, task_ids) in &queues {
            for task_id in task_ids {
                assignments.insert(task_id.clone(), agent_id.clone());
                if let Some(task) = graph.get_mut(task_id) {
                    task.set_assigned(agent_id);
                }
            }
        }

        Ok(Self {
            id: id.into(),
            name: name.into(),
            created_at: Utc::now(),
            graph,
            board,
            pool,
            assignments,
            queues,
            histories: BTreeMap::new(),
            plans: BTreeMap::new(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    pub fn board(&self) -> &KanbanBoard {
        &self.board
    }

    pub fn pool(&self) -> &AgentPool {
        &self.pool
    }

    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.graph.get(task_id)
    }

    /// Agent id a task is bound to.
    pub fn assignment(&self, task_id: &str) -> Option<&str> {
        self.assignments.get(task_id).map(String::as_str)
    }

    pub fn assignments(&self) -> &BTreeMap<String, String> {
        &self.assignments
    }

    /// Per-agent work queues, in task order.
    pub fn queues(&self) -> &BTreeMap<String, Vec<String>> {
        &self.queues
    }

    /// Verification results for a task, oldest first.
    pub fn history(&self, task_id: &str) -> &[VerificationResult] {
        self.histories.get(task_id).map_or(&[], Vec::as_slice)
    }

    /// Latest remediation plan for a blocked, failed or retried task.
    pub fn plan(&self, task_id: &str) -> Option<&RemediationPlan> {
        self.plans.get(task_id)
    }

    /// Ids of `todo` tasks that can no longer become ready.
    pub fn stranded(&self) -> Vec<String> {
        self.graph.stranded_tasks()
    }

    pub fn is_complete(&self) -> bool {
        self.graph.is_complete()
    }

    /// Move a task on the board and update its status.
    ///
    /// Returns false (and changes nothing) when the board refuses the move.
    pub(crate) fn transition(
        &mut self,
        task_id: &str,
        to: TaskStatus,
        agent_id: Option<&str>,
    ) -> bool {
        let Some(from) = self.graph.status_of(task_id) else {
            tracing::warn!(task_id, %to, "transition for unknown task ignored");
            return false;
        };
        if !self.board.move_task(task_id, from, to, agent_id) {
            return false;
        }
        if let Err(e) = self.graph.set_status(task_id, to) {
            tracing::warn!(task_id, error = %e, "status update failed after board move");
        }
        true
    }

    pub(crate) fn task_mut(&mut self, task_id: &str) -> Option<&mut Task> {
        self.graph.get_mut(task_id)
    }

    pub(crate) fn pool_mut(&mut self) -> &mut AgentPool {
        &mut self.pool
    }

    /// Bind a task to an agent that was chosen after project creation.
    pub(crate) fn bind(&mut self, task_id: &str, agent_id: &str) {
        self.assignments
            .insert(task_id.to_string(), agent_id.to_string());
        let queue = self.queues.entry(agent_id.to_string()).or_default();
        if !queue.iter().any(|id| id == task_id) {
            queue.push(task_id.to_string());
        }
        if let Some(task) = self.graph.get_mut(task_id) {
            task.set_assigned(agent_id);
        }
    }

    /// Append a verification result and merge its findings into the task.
    pub(crate) fn record_verification(&mut self, task_id: &str, result: VerificationResult) {
        if let Some(task) = self.graph.get_mut(task_id) {
            task.record_findings(result.score, &result.issues(), &result.recommendations());
        }
        self.histories
            .entry(task_id.to_string())
            .or_default()
            .push(result);
    }

    pub(crate) fn set_plan(&mut self, task_id: &str, plan: RemediationPlan) {
        self.plans.insert(task_id.to_string(), plan);
    }

    /// Return a blocked task to `todo` with a fresh retry budget.
    ///
    /// Its remediation plan is kept and fed to the next attempt.
    pub fn release_blocked(&mut self, task_id: &str) -> bool {
        if self.graph.status_of(task_id) != Some(TaskStatus::Blocked) {
            return false;
        }
        if !self.transition(task_id, TaskStatus::Todo, None) {
            return false;
        }
        if let Some(task) = self.graph.get_mut(task_id) {
            task.retry_count = 0;
        }
        tracing::info!(project_id = %self.id, task_id, "blocked task released");
        true
    }

    /// Capture the project as a snapshot.
    pub fn snapshot(&self) -> ProjectSnapshot {
        let agents = self
            .pool
            .agents()
            .iter()
            .cloned()
            .map(|mut agent| {
                agent.assigned.clear();
                agent
            })
            .collect();

        ProjectSnapshot {
            version: SNAPSHOT_VERSION,
            project_id: self.id.clone(),
            name: self.name.clone(),
            created_at: self.created_at,
            saved_at: Utc::now(),
            tasks: self.graph.tasks().to_vec(),
            edges: self.graph.edges().to_vec(),
            board: self.board.clone(),
            assignments: self.assignments.clone(),
            agents,
            histories: self.histories.clone(),
            plans: self.plans.clone(),
        }
    }

    /// Rebuild a project from a snapshot.
    ///
    /// Tasks that were `inProgress`, `review` or `revision` when the snapshot
    /// was taken had a worker or verifier that no longer exists; they go back
    /// to `todo`.
    pub fn from_snapshot(snapshot: ProjectSnapshot, fallback: Agent) -> Result<Self> {
        snapshot.validate()?;
        let ProjectSnapshot {
            project_id,
            name,
            created_at,
            tasks,
            edges,
            mut board,
            assignments,
            agents,
            histories,
            plans,
            ..
        } = snapshot;

        let mut graph = TaskGraph::from_parts(tasks, edges)?;

        let interrupted: Vec<String> = graph
            .tasks()
            .iter()
            .filter(|t| t.status.is_active() || t.status == TaskStatus::Revision)
            .map(|t| t.id.clone())
            .collect();
        for task_id in &interrupted {
            board.place(task_id, TaskStatus::Todo);
            graph.set_status(task_id, TaskStatus::Todo)?;
        }
        if !interrupted.is_empty() {
            tracing::info!(
                project_id = %project_id,
                tasks = ?interrupted,
                "interrupted tasks reset to todo"
            );
        }

        let mut queues: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for task in graph.tasks() {
            if let Some(agent_id) = assignments.get(&task.id) {
                queues
                    .entry(agent_id.clone())
                    .or_default()
                    .push(task.id.clone());
            }
        }

        let mut pool = AgentPool::new(agents, fallback);
        pool.clear_slots();

        Ok(Self {
            id: project_id,
            name,
            created_at,
            graph,
            board,
            pool,
            assignments,
            queues,
            histories,
            plans,
        })
    }
}
