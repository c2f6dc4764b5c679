//! Task dependency graph.
//!
//! Nodes are kept in insertion order and edges point from a dependency to the
//! task that waits on it. Readiness is recomputed by a full scan on every call
//! to [`TaskGraph::ready_tasks`]; graphs are small (tens to hundreds of tasks)
//! and a scan cannot drift out of sync with concurrent status updates the way
//! an incremental ready-set can.

use crate::error::GraphError;
use crate::task::{Task, TaskStatus};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};


/// A directed dependency edge: `to` cannot start until `from` is completed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
}

impl Edge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Ordered task nodes plus dependency edges.
#[derive(Debug, Clone, Default)]
pub struct TaskGraph {
    tasks: Vec<Task>,
    index: HashMap<String, usize>,
    edges: Vec<Edge>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from a decomposed task list.
    ///
    /// Dependencies may reference tasks that appear later in the list. Every
    /// reference is checked, duplicates are rejected, and the finished graph
    /// is checked for cycles before it is returned.
    pub fn build(tasks: Vec<Task>) -> Result<Self, GraphError> {
        let mut seen = HashSet::new();
        for task in &tasks {
            check_task_id(&task.id)?;
            if !seen.insert(task.id.as_str()) {
                return Err(GraphError::DuplicateTask(task.id.clone()));
            }
        }

        for task in &tasks {
            for dep in &task.dependencies {
                if !seen.contains(dep.as_str()) {
                    return Err(GraphError::InvalidDependency {
                        task: task.id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        let mut graph = Self::new();
        for mut task in tasks {
            let deps = dedup(&task.dependencies);
            task.dependencies = deps.clone();
            for dep in deps {
                graph.edges.push(Edge::new(dep, task.id.clone()));
            }
            graph.index.insert(task.id.clone(), graph.tasks.len());
            graph.tasks.push(task);
        }

        if let Some(cycle) = graph.detect_cycle() {
            return Err(GraphError::CycleDetected(cycle));
        }

        Ok(graph)
    }

    /// Rebuild a graph from persisted nodes and edges.
    ///
    /// Each task's `dependencies` list is rewritten from the edges so the two
    /// cannot disagree after a restore.
    pub fn from_parts(tasks: Vec<Task>, edges: Vec<Edge>) -> Result<Self, GraphError> {
        let mut graph = Self::new();
        for mut task in tasks {
            check_task_id(&task.id)?;
            if graph.index.contains_key(&task.id) {
                return Err(GraphError::DuplicateTask(task.id));
            }
            task.dependencies.clear();
            graph.index.insert(task.id.clone(), graph.tasks.len());
            graph.tasks.push(task);
        }

        for edge in edges {
            if !graph.index.contains_key(&edge.from) {
                return Err(GraphError::InvalidDependency {
                    task: edge.to,
                    dependency: edge.from,
                });
            }
            let Some(&to_idx) = graph.index.get(&edge.to) else {
                return Err(GraphError::UnknownTask(edge.to));
            };
            let deps = &mut graph.tasks[to_idx].dependencies;
            if !deps.contains(&edge.from) {
                deps.push(edge.from.clone());
                graph.edges.push(edge);
            }
        }

        if let Some(cycle) = graph.detect_cycle() {
            return Err(GraphError::CycleDetected(cycle));
        }

        Ok(graph)
    }

    /// Insert a task whose dependencies are already in the graph.
    ///
    /// The task's own `dependencies` field is replaced by `dependencies`.
    pub fn add_task(&mut self, mut task: Task, dependencies: &[String]) -> Result<(), GraphError> {
        check_task_id(&task.id)?;
        if self.index.contains_key(&task.id) {
            return Err(GraphError::DuplicateTask(task.id));
        }

        for dep in dependencies {
            if !self.index.contains_key(dep) {
                return Err(GraphError::InvalidDependency {
                    task: task.id.clone(),
                    dependency: dep.clone(),
                });
            }
        }

        let deps = dedup(dependencies);
        for dep in &deps {
            self.edges.push(Edge::new(dep.clone(), task.id.clone()));
        }
        task.dependencies = deps;
        self.index.insert(task.id.clone(), self.tasks.len());
        self.tasks.push(task);
        Ok(())
    }

    /// Add a single edge between two existing tasks.
    ///
    /// An edge that would close a cycle is rejected and not kept.
    pub fn add_dependency(&mut self, dependency: &str, dependent: &str) -> Result<(), GraphError> {
        if !self.index.contains_key(dependency) {
            return Err(GraphError::InvalidDependency {
                task: dependent.to_string(),
                dependency: dependency.to_string(),
            });
        }
        let Some(&idx) = self.index.get(dependent) else {
            return Err(GraphError::UnknownTask(dependent.to_string()));
        };

        if self.tasks[idx].dependencies.iter().any(|d| d == dependency) {
            return Ok(());
        }

        self.tasks[idx].dependencies.push(dependency.to_string());
        self.edges.push(Edge::new(dependency, dependent));

        if let Some(cycle) = self.detect_cycle() {
            self.tasks[idx].dependencies.pop();
            self.edges.pop();
            return Err(GraphError::CycleDetected(cycle));
        }

        Ok(())
    }

    /// Find a dependency cycle, if any.
    ///
    /// Traversal starts from nodes in insertion order, so the reported path
    /// is deterministic. The path starts and ends on the same id.
    pub fn detect_cycle(&self) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            InPath,
            Done,
        }

        fn visit(
            node: usize,
            adjacency: &[Vec<usize>],
            marks: &mut [Mark],
            path: &mut Vec<usize>,
        ) -> Option<Vec<usize>> {
            marks[node] = Mark::InPath;
            path.push(node);

            for &next in &adjacency[node] {
                match marks[next] {
                    Mark::InPath => {
                        let start = path.iter().position(|&n| n == next).unwrap_or(0);
                        let mut cycle = path[start..].to_vec();
                        cycle.push(next);
                        return Some(cycle);
                    }
                    Mark::Unvisited => {
                        if let Some(cycle) = visit(next, adjacency, marks, path) {
                            return Some(cycle);
                        }
                    }
                    Mark::Done => {}
                }
            }

            path.pop();
            marks[node] = Mark::Done;
            None
        }

        let adjacency = self.adjacency();
        let mut marks = vec![Mark::Unvisited; self.tasks.len()];
        let mut path = Vec::new();

        for start in 0..self.tasks.len() {
            if marks[start] != Mark::Unvisited {
                continue;
            }
            if let Some(cycle) = visit(start, &adjacency, &mut marks, &mut path) {
                return Some(
                    cycle
                        .into_iter()
                        .map(|i| self.tasks[i].id.clone())
                        .collect(),
                );
            }
        }

        None
    }

    /// Tasks in `todo` whose dependencies are all `completed`, in insertion order.
    pub fn ready_tasks(&self) -> Vec<&Task> {
        let mut incoming: HashMap<&str, Vec<&str>> = HashMap::new();
        for edge in &self.edges {
            incoming
                .entry(edge.to.as_str())
                .or_default()
                .push(edge.from.as_str());
        }

        self.tasks
            .iter()
            .filter(|task| task.status == TaskStatus::Todo)
            .filter(|task| {
                incoming.get(task.id.as_str()).is_none_or(|deps| {
                    deps.iter()
                        .all(|dep| self.status_of(dep) == Some(TaskStatus::Completed))
                })
            })
            .collect()
    }

    /// Ids of [`ready_tasks`](Self::ready_tasks), ordered for dispatch:
    /// priority first, insertion order among equal priorities.
    pub fn dispatch_order(&self) -> Vec<String> {
        let mut ready = self.ready_tasks();
        // sort_by_key is stable, so insertion order breaks ties.
        ready.sort_by_key(|task| task.priority.rank());
        ready.into_iter().map(|task| task.id.clone()).collect()
    }

    /// True iff every task is `completed`. An empty graph is complete.
    pub fn is_complete(&self) -> bool {
        self.tasks
            .iter()
            .all(|task| task.status == TaskStatus::Completed)
    }

    /// Tasks left in `todo` that can never become ready because some
    /// dependency (directly or transitively) ended in `failed` or `blocked`.
    pub fn stranded_tasks(&self) -> Vec<String> {
        let mut stranded: HashSet<&str> = HashSet::new();

        // Levels are in topological order, so a dependency is classified
        // before any task that waits on it.
        for level in self.levels() {
            for id in level {
                let Some(task) = self.get(&id) else { continue };
                if task.status != TaskStatus::Todo {
                    continue;
                }
                let dead = task.dependencies.iter().any(|dep| {
                    stranded.contains(dep.as_str())
                        || matches!(
                            self.status_of(dep),
                            Some(TaskStatus::Failed) | Some(TaskStatus::Blocked)
                        )
                });
                if dead {
                    stranded.insert(task.id.as_str());
                }
            }
        }

        self.tasks
            .iter()
            .filter(|t| stranded.contains(t.id.as_str()))
            .map(|t| t.id.clone())
            .collect()
    }

    /// Group task ids into dependency levels (level 0 has no dependencies).
    ///
    /// Tasks inside a cycle never reach a level and are omitted; graphs built
    /// through this module are acyclic.
    pub fn levels(&self) -> Vec<Vec<String>> {
        let mut remaining: Vec<usize> = self
            .tasks
            .iter()
            .map(|task| task.dependencies.len())
            .collect();
        let adjacency = self.adjacency();

        let mut current: Vec<usize> = (0..self.tasks.len())
            .filter(|&i| remaining[i] == 0)
            .collect();
        let mut levels = Vec::new();

        while !current.is_empty() {
            let mut next = Vec::new();
            for &node in &current {
                for &dependent in &adjacency[node] {
                    remaining[dependent] -= 1;
                    if remaining[dependent] == 0 {
                        next.push(dependent);
                    }
                }
            }
            next.sort_unstable();
            levels.push(
                current
                    .iter()
                    .map(|&i| self.tasks[i].id.clone())
                    .collect(),
            );
            current = next;
        }

        levels
    }

    /// Whether any task can still make progress without outside help.
    pub fn has_pending_work(&self) -> bool {
        let stranded = self.stranded_tasks();
        self.tasks.iter().any(|task| match task.status {
            TaskStatus::Todo => !stranded.contains(&task.id),
            TaskStatus::InProgress | TaskStatus::Review | TaskStatus::Revision => true,
            _ => false,
        })
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.index.get(id).map(|&i| &self.tasks[i])
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.index.get(id).map(|&i| &mut self.tasks[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn status_of(&self, id: &str) -> Option<TaskStatus> {
        self.get(id).map(|task| task.status)
    }

    /// Overwrite a task's status.
    ///
    /// This does not touch the kanban board; the engine changes status only
    /// through `Project::transition`, which updates both.
    pub fn set_status(&mut self, id: &str, status: TaskStatus) -> Result<(), GraphError> {
        let task = self
            .get_mut(id)
            .ok_or_else(|| GraphError::UnknownTask(id.to_string()))?;
        task.status = status;
        Ok(())
    }

    /// All tasks in insertion order.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Ids this task waits on.
    pub fn dependencies_of(&self, id: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.to == id)
            .map(|e| e.from.as_str())
            .collect()
    }

    /// Ids that wait on this task.
    pub fn dependents_of(&self, id: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.from == id)
            .map(|e| e.to.as_str())
            .collect()
    }

    /// Number of tasks per status.
    pub fn status_counts(&self) -> BTreeMap<TaskStatus, usize> {
        let mut counts: BTreeMap<TaskStatus, usize> =
            TaskStatus::ALL.iter().map(|s| (*s, 0)).collect();
        for task in &self.tasks {
            *counts.entry(task.status).or_insert(0) += 1;
        }
        counts
    }

    /// Dependents adjacency by node index, in edge insertion order.
    fn adjacency(&self) -> Vec<Vec<usize>> {
        let mut adjacency = vec![Vec::new(); self.tasks.len()];
        for edge in &self.edges {
            if let (Some(&from), Some(&to)) = (self.index.get(&edge.from), self.index.get(&edge.to))
            {
                adjacency[from].push(to);
            }
        }
        adjacency
    }
}

fn dedup(ids: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(ids.len());
    for id in ids {
        if !out.contains(id) {
            out.push(id.clone());
        }
    }
    out
}

/// Task ids name the task's working directory and log directory, so each
/// must be a single plain path component.
fn check_task_id(id: &str) -> Result<(), GraphError> {
    let reason = if id.trim().is_empty() {
        Some("id is empty")
    } else if id.contains(['/', '\\']) {
        Some("id contains a path separator")
    } else if id == "." || id == ".." {
        Some("id is a relative path component")
    } else if id.contains(':') || id.contains('\0') {
        Some("id contains ':' or a NUL byte")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(GraphError::InvalidTaskId {
            task: id.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}
