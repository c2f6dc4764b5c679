//! Kanban board for taskgate.
//!
//! The board partitions every task id into one column per [`TaskStatus`] and
//! records each move. A move that does not match the board (task not in the
//! expected column, or a transition the state machine does not allow) is
//! logged and ignored; bookkeeping problems never abort execution.

use crate::task::TaskStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

#[cfg(test)]
mod tests;

/// One entry in the move log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMove {
    pub task_id: String,
    pub from: TaskStatus,
    pub to: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    pub at: DateTime<Utc>,
}

/// Task ids partitioned into status columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KanbanBoard {
    columns: BTreeMap<TaskStatus, Vec<String>>,
    #[serde(default)]
    moves: Vec<ColumnMove>,
}

impl Default for KanbanBoard {
    fn default() -> Self {
        Self {
            columns: TaskStatus::ALL.iter().map(|s| (*s, Vec::new())).collect(),
            moves: Vec::new(),
        }
    }
}

impl KanbanBoard {
    /// Create a board with every id in `todo`.
    pub fn new<I, S>(task_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut board = Self::default();
        for id in task_ids {
            board.add_task(id);
        }
        board
    }

    /// Place a new task in `todo`. Returns false if the id is already on the board.
    pub fn add_task(&mut self, task_id: impl Into<String>) -> bool {
        let task_id = task_id.into();
        if self.column(&task_id).is_some() {
            tracing::warn!(task_id = %task_id, "task already on the board, not adding");
            return false;
        }
        self.columns
            .entry(TaskStatus::Todo)
            .or_default()
            .push(task_id);
        true
    }

    /// Column currently holding the task.
    pub fn column(&self, task_id: &str) -> Option<TaskStatus> {
        self.columns
            .iter()
            .find(|(_, ids)| ids.iter().any(|id| id == task_id))
            .map(|(status, _)| *status)
    }

    /// Ids in a column, in the order they arrived there.
    pub fn tasks_in(&self, column: TaskStatus) -> &[String] {
        self.columns.get(&column).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Move a task between columns.
    ///
    /// Returns whether the move happened. The move is skipped with a warning
    /// when the task is not in `from` or `from -> to` is not an allowed
    /// transition.
    pub fn move_task(
        &mut self,
        task_id: &str,
        from: TaskStatus,
        to: TaskStatus,
        agent_id: Option<&str>,
    ) -> bool {
        if !from.can_transition_to(to) {
            tracing::warn!(task_id, %from, %to, "illegal kanban transition ignored");
            return false;
        }

        let Some(source) = self.columns.get_mut(&from) else {
            return false;
        };
        let Some(pos) = source.iter().position(|id| id == task_id) else {
            tracing::warn!(
                task_id,
                %from,
                %to,
                actual = ?self.column(task_id),
                "task not found in source column, move ignored"
            );
            return false;
        };

        let id = source.remove(pos);
        self.columns.entry(to).or_default().push(id);
        self.moves.push(ColumnMove {
            task_id: task_id.to_string(),
            from,
            to,
            agent_id: agent_id.map(str::to_string),
            at: Utc::now(),
        });
        true
    }

    /// Manually release a blocked task back to `todo`.
    pub fn release(&mut self, task_id: &str) -> bool {
        self.move_task(task_id, TaskStatus::Blocked, TaskStatus::Todo, None)
    }

    /// Put a task into a column without going through the state machine.
    ///
    /// Used when restoring a snapshot, where the persisted column is the
    /// source of truth. Any existing placement is removed first.
    pub(crate) fn place(&mut self, task_id: &str, column: TaskStatus) {
        for ids in self.columns.values_mut() {
            ids.retain(|id| id != task_id);
        }
        self.columns
            .entry(column)
            .or_default()
            .push(task_id.to_string());
    }

    /// Number of ids per column.
    pub fn counts(&self) -> BTreeMap<TaskStatus, usize> {
        TaskStatus::ALL
            .iter()
            .map(|s| (*s, self.tasks_in(*s).len()))
            .collect()
    }

    /// The move log, oldest first.
    pub fn moves(&self) -> &[ColumnMove] {
        &self.moves
    }

    /// Whether the board holds exactly `ids`, each in exactly one column.
    pub fn is_partition<'a, I>(&self, ids: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        let expected: HashSet<&str> = ids.into_iter().collect();
        let mut seen: HashSet<&str> = HashSet::new();

        for id in self.columns.values().flatten() {
            if !seen.insert(id.as_str()) {
                return false;
            }
        }

        seen == expected
    }
}
