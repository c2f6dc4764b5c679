//! Task list loading.
//!
//! Accepts either a document with a top-level `tasks:` key or a bare list,
//! in YAML or JSON (picked by file extension).

use super::Task;
use crate::error::{Result, TaskgateError};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A decomposed request: the ordered task list the graph is built from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskList {
    /// Optional project name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub tasks: Vec<Task>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TaskListDocument {
    Wrapped(TaskList),
    Bare(Vec<Task>),
}

/// Parse a task list from YAML text.
pub fn parse_tasks(content: &str) -> Result<TaskList> {
    let doc: TaskListDocument = serde_yaml::from_str(content)
        .map_err(|e| TaskgateError::UserError(format!("failed to parse task list: {}", e)))?;
    normalize(doc)
}

/// Load a task list from a `.yaml`, `.yml` or `.json` file.
pub fn load_tasks<P: AsRef<Path>>(path: P) -> Result<TaskList> {
    let path = path.as_ref();

    let content = std::fs::read_to_string(path).map_err(|e| {
        TaskgateError::UserError(format!(
            "failed to read task list '{}': {}",
            path.display(),
            e
        ))
    })?;

    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    if !is_json {
        return parse_tasks(&content);
    }

    let doc: TaskListDocument = serde_json::from_str(&content).map_err(|e| {
        TaskgateError::UserError(format!(
            "failed to parse task list '{}': {}",
            path.display(),
            e
        ))
    })?;
    normalize(doc)
}

/// Reject blank ids and stamp creation times.
fn normalize(doc: TaskListDocument) -> Result<TaskList> {
    let mut list = match doc {
        TaskListDocument::Wrapped(list) => list,
        TaskListDocument::Bare(tasks) => TaskList { name: None, tasks },
    };

    let now = Utc::now();
    for task in &mut list.tasks {
        if task.id.trim().is_empty() {
            return Err(TaskgateError::UserError(format!(
                "task list contains a task with an empty id (title: '{}')",
                task.title
            )));
        }
        task.created_at.get_or_insert(now);
    }

    Ok(list)
}
