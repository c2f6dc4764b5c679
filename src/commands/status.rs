//! Implementation of the `taskgate status` command.
//!
//! Reads a snapshot and prints its board: counts per column, then each
//! non-empty column with the agent and latest score of every task.

use super::print_json;
use crate::cli::StatusArgs;
use serde_json::json;
use taskgate::error::Result;
use taskgate::snapshot::ProjectSnapshot;
use taskgate::task::TaskStatus;

/// Execute the `taskgate status` command.
pub fn cmd_status(args: StatusArgs) -> Result<()> {
    let snapshot = ProjectSnapshot::load(&args.snapshot)?;
    let counts = snapshot.board.counts();

    if args.json {
        let columns: serde_json::Map<String, serde_json::Value> = TaskStatus::ALL
            .iter()
            .map(|s| (s.as_str().to_string(), json!(snapshot.board.tasks_in(*s))))
            .collect();
        return print_json(&json!({
            "project_id": snapshot.project_id,
            "name": snapshot.name,
            "saved_at": snapshot.saved_at,
            "counts": counts,
            "columns": columns,
        }));
    }

    println!("Project {} ({})", snapshot.name, snapshot.project_id);
    println!("Saved {}", snapshot.saved_at.to_rfc3339());
    println!();

    let total: usize = counts.values().sum();
    for (status, count) in &counts {
        println!("  {:12} {:>3}", status.as_str(), count);
    }
    println!("  ------------");
    println!("  {:12} {:>3}", "total", total);

    for status in TaskStatus::ALL {
        let ids = snapshot.board.tasks_in(status);
        if ids.is_empty() {
            continue;
        }
        println!();
        println!("{}:", status);
        for id in ids {
            let task = snapshot.tasks.iter().find(|t| &t.id == id);
            let agent = snapshot.assignments.get(id).map_or("-", String::as_str);
            let score = task
                .and_then(|t| t.verification_score)
                .map_or_else(|| "-".to_string(), |s| format!("{:.2}", s));
            let title = task.map_or("", |t| t.title.as_str());
            println!("  {:20} {:12} {:>5}  {}", id, agent, score, title);
            if matches!(status, TaskStatus::Blocked | TaskStatus::Failed)
                && let Some(plan) = snapshot.plans.get(id)
                && let Some(fix) = plan.fixes.first()
            {
                println!("  {:20} next fix: {}", "", fix.description);
            }
        }
    }
    Ok(())
}
