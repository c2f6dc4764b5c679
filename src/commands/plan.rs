//! Implementation of the `taskgate plan` command.
//!
//! Builds the graph and assigns agents exactly as `run` would, then prints
//! the result instead of executing it.

use super::{Settings, print_json};
use crate::cli::{GlobalArgs, PlanArgs};
use serde::Serialize;
use std::collections::BTreeMap;
use taskgate::agent::AgentPool;
use taskgate::engine::Project;
use taskgate::error::Result;
use taskgate::task::load_tasks;

#[derive(Serialize)]
struct Plan<'a> {
    name: &'a str,
    levels: Vec<Vec<String>>,
    assignments: &'a BTreeMap<String, String>,
    queues: &'a BTreeMap<String, Vec<String>>,
}

/// Execute the `taskgate plan` command.
pub fn cmd_plan(global: &GlobalArgs, args: PlanArgs) -> Result<()> {
    let Settings { config, agents } = Settings::load(global)?;
    let list = load_tasks(&args.tasks)?;
    let name = list.name.clone().unwrap_or_else(|| "plan".to_string());

    let pool = AgentPool::from_config(agents.as_ref(), &config.fallback_agent);
    let project = Project::new("plan", name.as_str(), list.tasks, pool)?;

    let plan = Plan {
        name: &name,
        levels: project.graph().levels(),
        assignments: project.assignments(),
        queues: project.queues(),
    };

    if args.json {
        return print_json(&plan);
    }

    println!("Plan: {} ({} tasks)", plan.name, project.graph().len());
    println!();
    for (depth, level) in plan.levels.iter().enumerate() {
        println!("Level {}:", depth);
        for task_id in level {
            let agent = project.assignment(task_id).unwrap_or("-");
            let priority = project
                .task(task_id)
                .map(|t| format!("{:?}", t.priority).to_lowercase())
                .unwrap_or_default();
            println!("  {:24} {:8} -> {}", task_id, priority, agent);
        }
    }
    println!();
    println!("Agent queues:");
    for (agent, tasks) in plan.queues {
        println!("  {}: {}", agent, tasks.join(", "));
    }
    Ok(())
}
