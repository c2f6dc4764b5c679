//! Implementation of the `taskgate probe` command.

use super::Settings;
use crate::cli::{GlobalArgs, ProbeArgs};
use std::sync::Arc;
use taskgate::agent::dispatch::{CommandWorker, Worker};
use taskgate::agent::{Agent, AgentPool};
use taskgate::error::{Result, TaskgateError};
use taskgate::runner::SystemRunner;

/// Execute the `taskgate probe` command.
///
/// Probes every pooled agent plus the fallback (or just `--agent`).
pub fn cmd_probe(global: &GlobalArgs, args: ProbeArgs) -> Result<()> {
    let Settings { config, agents } = Settings::load(global)?;
    let pool = AgentPool::from_config(agents.as_ref(), &config.fallback_agent);

    let mut candidates: Vec<&Agent> = pool.agents().iter().collect();
    if pool.get(pool.fallback_id()).is_none() {
        candidates.push(pool.fallback());
    }
    if let Some(wanted) = &args.agent {
        candidates.retain(|a| &a.id == wanted);
        if candidates.is_empty() {
            let mut known: Vec<&str> = pool.agents().iter().map(|a| a.id.as_str()).collect();
            if !known.contains(&pool.fallback_id()) {
                known.push(pool.fallback_id());
            }
            return Err(TaskgateError::UserError(format!(
                "agent '{}' is not configured\nAvailable agents: {}",
                wanted,
                known.join(", ")
            )));
        }
    }

    let worker = CommandWorker::new(Arc::new(SystemRunner), std::env::temp_dir());
    let mut unavailable = 0;
    for agent in candidates {
        match worker.probe(agent) {
            Ok(()) => println!("  ok           {:16} {}", agent.id, agent.command),
            Err(e) => {
                unavailable += 1;
                println!("  unavailable  {:16} {}", agent.id, e);
            }
        }
    }

    if unavailable > 0 {
        return Err(TaskgateError::UserError(format!(
            "{} agent(s) unavailable\n\nFix: install the missing tools or edit agents.yaml.",
            unavailable
        )));
    }
    Ok(())
}
