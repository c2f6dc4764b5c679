//! Task-to-agent assignment.
//!
//! # Resolution order
//!
//! 1. The task's explicit `agent` hint, when that agent is in the pool
//! 2. The highest-scoring pooled agent (see [`assignment_score`])
//! 3. The fallback agent, added to the pool on first use
//!
//! The pool also tracks which tasks each agent is running so the engine can
//! respect `max_concurrent`.

use super::{Agent, AgentProfile, AgentsConfig};
use crate::config::FallbackAgent;
use crate::error::AssignmentError;
use crate::task::Task;
use std::collections::BTreeMap;

/// Weight of the mean efficiency over matched skills.
const EFFICIENCY_WEIGHT: f64 = 0.6;

/// Weight of the matched share of required skills.
const COVERAGE_WEIGHT: f64 = 0.4;

/// Score an agent for a set of normalized skills.
///
/// `0.6 * mean efficiency over matched skills + 0.4 * matched / required`.
/// `None` when the agent shares no skill with the task.
pub fn assignment_score(agent: &Agent, skills: &[String]) -> Option<f64> {
    let efficiencies: Vec<f64> = skills.iter().filter_map(|s| agent.efficiency(s)).collect();
    if efficiencies.is_empty() {
        return None;
    }

    let mean = efficiencies.iter().sum::<f64>() / efficiencies.len() as f64;
    let coverage = efficiencies.len() as f64 / skills.len() as f64;
    Some(EFFICIENCY_WEIGHT * mean + COVERAGE_WEIGHT * coverage)
}

/// The set of agents available to one project.
#[derive(Debug, Clone)]
pub struct AgentPool {
    agents: Vec<Agent>,
    fallback: Agent,
}

impl AgentPool {
    /// A pool over `agents`, falling back to `fallback` for uncovered tasks.
    pub fn new(agents: Vec<Agent>, fallback: Agent) -> Self {
        Self { agents, fallback }
    }

    /// Pool from `agents.yaml` (if any) and the configured fallback.
    ///
    /// An agent marked `default: true` replaces the configured fallback.
    pub fn from_config(agents: Option<&AgentsConfig>, fallback: &FallbackAgent) -> Self {
        let pooled: Vec<Agent> = agents
            .map(|cfg| {
                cfg.iter()
                    .map(|(id, profile)| Agent::from_profile(id, profile))
                    .collect()
            })
            .unwrap_or_default();

        let fallback_agent = match agents.and_then(AgentsConfig::default_agent) {
            Some((id, profile)) => Agent::from_profile(id, profile),
            None => Agent::from_profile(&fallback.id, &AgentProfile::from_fallback(fallback)),
        };

        Self::new(pooled, fallback_agent)
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn get(&self, id: &str) -> Option<&Agent> {
        self.agents.iter().find(|a| a.id == id)
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut Agent> {
        self.agents.iter_mut().find(|a| a.id == id)
    }

    /// The agent used when nothing in the pool matches.
    pub fn fallback(&self) -> &Agent {
        &self.fallback
    }

    pub fn fallback_id(&self) -> &str {
        &self.fallback.id
    }

    /// Add the fallback agent to the pool if it is not there yet.
    pub fn ensure_fallback(&mut self) -> String {
        if self.get(&self.fallback.id).is_none() {
            tracing::info!(agent_id = %self.fallback.id, "adding fallback agent to the pool");
            self.agents.push(self.fallback.clone());
        }
        self.fallback.id.clone()
    }

    /// Best-scoring pooled agent for a task. Ties keep pool order.
    pub fn best_match(&self, task: &Task) -> Result<&Agent, AssignmentError> {
        let skills = task.normalized_skills();
        let mut best: Option<(&Agent, f64)> = None;

        if !skills.is_empty() {
            for agent in &self.agents {
                let Some(score) = assignment_score(agent, &skills) else {
                    continue;
                };
                if best.is_none_or(|(_, top)| score > top) {
                    best = Some((agent, score));
                }
            }
        }

        best.map(|(agent, _)| agent)
            .ok_or_else(|| AssignmentError::NoEligibleAgent {
                task: task.id.clone(),
                required: skills,
            })
    }

    /// Choose the agent for a task, adding the fallback when nothing matches.
    pub fn assign(&mut self, task: &Task) -> String {
        if let Some(hint) = &task.agent {
            if self.get(hint).is_some() {
                return hint.clone();
            }
            if *hint == self.fallback.id {
                return self.ensure_fallback();
            }
            tracing::warn!(
                task_id = %task.id,
                agent_id = %hint,
                "task names an agent that is not in the pool, scoring instead"
            );
        }

        match self.best_match(task) {
            Ok(agent) => agent.id.clone(),
            Err(e) => {
                tracing::info!(task_id = %task.id, reason = %e, "using fallback agent");
                self.ensure_fallback()
            }
        }
    }

    /// Assign every task and group the ids into per-agent work queues.
    ///
    /// Queues keep task order.
    pub fn assign_all<'a, I>(&mut self, tasks: I) -> BTreeMap<String, Vec<String>>
    where
        I: IntoIterator<Item = &'a Task>,
    {
        let mut queues: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for task in tasks {
            let agent_id = self.assign(task);
            queues.entry(agent_id).or_default().push(task.id.clone());
        }
        queues
    }

    /// Whether the agent can take another task right now.
    pub fn has_free_slot(&self, agent_id: &str) -> bool {
        self.get(agent_id).is_some_and(Agent::has_free_slot)
    }

    /// Occupy a slot for a task. Returns false when the agent is unknown or full.
    pub fn acquire(&mut self, agent_id: &str, task_id: &str) -> bool {
        match self.get_mut(agent_id) {
            Some(agent) if agent.has_free_slot() => {
                agent.assigned.push(task_id.to_string());
                true
            }
            _ => false,
        }
    }

    /// Free the slot a task held. Returns false when it held none.
    pub fn release(&mut self, agent_id: &str, task_id: &str) -> bool {
        let Some(agent) = self.get_mut(agent_id) else {
            return false;
        };
        let before = agent.assigned.len();
        agent.assigned.retain(|t| t != task_id);
        agent.assigned.len() != before
    }

    pub fn active_count(&self, agent_id: &str) -> usize {
        self.get(agent_id).map_or(0, Agent::active_count)
    }

    /// Drop every slot, e.g. after restoring a project.
    pub fn clear_slots(&mut self) {
        for agent in &mut self.agents {
            agent.assigned.clear();
        }
    }
}
