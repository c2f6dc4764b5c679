//! Agent pool, prompts, and worker dispatch.
//!
//! - **Config**: `agents.yaml` parsing ([`AgentsConfig`])
//! - **Pool**: skill-based assignment and concurrency slots ([`AgentPool`])
//! - **Prompt**: task prompt rendering ([`prompt`])
//! - **Dispatch**: the worker boundary ([`dispatch::Worker`])

pub mod config;
pub mod dispatch;
mod pool;
pub mod prompt;

pub use config::{AGENTS_FILE, AgentProfile, AgentsConfig};
pub use pool::{AgentPool, assignment_score};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A worker the engine can assign tasks to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,

    /// Skill (lowercase) → efficiency in [0, 1].
    #[serde(default)]
    pub capabilities: BTreeMap<String, f64>,

    pub max_concurrent: u32,

    /// Tasks currently running on this agent.
    #[serde(default)]
    pub assigned: Vec<String>,

    /// Worker command template.
    pub command: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,

    /// Worker timeout override in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

impl Agent {
    pub fn new(id: impl Into<String>, command: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            capabilities: BTreeMap::new(),
            max_concurrent: 1,
            assigned: Vec::new(),
            command: command.into(),
            environment: BTreeMap::new(),
            timeout_seconds: None,
        }
    }

    /// Build from an `agents.yaml` profile.
    pub fn from_profile(id: &str, profile: &AgentProfile) -> Self {
        let mut agent = Self::new(id, profile.command.clone());
        if !profile.name.trim().is_empty() {
            agent.name = profile.name.clone();
        }
        agent.capabilities = profile
            .capabilities
            .iter()
            .map(|(skill, eff)| (skill.trim().to_lowercase(), *eff))
            .collect();
        agent.max_concurrent = profile.max_concurrent;
        agent.environment = profile.environment.clone();
        agent.timeout_seconds = profile.timeout_seconds;
        agent
    }

    pub fn with_capability(mut self, skill: &str, efficiency: f64) -> Self {
        self.capabilities
            .insert(skill.trim().to_lowercase(), efficiency);
        self
    }

    pub fn with_max_concurrent(mut self, slots: u32) -> Self {
        self.max_concurrent = slots;
        self
    }

    pub fn efficiency(&self, skill: &str) -> Option<f64> {
        self.capabilities.get(skill).copied()
    }

    pub fn has_free_slot(&self) -> bool {
        (self.assigned.len() as u32) < self.max_concurrent
    }

    pub fn active_count(&self) -> usize {
        self.assigned.len()
    }
}
