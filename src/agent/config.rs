//! Agent pool configuration parsing.
//!
//! `agents.yaml` declares the workers the engine can assign tasks to. Each
//! agent lists its skills with an efficiency in [0, 1], how many tasks it may
//! run at once, and the command template used to invoke it.
//!
//! # Example
//!
//! ```yaml
//! agents:
//!   backend:
//!     name: "Backend specialist"
//!     command: "claude --print {prompt}"
//!     max_concurrent: 2
//!     capabilities:
//!       rust: 0.9
//!       sql: 0.7
//!     environment:
//!       CLAUDE_CODE_AUTO_CONFIRM: "true"
//!
//!   generalist:
//!     command: "claude --print {prompt}"
//!     default: true
//! ```
//!
//! Agents keep their declaration order; ties in assignment scoring go to the
//! agent declared first.

use crate::config::FallbackAgent;
use crate::error::{Result, TaskgateError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Default file name for the agent pool.
pub const AGENTS_FILE: &str = "agents.yaml";

/// Parsed `agents.yaml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentsConfig {
    /// Agent profiles in declaration order.
    #[serde(with = "ordered_agents")]
    pub agents: Vec<(String, AgentProfile)>,

    /// Unknown top-level fields, kept for forward compatibility.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// One agent profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentProfile {
    /// Display name. Defaults to the agent id.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,

    /// Worker command template.
    pub command: String,

    /// Skill → efficiency in [0, 1].
    pub capabilities: BTreeMap<String, f64>,

    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: u32,

    /// Per-agent worker timeout override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,

    /// Receives tasks no other agent covers, replacing the configured fallback.
    pub default: bool,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

fn default_max_concurrent() -> u32 {
    1
}

impl AgentProfile {
    /// Profile built from the `fallback_agent` section of `taskgate.yaml`.
    pub fn from_fallback(fallback: &FallbackAgent) -> Self {
        Self {
            name: fallback.name.clone(),
            command: fallback.command.clone(),
            capabilities: BTreeMap::new(),
            max_concurrent: fallback.max_concurrent,
            timeout_seconds: None,
            environment: fallback.environment.clone(),
            default: true,
            extra: BTreeMap::new(),
        }
    }
}

impl AgentsConfig {
    /// Load `agents.yaml`. A missing file is `Ok(None)`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Option<Self>> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            TaskgateError::UserError(format!(
                "failed to read agents config '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content).map(Some)
    }

    /// Parse from YAML and validate.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: AgentsConfig = serde_yaml::from_str(yaml).map_err(|e| {
            TaskgateError::UserError(format!("failed to parse agents.yaml: {}", e))
        })?;

        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| {
            TaskgateError::UserError(format!("failed to serialize agents config: {}", e))
        })
    }

    /// Validate the pool.
    ///
    /// Rejects more than one default agent, empty ids or commands, zero
    /// timeouts or concurrency, and efficiencies outside [0, 1].
    pub fn validate(&self) -> Result<()> {
        let defaults = self.agents.iter().filter(|(_, a)| a.default).count();
        if defaults > 1 {
            return Err(invalid(format!(
                "at most one agent can be marked as default, found {}",
                defaults
            )));
        }

        let mut seen: Vec<&str> = Vec::new();
        for (id, agent) in &self.agents {
            if id.trim().is_empty() {
                return Err(invalid("agent id cannot be empty"));
            }
            if seen.contains(&id.as_str()) {
                return Err(invalid(format!("agent '{}' is declared twice", id)));
            }
            seen.push(id);

            if agent.command.trim().is_empty() {
                return Err(invalid(format!("agent '{}' has an empty command", id)));
            }
            if agent.timeout_seconds == Some(0) {
                return Err(invalid(format!(
                    "agent '{}' has timeout_seconds of 0, which is not allowed",
                    id
                )));
            }
            if agent.max_concurrent == 0 {
                return Err(invalid(format!(
                    "agent '{}' has max_concurrent of 0; it could never run a task",
                    id
                )));
            }
            for (skill, efficiency) in &agent.capabilities {
                if !(0.0..=1.0).contains(efficiency) {
                    return Err(invalid(format!(
                        "agent '{}' has efficiency {} for skill '{}' (must be between 0.0 and 1.0)",
                        id, efficiency, skill
                    )));
                }
            }
        }

        Ok(())
    }

    /// The agent marked `default: true`, if any.
    pub fn default_agent(&self) -> Option<(&str, &AgentProfile)> {
        self.iter().find(|(_, a)| a.default)
    }

    pub fn get(&self, id: &str) -> Option<&AgentProfile> {
        self.agents.iter().find(|(k, _)| k == id).map(|(_, a)| a)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AgentProfile)> {
        self.agents.iter().map(|(id, a)| (id.as_str(), a))
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

fn invalid(message: impl AsRef<str>) -> TaskgateError {
    TaskgateError::UserError(format!(
        "agents.yaml validation failed: {}",
        message.as_ref()
    ))
}

/// Serializes the agent list as a YAML mapping while keeping declaration order.
mod ordered_agents {
    use super::AgentProfile;
    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(
        agents: &[(String, AgentProfile)],
        s: S,
    ) -> Result<S::Ok, S::Error> {
        let mut map = s.serialize_map(Some(agents.len()))?;
        for (id, agent) in agents {
            map.serialize_entry(id, agent)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Vec<(String, AgentProfile)>, D::Error> {
        struct AgentsVisitor;

        impl<'de> Visitor<'de> for AgentsVisitor {
            type Value = Vec<(String, AgentProfile)>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping of agent id to agent profile")
            }

            fn visit_unit<E: serde::de::Error>(self) -> Result<Self::Value, E> {
                Ok(Vec::new())
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut agents = Vec::new();
                while let Some((id, profile)) = access.next_entry::<String, AgentProfile>()? {
                    agents.push((id, profile));
                }
                Ok(agents)
            }
        }

        d.deserialize_any(AgentsVisitor)
    }
}
