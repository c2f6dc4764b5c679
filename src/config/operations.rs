//! Config loading, validation, and utility operations.

use super::model::{Config, VerificationConfig};
use super::types::MAX_AUTO_RETRIES_LIMIT;
use crate::error::{Result, TaskgateError};
use std::path::Path;
use std::time::Duration;

/// Default config file name, looked up in the current directory.
pub const CONFIG_FILE: &str = "taskgate.yaml";

impl Config {
    /// Load config from a YAML file.
    ///
    /// Unknown fields in the YAML are silently ignored for forward compatibility.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the taskgate.yaml file
    ///
    /// # Returns
    ///
    /// * `Ok(Config)` - Successfully loaded and validated config
    /// * `Err(TaskgateError::UserError)` - Read error, parse error, or validation failure
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            TaskgateError::UserError(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Load `path` if given, else `taskgate.yaml` if present, else defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None if Path::new(CONFIG_FILE).is_file() => Self::load(CONFIG_FILE),
            None => Ok(Self::default()),
        }
    }

    /// Parse config from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        // An empty document is null in YAML; treat it as all defaults.
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(yaml)
            .map_err(|e| TaskgateError::UserError(format!("failed to parse config YAML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize config to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| {
            TaskgateError::UserError(format!("failed to serialize config to YAML: {}", e))
        })
    }

    /// Validate config values and return error on invalid values.
    ///
    /// Validation rules:
    /// - `max_auto_retries` must not exceed 5
    /// - `retry_score_floor`, `pass_threshold`, `deploy_threshold` must lie in [0, 1]
    /// - `deploy_threshold` must not be below `pass_threshold`
    /// - timeouts must be positive
    /// - `source_extensions` entries must be non-empty and have no leading dots
    /// - step weights must be non-negative
    pub fn validate(&self) -> Result<()> {
        let exec = &self.execution;

        if exec.max_auto_retries > MAX_AUTO_RETRIES_LIMIT {
            return Err(invalid(format!(
                "max_auto_retries must be at most {} (found {})",
                MAX_AUTO_RETRIES_LIMIT, exec.max_auto_retries
            )));
        }

        check_unit("retry_score_floor", exec.retry_score_floor)?;

        if exec.worker_timeout_seconds == 0 {
            return Err(invalid("worker_timeout_seconds must be greater than 0"));
        }
        if exec.task_deadline_seconds == 0 {
            return Err(invalid("task_deadline_seconds must be greater than 0"));
        }
        if exec.workspace_dir.trim().is_empty() {
            return Err(invalid("workspace_dir must not be empty"));
        }

        if self.fallback_agent.id.trim().is_empty() {
            return Err(invalid("fallback_agent.id must not be empty"));
        }
        if self.fallback_agent.max_concurrent == 0 {
            return Err(invalid("fallback_agent.max_concurrent must be greater than 0"));
        }

        self.verification.validate()
    }
}

impl VerificationConfig {
    pub fn validate(&self) -> Result<()> {
        check_unit("pass_threshold", self.pass_threshold)?;
        check_unit("deploy_threshold", self.deploy_threshold)?;

        if self.deploy_threshold < self.pass_threshold {
            return Err(invalid(format!(
                "deploy_threshold ({}) must not be below pass_threshold ({})",
                self.deploy_threshold, self.pass_threshold
            )));
        }

        if self.command_timeout_seconds == 0 {
            return Err(invalid("command_timeout_seconds must be greater than 0"));
        }

        for ext in &self.source_extensions {
            if ext.is_empty() {
                return Err(invalid("source_extensions entries must be non-empty"));
            }
            if ext.starts_with('.') {
                return Err(invalid(format!(
                    "source_extensions entries must not have leading dots (found '{}'). Use '{}' instead.",
                    ext,
                    ext.trim_start_matches('.')
                )));
            }
        }

        for id in &self.steps {
            let weight = self.weights.weight(*id);
            if !weight.is_finite() || weight < 0.0 {
                return Err(invalid(format!(
                    "weights.{} must be a non-negative number (found {})",
                    id, weight
                )));
            }
        }

        Ok(())
    }

    /// Get source_extensions normalized to lowercase.
    pub fn normalized_extensions(&self) -> Vec<String> {
        self.source_extensions
            .iter()
            .map(|s| s.to_lowercase())
            .collect()
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_seconds)
    }

    pub fn runtime_grace(&self) -> Duration {
        Duration::from_secs(self.runtime_grace_seconds)
    }
}

fn check_unit(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(invalid(format!(
            "{} must be between 0 and 1 (found {})",
            name, value
        )));
    }
    Ok(())
}

fn invalid(message: impl AsRef<str>) -> TaskgateError {
    TaskgateError::UserError(format!("config validation failed: {}", message.as_ref()))
}
