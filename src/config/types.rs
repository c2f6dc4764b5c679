//! Configuration types and defaults for taskgate.
//!
//! This module defines enums, constants, and default value functions
//! used by the Config struct.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of a verification step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepId {
    Structure,
    Build,
    Tests,
    Runtime,
    Security,
    Lint,
    Dependencies,
    Documentation,
    Performance,
}

impl StepId {
    /// Default pipeline order.
    pub const ALL: [StepId; 9] = [
        StepId::Structure,
        StepId::Build,
        StepId::Tests,
        StepId::Runtime,
        StepId::Security,
        StepId::Lint,
        StepId::Dependencies,
        StepId::Documentation,
        StepId::Performance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepId::Structure => "structure",
            StepId::Build => "build",
            StepId::Tests => "tests",
            StepId::Runtime => "runtime",
            StepId::Security => "security",
            StepId::Lint => "lint",
            StepId::Dependencies => "dependencies",
            StepId::Documentation => "documentation",
            StepId::Performance => "performance",
        }
    }

    /// Parse a step name.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        StepId::ALL.into_iter().find(|id| id.as_str() == s)
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maximum score contributed by each step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepWeights {
    pub structure: f64,
    pub build: f64,
    pub tests: f64,
    pub runtime: f64,
    pub security: f64,
    pub lint: f64,
    pub dependencies: f64,
    pub documentation: f64,
    pub performance: f64,
}

impl Default for StepWeights {
    fn default() -> Self {
        Self {
            structure: 1.0,
            build: 2.0,
            tests: 2.0,
            runtime: 1.0,
            security: 2.0,
            lint: 1.0,
            dependencies: 1.0,
            documentation: 0.5,
            performance: 0.5,
        }
    }
}

impl StepWeights {
    pub fn weight(&self, id: StepId) -> f64 {
        match id {
            StepId::Structure => self.structure,
            StepId::Build => self.build,
            StepId::Tests => self.tests,
            StepId::Runtime => self.runtime,
            StepId::Security => self.security,
            StepId::Lint => self.lint,
            StepId::Dependencies => self.dependencies,
            StepId::Documentation => self.documentation,
            StepId::Performance => self.performance,
        }
    }
}

/// Generalist agent used when no pooled agent covers a task's skills.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackAgent {
    pub id: String,
    pub name: String,

    /// Worker command template (see `agent::dispatch`).
    pub command: String,

    pub max_concurrent: u32,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
}

impl Default for FallbackAgent {
    fn default() -> Self {
        Self {
            id: "generalist".to_string(),
            name: "Generalist".to_string(),
            command: default_worker_command(),
            max_concurrent: 1,
            environment: BTreeMap::new(),
        }
    }
}

/// Default marker patterns for detecting unfinished code.
pub fn default_marker_patterns() -> Vec<String> {
    vec![
        r"\bTODO\b".to_string(),
        r"\bFIXME\b".to_string(),
        r"\bXXX\b".to_string(),
        r"\bHACK\b".to_string(),
        r"unimplemented!".to_string(),
        r"todo!".to_string(),
        r#"panic!\s*\(\s*"not implemented"#.to_string(),
        "NotImplementedError".to_string(),
        "raise NotImplemented".to_string(),
    ]
}

/// Patterns whose presence fails the security gate.
pub fn default_hard_security_patterns() -> Vec<String> {
    vec![
        r"-----BEGIN (RSA |EC |DSA |OPENSSH )?PRIVATE KEY-----".to_string(),
        r"AKIA[0-9A-Z]{16}".to_string(),
        r"gh[pousr]_[A-Za-z0-9]{36}".to_string(),
        r"sk-[A-Za-z0-9]{32,}".to_string(),
        r#"(?i)(password|passwd|secret|api_key|apikey)\s*[:=]\s*["'][^"'\s]{8,}["']"#.to_string(),
    ]
}

/// Patterns that cost score without failing the gate.
pub fn default_soft_security_patterns() -> Vec<String> {
    vec![
        r"\beval\s*\(".to_string(),
        r"\bexec\s*\(".to_string(),
        r"child_process".to_string(),
        r"shell\s*=\s*True".to_string(),
        r"\bunsafe\s*\{".to_string(),
        r"innerHTML\s*=".to_string(),
        r"(?i)md5\s*\(".to_string(),
    ]
}

/// Default source file extensions scanned by the content checks.
pub fn default_source_extensions() -> Vec<String> {
    [
        "rs", "py", "ts", "js", "tsx", "jsx", "go", "java", "rb", "c", "cpp", "h", "cs", "sh",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Directories never walked by verification.
pub fn default_ignore_dirs() -> Vec<String> {
    [
        ".git",
        "target",
        "node_modules",
        "dist",
        "build",
        "__pycache__",
        ".venv",
        "venv",
        ".taskgate",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

pub fn default_worker_command() -> String {
    "claude --print --dangerously-skip-permissions {prompt}".to_string()
}

// Default value functions for serde
pub(crate) fn default_worker_timeout_seconds() -> u64 {
    1800
}
pub(crate) fn default_task_deadline_seconds() -> u64 {
    3600
}
pub(crate) fn default_max_auto_retries() -> u32 {
    1
}
pub(crate) fn default_retry_score_floor() -> f64 {
    0.4
}
pub(crate) fn default_workspace_dir() -> String {
    ".taskgate/work".to_string()
}
pub(crate) fn default_pass_threshold() -> f64 {
    0.7
}
pub(crate) fn default_deploy_threshold() -> f64 {
    0.85
}
pub(crate) fn default_command_timeout_seconds() -> u64 {
    600
}
pub(crate) fn default_runtime_grace_seconds() -> u64 {
    5
}
pub(crate) fn default_max_file_lines() -> usize {
    800
}
pub(crate) fn default_max_nesting_depth() -> usize {
    6
}
pub(crate) fn default_max_file_bytes() -> u64 {
    1_000_000
}
pub(crate) fn default_min_readme_chars() -> usize {
    200
}
pub(crate) fn default_true() -> bool {
    true
}
pub(crate) fn default_steps() -> Vec<StepId> {
    StepId::ALL.to_vec()
}

/// Upper bound accepted for `max_auto_retries`.
pub const MAX_AUTO_RETRIES_LIMIT: u32 = 5;
