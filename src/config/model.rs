//! Config struct definitions and default implementations.

use super::types::*;
use serde::{Deserialize, Serialize};

/// Configuration for taskgate.
///
/// This struct represents the contents of `taskgate.yaml`.
/// Unknown fields in the YAML are ignored for forward compatibility.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub execution: ExecutionConfig,
    pub verification: VerificationConfig,
    pub fallback_agent: FallbackAgent,
}

/// Execution loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Timeout for a single worker invocation.
    #[serde(default = "default_worker_timeout_seconds")]
    pub worker_timeout_seconds: u64,

    /// Wall-clock budget per task, measured from its first start. When it
    /// expires the task is forced to `completed` with kind `timeout`.
    #[serde(default = "default_task_deadline_seconds")]
    pub task_deadline_seconds: u64,

    /// Automatic retries after a non-critical verification failure.
    #[serde(default = "default_max_auto_retries")]
    pub max_auto_retries: u32,

    /// Minimum verification score that still qualifies for a retry.
    #[serde(default = "default_retry_score_floor")]
    pub retry_score_floor: f64,

    /// Root of the per-task working directories (`<workspace_dir>/<task_id>`).
    #[serde(default = "default_workspace_dir")]
    pub workspace_dir: String,

    /// Probe each agent's tool before its first dispatch.
    #[serde(default = "default_true")]
    pub probe_workers: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            worker_timeout_seconds: default_worker_timeout_seconds(),
            task_deadline_seconds: default_task_deadline_seconds(),
            max_auto_retries: default_max_auto_retries(),
            retry_score_floor: default_retry_score_floor(),
            workspace_dir: default_workspace_dir(),
            probe_workers: default_true(),
        }
    }
}

/// Verification pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    // =========================================================================
    // Scoring
    // =========================================================================
    /// Minimum aggregate score for a pass.
    #[serde(default = "default_pass_threshold")]
    pub pass_threshold: f64,

    /// Minimum aggregate score for deployment readiness.
    #[serde(default = "default_deploy_threshold")]
    pub deploy_threshold: f64,

    /// Steps to run, in order.
    #[serde(default = "default_steps")]
    pub steps: Vec<StepId>,

    #[serde(default)]
    pub weights: StepWeights,

    // =========================================================================
    // Structure
    // =========================================================================
    /// Globs that must each match at least one file.
    #[serde(default)]
    pub required_files: Vec<String>,

    #[serde(default = "default_ignore_dirs")]
    pub ignore_dirs: Vec<String>,

    /// File extensions treated as source (no leading dots).
    #[serde(default = "default_source_extensions")]
    pub source_extensions: Vec<String>,

    // =========================================================================
    // Commands
    // =========================================================================
    /// Detect build/test/lint commands from manifests when not configured.
    #[serde(default = "default_true")]
    pub auto_detect_commands: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_command: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_command: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lint_command: Option<String>,

    /// Start command for the runtime gate. Never auto-detected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_command: Option<String>,

    #[serde(default = "default_command_timeout_seconds")]
    pub command_timeout_seconds: u64,

    /// A runtime command still alive after this long counts as started.
    #[serde(default = "default_runtime_grace_seconds")]
    pub runtime_grace_seconds: u64,

    // =========================================================================
    // Content scans
    // =========================================================================
    /// Regex patterns marking unfinished code.
    #[serde(default = "default_marker_patterns")]
    pub marker_patterns: Vec<String>,

    /// Regex patterns that fail the security gate.
    #[serde(default = "default_hard_security_patterns")]
    pub hard_security_patterns: Vec<String>,

    /// Regex patterns that cost security score.
    #[serde(default = "default_soft_security_patterns")]
    pub soft_security_patterns: Vec<String>,

    // =========================================================================
    // Heuristic limits
    // =========================================================================
    #[serde(default = "default_max_file_lines")]
    pub max_file_lines: usize,

    #[serde(default = "default_max_nesting_depth")]
    pub max_nesting_depth: usize,

    /// Files larger than this are not read by content scans.
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,

    #[serde(default = "default_min_readme_chars")]
    pub min_readme_chars: usize,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            pass_threshold: default_pass_threshold(),
            deploy_threshold: default_deploy_threshold(),
            steps: default_steps(),
            weights: StepWeights::default(),
            required_files: Vec::new(),
            ignore_dirs: default_ignore_dirs(),
            source_extensions: default_source_extensions(),
            auto_detect_commands: default_true(),
            build_command: None,
            test_command: None,
            lint_command: None,
            runtime_command: None,
            command_timeout_seconds: default_command_timeout_seconds(),
            runtime_grace_seconds: default_runtime_grace_seconds(),
            marker_patterns: default_marker_patterns(),
            hard_security_patterns: default_hard_security_patterns(),
            soft_security_patterns: default_soft_security_patterns(),
            max_file_lines: default_max_file_lines(),
            max_nesting_depth: default_max_nesting_depth(),
            max_file_bytes: default_max_file_bytes(),
            min_readme_chars: default_min_readme_chars(),
        }
    }
}
