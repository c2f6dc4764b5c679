//! Configuration model for taskgate.
//!
//! This module defines the Config struct that represents `taskgate.yaml`.
//! It supports forward-compatible YAML parsing (unknown fields are ignored),
//! sensible defaults for optional fields, and validation of config values.

mod model;
mod operations;
pub mod types;


// Re-export public API
pub use model::{Config, ExecutionConfig, VerificationConfig};
pub use operations::CONFIG_FILE;
pub use types::{FallbackAgent, StepId, StepWeights};
