//! Command implementations for taskgate.
//!
//! This module provides the dispatcher that routes CLI commands to their
//! implementations, plus the configuration loading they share.

mod plan;
mod probe;
mod run;
mod status;
mod verify;

use crate::cli::{Cli, Command, GlobalArgs};
use serde::Serialize;
use taskgate::agent::AgentsConfig;
use taskgate::config::Config;
use taskgate::error::{Result, TaskgateError};

/// Dispatch a command to its implementation.
pub fn dispatch(cli: Cli) -> Result<()> {
    let Cli { global, command } = cli;
    match command {
        Command::Run(args) => run::cmd_run(&global, args),
        Command::Plan(args) => plan::cmd_plan(&global, args),
        Command::Verify(args) => verify::cmd_verify(&global, args),
        Command::Status(args) => status::cmd_status(args),
        Command::Probe(args) => probe::cmd_probe(&global, args),
    }
}

/// `taskgate.yaml` and `agents.yaml`, loaded once per invocation.
struct Settings {
    config: Config,
    agents: Option<AgentsConfig>,
}

impl Settings {
    fn load(global: &GlobalArgs) -> Result<Self> {
        let config = Config::load_or_default(global.config.as_deref())?;
        let agents = AgentsConfig::load(&global.agents)?;
        if agents.is_none() {
            tracing::debug!(
                path = %global.agents.display(),
                "no agents file, every task goes to the fallback agent"
            );
        }
        Ok(Self { config, agents })
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| TaskgateError::UserError(format!("failed to render JSON: {}", e)))?;
    println!("{}", json);
    Ok(())
}
