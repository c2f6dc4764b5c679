//! Taskgate: dependency-ordered task orchestration for agentic coding.
//!
//! A decomposed request becomes a [`graph::TaskGraph`]. The
//! [`engine::Orchestrator`] dispatches ready tasks to worker agents, tracks
//! each one on a [`kanban::KanbanBoard`], and only marks a task completed
//! once the [`verify::VerificationPipeline`] passes it. Failed verifications
//! go through a bounded retry loop with a [`verify::RemediationPlan`].

pub mod agent;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod exit_codes;
pub mod fs;
pub mod graph;
pub mod kanban;
pub mod runner;
pub mod snapshot;
pub mod task;
pub mod verify;

#[cfg(test)]
mod test_support;
