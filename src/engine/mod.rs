//! Orchestration engine.
//!
//! The [`Orchestrator`] owns a store of projects keyed by id. Creating a
//! project builds its task graph (graph errors abort here, before anything
//! runs) and assigns every task to an agent. [`Orchestrator::run`] then
//! drives the project: ready tasks are dispatched by priority as their
//! agents free up, each attempt is verified, and failures go through the
//! retry policy.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use taskgate::agent::dispatch::CommandWorker;
//! use taskgate::config::Config;
//! use taskgate::engine::Orchestrator;
//! use taskgate::runner::SystemRunner;
//! use taskgate::task::load_tasks;
//!
//! # fn main() -> taskgate::error::Result<()> {
//! let runner = Arc::new(SystemRunner);
//! let worker = Arc::new(CommandWorker::new(runner.clone(), ".taskgate/logs"));
//! let mut orchestrator = Orchestrator::new(Config::default(), None, worker, runner);
//!
//! let list = load_tasks("tasks.yaml")?;
//! let id = orchestrator.create_project("demo", list.tasks)?;
//! let summary = orchestrator.run(&id)?;
//! println!("complete: {}", summary.complete);
//! # Ok(())
//! # }
//! ```

mod execution;
mod project;
mod retry;

#[cfg(test)]
mod tests;

pub use execution::RunSummary;
pub use project::{Project, ProjectId};
pub use retry::{RetryDecision, RetryPolicy};

use crate::agent::dispatch::Worker;
use crate::agent::{AgentPool, AgentsConfig};
use crate::config::Config;
use crate::error::{Result, TaskgateError};
use crate::events::{EventSink, NullSink};
use crate::runner::CommandRunner;
use crate::snapshot::ProjectSnapshot;
use crate::task::Task;
use crate::verify::VerificationPipeline;
use execution::{Execution, Services};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

/// Owner of every project and of the collaborators runs use.
pub struct Orchestrator {
    config: Config,
    agents: Option<AgentsConfig>,
    worker: Arc<dyn Worker>,
    pipeline: VerificationPipeline,
    sink: Arc<dyn EventSink>,
    projects: BTreeMap<ProjectId, Project>,
}

impl Orchestrator {
    /// Orchestrator with the configured verification steps and no event sink.
    pub fn new(
        config: Config,
        agents: Option<AgentsConfig>,
        worker: Arc<dyn Worker>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        let pipeline = VerificationPipeline::from_config(config.verification.clone(), runner);
        Self {
            config,
            agents,
            worker,
            pipeline,
            sink: Arc::new(NullSink),
            projects: BTreeMap::new(),
        }
    }

    /// Replace the verification pipeline.
    pub fn with_pipeline(mut self, pipeline: VerificationPipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// A fresh agent pool from the agents file and the fallback settings.
    fn new_pool(&self) -> AgentPool {
        AgentPool::from_config(self.agents.as_ref(), &self.config.fallback_agent)
    }

    /// Build a project from a decomposed task list and store it.
    ///
    /// Returns the new project's id. Fails with [`TaskgateError::Graph`] on
    /// duplicate ids, unknown dependencies or cycles.
    pub fn create_project(&mut self, name: &str, tasks: Vec<Task>) -> Result<ProjectId> {
        let id = format!("proj-{}", &Uuid::new_v4().simple().to_string()[..8]);
        let project = Project::new(id.clone(), name, tasks, self.new_pool())?;

        tracing::info!(
            project_id = %id,
            name,
            tasks = project.graph().len(),
            agents = project.queues().len(),
            "project created"
        );
        self.projects.insert(id.clone(), project);
        Ok(id)
    }

    /// Run a project until no task can make further progress.
    pub fn run(&mut self, project_id: &str) -> Result<RunSummary> {
        let project = self
            .projects
            .get_mut(project_id)
            .ok_or_else(|| TaskgateError::UnknownProject(project_id.to_string()))?;

        let services = Services {
            worker: self.worker.as_ref(),
            pipeline: &self.pipeline,
            sink: self.sink.as_ref(),
        };
        let workspace = PathBuf::from(&self.config.execution.workspace_dir);

        Ok(Execution::new(project, services, &self.config.execution, workspace).run())
    }

    pub fn project(&self, project_id: &str) -> Option<&Project> {
        self.projects.get(project_id)
    }

    /// Stored projects, ordered by id.
    pub fn projects(&self) -> impl Iterator<Item = &Project> {
        self.projects.values()
    }

    pub fn snapshot(&self, project_id: &str) -> Result<ProjectSnapshot> {
        self.project(project_id)
            .map(Project::snapshot)
            .ok_or_else(|| TaskgateError::UnknownProject(project_id.to_string()))
    }

    /// Store a project rebuilt from a snapshot, replacing any project with
    /// the same id.
    pub fn restore(&mut self, snapshot: ProjectSnapshot) -> Result<ProjectId> {
        let fallback = self.new_pool().fallback().clone();
        let project = Project::from_snapshot(snapshot, fallback)?;
        let id = project.id().to_string();

        tracing::info!(project_id = %id, tasks = project.graph().len(), "project restored");
        self.projects.insert(id.clone(), project);
        Ok(id)
    }

    /// Return a blocked task to `todo`. Returns false if it was not blocked.
    pub fn release_blocked(&mut self, project_id: &str, task_id: &str) -> Result<bool> {
        let project = self
            .projects
            .get_mut(project_id)
            .ok_or_else(|| TaskgateError::UnknownProject(project_id.to_string()))?;
        Ok(project.release_blocked(task_id))
    }
}
