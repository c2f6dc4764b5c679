//! The dispatch loop.
//!
//! One loop thread owns the project. Each dispatched attempt runs on a scoped
//! worker thread that calls the worker and then the verification pipeline,
//! and reports back over an `mpsc` channel:
//!
//! 1. `WorkerFinished` once the worker returned (task moves to `review`)
//! 2. `Finished` with the verification result or the worker error
//!
//! Every graph, board and pool mutation happens on the loop thread. Each
//! attempt carries a token; a message whose token no longer matches the
//! task's in-flight entry (the deadline fired first) is dropped.

use super::project::Project;
use super::retry::{RetryDecision, RetryPolicy};
use crate::agent::dispatch::{WorkRequest, Worker, WorkerReport};
use crate::agent::prompt::build_task_prompt;
use crate::config::ExecutionConfig;
use crate::error::ExecutionError;
use crate::events::{EngineEvent, EventSink};
use crate::task::{CompletionKind, TaskStatus};
use crate::verify::{RemediationPlan, Severity, VerificationPipeline, VerificationResult};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, Scope};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Collaborators shared with worker threads.
#[derive(Clone, Copy)]
pub(crate) struct Services<'a> {
    pub(crate) worker: &'a dyn Worker,
    pub(crate) pipeline: &'a VerificationPipeline,
    pub(crate) sink: &'a dyn EventSink,
}

/// Outcome of one [`Orchestrator::run`](super::Orchestrator::run).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub project_id: String,
    /// Every task reached `completed`.
    pub complete: bool,
    /// Tasks per column after the run.
    pub counts: BTreeMap<TaskStatus, usize>,
    pub completed: Vec<String>,
    /// Completed because the per-task deadline expired.
    pub timed_out: Vec<String>,
    pub failed: Vec<String>,
    pub blocked: Vec<String>,
    /// Left in `todo` behind a failed or blocked dependency.
    pub stranded: Vec<String>,
    pub elapsed_ms: u64,
}

impl RunSummary {
    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms)
    }

    /// Short human-readable reason the run is not complete.
    pub fn incomplete_detail(&self) -> String {
        let mut parts = Vec::new();
        if !self.failed.is_empty() {
            parts.push(format!("failed: {}", self.failed.join(", ")));
        }
        if !self.blocked.is_empty() {
            parts.push(format!("blocked: {}", self.blocked.join(", ")));
        }
        if !self.stranded.is_empty() {
            parts.push(format!("stranded: {}", self.stranded.join(", ")));
        }
        if parts.is_empty() {
            parts.push("tasks remain unfinished".to_string());
        }
        parts.join("; ")
    }
}

enum Message {
    WorkerFinished {
        task_id: String,
        token: u64,
    },
    Finished {
        task_id: String,
        token: u64,
        outcome: AttemptOutcome,
    },
}

enum AttemptOutcome {
    Verified {
        result: VerificationResult,
        report: WorkerReport,
    },
    WorkerFailed(ExecutionError),
}

struct InFlight {
    token: u64,
    agent_id: String,
    attempt: u32,
}

/// State of one run over one project.
pub(crate) struct Execution<'p, 'a> {
    project: &'p mut Project,
    services: Services<'a>,
    config: &'a ExecutionConfig,
    workspace: PathBuf,
    policy: RetryPolicy,
    in_flight: HashMap<String, InFlight>,
    /// Absolute deadline per task, set on its first dispatch in this run.
    deadlines: HashMap<String, Instant>,
    /// Cached probe outcome per agent id.
    probes: HashMap<String, Result<(), String>>,
    next_token: u64,
    started: Instant,
}

impl<'p, 'a> Execution<'p, 'a> {
    pub(crate) fn new(
        project: &'p mut Project,
        services: Services<'a>,
        config: &'a ExecutionConfig,
        workspace: PathBuf,
    ) -> Self {
        Self {
            project,
            services,
            config,
            workspace,
            policy: RetryPolicy::from_config(config),
            in_flight: HashMap::new(),
            deadlines: HashMap::new(),
            probes: HashMap::new(),
            next_token: 0,
            started: Instant::now(),
        }
    }

    /// Drive the project until nothing is running and nothing is ready.
    ///
    /// Attempts discarded by a deadline are still joined before this returns.
    pub(crate) fn run(mut self) -> RunSummary {
        tracing::info!(
            project_id = %self.project.id(),
            tasks = self.project.graph().len(),
            "run started"
        );
        self.services.sink.emit(&EngineEvent::ProjectStarted {
            project_id: self.project.id().to_string(),
            name: self.project.name().to_string(),
            total_tasks: self.project.graph().len(),
        });

        thread::scope(|scope| {
            let (tx, rx) = mpsc::channel::<Message>();

            loop {
                self.expire_deadlines();
                self.dispatch_ready(scope, &tx);
                if self.in_flight.is_empty() {
                    break;
                }

                let received = match self.next_deadline() {
                    Some(deadline) => {
                        rx.recv_timeout(deadline.saturating_duration_since(Instant::now()))
                    }
                    None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
                };

                match received {
                    Ok(message) => self.handle(scope, &tx, message),
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => {
                        tracing::warn!("worker channel closed with tasks in flight");
                        break;
                    }
                }
            }
        });

        self.finish()
    }

    fn dispatch_ready<'scope, 'env>(
        &mut self,
        scope: &'scope Scope<'scope, 'env>,
        tx: &Sender<Message>,
    ) where
        'a: 'scope,
    {
        for task_id in self.project.graph().dispatch_order() {
            if self.in_flight.contains_key(&task_id) {
                continue;
            }

            let agent_id = self.resolve_agent(&task_id);
            if let Err(reason) = self.probe(&agent_id) {
                self.fail_unavailable(&task_id, &agent_id, reason);
                continue;
            }
            if !self.project.pool_mut().acquire(&agent_id, &task_id) {
                continue;
            }
            if !self
                .project
                .transition(&task_id, TaskStatus::InProgress, Some(&agent_id))
            {
                self.project.pool_mut().release(&agent_id, &task_id);
                continue;
            }
            self.agent_changed(&agent_id);

            if let Some(task) = self.project.task_mut(&task_id) {
                task.set_assigned(&agent_id);
                task.mark_started(Utc::now());
            }
            if self.config.task_deadline_seconds > 0 {
                let budget = Duration::from_secs(self.config.task_deadline_seconds);
                self.deadlines
                    .entry(task_id.clone())
                    .or_insert_with(|| Instant::now() + budget);
            }

            self.launch(scope, tx, &task_id, &agent_id);
        }
    }

    /// The task's bound agent, re-assigning when that agent left the pool.
    fn resolve_agent(&mut self, task_id: &str) -> String {
        if let Some(agent_id) = self.project.assignment(task_id)
            && self.project.pool().get(agent_id).is_some()
        {
            return agent_id.to_string();
        }

        let Some(task) = self.project.task(task_id).cloned() else {
            return self.project.pool_mut().ensure_fallback();
        };
        let agent_id = self.project.pool_mut().assign(&task);
        self.project.bind(task_id, &agent_id);
        agent_id
    }

    fn probe(&mut self, agent_id: &str) -> Result<(), String> {
        if !self.config.probe_workers {
            return Ok(());
        }
        if let Some(cached) = self.probes.get(agent_id) {
            return cached.clone();
        }
        let Some(agent) = self.project.pool().get(agent_id) else {
            return Ok(());
        };

        let result = self.services.worker.probe(agent).map_err(|e| e.to_string());
        match &result {
            Ok(()) => tracing::debug!(agent_id, "agent probe ok"),
            Err(reason) => tracing::warn!(agent_id, reason = %reason, "agent unavailable"),
        }
        self.probes.insert(agent_id.to_string(), result.clone());
        result
    }

    /// Spawn one attempt for a task already in `inProgress` with a held slot.
    fn launch<'scope, 'env>(
        &mut self,
        scope: &'scope Scope<'scope, 'env>,
        tx: &Sender<Message>,
        task_id: &str,
        agent_id: &str,
    ) where
        'a: 'scope,
    {
        let (Some(task), Some(agent)) = (
            self.project.task(task_id),
            self.project.pool().get(agent_id).cloned(),
        ) else {
            tracing::warn!(task_id, agent_id, "cannot launch: task or agent missing");
            return;
        };

        let attempt = task.attempt();
        let instruction = self.project.plan(task_id).map(|p| p.instruction.as_str());
        let request = WorkRequest {
            task_id: task_id.to_string(),
            title: task.title.clone(),
            prompt: build_task_prompt(task, instruction),
            session_id: Uuid::new_v4().to_string(),
            workdir: self.workspace.join(task_id),
            attempt,
        };
        let timeout = Duration::from_secs(
            agent
                .timeout_seconds
                .unwrap_or(self.config.worker_timeout_seconds),
        );

        self.next_token += 1;
        let token = self.next_token;
        self.in_flight.insert(
            task_id.to_string(),
            InFlight {
                token,
                agent_id: agent_id.to_string(),
                attempt,
            },
        );

        tracing::info!(task_id, agent_id, attempt, "task dispatched");
        self.services.sink.emit(&EngineEvent::TaskStarted {
            task_id: task_id.to_string(),
            agent_id: agent_id.to_string(),
            attempt,
        });

        let services = self.services;
        let tx = tx.clone();
        scope.spawn(move || {
            let attempt = || match services.worker.execute(&agent, &request, timeout) {
                Ok(outcome) => {
                    // The receiver is gone only when the run already ended.
                    let _ = tx.send(Message::WorkerFinished {
                        task_id: request.task_id.clone(),
                        token,
                    });
                    let result = services.pipeline.verify(
                        &request.task_id,
                        &request.workdir,
                        request.attempt,
                        services.sink,
                    );
                    AttemptOutcome::Verified {
                        result,
                        report: outcome.report,
                    }
                }
                Err(e) => AttemptOutcome::WorkerFailed(e),
            };
            // Every attempt ends in exactly one `Finished`, even when it panics.
            let outcome =
                panic::catch_unwind(AssertUnwindSafe(attempt)).unwrap_or_else(|payload| {
                    AttemptOutcome::WorkerFailed(ExecutionError::Worker {
                        task: request.task_id.clone(),
                        message: format!("worker panicked: {}", panic_message(payload.as_ref())),
                    })
                });
            let _ = tx.send(Message::Finished {
                task_id: request.task_id,
                token,
                outcome,
            });
        });
    }

    fn handle<'scope, 'env>(
        &mut self,
        scope: &'scope Scope<'scope, 'env>,
        tx: &Sender<Message>,
        message: Message,
    ) where
        'a: 'scope,
    {
        match message {
            Message::WorkerFinished { task_id, token } => {
                let Some(attempt) = self
                    .in_flight
                    .get(&task_id)
                    .filter(|f| f.token == token)
                    .map(|f| f.attempt)
                else {
                    tracing::debug!(task_id = %task_id, token, "stale worker notice dropped");
                    return;
                };
                if self.project.transition(&task_id, TaskStatus::Review, None) {
                    self.services.sink.emit(&EngineEvent::TaskInReview {
                        task_id: task_id.clone(),
                        attempt,
                    });
                }
            }
            Message::Finished {
                task_id,
                token,
                outcome,
            } => {
                if self.in_flight.get(&task_id).is_none_or(|f| f.token != token) {
                    tracing::debug!(task_id = %task_id, token, "late attempt result discarded");
                    return;
                }
                let Some(flight) = self.in_flight.remove(&task_id) else {
                    return;
                };
                match outcome {
                    AttemptOutcome::Verified { result, report } => {
                        self.on_verified(scope, tx, &task_id, flight, result, report)
                    }
                    AttemptOutcome::WorkerFailed(e) => self.on_worker_error(&task_id, flight, e),
                }
            }
        }
    }

    fn on_verified<'scope, 'env>(
        &mut self,
        scope: &'scope Scope<'scope, 'env>,
        tx: &Sender<Message>,
        task_id: &str,
        flight: InFlight,
        result: VerificationResult,
        report: WorkerReport,
    ) where
        'a: 'scope,
    {
        if !report.summary.is_empty() {
            tracing::debug!(task_id, summary = %report.summary, "worker report");
        }

        let score = result.score;
        if result.passed {
            tracing::info!(task_id, score, attempt = flight.attempt, "verification passed");
            self.project.record_verification(task_id, result);
            self.release_slot(task_id, &flight.agent_id);
            self.complete(task_id, CompletionKind::Verified, Some(score));
            return;
        }

        let retries_used = self.project.task(task_id).map_or(0, |t| t.retry_count);
        let decision = self.policy.decide(&result, retries_used);
        let severity = result.severity.unwrap_or(Severity::Minor);
        let reason = result.summary();
        let issues = result.issues();
        let plan = RemediationPlan::from_result(&result, &[]);

        tracing::warn!(
            task_id,
            score,
            %severity,
            attempt = flight.attempt,
            decision = ?decision,
            "verification failed"
        );
        self.project.record_verification(task_id, result);
        self.project.set_plan(task_id, plan);

        match decision {
            RetryDecision::Retry => {
                if !self.project.transition(task_id, TaskStatus::Revision, None) {
                    self.release_slot(task_id, &flight.agent_id);
                    return;
                }
                self.services.sink.emit(&EngineEvent::TaskNeedsRevision {
                    task_id: task_id.to_string(),
                    attempt: flight.attempt,
                    score,
                    severity,
                    issues,
                });
                if let Some(task) = self.project.task_mut(task_id) {
                    task.increment_retry();
                }
                // The slot stays held across the retry.
                if self.project.transition(
                    task_id,
                    TaskStatus::InProgress,
                    Some(flight.agent_id.as_str()),
                ) {
                    self.launch(scope, tx, task_id, &flight.agent_id);
                } else {
                    self.release_slot(task_id, &flight.agent_id);
                }
            }
            RetryDecision::Block => {
                self.project.transition(task_id, TaskStatus::Blocked, None);
                self.release_slot(task_id, &flight.agent_id);
                self.services.sink.emit(&EngineEvent::TaskBlocked {
                    task_id: task_id.to_string(),
                    reason,
                    score,
                });
            }
            RetryDecision::Fail => {
                self.project.transition(task_id, TaskStatus::Failed, None);
                self.release_slot(task_id, &flight.agent_id);
                self.services.sink.emit(&EngineEvent::TaskFailed {
                    task_id: task_id.to_string(),
                    reason,
                    score: Some(score),
                });
            }
        }
    }

    fn on_worker_error(&mut self, task_id: &str, flight: InFlight, error: ExecutionError) {
        tracing::warn!(
            task_id,
            agent_id = %flight.agent_id,
            attempt = flight.attempt,
            error = %error,
            "worker failed"
        );
        let reason = error.to_string();
        self.record_failure(task_id, flight.attempt, &reason);
        self.project.transition(task_id, TaskStatus::Failed, None);
        self.release_slot(task_id, &flight.agent_id);
        self.services.sink.emit(&EngineEvent::TaskFailed {
            task_id: task_id.to_string(),
            reason,
            score: None,
        });
    }

    /// The agent's tool is missing; the task fails without a worker call.
    fn fail_unavailable(&mut self, task_id: &str, agent_id: &str, reason: String) {
        let attempt = self.project.task(task_id).map_or(1, |t| t.attempt());
        self.record_failure(task_id, attempt, &reason);
        self.project
            .transition(task_id, TaskStatus::InProgress, Some(agent_id));
        self.project.transition(task_id, TaskStatus::Failed, None);
        self.services.sink.emit(&EngineEvent::TaskFailed {
            task_id: task_id.to_string(),
            reason,
            score: None,
        });
    }

    fn record_failure(&mut self, task_id: &str, attempt: u32, reason: &str) {
        if let Some(task) = self.project.task_mut(task_id) {
            task.add_issues([reason.to_string()]);
        }
        self.project
            .set_plan(task_id, RemediationPlan::from_error(reason, attempt));
    }

    fn complete(&mut self, task_id: &str, kind: CompletionKind, score: Option<f64>) {
        if !self.project.transition(task_id, TaskStatus::Completed, None) {
            return;
        }
        if let Some(task) = self.project.task_mut(task_id) {
            task.mark_completed(kind, Utc::now());
        }
        self.services.sink.emit(&EngineEvent::TaskCompleted {
            task_id: task_id.to_string(),
            kind,
            score,
        });
        if self.project.is_complete() {
            tracing::info!(project_id = %self.project.id(), "all tasks completed");
        }
    }

    /// Force-complete in-flight tasks whose deadline passed.
    fn expire_deadlines(&mut self) {
        let now = Instant::now();
        let expired: Vec<String> = self
            .in_flight
            .keys()
            .filter(|id| self.deadlines.get(*id).is_some_and(|d| *d <= now))
            .cloned()
            .collect();

        for task_id in expired {
            let Some(flight) = self.in_flight.remove(&task_id) else {
                continue;
            };
            tracing::warn!(
                task_id = %task_id,
                attempt = flight.attempt,
                "task deadline expired, forcing completion"
            );
            self.release_slot(&task_id, &flight.agent_id);
            let score = self
                .project
                .task(&task_id)
                .and_then(|t| t.verification_score);
            self.complete(&task_id, CompletionKind::Timeout, score);
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.in_flight
            .keys()
            .filter_map(|id| self.deadlines.get(id).copied())
            .min()
    }

    fn release_slot(&mut self, task_id: &str, agent_id: &str) {
        self.project.pool_mut().release(agent_id, task_id);
        self.agent_changed(agent_id);
    }

    fn agent_changed(&self, agent_id: &str) {
        let Some(agent) = self.project.pool().get(agent_id) else {
            return;
        };
        self.services.sink.emit(&EngineEvent::AgentStatusChanged {
            agent_id: agent_id.to_string(),
            active: agent.active_count(),
            max_concurrent: agent.max_concurrent,
        });
    }

    fn finish(self) -> RunSummary {
        let graph = self.project.graph();
        let ids_in = |status: TaskStatus| -> Vec<String> {
            graph
                .tasks()
                .iter()
                .filter(|t| t.status == status)
                .map(|t| t.id.clone())
                .collect()
        };

        let summary = RunSummary {
            project_id: self.project.id().to_string(),
            complete: graph.is_complete(),
            counts: self.project.board().counts(),
            completed: ids_in(TaskStatus::Completed),
            timed_out: graph
                .tasks()
                .iter()
                .filter(|t| t.completion == Some(CompletionKind::Timeout))
                .map(|t| t.id.clone())
                .collect(),
            failed: ids_in(TaskStatus::Failed),
            blocked: ids_in(TaskStatus::Blocked),
            stranded: self.project.stranded(),
            elapsed_ms: self.started.elapsed().as_millis() as u64,
        };

        tracing::info!(
            project_id = %summary.project_id,
            complete = summary.complete,
            completed = summary.completed.len(),
            failed = summary.failed.len(),
            blocked = summary.blocked.len(),
            stranded = summary.stranded.len(),
            elapsed_ms = summary.elapsed_ms,
            "run finished"
        );
        self.services.sink.emit(&EngineEvent::ProjectFinished {
            project_id: summary.project_id.clone(),
            complete: summary.complete,
            completed: summary.completed.len(),
            failed: summary.failed.len(),
            blocked: summary.blocked.len(),
            stranded: summary.stranded.len(),
            elapsed_ms: summary.elapsed_ms,
        });

        summary
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
