use super::*;
use crate::config::StepId;
use crate::error::{GraphError, VerificationError};
use crate::events::{CollectingSink, EngineEvent};
use crate::snapshot::ProjectSnapshot;
use crate::task::{CompletionKind, Priority, TaskStatus};
use crate::test_support::{FakeAttempt, FakeWorker, ScriptedRunner};
use crate::verify::steps::{StepContext, VerificationStep};
use crate::verify::{StepKind, StepResult};
use std::time::Duration;
use tempfile::TempDir;

/// Scores a working directory from the number in its `score.txt`.
struct ScoreFileStep;

impl VerificationStep for ScoreFileStep {
    fn id(&self) -> StepId {
        StepId::Lint
    }

    fn kind(&self) -> StepKind {
        StepKind::Weighted
    }

    fn run(&self, ctx: &StepContext<'_>) -> std::result::Result<StepResult, VerificationError> {
        let Ok(raw) = std::fs::read_to_string(ctx.tree.root().join("score.txt")) else {
            return Ok(StepResult::fail(
                self.id(),
                self.kind(),
                1.0,
                "score.txt missing",
            ));
        };
        let fraction: f64 = raw.trim().parse().unwrap_or(0.0);
        let mut result = StepResult::scored(self.id(), self.kind(), 1.0, fraction);
        if fraction < 1.0 {
            result = result
                .with_issue(format!("quality score {}", raw.trim()))
                .with_recommendation("Raise the quality score");
        }
        Ok(result)
    }
}

fn score(value: &str) -> FakeAttempt {
    FakeAttempt::writes(&[("score.txt", value)])
}

struct Harness {
    _temp: TempDir,
    orchestrator: Orchestrator,
    worker: Arc<FakeWorker>,
    sink: Arc<CollectingSink>,
}

impl Harness {
    fn new(worker: FakeWorker) -> Self {
        Self::with(worker, None, |_| {})
    }

    fn with(
        worker: FakeWorker,
        agents: Option<AgentsConfig>,
        tweak: impl FnOnce(&mut Config),
    ) -> Self {
        let temp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.execution.workspace_dir = temp.path().join("work").to_string_lossy().into_owned();
        tweak(&mut config);

        let worker = Arc::new(worker);
        let sink = Arc::new(CollectingSink::new());
        let runner = Arc::new(ScriptedRunner::new());
        let pipeline = VerificationPipeline::with_steps(
            vec![Box::new(ScoreFileStep)],
            config.verification.clone(),
            runner.clone(),
        );
        let orchestrator = Orchestrator::new(config, agents, worker.clone(), runner)
            .with_pipeline(pipeline)
            .with_sink(sink.clone());

        Self {
            _temp: temp,
            orchestrator,
            worker,
            sink,
        }
    }

    fn create(&mut self, tasks: Vec<Task>) -> ProjectId {
        self.orchestrator.create_project("test", tasks).unwrap()
    }

    fn status(&self, project_id: &str, task_id: &str) -> TaskStatus {
        self.orchestrator
            .project(project_id)
            .unwrap()
            .task(task_id)
            .unwrap()
            .status
    }

    fn position(&self, wanted: impl Fn(&EngineEvent) -> bool) -> usize {
        self.sink
            .events()
            .iter()
            .position(wanted)
            .expect("event not emitted")
    }
}

fn started(event: &EngineEvent, id: &str) -> bool {
    matches!(event, EngineEvent::TaskStarted { task_id, .. } if task_id == id)
}

fn completed(event: &EngineEvent, id: &str) -> bool {
    matches!(event, EngineEvent::TaskCompleted { task_id, .. } if task_id == id)
}

#[test]
fn test_dependents_start_after_dependencies_complete() {
    let mut h = Harness::new(FakeWorker::new(&[("score.txt", "1.0")]));
    let id = h.create(vec![
        Task::new("a", "A"),
        Task::new("b", "B"),
        Task::new("c", "C").with_dependencies(["a", "b"]),
    ]);

    let summary = h.orchestrator.run(&id).unwrap();

    assert!(summary.complete);
    assert_eq!(summary.completed, vec!["a", "b", "c"]);
    assert_eq!(summary.counts[&TaskStatus::Completed], 3);
    assert!(summary.stranded.is_empty());

    let c_started = h.position(|e| started(e, "c"));
    assert!(h.position(|e| completed(e, "a")) < c_started);
    assert!(h.position(|e| completed(e, "b")) < c_started);

    let project = h.orchestrator.project(&id).unwrap();
    let task = project.task("c").unwrap();
    assert_eq!(task.completion, Some(CompletionKind::Verified));
    assert_eq!(task.verification_score, Some(1.0));
    assert_eq!(project.history("c").len(), 1);
    assert!(project.board().is_partition(["a", "b", "c"]));
}

#[test]
fn test_task_moves_through_review() {
    let mut h = Harness::new(FakeWorker::new(&[("score.txt", "1.0")]));
    let id = h.create(vec![Task::new("a", "A")]);
    h.orchestrator.run(&id).unwrap();

    let project = h.orchestrator.project(&id).unwrap();
    let path: Vec<(TaskStatus, TaskStatus)> =
        project.board().moves().iter().map(|m| (m.from, m.to)).collect();
    assert_eq!(
        path,
        vec![
            (TaskStatus::Todo, TaskStatus::InProgress),
            (TaskStatus::InProgress, TaskStatus::Review),
            (TaskStatus::Review, TaskStatus::Completed),
        ]
    );
    assert!(h.position(|e| matches!(e, EngineEvent::TaskInReview { .. })) > 0);
}

#[test]
fn test_worker_error_fails_task_and_sibling_completes() {
    let worker = FakeWorker::new(&[("score.txt", "1.0")])
        .script("a", vec![FakeAttempt::error("segfault in generator")]);
    let mut h = Harness::new(worker);
    let id = h.create(vec![Task::new("a", "A"), Task::new("b", "B")]);

    let summary = h.orchestrator.run(&id).unwrap();

    assert!(!summary.complete);
    assert_eq!(summary.failed, vec!["a"]);
    assert_eq!(summary.completed, vec!["b"]);

    let project = h.orchestrator.project(&id).unwrap();
    let task = project.task("a").unwrap();
    assert!(task.issues.iter().any(|i| i.contains("segfault in generator")));
    assert!(project.plan("a").is_some());
    assert!(project.history("a").is_empty());
}

#[test]
fn test_worker_panic_fails_task_without_stalling_run() {
    let worker = FakeWorker::new(&[("score.txt", "1.0")])
        .script("a", vec![FakeAttempt::panics("generator exploded")]);
    let mut h = Harness::new(worker);
    let id = h.create(vec![
        Task::new("a", "A"),
        Task::new("b", "B"),
        Task::new("c", "C").with_dependencies(["a"]),
    ]);

    let summary = h.orchestrator.run(&id).unwrap();

    assert_eq!(summary.failed, vec!["a"]);
    assert_eq!(summary.completed, vec!["b"]);
    assert_eq!(summary.stranded, vec!["c"]);
    let project = h.orchestrator.project(&id).unwrap();
    let task = project.task("a").unwrap();
    assert!(task.issues.iter().any(|i| i.contains("generator exploded")));
    assert!(project.plan("a").is_some());
}

#[test]
fn test_moderate_failure_retries_exactly_once() {
    let worker = FakeWorker::new(&[("score.txt", "0.5")]);
    let mut h = Harness::new(worker);
    let id = h.create(vec![Task::new("a", "A")]);

    let summary = h.orchestrator.run(&id).unwrap();

    assert_eq!(summary.failed, vec!["a"]);
    let calls = h.worker.calls_for("a");
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].attempt, 1);
    assert_eq!(calls[1].attempt, 2);
    assert!(!calls[0].prompt.contains("## Previous attempt"));
    assert!(calls[1].prompt.contains("## Previous attempt"));

    let project = h.orchestrator.project(&id).unwrap();
    assert_eq!(project.task("a").unwrap().retry_count, 1);
    assert_eq!(project.history("a").len(), 2);
    assert!(project.plan("a").is_some());

    let revisions = h
        .sink
        .events()
        .iter()
        .filter(|e| matches!(e, EngineEvent::TaskNeedsRevision { .. }))
        .count();
    assert_eq!(revisions, 1);
}

#[test]
fn test_retry_can_pass() {
    let worker = FakeWorker::new(&[("score.txt", "1.0")]).script("a", vec![score("0.5")]);
    let mut h = Harness::new(worker);
    let id = h.create(vec![Task::new("a", "A")]);

    let summary = h.orchestrator.run(&id).unwrap();

    assert!(summary.complete);
    assert_eq!(h.worker.calls_for("a").len(), 2);
    let task = h.orchestrator.project(&id).unwrap().task("a").unwrap().clone();
    assert_eq!(task.retry_count, 1);
    assert!(task.issues.contains(&"quality score 0.5".to_string()));
}

#[test]
fn test_critical_failure_blocks_and_strands_dependents() {
    let worker = FakeWorker::new(&[("score.txt", "1.0")]).script("a", vec![score("0.1")]);
    let mut h = Harness::new(worker);
    let id = h.create(vec![
        Task::new("a", "A"),
        Task::new("b", "B").with_dependencies(["a"]),
    ]);

    let summary = h.orchestrator.run(&id).unwrap();

    assert_eq!(summary.blocked, vec!["a"]);
    assert_eq!(summary.stranded, vec!["b"]);
    assert!(!summary.complete);
    assert_eq!(h.worker.calls_for("a").len(), 1);
    assert!(h.worker.calls_for("b").is_empty());
    assert_eq!(h.status(&id, "b"), TaskStatus::Todo);
    assert!(h.orchestrator.project(&id).unwrap().plan("a").is_some());
}

#[test]
fn test_below_floor_fails_without_retry() {
    let worker = FakeWorker::new(&[("score.txt", "1.0")]).script("a", vec![score("0.35")]);
    let mut h = Harness::new(worker);
    let id = h.create(vec![Task::new("a", "A")]);

    let summary = h.orchestrator.run(&id).unwrap();

    assert_eq!(summary.failed, vec!["a"]);
    assert_eq!(h.worker.calls_for("a").len(), 1);
}

#[test]
fn test_deadline_forces_timeout_completion() {
    let worker = FakeWorker::new(&[("score.txt", "1.0")]).script(
        "a",
        vec![score("1.0").delayed(Duration::from_millis(1500))],
    );
    let mut h = Harness::with(worker, None, |c| c.execution.task_deadline_seconds = 1);
    let id = h.create(vec![
        Task::new("a", "A"),
        Task::new("b", "B").with_dependencies(["a"]),
    ]);

    let summary = h.orchestrator.run(&id).unwrap();

    assert!(summary.complete);
    assert_eq!(summary.timed_out, vec!["a"]);

    let project = h.orchestrator.project(&id).unwrap();
    assert_eq!(
        project.task("a").unwrap().completion,
        Some(CompletionKind::Timeout)
    );
    assert_eq!(
        project.task("b").unwrap().completion,
        Some(CompletionKind::Verified)
    );
    // The late result of the timed-out attempt is dropped.
    assert!(project.history("a").is_empty());
}

#[test]
fn test_unavailable_agent_fails_task() {
    let worker = FakeWorker::new(&[("score.txt", "1.0")]).unavailable("generalist");
    let mut h = Harness::new(worker);
    let id = h.create(vec![Task::new("a", "A")]);

    let summary = h.orchestrator.run(&id).unwrap();

    assert_eq!(summary.failed, vec!["a"]);
    assert!(h.worker.calls().is_empty());
    let task = h.orchestrator.project(&id).unwrap().task("a").unwrap().clone();
    assert!(task.issues[0].contains("unavailable"));
}

#[test]
fn test_probe_can_be_disabled() {
    let worker = FakeWorker::new(&[("score.txt", "1.0")]).unavailable("generalist");
    let mut h = Harness::with(worker, None, |c| c.execution.probe_workers = false);
    let id = h.create(vec![Task::new("a", "A")]);

    assert!(h.orchestrator.run(&id).unwrap().complete);
}

const AGENTS: &str = r#"
agents:
  agent1:
    command: "one {prompt_file}"
    capabilities:
      x: 0.9
  agent2:
    command: "two {prompt_file}"
    max_concurrent: 2
    capabilities:
      x: 0.8
      y: 0.8
"#;

#[test]
fn test_assignment_uses_skill_scores_and_fallback() {
    let agents = AgentsConfig::from_yaml(AGENTS).unwrap();
    let mut h = Harness::with(FakeWorker::new(&[("score.txt", "1.0")]), Some(agents), |_| {});
    let id = h.create(vec![
        Task::new("both", "Both").with_skills(["x", "Y"]),
        Task::new("only-x", "X").with_skills(["x"]),
        Task::new("docs", "Docs").with_skills(["writing"]),
        Task::new("pinned", "Pinned").with_agent("agent1"),
    ]);

    let project = h.orchestrator.project(&id).unwrap();
    assert_eq!(project.assignment("both"), Some("agent2"));
    assert_eq!(project.assignment("only-x"), Some("agent1"));
    assert_eq!(project.assignment("docs"), Some("generalist"));
    assert_eq!(project.assignment("pinned"), Some("agent1"));
    assert_eq!(project.queues()["agent1"], vec!["only-x", "pinned"]);

    h.orchestrator.run(&id).unwrap();
    let calls = h.worker.calls_for("both");
    assert_eq!(calls[0].agent_id, "agent2");
}

#[test]
fn test_concurrency_respects_max_concurrent() {
    let slow = || score("1.0").delayed(Duration::from_millis(50));
    let worker = FakeWorker::new(&[("score.txt", "1.0")])
        .script("a", vec![slow()])
        .script("b", vec![slow()])
        .script("c", vec![slow()]);
    let agents = AgentsConfig::from_yaml(AGENTS).unwrap();
    let mut h = Harness::with(worker, Some(agents), |_| {});
    let id = h.create(
        ["a", "b", "c"]
            .iter()
            .map(|t| Task::new(*t, *t).with_skills(["y"]))
            .collect(),
    );

    assert!(h.orchestrator.run(&id).unwrap().complete);

    for event in h.sink.events() {
        if let EngineEvent::AgentStatusChanged {
            active,
            max_concurrent,
            ..
        } = event
        {
            assert!(active <= max_concurrent as usize);
        }
    }
}

#[test]
fn test_high_priority_dispatched_first() {
    let mut h = Harness::new(FakeWorker::new(&[("score.txt", "1.0")]));
    let id = h.create(vec![
        Task::new("low", "Low").with_priority(Priority::Low),
        Task::new("high", "High").with_priority(Priority::High),
    ]);

    h.orchestrator.run(&id).unwrap();

    let order: Vec<String> = h.worker.calls().into_iter().map(|c| c.task_id).collect();
    assert_eq!(order, vec!["high", "low"]);
}

#[test]
fn test_cycle_aborts_project_creation() {
    let mut h = Harness::new(FakeWorker::new(&[]));
    let err = h
        .orchestrator
        .create_project(
            "cyclic",
            vec![
                Task::new("a", "A").with_dependencies(["b"]),
                Task::new("b", "B").with_dependencies(["a"]),
            ],
        )
        .unwrap_err();

    assert!(matches!(
        err,
        TaskgateError::Graph(GraphError::CycleDetected(_))
    ));
    assert_eq!(h.orchestrator.projects().count(), 0);
}

#[test]
fn test_path_like_task_id_aborts_project_creation() {
    let outside = TempDir::new().unwrap();
    let escape = outside.path().join("escaped").to_string_lossy().into_owned();
    let mut h = Harness::new(FakeWorker::new(&[("score.txt", "1.0")]));

    for id in [escape.as_str(), "../sibling"] {
        let err = h
            .orchestrator
            .create_project("paths", vec![Task::new(id, "Escape")])
            .unwrap_err();
        assert!(matches!(
            err,
            TaskgateError::Graph(GraphError::InvalidTaskId { .. })
        ));
    }
    assert_eq!(h.orchestrator.projects().count(), 0);
    assert!(h.worker.calls_for(&escape).is_empty());
    assert!(!outside.path().join("escaped").exists());
}

#[test]
fn test_input_status_is_reset_and_run_completes() {
    let list = crate::task::parse_tasks(
        r#"
tasks:
  - id: a
    title: A
    status: inProgress
    retry_count: 2
  - id: b
    title: B
    depends_on: [a]
"#,
    )
    .unwrap();
    let mut h = Harness::new(FakeWorker::new(&[("score.txt", "1.0")]));
    let id = h.create(list.tasks);

    let project = h.orchestrator.project(&id).unwrap();
    assert_eq!(project.task("a").unwrap().status, TaskStatus::Todo);
    assert_eq!(project.task("a").unwrap().retry_count, 0);
    assert_eq!(project.board().column("a"), Some(TaskStatus::Todo));

    let summary = h.orchestrator.run(&id).unwrap();
    assert!(summary.complete);
    assert_eq!(summary.completed, vec!["a", "b"]);
    assert_eq!(h.worker.calls_for("a").len(), 1);
    assert!(h.orchestrator.snapshot(&id).unwrap().validate().is_ok());
}

#[test]
fn test_unknown_project() {
    let mut h = Harness::new(FakeWorker::new(&[]));
    assert!(matches!(
        h.orchestrator.run("proj-missing"),
        Err(TaskgateError::UnknownProject(_))
    ));
    assert!(h.orchestrator.snapshot("proj-missing").is_err());
}

#[test]
fn test_release_blocked_and_rerun() {
    let worker = FakeWorker::new(&[("score.txt", "1.0")]).script("a", vec![score("0.1")]);
    let mut h = Harness::new(worker);
    let id = h.create(vec![
        Task::new("a", "A"),
        Task::new("b", "B").with_dependencies(["a"]),
    ]);
    h.orchestrator.run(&id).unwrap();
    assert_eq!(h.status(&id, "a"), TaskStatus::Blocked);

    assert!(!h.orchestrator.release_blocked(&id, "b").unwrap());
    assert!(h.orchestrator.release_blocked(&id, "a").unwrap());
    assert_eq!(h.status(&id, "a"), TaskStatus::Todo);

    let summary = h.orchestrator.run(&id).unwrap();
    assert!(summary.complete);
    let calls = h.worker.calls_for("a");
    assert_eq!(calls.len(), 2);
    assert!(calls[1].prompt.contains("## Previous attempt"));
}

#[test]
fn test_snapshot_save_and_restore() {
    let worker = FakeWorker::new(&[("score.txt", "1.0")]).script("b", vec![score("0.1")]);
    let mut h = Harness::new(worker);
    let id = h.create(vec![
        Task::new("a", "A"),
        Task::new("b", "B").with_dependencies(["a"]),
    ]);
    h.orchestrator.run(&id).unwrap();

    let temp = TempDir::new().unwrap();
    let path = temp.path().join("snapshot.json");
    h.orchestrator.snapshot(&id).unwrap().save(&path).unwrap();
    let loaded = ProjectSnapshot::load(&path).unwrap();

    let mut fresh = Harness::new(FakeWorker::new(&[("score.txt", "1.0")]));
    let restored = fresh.orchestrator.restore(loaded).unwrap();
    assert_eq!(restored, id);
    assert_eq!(fresh.status(&id, "a"), TaskStatus::Completed);
    assert_eq!(fresh.status(&id, "b"), TaskStatus::Blocked);

    let project = fresh.orchestrator.project(&id).unwrap();
    assert_eq!(project.history("b").len(), 1);
    assert!(project.plan("b").is_some());
    assert_eq!(project.assignment("a"), Some("generalist"));

    fresh.orchestrator.release_blocked(&id, "b").unwrap();
    assert!(fresh.orchestrator.run(&id).unwrap().complete);
    assert!(fresh.worker.calls_for("a").is_empty());
}

#[test]
fn test_restore_resets_interrupted_tasks() {
    let mut h = Harness::new(FakeWorker::new(&[("score.txt", "1.0")]));
    let id = h.create(vec![Task::new("a", "A"), Task::new("b", "B")]);

    let mut snapshot = h.orchestrator.snapshot(&id).unwrap();
    snapshot
        .board
        .move_task("a", TaskStatus::Todo, TaskStatus::InProgress, Some("generalist"));
    snapshot
        .board
        .move_task("a", TaskStatus::InProgress, TaskStatus::Review, None);
    snapshot.tasks[0].status = TaskStatus::Review;

    h.orchestrator.restore(snapshot).unwrap();
    assert_eq!(h.status(&id, "a"), TaskStatus::Todo);
    let project = h.orchestrator.project(&id).unwrap();
    assert_eq!(project.board().column("a"), Some(TaskStatus::Todo));
    assert!(project.board().is_partition(["a", "b"]));
}
