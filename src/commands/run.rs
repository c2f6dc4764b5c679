//! Implementation of the `taskgate run` command.

use super::{Settings, print_json};
use crate::cli::{GlobalArgs, RunArgs};
use std::path::Path;
use std::sync::Arc;
use taskgate::agent::dispatch::CommandWorker;
use taskgate::engine::{Orchestrator, RunSummary};
use taskgate::error::{Result, TaskgateError};
use taskgate::events::NdjsonSink;
use taskgate::runner::{CommandRunner, SystemRunner};
use taskgate::snapshot::ProjectSnapshot;
use taskgate::task::load_tasks;

/// Execute the `taskgate run` command.
///
/// Builds the project from a task list (or restores it from a snapshot),
/// runs it, optionally saves a snapshot, and fails with the "incomplete"
/// exit code unless every task completed.
pub fn cmd_run(global: &GlobalArgs, args: RunArgs) -> Result<()> {
    check_release(&args)?;
    let Settings { config, agents } = Settings::load(global)?;

    let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);
    let worker = Arc::new(CommandWorker::new(runner.clone(), &args.logs_dir));
    let mut orchestrator = Orchestrator::new(config, agents, worker, runner);
    if let Some(path) = &args.events {
        orchestrator = orchestrator.with_sink(Arc::new(NdjsonSink::open(path)?));
    }

    let project_id = match (&args.resume, &args.tasks) {
        (Some(snapshot), _) => {
            let id = orchestrator.restore(ProjectSnapshot::load(snapshot)?)?;
            for task_id in &args.release {
                if !orchestrator.release_blocked(&id, task_id)? {
                    return Err(TaskgateError::UserError(format!(
                        "task '{}' is not blocked in snapshot '{}'",
                        task_id,
                        snapshot.display()
                    )));
                }
            }
            id
        }
        (None, Some(tasks)) => {
            let list = load_tasks(tasks)?;
            let name = args
                .name
                .clone()
                .or(list.name)
                .unwrap_or_else(|| file_stem(tasks));
            orchestrator.create_project(&name, list.tasks)?
        }
        (None, None) => {
            return Err(TaskgateError::UserError(
                "nothing to run\n\nFix: pass a task list or --resume <snapshot>".to_string(),
            ));
        }
    };

    let summary = orchestrator.run(&project_id)?;

    if let Some(path) = &args.snapshot {
        orchestrator.snapshot(&project_id)?.save(path)?;
    }

    if args.json {
        print_json(&summary)?;
    } else {
        print_summary(&summary, args.snapshot.as_deref());
    }

    if !summary.complete {
        return Err(TaskgateError::Incomplete {
            project: project_id,
            detail: summary.incomplete_detail(),
        });
    }
    Ok(())
}

/// `--release` names tasks in a snapshot, so it means nothing without `--resume`.
fn check_release(args: &RunArgs) -> Result<()> {
    if args.release.is_empty() || args.resume.is_some() {
        return Ok(());
    }
    let ids = args.release.join(",");
    Err(TaskgateError::UserError(format!(
        "--release {ids} needs a snapshot to release from\n\n\
         Fix: run `taskgate run --resume <snapshot> --release {ids}`."
    )))
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string())
}

fn print_summary(summary: &RunSummary, snapshot: Option<&Path>) {
    println!("Project {}", summary.project_id);
    println!("================");
    for (status, count) in &summary.counts {
        println!("  {:12} {:>3}", status.as_str(), count);
    }
    println!();

    if !summary.timed_out.is_empty() {
        println!("Completed via timeout: {}", summary.timed_out.join(", "));
    }
    if !summary.failed.is_empty() {
        println!("Failed: {}", summary.failed.join(", "));
    }
    if !summary.blocked.is_empty() {
        println!("Blocked: {}", summary.blocked.join(", "));
    }
    if !summary.stranded.is_empty() {
        println!("Stranded: {}", summary.stranded.join(", "));
    }

    println!(
        "{} in {:.1}s",
        if summary.complete {
            "Complete"
        } else {
            "Incomplete"
        },
        summary.elapsed().as_secs_f64()
    );
    if let Some(path) = snapshot {
        println!("Snapshot written to {}", path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Command};
    use clap::Parser;

    fn run_args(argv: &[&str]) -> (GlobalArgs, RunArgs) {
        let cli = Cli::try_parse_from(argv).unwrap();
        let Command::Run(args) = cli.command else {
            panic!("Expected Run command");
        };
        (cli.global, args)
    }

    #[test]
    fn release_without_resume_is_rejected() {
        let (global, args) = run_args(&["taskgate", "run", "tasks.yaml", "--release", "a"]);
        let err = check_release(&args).unwrap_err();
        assert!(matches!(err, TaskgateError::UserError(_)));
        assert!(err.to_string().contains("--resume"));

        let err = cmd_run(&global, args).unwrap_err();
        assert!(matches!(err, TaskgateError::UserError(_)));
    }

    #[test]
    fn release_with_resume_is_accepted() {
        let (_, args) = run_args(&["taskgate", "run", "--resume", "s.json", "--release", "a"]);
        assert!(check_release(&args).is_ok());
        let (_, args) = run_args(&["taskgate", "run", "tasks.yaml"]);
        assert!(check_release(&args).is_ok());
    }
}
