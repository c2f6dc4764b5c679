//! Build and test gates.
//!
//! Both run one command in the project root and pass iff it exits 0. The
//! command comes from config, or is detected from the project's manifest
//! when `auto_detect_commands` is on. With neither, the gate is skipped.

use super::{StepContext, VerificationStep, output_tail};
use crate::config::StepId;
use crate::error::VerificationError;
use crate::verify::tree::FileTree;
use crate::verify::types::{StepKind, StepResult};

/// Gate that runs the build or the test command.
pub struct CommandGate {
    id: StepId,
}

impl CommandGate {
    pub fn build() -> Self {
        Self { id: StepId::Build }
    }

    pub fn tests() -> Self {
        Self { id: StepId::Tests }
    }

    fn configured<'a>(&self, ctx: &'a StepContext<'_>) -> Option<&'a str> {
        let cmd = match self.id {
            StepId::Build => ctx.config.build_command.as_deref(),
            _ => ctx.config.test_command.as_deref(),
        };
        cmd.map(str::trim).filter(|c| !c.is_empty())
    }

    fn advice(&self) -> &'static str {
        match self.id {
            StepId::Build => "Fix the compilation errors so the project builds cleanly",
            _ => "Fix the failing tests or the code they exercise",
        }
    }
}

impl VerificationStep for CommandGate {
    fn id(&self) -> StepId {
        self.id
    }

    fn kind(&self) -> StepKind {
        StepKind::Gate
    }

    fn run(&self, ctx: &StepContext<'_>) -> Result<StepResult, VerificationError> {
        let command = match self.configured(ctx) {
            Some(cmd) => cmd.to_string(),
            None if ctx.config.auto_detect_commands => match detect_command(ctx.tree, self.id) {
                Some(cmd) => cmd,
                None => {
                    return Ok(StepResult::skip(
                        self.id,
                        self.kind(),
                        format!("no {} command configured or detected", self.id),
                    ));
                }
            },
            None => {
                return Ok(StepResult::skip(
                    self.id,
                    self.kind(),
                    format!("no {} command configured", self.id),
                ));
            }
        };

        let max = ctx.weight(self.id);
        let output = ctx.run_command(self.id, &command, ctx.config.command_timeout())?;

        if output.success {
            return Ok(StepResult::pass(self.id, self.kind(), max));
        }

        Ok(StepResult::fail(
            self.id,
            self.kind(),
            max,
            format!("{} command `{}` {}", self.id, command, output.failure_reason()),
        )
        .with_recommendation(self.advice())
        .with_output(output_tail(&output)))
    }
}

/// Guess the build or test command from the manifests at the project root.
///
/// Returns `None` for other step ids.
pub fn detect_command(tree: &FileTree, id: StepId) -> Option<String> {
    let has = |name: &str| tree.contains(name);

    if has("Cargo.toml") {
        return match id {
            StepId::Build => Some("cargo build --quiet".to_string()),
            StepId::Tests => Some("cargo test --quiet".to_string()),
            _ => None,
        };
    }

    if has("go.mod") {
        return match id {
            StepId::Build => Some("go build ./...".to_string()),
            StepId::Tests => Some("go test ./...".to_string()),
            _ => None,
        };
    }

    if has("package.json") {
        let script = match id {
            StepId::Build => "build",
            StepId::Tests => "test",
            _ => return None,
        };
        return npm_script(tree, script).then(|| match id {
            StepId::Build => "npm run build".to_string(),
            _ => "npm test".to_string(),
        });
    }

    if has("pyproject.toml") || has("setup.py") || has("requirements.txt") {
        return match id {
            StepId::Build => Some("python3 -m compileall -q .".to_string()),
            StepId::Tests if has_python_tests(tree) => Some("python3 -m pytest -q".to_string()),
            _ => None,
        };
    }

    if has("Makefile") {
        return match id {
            StepId::Build => Some("make".to_string()),
            StepId::Tests if makefile_has_target(tree, "test") => Some("make test".to_string()),
            _ => None,
        };
    }

    None
}

/// Whether package.json defines a script, ignoring npm's placeholder test script.
fn npm_script(tree: &FileTree, name: &str) -> bool {
    let Some(text) = read_root_file(tree, "package.json") else {
        return false;
    };
    let Ok(json) = serde_json::from_str::<serde_json::Value>(&text) else {
        return false;
    };
    json.get("scripts")
        .and_then(|s| s.get(name))
        .and_then(|s| s.as_str())
        .is_some_and(|s| !s.contains("no test specified"))
}

fn has_python_tests(tree: &FileTree) -> bool {
    tree.files().iter().any(|f| {
        let name = f.file_name();
        name.ends_with(".py") && (name.starts_with("test_") || name.ends_with("_test.py"))
    })
}

fn makefile_has_target(tree: &FileTree, target: &str) -> bool {
    let prefix = format!("{}:", target);
    read_root_file(tree, "Makefile")
        .is_some_and(|text| text.lines().any(|l| l.starts_with(&prefix)))
}

fn read_root_file(tree: &FileTree, name: &str) -> Option<String> {
    let entry = tree.files().iter().find(|f| f.path == name)?;
    tree.read_text(StepId::Build, entry).ok().flatten()
}
