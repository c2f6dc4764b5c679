use super::{StepContext, VerificationStep};
use crate::config::StepId;
use crate::error::VerificationError;
use crate::verify::tree::FileEntry;
use crate::verify::types::{StepKind, StepResult};

/// Manifest files and the lockfiles that pin them.
const ECOSYSTEMS: &[(&str, &[&str])] = &[
    ("Cargo.toml", &["Cargo.lock"]),
    (
        "package.json",
        &["package-lock.json", "yarn.lock", "pnpm-lock.yaml", "bun.lockb"],
    ),
    ("go.mod", &["go.sum"]),
    ("pyproject.toml", &["poetry.lock", "uv.lock", "pdm.lock"]),
    ("requirements.txt", &["requirements.txt"]),
    ("Gemfile", &["Gemfile.lock"]),
    ("composer.json", &["composer.lock"]),
];

const NO_MANIFEST_FRACTION: f64 = 0.5;
const MISSING_LOCK_PENALTY: f64 = 0.3;
const WILDCARD_PENALTY: f64 = 0.4;

/// Weighted: dependency manifest present, lockfile present, no wildcard versions.
pub struct DependenciesStep;

impl VerificationStep for DependenciesStep {
    fn id(&self) -> StepId {
        StepId::Dependencies
    }

    fn kind(&self) -> StepKind {
        StepKind::Weighted
    }

    fn run(&self, ctx: &StepContext<'_>) -> Result<StepResult, VerificationError> {
        let max = ctx.weight(self.id());
        let tree = ctx.tree;

        let manifests: Vec<(&FileEntry, &[&str])> = ECOSYSTEMS
            .iter()
            .filter_map(|(manifest, locks)| {
                tree.files()
                    .iter()
                    .find(|f| f.path == *manifest)
                    .map(|entry| (entry, *locks))
            })
            .collect();

        if manifests.is_empty() {
            return Ok(
                StepResult::scored(self.id(), self.kind(), max, NO_MANIFEST_FRACTION)
                    .with_issue("no dependency manifest found at the project root")
                    .with_recommendation(
                        "Declare dependencies in a manifest (Cargo.toml, package.json, pyproject.toml, ...)",
                    ),
            );
        }

        let mut fraction = 1.0;
        let mut result_issues = Vec::new();
        let mut recommendations = Vec::new();

        let unlocked: Vec<&str> = manifests
            .iter()
            .filter(|(_, locks)| !locks.iter().any(|l| tree.contains(l)))
            .map(|(entry, _)| entry.path.as_str())
            .collect();
        if !unlocked.is_empty() {
            fraction -= MISSING_LOCK_PENALTY;
            result_issues.push(format!("no lockfile for {}", unlocked.join(", ")));
            recommendations.push("Commit the lockfile so builds are reproducible".to_string());
        }

        let mut wildcards = Vec::new();
        for (entry, _) in &manifests {
            let Some(text) = tree.read_text(self.id(), entry)? else {
                continue;
            };
            wildcards.extend(
                wildcard_versions(&entry.path, &text)
                    .into_iter()
                    .map(|dep| format!("{}: {}", entry.path, dep)),
            );
        }
        if !wildcards.is_empty() {
            fraction -= WILDCARD_PENALTY;
            result_issues.push(format!("unpinned dependency versions: {}", wildcards.join(", ")));
            recommendations.push("Pin dependency versions instead of using wildcards".to_string());
        }

        let mut result =
            StepResult::scored(self.id(), self.kind(), max, fraction).with_issues(result_issues);
        for rec in recommendations {
            result = result.with_recommendation(rec);
        }
        Ok(result)
    }
}

/// Dependency names declared with a wildcard or unpinned version.
pub(crate) fn wildcard_versions(manifest: &str, text: &str) -> Vec<String> {
    match manifest {
        "package.json" => {
            let Ok(json) = serde_json::from_str::<serde_json::Value>(text) else {
                return Vec::new();
            };
            ["dependencies", "devDependencies"]
                .iter()
                .filter_map(|section| json.get(section).and_then(|d| d.as_object()))
                .flat_map(|deps| deps.iter())
                .filter(|(_, v)| matches!(v.as_str(), Some("*") | Some("latest") | Some("")))
                .map(|(name, _)| name.clone())
                .collect()
        }
        "requirements.txt" => text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#') && !l.starts_with('-'))
            .filter(|l| !l.contains(['=', '<', '>', '~', '@']))
            .map(str::to_string)
            .collect(),
        _ => text
            .lines()
            .filter_map(|line| {
                let (name, value) = line.split_once('=')?;
                let value = value.trim();
                let wildcard = value == "\"*\""
                    || value.contains("version = \"*\"")
                    || value.contains("version=\"*\"");
                wildcard.then(|| name.trim().to_string())
            })
            .collect(),
    }
}
