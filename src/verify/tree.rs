//! Snapshot of a project directory for verification steps.

use crate::config::StepId;
use crate::error::VerificationError;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A file found while scanning the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Path relative to the tree root, with forward slashes.
    pub path: String,
    pub size: u64,
}

impl FileEntry {
    /// Lowercase extension without the dot.
    pub fn extension(&self) -> Option<String> {
        let name = self.file_name();
        let (stem, ext) = name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_lowercase())
    }

    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Whether the file sits directly in the root.
    pub fn is_top_level(&self) -> bool {
        !self.path.contains('/')
    }
}

/// File listing of a project directory, taken once per verification run.
///
/// Steps read contents through [`FileTree::read_text`]; a missing root or
/// unreadable entries never fail the scan, they are reported by the steps.
#[derive(Debug, Clone)]
pub struct FileTree {
    root: PathBuf,
    exists: bool,
    files: Vec<FileEntry>,
    walk_errors: Vec<String>,
}

impl FileTree {
    /// Walk `root`, skipping directories named in `ignore_dirs`.
    pub fn scan(root: &Path, ignore_dirs: &[String]) -> Self {
        let mut tree = Self {
            root: root.to_path_buf(),
            exists: root.is_dir(),
            files: Vec::new(),
            walk_errors: Vec::new(),
        };
        if !tree.exists {
            return tree;
        }

        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0
                    || !entry.file_type().is_dir()
                    || !ignore_dirs
                        .iter()
                        .any(|d| entry.file_name().to_string_lossy() == d.as_str())
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tree.walk_errors.push(e.to_string());
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(root) else {
                continue;
            };
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            tree.files.push(FileEntry {
                path: rel.to_string_lossy().replace('\\', "/"),
                size,
            });
        }

        tree
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn files(&self) -> &[FileEntry] {
        &self.files
    }

    /// Errors hit while walking (permission denied and the like).
    pub fn walk_errors(&self) -> &[String] {
        &self.walk_errors
    }

    /// Exact relative path lookup.
    pub fn contains(&self, path: &str) -> bool {
        self.files.iter().any(|f| f.path == path)
    }

    /// First top-level file whose name matches one of `names`, case-insensitively.
    pub fn find_top_level(&self, names: &[&str]) -> Option<&FileEntry> {
        self.files.iter().find(|f| {
            f.is_top_level() && names.iter().any(|n| f.file_name().eq_ignore_ascii_case(n))
        })
    }

    /// Files whose extension is in `extensions` (lowercase, no dots).
    pub fn files_with_extensions<'a>(
        &'a self,
        extensions: &'a [String],
    ) -> impl Iterator<Item = &'a FileEntry> + 'a {
        self.files
            .iter()
            .filter(move |f| f.extension().is_some_and(|e| extensions.contains(&e)))
    }

    /// Whether any file matches the glob set.
    pub fn any_match(&self, globs: &GlobSet) -> bool {
        self.files.iter().any(|f| globs.is_match(&f.path))
    }

    /// Read a file as UTF-8 text.
    ///
    /// Returns `Ok(None)` for files that are not valid UTF-8 (binary assets)
    /// or that have disappeared since the scan.
    pub fn read_text(
        &self,
        step: StepId,
        entry: &FileEntry,
    ) -> Result<Option<String>, VerificationError> {
        let path = self.root.join(&entry.path);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(String::from_utf8(bytes).ok()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(VerificationError::Io {
                step: step.to_string(),
                message: format!("failed to read '{}': {}", entry.path, e),
            }),
        }
    }
}

/// Compile glob patterns, normalizing backslashes.
pub fn build_globset(patterns: &[String]) -> Result<GlobSet, VerificationError> {
    let mut builder = GlobSetBuilder::new();

    for pattern in patterns {
        let normalized = pattern.trim().replace('\\', "/");
        if normalized.is_empty() {
            continue;
        }
        let glob = Glob::new(&normalized).map_err(|e| VerificationError::Pattern {
            pattern: pattern.clone(),
            message: e.to_string(),
        })?;
        builder.add(glob);
    }

    builder.build().map_err(|e| VerificationError::Pattern {
        pattern: patterns.join(", "),
        message: e.to_string(),
    })
}
