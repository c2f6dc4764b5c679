//! Compiled regex scanning over a file tree.
//!
//! Shared by the lint marker scan and the security scan: compile a pattern
//! list once per run, then report every matching line with its location.

use super::tree::FileTree;
use crate::config::StepId;
use crate::error::VerificationError;
use regex::Regex;
use std::fmt;

/// Lines longer than this are cut when quoted in a finding.
const MAX_QUOTED_CHARS: usize = 120;

/// A single line that matched a pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    /// Tree-relative file path (forward slashes).
    pub file_path: String,
    /// Line number in the file (1-based).
    pub line_number: usize,
    /// The matching line, trimmed.
    pub content: String,
    pub matched_pattern: String,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}  {}", self.file_path, self.line_number, self.content)
    }
}

/// Regex patterns compiled for reuse across many lines.
pub struct CompiledPatterns {
    /// The compiled regex patterns paired with their original string representations.
    patterns: Vec<(Regex, String)>,
}

impl fmt::Debug for CompiledPatterns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledPatterns")
            .field(
                "patterns",
                &self.patterns.iter().map(|(_, s)| s).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl CompiledPatterns {
    /// Compile a pattern list.
    ///
    /// # Returns
    ///
    /// * `Ok(CompiledPatterns)` - Successfully compiled patterns
    /// * `Err(VerificationError::Pattern)` - If any pattern fails to compile
    pub fn compile(patterns: &[String]) -> Result<Self, VerificationError> {
        let mut compiled = Vec::with_capacity(patterns.len());

        for pattern in patterns {
            let regex = Regex::new(pattern).map_err(|e| VerificationError::Pattern {
                pattern: pattern.clone(),
                message: format!(
                    "{}\nFix: edit taskgate.yaml and correct or remove this pattern.",
                    e
                ),
            })?;
            compiled.push((regex, pattern.clone()));
        }

        Ok(Self { patterns: compiled })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// The first pattern matching `content`, if any.
    pub fn first_match(&self, content: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|(regex, _)| regex.is_match(content))
            .map(|(_, pattern)| pattern.as_str())
    }

    /// Scan every file the filter accepts, one finding per matching line.
    ///
    /// Files above `max_bytes` and non-UTF-8 files are skipped.
    pub fn scan<F>(
        &self,
        step: StepId,
        tree: &FileTree,
        max_bytes: u64,
        mut accept: F,
    ) -> Result<Vec<Finding>, VerificationError>
    where
        F: FnMut(&super::tree::FileEntry) -> bool,
    {
        let mut findings = Vec::new();
        if self.is_empty() {
            return Ok(findings);
        }

        for entry in tree.files() {
            if entry.size > max_bytes || !accept(entry) {
                continue;
            }
            let Some(text) = tree.read_text(step, entry)? else {
                continue;
            };

            for (idx, line) in text.lines().enumerate() {
                if let Some(pattern) = self.first_match(line) {
                    findings.push(Finding {
                        file_path: entry.path.clone(),
                        line_number: idx + 1,
                        content: quote_line(line),
                        matched_pattern: pattern.to_string(),
                    });
                }
            }
        }

        Ok(findings)
    }
}

fn quote_line(line: &str) -> String {
    let line = line.trim();
    if line.chars().count() <= MAX_QUOTED_CHARS {
        return line.to_string();
    }
    let cut: String = line.chars().take(MAX_QUOTED_CHARS).collect();
    format!("{}...", cut)
}

/// Render up to `limit` findings as issue strings, with a trailing count of the rest.
pub fn findings_to_issues(label: &str, findings: &[Finding], limit: usize) -> Vec<String> {
    let mut issues: Vec<String> = findings
        .iter()
        .take(limit)
        .map(|f| format!("{}: {}", label, f))
        .collect();
    if findings.len() > limit {
        issues.push(format!(
            "{}: {} more occurrence(s) not listed",
            label,
            findings.len() - limit
        ));
    }
    issues
}
