//! `{variable}` substitution for prompts and worker command templates.
//!
//! # Syntax
//!
//! - `{name}` substitutes variable `name` (surrounding whitespace is ignored)
//! - `{{` renders a literal `{`
//! - `}}` renders a literal `}`
//!
//! Undefined variables are an error rather than an empty substitution, so a
//! typo in a command template surfaces before the worker runs.

use std::collections::BTreeMap;
use thiserror::Error;

/// Template variables.
pub type Vars = BTreeMap<String, String>;

/// Why a template could not be rendered.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("undefined variable '{name}' at position {position} in template")]
    UndefinedVariable { name: String, position: usize },

    #[error("unmatched '{{' at position {position} in template")]
    UnmatchedBrace { position: usize },

    #[error("empty variable name '{{}}' at position {position} in template")]
    EmptyVariableName { position: usize },
}

/// Render `template`, substituting every `{name}` from `vars`.
///
/// ```
/// use taskgate::agent::prompt::{render_template, vars};
///
/// let v = vars([("task_id", "api"), ("workdir", "/tmp/api")]);
/// let out = render_template("run {task_id} in {workdir} with {{braces}}", &v).unwrap();
/// assert_eq!(out, "run api in /tmp/api with {braces}");
/// ```
pub fn render_template(template: &str, vars: &Vars) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((pos, ch)) = chars.next() {
        match ch {
            '{' if matches!(chars.peek(), Some((_, '{'))) => {
                chars.next();
                out.push('{');
            }
            '{' => {
                let mut name = String::new();
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    name.push(c);
                }
                if !closed {
                    return Err(TemplateError::UnmatchedBrace { position: pos });
                }

                let name = name.trim();
                if name.is_empty() {
                    return Err(TemplateError::EmptyVariableName { position: pos });
                }
                let value = vars
                    .get(name)
                    .ok_or_else(|| TemplateError::UndefinedVariable {
                        name: name.to_string(),
                        position: pos,
                    })?;
                out.push_str(value);
            }
            '}' => {
                if matches!(chars.peek(), Some((_, '}'))) {
                    chars.next();
                }
                out.push('}');
            }
            _ => out.push(ch),
        }
    }

    Ok(out)
}

/// Build a variable map from pairs.
pub fn vars<I, K, V>(pairs: I) -> Vars
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
