//! Prompt generation for worker invocations.
//!
//! The prompt handed to a worker is the task itself (title, description,
//! skills, dependencies) followed, on a retry, by the improvement instruction
//! from the previous attempt's remediation plan.

mod template;

pub use template::{TemplateError, Vars, render_template, vars};

use crate::task::Task;

/// Render the prompt for one attempt of a task.
///
/// `instruction` is the improvement instruction of the previous attempt.
pub fn build_task_prompt(task: &Task, instruction: Option<&str>) -> String {
    let mut prompt = format!("# Task: {}\n\n", task.title);

    prompt.push_str("## Objective\n");
    if task.description.trim().is_empty() {
        prompt.push_str(&task.title);
    } else {
        prompt.push_str(task.description.trim());
    }
    prompt.push_str("\n\n");

    prompt.push_str(&format!(
        "## Details\n- Task id: {}\n- Type: {}\n- Priority: {:?}\n- Estimated effort: {}h\n",
        task.id, task.task_type, task.priority, task.estimated_hours
    ));
    let skills = task.normalized_skills();
    if !skills.is_empty() {
        prompt.push_str(&format!("- Skills: {}\n", skills.join(", ")));
    }
    if !task.dependencies.is_empty() {
        prompt.push_str(&format!(
            "- Builds on completed tasks: {}\n",
            task.dependencies.join(", ")
        ));
    }

    if let Some(instruction) = instruction.filter(|i| !i.trim().is_empty()) {
        prompt.push_str(&format!(
            "\n## Previous attempt\n{}\n",
            instruction.trim_end()
        ));
    }

    prompt.push_str(
        "\n## Instructions\nWork only inside the current directory. \
         The result is verified automatically (structure, build, tests, security, lint, \
         dependencies, documentation, performance).\n",
    );
    prompt
}
