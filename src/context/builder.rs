//! Hybrid context builder
//!
//! Assembles one prompt per task from three blocks: the task description
//! (always included, it is the contract), summaries of prior completed tasks
//! (full for direct dependencies, light for the rest), and the contents of
//! the task's read files. A single token budget constrains all three.

use std::path::Path;

use crate::config::Config;
use crate::error::EngineError;
use crate::models::{Run, Task, TaskStatus, TaskSummary};

use super::summary::{format_full_summary, format_light_summary};
use super::tokens::{estimate_tokens, truncate_to_tokens, TokenBudget};

const BLOCK_DIVIDER: &str = "\n\n---\n\n";
/// Token reserve for the static prompt template wrapped around the context.
const TEMPLATE_RESERVE_TOKENS: usize = 500;
/// A file smaller than this after truncation is not worth including.
const MIN_FILE_TOKENS: usize = 100;

pub struct ContextBuilder<'a> {
    workdir: &'a Path,
    cfg: &'a Config,
    run: &'a Run,
}

impl<'a> ContextBuilder<'a> {
    pub fn new(workdir: &'a Path, cfg: &'a Config, run: &'a Run) -> Self {
        Self { workdir, cfg, run }
    }

    /// The context blocks for `task`, joined by the fixed divider.
    pub fn build_context(&self, task: &Task) -> Result<String, EngineError> {
        let mut budget = TokenBudget::new(self.cfg.context_max_tokens, TEMPLATE_RESERVE_TOKENS);

        let description = format_task_description(task);
        if !budget.use_tokens(estimate_tokens(&description)) {
            return Err(EngineError::ContextBuild {
                reason: "token budget exhausted before the task description fits".to_string(),
            });
        }

        let mut parts = vec![description];

        let summaries = self.build_summary_block(task, &mut budget);
        if !summaries.is_empty() {
            parts.push(summaries);
        }

        let files = self.build_files_block(&task.reads, &mut budget)?;
        if !files.is_empty() {
            parts.push(files);
        }

        Ok(parts.join(BLOCK_DIVIDER))
    }

    /// The full prompt: the assembled context inside the fixed template.
    pub fn build_task_prompt(&self, task: &Task) -> Result<String, EngineError> {
        let context = self.build_context(task)?;
        Ok(format!(
            "You are implementing a feature for a software project. Complete the following task.\n\
             \n\
             {context}\n\
             \n\
             Guidelines:\n\
             - Focus only on this specific task\n\
             - Follow the existing patterns and conventions of the codebase\n\
             - Write clean, maintainable code\n\
             - Do not modify files outside the scope of this task\n\
             \n\
             When complete, the changes will be reviewed before merging."
        ))
    }

    /// Summaries of other completed tasks, direct dependencies first (full
    /// format), then the rest (light format), each group in ascending
    /// priority. Summaries that no longer fit the budget are dropped.
    fn build_summary_block(&self, task: &Task, budget: &mut TokenBudget) -> String {
        if !self.cfg.include_for_dependencies && !self.cfg.include_for_same_feature {
            return String::new();
        }

        let mut direct: Vec<(&Task, &TaskSummary)> = Vec::new();
        let mut indirect: Vec<(&Task, &TaskSummary)> = Vec::new();
        for other in &self.run.tasks {
            if other.id == task.id || other.status != TaskStatus::Completed {
                continue;
            }
            let Some(summary) = other.summary.as_ref() else {
                continue;
            };
            if task.depends_on.contains(&other.id) {
                if self.cfg.include_for_dependencies {
                    direct.push((other, summary));
                }
            } else if self.cfg.include_for_same_feature {
                indirect.push((other, summary));
            }
        }
        direct.sort_by_key(|(t, _)| t.priority);
        indirect.sort_by_key(|(t, _)| t.priority);

        let mut parts = Vec::new();
        for (entries, full) in [(direct, true), (indirect, false)] {
            for (other, summary) in entries {
                let mut formatted = if full {
                    format_full_summary(summary, &other.title)
                } else {
                    format_light_summary(summary, &other.title)
                };

                if estimate_tokens(&formatted) > self.cfg.max_summary_tokens {
                    formatted = truncate_to_tokens(&formatted, self.cfg.max_summary_tokens);
                }

                if budget.use_tokens(estimate_tokens(&formatted)) {
                    parts.push(formatted);
                }
            }
        }

        if parts.is_empty() {
            return String::new();
        }
        format!("# Context from Prior Tasks\n\n{}", parts.join("\n"))
    }

    /// Contents of the task's read files as fenced code blocks. Missing
    /// files are skipped (the task may be about to create them); any other
    /// read error fails the build.
    fn build_files_block(
        &self,
        reads: &[String],
        budget: &mut TokenBudget,
    ) -> Result<String, EngineError> {
        if reads.is_empty() {
            return Ok(String::new());
        }

        let mut parts = Vec::new();
        for file in reads.iter().take(self.cfg.context_max_files) {
            let path = self.workdir.join(file);
            let content = match std::fs::read_to_string(&path) {
                Ok(content) => content,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(EngineError::ContextBuild {
                        reason: format!("failed to read {file}: {e}"),
                    });
                }
            };

            let formatted = format!("## {file}\n\n```\n{content}\n```");
            if budget.use_tokens(estimate_tokens(&formatted)) {
                parts.push(formatted);
            } else if let Some(truncated) = budget.try_fit(&content, MIN_FILE_TOKENS) {
                parts.push(format!("## {file} (truncated)\n\n```\n{truncated}\n```"));
            }
        }

        if parts.is_empty() {
            return Ok(String::new());
        }
        Ok(format!("# File Contents\n\n{}", parts.join("\n\n")))
    }
}

/// Block 1: title, description, and the declared write/create sets.
fn format_task_description(task: &Task) -> String {
    let mut out = String::new();
    out.push_str("# Task\n\n");
    out.push_str(&format!("**{}**\n\n", task.title));
    out.push_str(&task.description);
    out.push('\n');

    if !task.writes.is_empty() {
        out.push_str("\n**Files to modify:**\n");
        for file in &task.writes {
            out.push_str(&format!("- {file}\n"));
        }
    }
    if !task.creates.is_empty() {
        out.push_str("\n**Files to create:**\n");
        for file in &task.creates {
            out.push_str(&format!("- {file}\n"));
        }
    }

    out
}
