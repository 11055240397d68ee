//! Post-task summary extraction and rendering
//!
//! After each task the assistant is asked for a single JSON object matching
//! `TaskSummary`. The parser tolerates surrounding prose: it decodes the
//! slice from the first `{` to the last `}` and treats anything unparseable
//! as "no summary" (downgraded to a warning by the executor).

use crate::context::tokens::estimate_tokens;
use crate::models::TaskSummary;

/// Wire contract with the assistant: the keys here must match `TaskSummary`
/// exactly.
pub const SUMMARY_EXTRACTION_PROMPT: &str = r#"Analyze the changes you just made and extract a structured summary in JSON format:

{
  "files_changed": ["list of modified files"],
  "files_created": ["list of new files"],
  "functions_added": ["function signatures, e.g., 'fn new_user(email: &str) -> User'"],
  "types_added": ["type definitions, e.g., 'struct User', 'enum AuthToken'"],
  "patterns_used": ["architectural patterns, e.g., 'Repository pattern', 'Middleware chain'"],
  "decisions": ["key design decisions with brief rationale"],
  "conventions": ["coding conventions followed, e.g., 'errors wrapped with context'"],
  "gotchas": ["things future tasks should know about"],
  "public_interface": "brief description of main exports and how to use them"
}

Respond ONLY with the JSON object, no additional text."#;

/// Extract a `TaskSummary` from assistant output. `None` when no well-formed
/// JSON object is present.
pub fn parse_summary(task_id: &str, response: &str) -> Option<TaskSummary> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    if end <= start {
        return None;
    }

    let mut summary: TaskSummary = serde_json::from_str(&response[start..=end]).ok()?;
    summary.task_id = task_id.to_string();
    Some(summary)
}

/// Full rendering, used for direct dependencies: every non-empty field as a
/// labeled Markdown section.
pub fn format_full_summary(summary: &TaskSummary, task_title: &str) -> String {
    let mut out = String::new();
    out.push_str(&format!("## Summary from Task: {task_title}\n\n"));

    push_inline_list(&mut out, "Files Changed", &summary.files_changed);
    push_inline_list(&mut out, "Files Created", &summary.files_created);
    push_bullet_list(&mut out, "Functions Added", &summary.functions_added, true);
    push_bullet_list(&mut out, "Types Added", &summary.types_added, true);
    push_inline_list(&mut out, "Patterns Used", &summary.patterns_used);
    push_bullet_list(&mut out, "Key Decisions", &summary.decisions, false);
    push_bullet_list(&mut out, "Conventions", &summary.conventions, false);
    push_bullet_list(&mut out, "Important Notes", &summary.gotchas, false);

    if !summary.public_interface.is_empty() {
        out.push_str(&format!("**Public Interface:** {}\n", summary.public_interface));
    }

    out
}

/// Light rendering, used for non-dependency tasks in the same feature: just
/// the touched files, the decisions, and the public interface.
pub fn format_light_summary(summary: &TaskSummary, task_title: &str) -> String {
    let mut out = String::new();
    out.push_str(&format!("## Context from Task: {task_title}\n\n"));

    push_inline_list(&mut out, "Files Modified", &summary.touched_files());
    push_bullet_list(&mut out, "Decisions", &summary.decisions, false);

    if !summary.public_interface.is_empty() {
        out.push_str(&format!("**Exports:** {}\n", summary.public_interface));
    }

    out
}

/// Estimated token cost of a rendered summary.
pub fn summary_tokens(summary: &TaskSummary, full: bool) -> usize {
    let formatted = if full {
        format_full_summary(summary, "")
    } else {
        format_light_summary(summary, "")
    };
    estimate_tokens(&formatted)
}

fn push_inline_list(out: &mut String, label: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    out.push_str(&format!("**{label}:** {}\n\n", items.join(", ")));
}

fn push_bullet_list(out: &mut String, label: &str, items: &[String], as_code: bool) {
    if items.is_empty() {
        return;
    }
    out.push_str(&format!("**{label}:**\n"));
    for item in items {
        if as_code {
            out.push_str(&format!("- `{item}`\n"));
        } else {
            out.push_str(&format!("- {item}\n"));
        }
    }
    out.push('\n');
}
