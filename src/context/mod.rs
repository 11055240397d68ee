//! Prompt assembly under a token budget
//!
//! `tokens` estimates and allocates capacity, `summary` parses and renders
//! post-task summaries, and `builder` assembles the final task prompt from
//! the task description, tiered prior-task summaries, and fresh file
//! contents.

pub mod builder;
pub mod summary;
pub mod tokens;

pub use builder::ContextBuilder;
pub use summary::{
    format_full_summary, format_light_summary, parse_summary, SUMMARY_EXTRACTION_PROMPT,
};
pub use tokens::{estimate_tokens, truncate_to_tokens, TokenBudget};
