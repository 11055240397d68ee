//! Assistant capability interface
//!
//! The executor drives the assistant through this trait so tests can
//! substitute a scripted implementation for the real subprocess client.

pub mod claude;

pub use claude::ClaudeClient;

use std::path::Path;

use crate::cancel::CancelToken;
use crate::error::EngineError;

/// Captured result of one assistant invocation.
#[derive(Debug, Clone)]
pub struct AssistantOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl AssistantOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// stdout and stderr concatenated, for failure classification.
    pub fn combined(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr)
    }
}

pub trait Assistant: Send + Sync {
    /// Run one prompt to completion in `workdir`. Spawn failures, deadline
    /// expiry, and cancellation are errors; a nonzero exit is a normal
    /// return, classified by the caller.
    fn run_prompt(
        &self,
        workdir: &Path,
        prompt: &str,
        cancel: &CancelToken,
    ) -> Result<AssistantOutput, EngineError>;
}

/// Substrings indicating the assistant hit a rate limit. Deliberately one
/// table: a structured classifier would replace `detect_rate_limit` alone.
pub const RATE_LIMIT_MARKERS: &[&str] = &[
    "rate limit",
    "rate_limit_error",
    "overloaded_error",
    "too many requests",
];

/// The first rate-limit marker present in `output`, case-insensitive.
pub fn detect_rate_limit(output: &str) -> Option<&'static str> {
    let lowered = output.to_lowercase();
    RATE_LIMIT_MARKERS
        .iter()
        .find(|marker| lowered.contains(*marker))
        .copied()
}
