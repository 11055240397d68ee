//! Operator configuration
//!
//! Loaded from `~/.aiflow/config.yaml` when present; every key is optional
//! and falls back to the defaults below. The engine only ever reads a fully
//! resolved `Config` value threaded through its constructors.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding `runs/` and the current-run pointer.
    pub state_dir: PathBuf,
    /// Concurrency cap for one scheduler batch.
    pub max_parallel: usize,
    /// Absolute path to the assistant binary; `None` means PATH lookup.
    pub claude_path: Option<PathBuf>,
    /// Model override passed to the assistant, when set.
    pub model: Option<String>,
    /// Total token budget for one task prompt.
    pub context_max_tokens: usize,
    /// Cap on the number of `reads` files included in a prompt.
    pub context_max_files: usize,
    /// Per-summary token cap inside the prompt's prior-task block.
    pub max_summary_tokens: usize,
    /// Include full summaries of direct dependencies in task prompts.
    pub include_for_dependencies: bool,
    /// Include light summaries of other completed tasks in task prompts.
    pub include_for_same_feature: bool,
    pub lock_timeout_secs: u64,
    pub task_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state_dir: aiflow_home().join("state"),
            max_parallel: 3,
            claude_path: None,
            model: None,
            context_max_tokens: 8000,
            context_max_files: 20,
            max_summary_tokens: 1000,
            include_for_dependencies: true,
            include_for_same_feature: true,
            lock_timeout_secs: 300,
            task_timeout_secs: 1800,
        }
    }
}

impl Config {
    /// Load `~/.aiflow/config.yaml`, falling back to defaults when the file
    /// is absent. A present-but-unparseable file is an error, not a silent
    /// fallback.
    pub fn load() -> Result<Self> {
        let path = aiflow_home().join("config.yaml");
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let cfg: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(cfg)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }
}

/// The aiflow home directory (`~/.aiflow`).
pub fn aiflow_home() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".aiflow"),
        None => PathBuf::from(".aiflow"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.max_parallel, 3);
        assert_eq!(cfg.context_max_tokens, 8000);
        assert_eq!(cfg.lock_timeout(), Duration::from_secs(300));
        assert!(cfg.include_for_dependencies);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.yaml");
        std::fs::write(&path, "max_parallel: 8\nmodel: opus\n").unwrap();

        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg.max_parallel, 8);
        assert_eq!(cfg.model.as_deref(), Some("opus"));
        // Unspecified keys keep their defaults.
        assert_eq!(cfg.context_max_files, 20);
    }

    #[test]
    fn test_garbage_file_is_an_error() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.yaml");
        std::fs::write(&path, "max_parallel: [not a number").unwrap();

        assert!(Config::load_from(&path).is_err());
    }
}
