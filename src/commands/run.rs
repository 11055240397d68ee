//! `aiflow run`: execute a run's tasks

use anyhow::{bail, Result};
use colored::Colorize;
use std::sync::Arc;

use crate::assistant::ClaudeClient;
use crate::cancel::CancelToken;
use crate::config::Config;
use crate::git::GitRepo;
use crate::models::RunStatus;
use crate::orchestrator::RunDriver;

use super::common::{open_store, resolve_run};

pub fn execute(run_id: Option<String>) -> Result<()> {
    let cfg = Config::load()?;
    let store = open_store(&cfg)?;
    let run = resolve_run(&store, run_id)?;

    if run.tasks.is_empty() {
        bail!("run {} has no tasks; complete the breakdown first", run.id);
    }
    if run.status == RunStatus::Completed {
        bail!("run {} is already completed", run.id);
    }

    store.set_current_run(&run.id)?;

    let repo = Arc::new(GitRepo::open(&run.worktree_path)?);
    let assistant = Arc::new(ClaudeClient::new(&cfg));
    let driver = RunDriver::new(cfg, store, assistant, repo);

    println!("Run: {}", run.id.bold());
    println!("Feature: {}", run.feature_desc);
    println!("Worktree: {}", run.worktree_path);
    println!();

    let progress = |completed: usize, total: usize| {
        println!("Progress: {completed}/{total} tasks completed");
    };

    driver.execute(&run.id, &CancelToken::new(), Some(&progress))?;

    println!();
    println!("{}", "Run completed".green().bold());
    Ok(())
}
