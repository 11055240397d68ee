//! `aiflow resume`: continue an interrupted run
//!
//! Running tasks are demoted to pending (the interrupted process never
//! finished them); when the run previously failed, its failed tasks are
//! reset for retry. Summaries and commits of completed tasks carry over
//! into the prompts of everything still to run.

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

    match run.status {
        RunStatus::Completed => bail!("run {} is already completed", run.id),
        RunStatus::Failed => {
            println!("Run {} had failures; failed tasks will be retried", run.id)
        }
        RunStatus::Cancelled => println!("Run {} was cancelled; resuming", run.id),
        _ => {}
    }

    store.set_current_run(&run.id)?;

    let completed = run.completed_ids().len();
    println!("Resuming run: {}", run.id.bold());
    println!("Feature: {}", run.feature_desc);
    println!(
        "Progress so far: {}/{} tasks completed",
        completed,
        run.tasks.len()
    );
    println!();

    let repo = Arc::new(GitRepo::open(&run.worktree_path)?);
    let assistant = Arc::new(ClaudeClient::new(&cfg));
    let driver = RunDriver::new(cfg, store, assistant, repo);

    let progress = |completed: usize, total: usize| {
        println!("Progress: {completed}/{total} tasks completed");
    };

    driver.resume(&run.id, &CancelToken::new(), Some(&progress))?;

    println!();
    println!("{}", "Run completed".green().bold());
    Ok(())
}
