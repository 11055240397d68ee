//! `aiflow status`: task-by-task detail for one run

use anyhow::Result;
use colored::{ColoredString, Colorize};

use crate::config::Config;
use crate::models::{Task, TaskStatus};

use super::common::{open_store, resolve_run};
use super::list::colorize_status;

pub fn execute(run_id: Option<String>) -> Result<()> {
    let cfg = Config::load()?;
    let store = open_store(&cfg)?;
    let run = resolve_run(&store, run_id)?;

    println!("Run: {}", run.id.bold());
    println!("Feature: {}", run.feature_desc);
    println!("Worktree: {}", run.worktree_path);
    println!("Base branch: {}", run.base_branch);
    println!("Status: {}", colorize_status(run.status));
    if let Some(error) = &run.error {
        println!("Error: {}", error.red());
    }
    println!("Progress: {:.0}%", run.progress());

    if run.tasks.is_empty() {
        println!("\nNo tasks yet");
        return Ok(());
    }

    println!("\nTasks:");
    for task in &run.tasks {
        print_task(task);
    }

    Ok(())
}

fn print_task(task: &Task) {
    println!("  {} {}: {}", status_icon(task.status), task.id, task.title);
    if let Some(error) = &task.error {
        println!("      {}", error.red());
    }
    if let Some(commit) = &task.commit {
        let short: String = commit.chars().take(10).collect();
        println!("      commit {short}");
    }
    if task.summary.is_some() {
        println!("      summary captured");
    }
}

fn status_icon(status: TaskStatus) -> ColoredString {
    match status {
        TaskStatus::Completed => "✓".green(),
        TaskStatus::Failed => "✗".red(),
        TaskStatus::Running => "▶".yellow(),
        TaskStatus::Ready => "●".cyan(),
        TaskStatus::Pending => "○".normal(),
    }
}
