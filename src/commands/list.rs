//! `aiflow list`: table of runs

use anyhow::Result;
use colored::{ColoredString, Colorize};

use crate::config::Config;
use crate::models::RunStatus;

use super::common::{ellipsize, open_store};

pub fn execute() -> Result<()> {
    let cfg = Config::load()?;
    let store = open_store(&cfg)?;

    let runs = store.list_runs()?;
    if runs.is_empty() {
        println!("No runs found");
        return Ok(());
    }

    let current = store.get_current_run_id()?;

    println!(
        "{:<10} {:<12} {:<40} {}",
        "ID", "STATUS", "FEATURE", "PROGRESS"
    );
    for run in runs {
        let marker = if current.as_deref() == Some(run.id.as_str()) {
            "*"
        } else {
            " "
        };
        let completed = run.completed_ids().len();
        println!(
            "{marker}{:<9} {:<12} {:<40} {}/{}",
            run.id,
            colorize_status(run.status),
            ellipsize(&run.feature_desc, 38),
            completed,
            run.tasks.len()
        );
    }

    Ok(())
}

pub(crate) fn colorize_status(status: RunStatus) -> ColoredString {
    let text = status.to_string();
    match status {
        RunStatus::Completed => text.green(),
        RunStatus::Failed => text.red(),
        RunStatus::Running => text.yellow(),
        RunStatus::Cancelled => text.dimmed(),
        RunStatus::Breakdown | RunStatus::Ready => text.cyan(),
    }
}
