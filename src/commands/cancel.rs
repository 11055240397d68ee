//! `aiflow cancel`: request cancellation of a run
//!
//! Cancellation is cooperative: this flips the persisted run status, and a
//! live driver observes it when it reloads the run between batches. A run
//! with no live driver simply stays cancelled until resumed.

use anyhow::{bail, Result};
use colored::Colorize;

use crate::config::Config;
use crate::models::RunStatus;

use super::common::{open_store, resolve_run};

pub fn execute(run_id: Option<String>) -> Result<()> {
    let cfg = Config::load()?;
    let store = open_store(&cfg)?;
    let run = resolve_run(&store, run_id)?;

    match run.status {
        RunStatus::Completed => bail!("run {} is already completed", run.id),
        RunStatus::Cancelled => {
            println!("Run {} is already cancelled", run.id);
            return Ok(());
        }
        _ => {}
    }

    store.set_run_status(&run.id, RunStatus::Cancelled, None)?;
    println!(
        "Run {} marked {}; a live driver will stop at the next batch boundary",
        run.id,
        "cancelled".yellow()
    );
    Ok(())
}
