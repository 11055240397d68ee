//! `aiflow clean`: delete run state files

use anyhow::{bail, Result};
use std::io::{stdin, stdout, Write};

use crate::config::Config;
use crate::models::Run;

use super::common::open_store;

pub fn execute(run_ids: Vec<String>, all: bool, force: bool) -> Result<()> {
    let cfg = Config::load()?;
    let store = open_store(&cfg)?;

    let targets: Vec<Run> = if all {
        store.list_runs()?
    } else if !run_ids.is_empty() {
        let mut runs = Vec::new();
        for id in &run_ids {
            match store.load_run(id) {
                Ok(run) => runs.push(run),
                Err(_) => eprintln!("Warning: run {id} not found, skipping"),
            }
        }
        runs
    } else {
        bail!("specify run ID(s) or use --all");
    };

    if targets.is_empty() {
        println!("No runs to clean");
        return Ok(());
    }

    if !force {
        println!("This will remove {} run(s):", targets.len());
        for run in &targets {
            println!("  - {}: {}", run.id, run.feature_desc);
        }
        print!("\nContinue? (y/N): ");
        stdout().flush()?;

        let mut response = String::new();
        stdin().read_line(&mut response)?;
        let response = response.trim().to_lowercase();
        if response != "y" && response != "yes" {
            println!("Cancelled");
            return Ok(());
        }
    }

    for run in &targets {
        store.delete_run(&run.id)?;
        println!("Removed run {}", run.id);
    }

    Ok(())
}
