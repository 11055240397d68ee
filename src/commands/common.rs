//! Helpers shared by the operator commands

use anyhow::{bail, Result};
use std::sync::Arc;

use crate::config::Config;
use crate::fs::Store;
use crate::models::Run;

pub fn open_store(cfg: &Config) -> Result<Arc<Store>> {
    Ok(Arc::new(Store::new(&cfg.state_dir)?))
}

/// Load the named run, or the current run when no id is given.
pub fn resolve_run(store: &Store, run_id: Option<String>) -> Result<Run> {
    match run_id {
        Some(id) => Ok(store.load_run(&id)?),
        None => match store.current_run()? {
            Some(run) => Ok(run),
            None => bail!("no current run; pass a run ID or start a new run"),
        },
    }
}

/// Shorten a feature description for table display.
pub fn ellipsize(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
