use anyhow::Result;

use crate::commands::{cancel, clean, list, resume, run, status};

use super::types::Commands;

pub fn dispatch(command: Commands) -> Result<()> {
    match command {
        Commands::Run { run_id } => run::execute(run_id),
        Commands::Resume { run_id } => resume::execute(run_id),
        Commands::List => list::execute(),
        Commands::Status { run_id } => status::execute(run_id),
        Commands::Clean {
            run_ids,
            all,
            force,
        } => clean::execute(run_ids, all, force),
        Commands::Cancel { run_id } => cancel::execute(run_id),
    }
}
