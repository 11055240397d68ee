use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "aiflow")]
#[command(about = "Drives Claude Code through dependency-aware task batches", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute a run's tasks (defaults to the current run)
    Run {
        /// Run ID; omit to use the current run
        run_id: Option<String>,
    },

    /// Resume an interrupted run, retrying failed tasks when the run failed
    Resume {
        /// Run ID; omit to use the current run
        run_id: Option<String>,
    },

    /// List all runs with status and progress
    List,

    /// Show task-by-task detail for a run
    Status {
        /// Run ID; omit to use the current run
        run_id: Option<String>,
    },

    /// Delete run state files
    Clean {
        /// Run IDs to delete
        run_ids: Vec<String>,

        /// Delete every run
        #[arg(short, long)]
        all: bool,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Mark a run cancelled; a live driver stops at the next batch boundary
    Cancel {
        /// Run ID; omit to use the current run
        run_id: Option<String>,
    },
}
