use aiflow::cli::{dispatch, Cli};
use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = Cli::parse();
    dispatch(cli.command)
}
