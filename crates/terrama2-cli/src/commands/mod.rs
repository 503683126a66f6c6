//! Command implementations

mod check;
mod config;
mod run;

use anyhow::Result;
use terrama2_core::config::LayeredConfig;

use crate::cli::{Cli, Commands};
use crate::output::OutputWriter;

/// Execute a CLI command
pub async fn execute(cli: Cli, config: LayeredConfig) -> Result<()> {
    let output = OutputWriter::new(cli.json);

    match cli.command {
        Commands::Run(args) => run::execute(args, &config, &output).await,
        Commands::Check(args) => check::execute(args, &config, &output),
        Commands::Config => config::execute(&config, &output),
    }
}
