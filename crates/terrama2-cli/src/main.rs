//! TerraMA2 CLI - Collector service entry point

mod cli;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::Parser;
use cli::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config::load_config(cli.config.as_deref(), cli.overrides())?;

    // RUST_LOG wins over the configured filter; logs stay off stdout
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_filter.value)),
        )
        .init();

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(commands::execute(cli, config))
}
