use clap::{Parser, Subcommand};
use std::path::PathBuf;

use terrama2_core::config::CliConfigOverrides;

/// TerraMA2 - Environmental monitoring data collector
#[derive(Parser, Debug)]
#[command(name = "terrama2")]
#[command(about = "Schedules and collects environmental monitoring data", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Output results in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Configuration file (defaults to ./terrama2.toml when present)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Maximum idle time between scheduling passes, in milliseconds
    #[arg(long, global = true, value_name = "MS")]
    pub loop_interval_ms: Option<u64>,

    /// How often scheduled datasets check the clock, in seconds
    #[arg(long, global = true, value_name = "SECS")]
    pub schedule_check_secs: Option<u64>,

    /// Collect every dataset once as soon as it is registered
    #[arg(long, global = true, value_name = "BOOL")]
    pub collect_on_register: Option<bool>,

    /// Directory for downloaded files
    #[arg(long, global = true, value_name = "DIR")]
    pub download_dir: Option<PathBuf>,

    /// Log filter, e.g. "info" or "terrama2_collector=debug"
    #[arg(long, global = true, value_name = "FILTER")]
    pub log: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn overrides(&self) -> CliConfigOverrides {
        CliConfigOverrides {
            loop_interval_ms: self.loop_interval_ms,
            schedule_check_secs: self.schedule_check_secs,
            collect_on_register: self.collect_on_register,
            download_dir: self.download_dir.clone(),
            log_filter: self.log.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the collector service until interrupted
    Run(CatalogArgs),

    /// Validate a catalog and show how its datasets would be scheduled
    Check(CatalogArgs),

    /// Show the effective configuration and where each value comes from
    Config,
}

#[derive(Parser, Debug)]
pub struct CatalogArgs {
    /// Catalog of providers and datasets (TOML, or JSON by extension)
    pub catalog: PathBuf,
}
