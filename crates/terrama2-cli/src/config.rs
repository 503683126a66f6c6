use anyhow::{Context, Result};
use std::path::Path;

use terrama2_core::config::{CliConfigOverrides, LayeredConfig};

const DEFAULT_CONFIG_FILE: &str = "terrama2.toml";

/// Defaults, then the config file, then environment, then command line.
///
/// An explicit `path` must exist; the default file is optional.
pub fn load_config(path: Option<&Path>, overrides: CliConfigOverrides) -> Result<LayeredConfig> {
    let mut config = LayeredConfig::with_defaults();

    match path {
        Some(path) => {
            config = config
                .load_from_file(path)
                .with_context(|| format!("Failed to load configuration file {}", path.display()))?;
        }
        None => {
            let default = Path::new(DEFAULT_CONFIG_FILE);
            if default.exists() {
                config = config
                    .load_from_file(default)
                    .context("Failed to load configuration file")?;
            }
        }
    }

    let mut config = config.load_from_env();
    config.update_from_cli(overrides);
    Ok(config)
}
