use crate::error::{Result, Terrama2Error};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration source for tracking where values come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Default value
    Default,
    /// Loaded from config file
    File,
    /// Loaded from environment variable
    Environment,
    /// Provided via CLI argument
    Cli,
}

impl ConfigSource {
    /// Returns the precedence level (higher = higher priority)
    pub fn precedence(&self) -> u8 {
        match self {
            ConfigSource::Default => 0,
            ConfigSource::File => 1,
            ConfigSource::Environment => 2,
            ConfigSource::Cli => 3,
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }

    /// Update the value if the new source has higher precedence
    pub fn update(&mut self, value: T, source: ConfigSource) {
        if source.precedence() > self.source.precedence() {
            self.value = value;
            self.source = source;
        }
    }
}

/// Layered configuration for the TerraMA2 collector
#[derive(Debug, Clone)]
pub struct LayeredConfig {
    /// Idle wake-up period of the scheduler loop
    pub loop_interval_ms: ConfigValue<u64>,
    /// Poll period of timers in schedule mode
    pub schedule_check_secs: ConfigValue<u64>,
    /// Enqueue a dataset once right after it's registered
    pub collect_on_register: ConfigValue<bool>,
    /// Where remote retrievers store downloaded files
    pub download_dir: ConfigValue<PathBuf>,
    /// Tracing filter directive
    pub log_filter: ConfigValue<String>,
}

impl LayeredConfig {
    /// Create a new configuration with default values
    pub fn with_defaults() -> Self {
        Self {
            loop_interval_ms: ConfigValue::new(1000, ConfigSource::Default),
            schedule_check_secs: ConfigValue::new(60, ConfigSource::Default),
            collect_on_register: ConfigValue::new(true, ConfigSource::Default),
            download_dir: ConfigValue::new(
                env::temp_dir().join("terrama2"),
                ConfigSource::Default,
            ),
            log_filter: ConfigValue::new("info".to_string(), ConfigSource::Default),
        }
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self> {
        let content =
            fs::read_to_string(path.as_ref()).map_err(|e| Terrama2Error::ConfigInvalid {
                key: "file".to_string(),
                reason: format!("Failed to read config file: {}", e),
            })?;

        let file_config: FileConfig =
            toml::from_str(&content).map_err(|e| Terrama2Error::ConfigInvalid {
                key: "file".to_string(),
                reason: format!("Failed to parse TOML: {}", e),
            })?;

        if let Some(interval) = file_config.loop_interval_ms {
            self.loop_interval_ms
                .update(validate_positive("loop_interval_ms", interval)?, ConfigSource::File);
        }

        if let Some(secs) = file_config.schedule_check_secs {
            self.schedule_check_secs
                .update(validate_positive("schedule_check_secs", secs)?, ConfigSource::File);
        }

        if let Some(collect) = file_config.collect_on_register {
            self.collect_on_register.update(collect, ConfigSource::File);
        }

        if let Some(dir) = file_config.download_dir {
            self.download_dir.update(dir, ConfigSource::File);
        }

        if let Some(filter) = file_config.log_filter {
            self.log_filter.update(filter, ConfigSource::File);
        }

        Ok(self)
    }

    /// Load configuration from environment variables
    pub fn load_from_env(mut self) -> Self {
        // TERRAMA2_LOOP_INTERVAL_MS
        if let Ok(value) = env::var("TERRAMA2_LOOP_INTERVAL_MS") {
            match parse_positive("loop_interval_ms", &value) {
                Ok(ms) => self.loop_interval_ms.update(ms, ConfigSource::Environment),
                Err(_) => tracing::warn!(
                    "Invalid TERRAMA2_LOOP_INTERVAL_MS value '{}': expected a positive integer",
                    value
                ),
            }
        }

        // TERRAMA2_SCHEDULE_CHECK_SECS
        if let Ok(value) = env::var("TERRAMA2_SCHEDULE_CHECK_SECS") {
            match parse_positive("schedule_check_secs", &value) {
                Ok(secs) => self.schedule_check_secs.update(secs, ConfigSource::Environment),
                Err(_) => tracing::warn!(
                    "Invalid TERRAMA2_SCHEDULE_CHECK_SECS value '{}': expected a positive integer",
                    value
                ),
            }
        }

        // TERRAMA2_COLLECT_ON_REGISTER
        if let Ok(value) = env::var("TERRAMA2_COLLECT_ON_REGISTER") {
            match parse_bool(&value) {
                Ok(collect) => self.collect_on_register.update(collect, ConfigSource::Environment),
                Err(_) => tracing::warn!(
                    "Invalid TERRAMA2_COLLECT_ON_REGISTER value '{}': expected true or false",
                    value
                ),
            }
        }

        // TERRAMA2_DOWNLOAD_DIR
        if let Ok(dir) = env::var("TERRAMA2_DOWNLOAD_DIR") {
            self.download_dir.update(PathBuf::from(dir), ConfigSource::Environment);
        }

        // TERRAMA2_LOG
        if let Ok(filter) = env::var("TERRAMA2_LOG") {
            self.log_filter.update(filter, ConfigSource::Environment);
        }

        self
    }

    /// Update configuration from CLI arguments
    pub fn update_from_cli(&mut self, overrides: CliConfigOverrides) {
        if let Some(interval) = overrides.loop_interval_ms {
            self.loop_interval_ms.update(interval, ConfigSource::Cli);
        }

        if let Some(secs) = overrides.schedule_check_secs {
            self.schedule_check_secs.update(secs, ConfigSource::Cli);
        }

        if let Some(collect) = overrides.collect_on_register {
            self.collect_on_register.update(collect, ConfigSource::Cli);
        }

        if let Some(dir) = overrides.download_dir {
            self.download_dir.update(dir, ConfigSource::Cli);
        }

        if let Some(filter) = overrides.log_filter {
            self.log_filter.update(filter, ConfigSource::Cli);
        }
    }

    /// Get all configuration values as a map for inspection
    pub fn to_inspection_map(&self) -> HashMap<String, (String, ConfigSource)> {
        let mut map = HashMap::new();

        map.insert(
            "loop_interval_ms".to_string(),
            (self.loop_interval_ms.value.to_string(), self.loop_interval_ms.source),
        );

        map.insert(
            "schedule_check_secs".to_string(),
            (self.schedule_check_secs.value.to_string(), self.schedule_check_secs.source),
        );

        map.insert(
            "collect_on_register".to_string(),
            (self.collect_on_register.value.to_string(), self.collect_on_register.source),
        );

        map.insert(
            "download_dir".to_string(),
            (self.download_dir.value.display().to_string(), self.download_dir.source),
        );

        map.insert("log_filter".to_string(), (self.log_filter.value.clone(), self.log_filter.source));

        map
    }
}

/// Configuration loaded from TOML file
#[derive(Debug, Deserialize, Serialize)]
struct FileConfig {
    loop_interval_ms: Option<u64>,
    schedule_check_secs: Option<u64>,
    collect_on_register: Option<bool>,
    download_dir: Option<PathBuf>,
    log_filter: Option<String>,
}

/// CLI configuration overrides
#[derive(Debug, Default)]
pub struct CliConfigOverrides {
    pub loop_interval_ms: Option<u64>,
    pub schedule_check_secs: Option<u64>,
    pub collect_on_register: Option<bool>,
    pub download_dir: Option<PathBuf>,
    pub log_filter: Option<String>,
}

fn validate_positive(key: &str, value: u64) -> Result<u64> {
    if value == 0 {
        return Err(Terrama2Error::ConfigInvalid {
            key: key.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}

/// Parse a strictly positive integer
pub fn parse_positive(key: &str, s: &str) -> Result<u64> {
    let value = s.trim().parse::<u64>().map_err(|_| Terrama2Error::ConfigInvalid {
        key: key.to_string(),
        reason: format!("Invalid integer: {}", s),
    })?;
    validate_positive(key, value)
}

/// Parse a boolean flag
pub fn parse_bool(s: &str) -> Result<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(Terrama2Error::ConfigInvalid {
            key: "collect_on_register".to_string(),
            reason: format!("Invalid flag: {}. Use true or false", s),
        }),
    }
}
