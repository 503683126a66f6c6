//! Runtime settings of the collector service

use std::path::PathBuf;
use std::time::Duration;

use terrama2_core::config::LayeredConfig;

/// Settings consumed by [`CollectorService`](crate::CollectorService)
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    /// Maximum idle time between two scheduling passes
    pub loop_interval: Duration,

    /// How often schedule-mode timers compare the wall clock
    pub schedule_check: Duration,

    /// Queue a dataset once as soon as it is registered
    pub collect_on_register: bool,

    /// Where network retrievers store downloaded files
    pub download_dir: PathBuf,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            loop_interval: Duration::from_secs(1),
            schedule_check: Duration::from_secs(60),
            collect_on_register: true,
            download_dir: std::env::temp_dir().join("terrama2"),
        }
    }
}

impl From<&LayeredConfig> for ServiceConfig {
    fn from(config: &LayeredConfig) -> Self {
        Self {
            loop_interval: Duration::from_millis(config.loop_interval_ms.value),
            schedule_check: Duration::from_secs(config.schedule_check_secs.value),
            collect_on_register: config.collect_on_register.value,
            download_dir: config.download_dir.value.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use terrama2_core::config::ConfigSource;

    #[test]
    fn test_from_layered_config() {
        let mut layered = LayeredConfig::with_defaults();
        layered.loop_interval_ms.update(250, ConfigSource::Cli);
        layered.collect_on_register.update(false, ConfigSource::Cli);

        let config = ServiceConfig::from(&layered);
        assert_eq!(config.loop_interval, Duration::from_millis(250));
        assert_eq!(config.schedule_check, Duration::from_secs(60));
        assert!(!config.collect_on_register);
    }
}
