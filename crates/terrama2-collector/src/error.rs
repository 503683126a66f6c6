//! Error types for the collector

use terrama2_core::models::{DataProviderId, DataSetId, ProviderKind};
use terrama2_core::Terrama2Error;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollectorError {
    // Configuration errors
    #[error("Invalid dataset: {reason}")]
    InvalidDataSet { reason: String },

    #[error("Invalid collect frequency for dataset {dataset}: {reason}")]
    InvalidCollectFrequency { dataset: DataSetId, reason: String },

    #[error("Invalid mask '{mask}': {reason}")]
    InvalidMask { mask: String, reason: String },

    // Provider errors
    #[error("Unable to open collector for provider {provider}: {reason}")]
    UnableToOpenCollector {
        provider: DataProviderId,
        reason: String,
    },

    #[error("Collector for provider {provider} is not open")]
    CollectorNotOpen { provider: DataProviderId },

    #[error("No retriever available for provider kind {kind}")]
    UnsupportedProviderKind { kind: ProviderKind },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // Collection errors
    #[error("Retrieval failed: {0}")]
    Retrieval(String),

    #[error("Collection of dataset {dataset} timed out after {seconds}s")]
    CollectTimeout { dataset: DataSetId, seconds: u64 },

    #[error("Dataset {dataset}: {failed} of {total} items failed")]
    PartialCollect {
        dataset: DataSetId,
        failed: usize,
        total: usize,
    },

    // Service lifecycle errors
    #[error("Collector service is already running")]
    ServiceAlreadyRunning,

    #[error("Unable to start collector service: {0}")]
    UnableToStartService(String),

    #[error("No async runtime available: {0}")]
    RuntimeUnavailable(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] Terrama2Error),
}

impl From<reqwest::Error> for CollectorError {
    fn from(err: reqwest::Error) -> Self {
        CollectorError::Retrieval(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CollectorError>;
