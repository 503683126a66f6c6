//! Error types for TerraMA2

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Terrama2Error {
    // Registry errors
    #[error("Data provider not found: {id}")]
    ProviderNotFound { id: u64 },

    #[error("Dataset not found: {id}")]
    DatasetNotFound { id: u64 },

    #[error("Data provider name already registered: {name}")]
    ProviderNameTaken { name: String },

    #[error("Invalid data provider: {reason}")]
    InvalidProvider { reason: String },

    #[error("Invalid dataset: {reason}")]
    InvalidDataset { reason: String },

    #[error("Identifier already assigned: {id}")]
    IdAlreadyAssigned { id: u64 },

    // Catalog errors
    #[error("Catalog not found at {path}")]
    CatalogNotFound { path: PathBuf },

    // Configuration errors
    #[error("Missing required configuration: {key}")]
    ConfigMissing { key: String },

    #[error("Invalid configuration value for {key}: {reason}")]
    ConfigInvalid { key: String, reason: String },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, Terrama2Error>;
