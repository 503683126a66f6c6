//! Catalog files listing the providers and datasets to collect.
//!
//! A catalog is TOML (or JSON, chosen by the `.json` extension):
//!
//! ```toml
//! [[providers]]
//! name = "local-pcd"
//! kind = "FILE"
//! uri = "/data/pcd"
//!
//! [[providers.datasets]]
//! name = "pcd-serrmar"
//! kind = "PCD"
//! data_frequency = 300
//!
//! [[providers.datasets.items]]
//! kind = "PCD_INPE"
//! mask = "%A%M%d_%h%m.txt"
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use terrama2_core::error::{Result, Terrama2Error};
use terrama2_core::models::DataProvider;

use crate::memory::MemoryDataManager;

/// Providers (with their datasets) read from a catalog file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub providers: Vec<DataProvider>,
}

/// What a catalog registered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogSummary {
    pub providers: usize,
    pub datasets: usize,
}

impl Catalog {
    /// Load a catalog file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Terrama2Error::CatalogNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_toml_str(&content)
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Terrama2Error::Serialization(format!("Failed to parse catalog: {}", e)))
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| Terrama2Error::Serialization(format!("Failed to parse catalog: {}", e)))
    }

    pub fn dataset_count(&self) -> usize {
        self.providers.iter().map(|p| p.datasets.len()).sum()
    }

    /// Register every provider in `manager`.
    ///
    /// Stops at the first provider the manager rejects.
    pub fn register(self, manager: &MemoryDataManager) -> Result<CatalogSummary> {
        let mut summary = CatalogSummary::default();
        for provider in self.providers {
            let datasets = provider.datasets.len();
            let name = provider.name.clone();
            let id = manager.add_provider(provider)?;
            tracing::info!(provider_id = %id, provider = %name, datasets, "Registered provider from catalog");
            summary.providers += 1;
            summary.datasets += datasets;
        }
        Ok(summary)
    }
}
