use serde::{Deserialize, Serialize};
use std::fmt;

use super::dataset::DataSet;
use crate::error::{Result, Terrama2Error};

/// Unique identifier for a data provider
///
/// Zero means the provider has not been persisted yet.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct DataProviderId(pub u64);

impl DataProviderId {
    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for DataProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transport or protocol used to reach a data provider.
///
/// The collector service partitions its queues by this value.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProviderKind {
    #[default]
    Unknown,
    File,
    Ftp,
    Http,
    Wfs,
    Wcs,
    Sos,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderKind::Unknown => "UNKNOWN",
            ProviderKind::File => "FILE",
            ProviderKind::Ftp => "FTP",
            ProviderKind::Http => "HTTP",
            ProviderKind::Wfs => "WFS",
            ProviderKind::Wcs => "WCS",
            ProviderKind::Sos => "SOS",
        };
        f.write_str(name)
    }
}

/// Activation status shared by providers, datasets and items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    #[default]
    Active,
    Inactive,
}

impl Status {
    pub fn is_active(&self) -> bool {
        matches!(self, Status::Active)
    }
}

/// Which service created the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Origin {
    #[default]
    Collector,
    Analysis,
}

/// A registered source of data and the datasets it owns
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DataProvider {
    id: DataProviderId,

    /// Unique provider name
    pub name: String,

    pub description: String,

    /// Transport used to reach the provider
    pub kind: ProviderKind,

    /// Location of the provider: a directory, an FTP or HTTP base URL
    pub uri: String,

    pub status: Status,

    pub origin: Origin,

    /// Datasets owned by this provider
    pub datasets: Vec<DataSet>,
}

impl DataProvider {
    /// Create a provider that has not been persisted yet
    pub fn new(name: impl Into<String>, kind: ProviderKind, uri: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            uri: uri.into(),
            ..Self::default()
        }
    }

    /// Restore a provider with an already persisted identifier
    pub fn with_id(mut self, id: u64) -> Self {
        self.id = DataProviderId(id);
        self
    }

    pub fn id(&self) -> DataProviderId {
        self.id
    }

    /// Assign the persisted identifier. Once assigned it can't change.
    pub fn assign_id(&mut self, id: DataProviderId) -> Result<()> {
        if self.id.is_valid() && self.id != id {
            return Err(Terrama2Error::IdAlreadyAssigned { id: self.id.0 });
        }
        self.id = id;
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Find an owned dataset by id
    pub fn dataset(&self, id: super::DataSetId) -> Option<&DataSet> {
        self.datasets.iter().find(|d| d.id() == id)
    }
}
