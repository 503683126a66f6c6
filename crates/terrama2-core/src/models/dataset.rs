use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use super::filter::Filter;
use super::provider::{DataProviderId, Status};
use crate::error::{Result, Terrama2Error};

/// Unique identifier for a dataset
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct DataSetId(pub u64);

impl DataSetId {
    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for DataSetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a dataset item
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct DataSetItemId(pub u64);

impl fmt::Display for DataSetItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of data a dataset carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataSetKind {
    #[default]
    Unknown,
    Pcd,
    Occurrence,
    Grid,
    Static,
}

/// Physical format of a dataset item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemKind {
    #[default]
    Unknown,
    PcdInpe,
    PcdToa5,
    FirePoints,
    DiseaseOccurrence,
    Grid,
}

/// Script run over the collected data of a dataset
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectRule {
    pub id: u64,
    pub script: String,
    pub dataset: DataSetId,
}

/// Auxiliary layers joined to the collected data
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Intersection {
    /// Vector layer name to the attributes copied from it
    pub attributes: BTreeMap<String, Vec<String>>,

    /// Grid dataset id (as text) to the band read from it
    pub bands: BTreeMap<String, String>,
}

impl Intersection {
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.bands.is_empty()
    }
}

/// One physical artifact (file pattern) of a dataset
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSetItem {
    pub id: DataSetItemId,
    pub kind: ItemKind,
    pub status: Status,

    /// Owning dataset
    pub dataset: DataSetId,

    /// File name pattern, see the collector's DataFilter for the wildcards
    pub mask: String,

    /// Path relative to the provider uri
    pub path: String,

    pub timezone: String,
    pub srid: u32,
    pub filter: Filter,

    /// Storage metadata
    pub metadata: BTreeMap<String, String>,
}

impl DataSetItem {
    pub fn new(id: u64, kind: ItemKind, mask: impl Into<String>) -> Self {
        Self {
            id: DataSetItemId(id),
            kind,
            mask: mask.into(),
            timezone: "+00".to_string(),
            srid: 4326,
            ..Self::default()
        }
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// A logical feed within a provider with its own collection schedule
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSet {
    id: DataSetId,

    pub name: String,
    pub description: String,
    pub kind: DataSetKind,
    pub status: Status,

    /// Provider this dataset is collected from
    pub provider: DataProviderId,

    /// Period between collections. Zero selects schedule mode.
    #[serde(with = "duration_secs")]
    pub data_frequency: Duration,

    /// Time of day (offset from midnight) to collect at
    #[serde(with = "duration_secs")]
    pub schedule: Duration,

    #[serde(with = "duration_secs")]
    pub schedule_retry: Duration,

    /// Upper bound for one collection of this dataset. Zero disables it.
    #[serde(with = "duration_secs")]
    pub schedule_timeout: Duration,

    pub collect_rules: Vec<CollectRule>,
    pub metadata: BTreeMap<String, String>,
    pub intersection: Option<Intersection>,
    pub items: Vec<DataSetItem>,
}

impl DataSet {
    /// Create a dataset that has not been persisted yet
    pub fn new(name: impl Into<String>, kind: DataSetKind, provider: DataProviderId) -> Self {
        Self {
            name: name.into(),
            kind,
            provider,
            ..Self::default()
        }
    }

    /// Restore a dataset with an already persisted identifier
    pub fn with_id(mut self, id: u64) -> Self {
        self.set_id(DataSetId(id));
        self
    }

    /// Collect every `frequency`
    pub fn with_frequency(mut self, frequency: Duration) -> Self {
        self.data_frequency = frequency;
        self
    }

    /// Collect once a day at `hour:minute`
    pub fn with_schedule(mut self, hour: u64, minute: u64) -> Self {
        self.schedule = Duration::from_secs(hour * 3600 + minute * 60);
        self
    }

    pub fn id(&self) -> DataSetId {
        self.id
    }

    /// Assign the persisted identifier. Once assigned it can't change.
    pub fn assign_id(&mut self, id: DataSetId) -> Result<()> {
        if self.id.is_valid() && self.id != id {
            return Err(Terrama2Error::IdAlreadyAssigned { id: self.id.0 });
        }
        self.set_id(id);
        Ok(())
    }

    fn set_id(&mut self, id: DataSetId) {
        self.id = id;
        for item in &mut self.items {
            item.dataset = id;
        }
        for rule in &mut self.collect_rules {
            rule.dataset = id;
        }
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Items that will be collected
    pub fn active_items(&self) -> impl Iterator<Item = &DataSetItem> {
        self.items.iter().filter(|item| item.is_active())
    }
}

/// Durations stored as whole seconds
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
