use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::geometry::Region;

/// Comparison applied by a value filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExpressionType {
    /// No filter by value
    #[default]
    None,
    /// Eliminate data when all values are less than the threshold
    LessThan,
    /// Eliminate data when all values are greater than the threshold
    GreaterThan,
    /// Eliminate data when the mean is less than the threshold
    MeanLessThan,
    /// Eliminate data when the mean is greater than the threshold
    MeanGreaterThan,
}

/// Filtering criteria applied while collecting a dataset item
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Filter {
    /// Data timestamped at or before this instant is discarded
    pub discard_before: Option<DateTime<Utc>>,

    /// Data timestamped at or after this instant is discarded
    pub discard_after: Option<DateTime<Utc>>,

    /// Threshold used by `expression_type`
    pub value: Option<f64>,

    pub expression_type: ExpressionType,

    /// Area of interest
    pub region: Option<Region>,

    pub band_filter: String,

    /// Static dataset used as area of interest
    pub static_data_id: Option<u64>,
}

impl Filter {
    /// True when no criteria is set
    pub fn is_empty(&self) -> bool {
        self.discard_before.is_none()
            && self.discard_after.is_none()
            && self.value.is_none()
            && self.expression_type == ExpressionType::None
            && self.region.is_none()
            && self.band_filter.is_empty()
            && self.static_data_id.is_none()
    }

    /// Whether `timestamp` falls inside the open interval (discard_before, discard_after)
    pub fn accepts_timestamp(&self, timestamp: &DateTime<Utc>) -> bool {
        if let Some(before) = &self.discard_before {
            if timestamp <= before {
                return false;
            }
        }
        if let Some(after) = &self.discard_after {
            if timestamp >= after {
                return false;
            }
        }
        true
    }
}
