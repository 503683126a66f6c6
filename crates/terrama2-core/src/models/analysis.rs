//! Analysis records.
//!
//! Analyses run user scripts over collected data. Only the records live here;
//! executing them belongs to the analysis service.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::dataset::DataSetId;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct AnalysisId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScriptLanguage {
    #[default]
    Python,
    Lua,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalysisType {
    #[default]
    Pcd,
    MonitoredObject,
    Grid,
    Terrame,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InfluenceType {
    /// Sensors whose radius touches the monitored object
    #[default]
    RadiusTouches,
    /// Sensors whose radius contains the monitored object's centroid
    RadiusCenter,
    /// Sensors inside a region dataset
    Region,
}

/// How an additional dataset influences the monitored objects
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Influence {
    pub influence_type: InfluenceType,

    /// Radius in meters, used by the radius types
    pub radius: f64,

    /// Region dataset, used by `InfluenceType::Region`
    pub region: Option<DataSetId>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Analysis {
    pub id: AnalysisId,
    pub name: String,
    pub description: String,
    pub analysis_type: AnalysisType,

    /// Dataset with the monitored objects
    pub monitored_object: DataSetId,

    pub additional_datasets: Vec<DataSetId>,
    pub script: String,
    pub script_language: ScriptLanguage,

    /// Influence rule per additional dataset, keyed by dataset id
    pub influences: BTreeMap<u64, Influence>,
}

impl Analysis {
    /// Every dataset the analysis reads from
    pub fn input_datasets(&self) -> Vec<DataSetId> {
        std::iter::once(self.monitored_object)
            .chain(self.additional_datasets.iter().copied())
            .collect()
    }

    pub fn influence(&self, dataset: DataSetId) -> Option<&Influence> {
        self.influences.get(&dataset.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_datasets() {
        let mut analysis = Analysis {
            monitored_object: DataSetId(1),
            additional_datasets: vec![DataSetId(2), DataSetId(3)],
            ..Analysis::default()
        };
        analysis.influences.insert(
            2,
            Influence {
                influence_type: InfluenceType::RadiusCenter,
                radius: 500.0,
                region: None,
            },
        );

        assert_eq!(analysis.input_datasets(), vec![DataSetId(1), DataSetId(2), DataSetId(3)]);
        assert_eq!(analysis.influence(DataSetId(2)).unwrap().radius, 500.0);
        assert!(analysis.influence(DataSetId(3)).is_none());
    }
}
