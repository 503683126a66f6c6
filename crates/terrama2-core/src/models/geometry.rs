//! Area-of-interest geometry used by filters.
//!
//! Coordinates are `[lon, lat]` pairs in WGS 84, laid out like GeoJSON.

use serde::{Deserialize, Serialize};

/// Polygonal area of interest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Region {
    Polygon {
        coordinates: Vec<Vec<[f64; 2]>>,
    },
    MultiPolygon {
        coordinates: Vec<Vec<Vec<[f64; 2]>>>,
    },
}

impl Region {
    /// Create a Polygon region
    pub fn polygon(rings: Vec<Vec<[f64; 2]>>) -> Self {
        Region::Polygon { coordinates: rings }
    }

    /// Axis-aligned box from its corners
    pub fn bbox(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Region::polygon(vec![vec![
            [min_lon, min_lat],
            [max_lon, min_lat],
            [max_lon, max_lat],
            [min_lon, max_lat],
            [min_lon, min_lat],
        ]])
    }

    /// Every exterior and interior ring of the region
    pub fn rings(&self) -> Vec<&Vec<[f64; 2]>> {
        match self {
            Region::Polygon { coordinates } => coordinates.iter().collect(),
            Region::MultiPolygon { coordinates } => coordinates.iter().flatten().collect(),
        }
    }

    /// Bounding box as `[min_lon, min_lat, max_lon, max_lat]`
    pub fn bounds(&self) -> Option<[f64; 4]> {
        let mut coords = self.rings().into_iter().flatten();
        let first = coords.next()?;
        let mut bounds = [first[0], first[1], first[0], first[1]];
        for c in coords {
            bounds[0] = bounds[0].min(c[0]);
            bounds[1] = bounds[1].min(c[1]);
            bounds[2] = bounds[2].max(c[0]);
            bounds[3] = bounds[3].max(c[1]);
        }
        Some(bounds)
    }
}
