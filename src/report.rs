use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::aggregate::{CraterFraction, TraditionalRecord};
use crate::config::Approach;
use crate::error::{MeasurementIssue, Result};
use crate::geometry::RingCoords;
use crate::region::RegionSummary;
use crate::spheroid::Spheroid;

/// Counted craters, shaped by the approach that produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "records", rename_all = "snake_case")]
pub enum CraterOutput {
    Traditional(Vec<TraditionalRecord>),
    Fractions(Vec<CraterFraction>),
}

impl CraterOutput {
    pub fn len(&self) -> usize {
        match self {
            CraterOutput::Traditional(r) => r.len(),
            CraterOutput::Fractions(r) => r.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn crater_ids(&self) -> Vec<u64> {
        match self {
            CraterOutput::Traditional(r) => r.iter().map(|c| c.crater_id).collect(),
            CraterOutput::Fractions(r) => r.iter().map(|c| c.crater_id).collect(),
        }
    }

    /// Column names of [`CraterOutput::to_array`].
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            CraterOutput::Traditional(_) => &["diameter_km", "fraction", "lon", "lat", "topo_scale_factor"],
            CraterOutput::Fractions(_) => &[
                "diameter_km",
                "fraction",
                "lon",
                "lat",
                "ejecta_diameter_km",
                "buffer_area_km2",
            ],
        }
    }

    /// One row per crater in output order.
    pub fn to_array(&self) -> Array2<f64> {
        match self {
            CraterOutput::Traditional(r) => Array2::from_shape_fn((r.len(), 5), |(i, j)| {
                let c = &r[i];
                [c.diameter_km, c.fraction, c.lon, c.lat, c.topo_scale_factor][j]
            }),
            CraterOutput::Fractions(r) => Array2::from_shape_fn((r.len(), 6), |(i, j)| {
                let c = &r[i];
                [c.diameter_km, c.fraction, c.lon, c.lat, c.ejecta_diameter_km, c.buffer_area_km2][j]
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedPolygon {
    pub outer: RingCoords,
    pub inners: Vec<RingCoords>,
}

/// Modified reference area of one crater, in geographic coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedGeometry {
    pub crater_id: u64,
    pub area_km2: f64,
    pub buffer_distance_m: f64,
    pub polygons: Vec<ExportedPolygon>,
}

/// Everything a run hands to the output writers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementReport {
    pub approach: Approach,
    pub spheroid: Spheroid,
    pub total_area_km2: f64,
    pub regions: Vec<RegionSummary>,
    pub output: CraterOutput,
    pub obliterated: Vec<u64>,
    pub issues: Vec<MeasurementIssue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub geometry: Vec<ExportedGeometry>,
}

impl MeasurementReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn fractions(&self) -> Option<&[CraterFraction]> {
        match &self.output {
            CraterOutput::Fractions(r) => Some(r),
            CraterOutput::Traditional(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_rows_follow_record_fields() {
        let output = CraterOutput::Fractions(vec![CraterFraction {
            crater_id: 1,
            diameter_km: 2.0,
            fraction: 0.5,
            lon: 10.0,
            lat: -3.0,
            ejecta_diameter_km: 4.0,
            buffer_area_km2: 200.0,
        }]);
        let array = output.to_array();
        assert_eq!(array.shape(), &[1, 6]);
        assert_eq!(array.row(0).to_vec(), vec![2.0, 0.5, 10.0, -3.0, 4.0, 200.0]);
        assert_eq!(output.columns().len(), 6);

        let empty = CraterOutput::Traditional(vec![]);
        assert!(empty.is_empty());
        assert_eq!(empty.to_array().shape(), &[0, 5]);
    }
}
