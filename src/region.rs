use geo::{MultiPolygon, Polygon};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Tuning;
use crate::error::Result;
use crate::geometry::{densify_polygon, Region};
use crate::projection::{EqualAreaProjection, LocalFrame, LocalProjectionPlanner};

/// A selected region in its own local frame, with its measured size.
#[derive(Debug, Clone)]
pub struct PreparedRegion {
    pub id: String,
    pub name: String,
    /// Outline as delivered, geographic coordinates.
    pub geographic: Polygon<f64>,
    pub frame: LocalFrame,
    /// Densified outline in `frame` coordinates.
    pub local: Polygon<f64>,
    pub area_km2: f64,
}

impl PreparedRegion {
    pub fn prepare(region: &Region, projection: &EqualAreaProjection, tuning: &Tuning) -> Result<Self> {
        let polygon = region.to_polygon()?;
        let frame = LocalProjectionPlanner::new(tuning).plan_polygon(&polygon)?;
        let local = densify_polygon(&frame.polygon_to_local(&polygon), tuning.densify_step_deg);
        let area_km2 = projection.area_km2(&MultiPolygon::new(vec![local.clone()]), tuning.densify_step_deg);
        debug!(region = %region.id, area_km2, "prepared region");
        Ok(Self {
            id: region.id.clone(),
            name: region.name.clone(),
            geographic: polygon,
            frame,
            local,
            area_km2,
        })
    }
}

/// Per-region counts reported with a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionSummary {
    pub id: String,
    pub name: String,
    pub area_km2: f64,
    pub craters_inside: usize,
    pub craters_in_range: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spheroid::Spheroid;
    use approx::assert_relative_eq;

    #[test]
    fn prepared_region_is_centred_and_measured() {
        let spheroid = Spheroid::sphere(1_737_400.0).unwrap();
        let region = Region::new("r1", vec![[10.0, -5.0], [10.0, 5.0], [20.0, 5.0], [20.0, -5.0]])
            .with_name("Mare");
        let prepared =
            PreparedRegion::prepare(&region, &EqualAreaProjection::new(spheroid), &Tuning::default()).unwrap();

        assert_eq!(prepared.name, "Mare");
        assert_relative_eq!(prepared.frame.center_lon, 15.0, epsilon = 1e-9);
        // densified to 1° steps along the 10° sides
        assert_eq!(prepared.local.exterior().0.len(), 41);

        let r = 1_737.4_f64;
        let expected = r * r * 10.0_f64.to_radians() * 2.0 * 5.0_f64.to_radians().sin();
        assert_relative_eq!(prepared.area_km2, expected, max_relative = 1e-3);
    }
}
