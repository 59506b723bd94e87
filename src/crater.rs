use std::collections::HashSet;

use geo::{Centroid, Coord, MultiPolygon};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::Tuning;
use crate::error::{CsfdError, MeasurementIssue, Result, Severity};
use crate::geometry::CraterFootprint;
use crate::projection::{EqualAreaProjection, LocalProjectionPlanner};
use crate::spheroid::Spheroid;

/// A counted crater, reduced to what the measurement needs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Crater {
    pub id: u64,
    pub diameter_km: f64,
    pub lon: f64,
    pub lat: f64,
}

impl Crater {
    pub fn new(id: u64, diameter_km: f64, lon: f64, lat: f64) -> Self {
        Self {
            id,
            diameter_km,
            lon,
            lat,
        }
    }

    /// Radius in metres.
    #[inline]
    pub fn radius_m(&self) -> f64 {
        self.diameter_km * 500.0
    }

    #[inline]
    pub fn centroid(&self) -> Coord<f64> {
        Coord {
            x: self.lon,
            y: self.lat,
        }
    }

    /// Derives a crater from its digitised rim.
    ///
    /// # Arguments
    ///
    /// * `footprint` - Rim polygon in geographic coordinates.
    /// * `index` - Input position, used as the id when the footprint has none.
    /// * `spheroid` - Body the footprint lies on.
    /// * `tuning` - Projection centring and densification settings.
    ///
    /// # Returns
    ///
    /// * The crater whose diameter is that of the circle with the footprint's
    ///   equal-area size, centred on the footprint's planar centroid.
    pub fn from_footprint(
        footprint: &CraterFootprint,
        index: usize,
        spheroid: &Spheroid,
        tuning: &Tuning,
    ) -> Result<Self> {
        let polygon = footprint.to_polygon(index)?;
        let frame = LocalProjectionPlanner::new(tuning).plan_polygon(&polygon)?;
        let local = frame.polygon_to_local(&polygon);

        let area_km2 = EqualAreaProjection::new(*spheroid)
            .area_km2(&MultiPolygon::new(vec![local.clone()]), tuning.densify_step_deg);
        let center = local
            .centroid()
            .map(|p| frame.to_geographic(p.0))
            .ok_or_else(|| CsfdError::DegenerateGeometry {
                feature: format!("crater footprint #{index}"),
                reason: "footprint has no centroid".to_string(),
            })?;

        Ok(Self {
            id: footprint.id.unwrap_or(index as u64),
            diameter_km: 2.0 * (area_km2 / std::f64::consts::PI).sqrt(),
            lon: center.x,
            lat: center.y,
        })
    }
}

/// Whether a crater survives into the counted output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObliterationTag {
    #[default]
    Included,
    /// Sits on a larger crater's ejecta; still shrinks the working area.
    Obliterates,
}

/// A crater relevant to a region, with its distance to that region.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedCrater {
    pub crater: Crater,
    /// Geodesic distance to the nearest boundary in metres, `-1` inside.
    pub distance: f64,
    pub tag: ObliterationTag,
}

impl ClassifiedCrater {
    pub const INSIDE: f64 = -1.0;

    pub fn inside(crater: Crater) -> Self {
        Self {
            crater,
            distance: Self::INSIDE,
            tag: ObliterationTag::Included,
        }
    }

    pub fn within_range(crater: Crater, distance: f64) -> Self {
        Self {
            crater,
            distance,
            tag: ObliterationTag::Included,
        }
    }

    #[inline]
    pub fn is_inside(&self) -> bool {
        self.distance <= 0.0
    }

    #[inline]
    pub fn is_obliterated(&self) -> bool {
        self.tag == ObliterationTag::Obliterates
    }
}

/// Descending diameter, id ascending among equals.
pub fn sort_by_diameter_desc(craters: &mut [ClassifiedCrater]) {
    craters.sort_by(|a, b| {
        b.crater
            .diameter_km
            .total_cmp(&a.crater.diameter_km)
            .then(a.crater.id.cmp(&b.crater.id))
    });
}

/// Craters built from a footprint layer, with the footprints that had to be
/// skipped.
#[derive(Debug, Clone, Default)]
pub struct CraterCatalog {
    pub craters: Vec<Crater>,
    pub issues: Vec<MeasurementIssue>,
}

impl CraterCatalog {
    /// Builds every crater in parallel. Degenerate footprints are reported
    /// and skipped; repeated ids abort the ingestion.
    pub fn ingest(footprints: &[CraterFootprint], spheroid: &Spheroid, tuning: &Tuning) -> Result<Self> {
        let built: Vec<(usize, Result<Crater>)> = footprints
            .par_iter()
            .enumerate()
            .map(|(index, footprint)| (index, Crater::from_footprint(footprint, index, spheroid, tuning)))
            .collect();

        let mut catalog = CraterCatalog::default();
        let mut seen = HashSet::with_capacity(footprints.len());
        for (index, result) in built {
            match result {
                Ok(crater) => {
                    if !seen.insert(crater.id) {
                        return Err(CsfdError::InvalidParameter {
                            name: "crater id",
                            value: crater.id.to_string(),
                            reason: "crater ids must be unique".to_string(),
                        });
                    }
                    catalog.craters.push(crater);
                }
                Err(e) if e.is_recoverable() => {
                    warn!(index, error = %e, "skipping crater footprint");
                    catalog
                        .issues
                        .push(MeasurementIssue::new(format!("crater footprint #{index}"), Severity::Warning, &e));
                }
                Err(e) => return Err(e),
            }
        }
        info!(
            craters = catalog.craters.len(),
            skipped = catalog.issues.len(),
            "ingested crater footprints"
        );
        Ok(catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    const MOON: f64 = 1_737_400.0;

    fn circle(lon: f64, lat: f64, radius_deg: f64, n: usize) -> Vec<[f64; 2]> {
        (0..n)
            .map(|k| {
                let t = -2.0 * PI * k as f64 / n as f64;
                [lon + radius_deg * t.cos(), lat + radius_deg * t.sin()]
            })
            .collect()
    }

    #[test]
    fn diameter_comes_from_footprint_area() {
        let spheroid = Spheroid::sphere(MOON).unwrap();
        let radius_deg = 0.1;
        let footprint = CraterFootprint::new(circle(30.0, 0.0, radius_deg, 360)).with_id(42);
        let crater = Crater::from_footprint(&footprint, 0, &spheroid, &Tuning::default()).unwrap();

        let radius_km = radius_deg.to_radians() * MOON / 1000.0;
        assert_eq!(crater.id, 42);
        assert_relative_eq!(crater.diameter_km, 2.0 * radius_km, max_relative = 1e-3);
        assert_relative_eq!(crater.lon, 30.0, epsilon = 1e-9);
        assert_relative_eq!(crater.lat, 0.0, epsilon = 1e-9);
        assert_relative_eq!(crater.radius_m(), crater.diameter_km * 500.0);
    }

    #[test]
    fn footprint_across_antimeridian_keeps_its_centre() {
        let spheroid = Spheroid::sphere(MOON).unwrap();
        let footprint = CraterFootprint::new(vec![
            [179.9, -0.1],
            [179.9, 0.1],
            [-179.9, 0.1],
            [-179.9, -0.1],
        ]);
        let crater = Crater::from_footprint(&footprint, 3, &spheroid, &Tuning::default()).unwrap();
        assert_eq!(crater.id, 3);
        assert_relative_eq!(crater.lon.abs(), 180.0, epsilon = 1e-9);

        let side_km = 0.2_f64.to_radians() * MOON / 1000.0;
        assert_relative_eq!(crater.diameter_km, 2.0 * side_km / PI.sqrt(), max_relative = 1e-3);
    }

    #[test]
    fn ingestion_skips_degenerate_and_rejects_duplicates() {
        let spheroid = Spheroid::sphere(MOON).unwrap();
        let tuning = Tuning::default();
        let good = CraterFootprint::new(circle(0.0, 0.0, 0.05, 64));
        let empty = CraterFootprint::new(vec![]);

        let catalog = CraterCatalog::ingest(&[good.clone(), empty, good.clone()], &spheroid, &tuning).unwrap();
        assert_eq!(catalog.craters.iter().map(|c| c.id).collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(catalog.issues.len(), 1);
        assert_eq!(catalog.issues[0].severity, Severity::Warning);
        assert!(catalog.issues[0].message.contains("no vertices"));

        let clash = [good.clone().with_id(1), good.with_id(1)];
        let err = CraterCatalog::ingest(&clash, &spheroid, &tuning).unwrap_err();
        assert!(matches!(err, CsfdError::InvalidParameter { name: "crater id", .. }));
    }

    #[test]
    fn sorting_is_descending_with_stable_ties() {
        let mut craters = vec![
            ClassifiedCrater::inside(Crater::new(5, 1.0, 0.0, 0.0)),
            ClassifiedCrater::inside(Crater::new(2, 3.0, 0.0, 0.0)),
            ClassifiedCrater::inside(Crater::new(1, 1.0, 0.0, 0.0)),
        ];
        sort_by_diameter_desc(&mut craters);
        let ids: Vec<u64> = craters.iter().map(|c| c.crater.id).collect();
        assert_eq!(ids, vec![2, 1, 5]);
    }
}
