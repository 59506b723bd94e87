//! Inside / within-range / outside classification of craters against one
//! region.

use geo::Coord;

use crate::config::{Approach, MeasurementConfig};
use crate::crater::{ClassifiedCrater, Crater};
use crate::error::Result;
use crate::geodesic::GeodesicSolver;
use crate::geometry::{nearest_on_ring, planar_distance_to_polygon};
use crate::region::PreparedRegion;

#[derive(Debug, Clone, Copy)]
pub struct CraterClassifier {
    solver: GeodesicSolver,
    approach: Approach,
    buffer_factor: f64,
    obliteration_factor: f64,
    boundary_epsilon: f64,
}

impl CraterClassifier {
    pub fn new(solver: GeodesicSolver, config: &MeasurementConfig) -> Self {
        Self {
            solver,
            approach: config.approach,
            buffer_factor: config.buffer_factor,
            obliteration_factor: config.obliteration_factor,
            boundary_epsilon: config.tuning.boundary_epsilon,
        }
    }

    /// Largest boundary distance in metres at which an outside crater still
    /// counts, or `None` when only craters inside count.
    pub fn range(&self, crater: &Crater) -> Option<f64> {
        match self.approach {
            Approach::Traditional => None,
            Approach::Buffered | Approach::BufferedNonSparsenessCorrection => {
                Some(crater.radius_m() * self.buffer_factor)
            }
            Approach::NonSparsenessCorrection => Some(crater.radius_m() * self.obliteration_factor),
        }
    }

    /// Boundary-inclusive range test.
    pub fn in_range(&self, crater: &Crater, distance: f64) -> bool {
        self.range(crater).is_some_and(|limit| distance <= limit)
    }

    /// Geodesic distance from the crater centroid to the nearest point of any
    /// ring of the region, or [`ClassifiedCrater::INSIDE`].
    pub fn distance(&self, region: &PreparedRegion, crater: &Crater) -> Result<f64> {
        let center = region.frame.to_local(crater.centroid());
        if planar_distance_to_polygon(&region.local, center) <= self.boundary_epsilon {
            return Ok(ClassifiedCrater::INSIDE);
        }

        let nearest: Vec<Coord<f64>> = std::iter::once(region.local.exterior())
            .chain(region.local.interiors())
            .filter_map(|ring| nearest_on_ring(ring, center))
            .collect();
        let mut best = f64::INFINITY;
        for point in nearest {
            let d = self.solver.distance(center.y, center.x, point.y, point.x)?;
            best = best.min(d);
        }
        Ok(best)
    }

    /// `Some` when the crater is inside the region or within range of it.
    pub fn classify(&self, region: &PreparedRegion, crater: &Crater) -> Result<Option<ClassifiedCrater>> {
        let distance = self.distance(region, crater)?;
        if distance <= 0.0 {
            return Ok(Some(ClassifiedCrater::inside(*crater)));
        }
        Ok(self
            .in_range(crater, distance)
            .then(|| ClassifiedCrater::within_range(*crater, distance)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Tuning;
    use crate::geometry::Region;
    use crate::projection::EqualAreaProjection;
    use crate::spheroid::Spheroid;
    use approx::assert_relative_eq;

    const MOON: f64 = 1_737_400.0;

    fn setup(approach: Approach) -> (CraterClassifier, PreparedRegion) {
        let spheroid = Spheroid::sphere(MOON).unwrap();
        let config = MeasurementConfig::new(approach, ["r"])
            .with_buffer_factor(2.0)
            .with_obliteration_factor(3.0);
        let region = Region::new("r", vec![[0.0, -2.0], [0.0, 2.0], [4.0, 2.0], [4.0, -2.0]])
            .with_hole(vec![[1.5, -0.5], [2.5, -0.5], [2.5, 0.5], [1.5, 0.5]]);
        let prepared =
            PreparedRegion::prepare(&region, &EqualAreaProjection::new(spheroid), &Tuning::default()).unwrap();
        let solver = GeodesicSolver::new(spheroid, &config.tuning);
        (CraterClassifier::new(solver, &config), prepared)
    }

    fn metres_per_degree() -> f64 {
        MOON * std::f64::consts::PI / 180.0
    }

    #[test]
    fn inside_and_on_boundary_are_inside() {
        let (classifier, region) = setup(Approach::Traditional);
        let inside = Crater::new(1, 2.0, 0.5, 1.0);
        let on_edge = Crater::new(2, 2.0, 0.0, 1.0);
        assert_eq!(classifier.distance(&region, &inside).unwrap(), -1.0);
        assert_eq!(classifier.distance(&region, &on_edge).unwrap(), -1.0);
    }

    #[test]
    fn hole_counts_as_outside() {
        let (classifier, region) = setup(Approach::Buffered);
        let in_hole = Crater::new(1, 2.0, 2.0, 0.0);
        let d = classifier.distance(&region, &in_hole).unwrap();
        assert_relative_eq!(d, 0.5 * metres_per_degree(), max_relative = 1e-6);
        // radius 1 km × 2 is far short of 15 km
        assert!(classifier.classify(&region, &in_hole).unwrap().is_none());
    }

    #[test]
    fn traditional_ignores_outside_craters() {
        let (classifier, region) = setup(Approach::Traditional);
        let near = Crater::new(1, 50.0, -0.01, 0.0);
        assert_eq!(classifier.range(&near), None);
        assert!(classifier.classify(&region, &near).unwrap().is_none());
    }

    #[test]
    fn ranges_follow_approach() {
        let crater = Crater::new(1, 10.0, 0.0, 0.0);
        assert_eq!(setup(Approach::Buffered).0.range(&crater), Some(10_000.0));
        assert_eq!(setup(Approach::BufferedNonSparsenessCorrection).0.range(&crater), Some(10_000.0));
        assert_eq!(setup(Approach::NonSparsenessCorrection).0.range(&crater), Some(15_000.0));
    }

    #[test]
    fn range_is_boundary_inclusive() {
        let (classifier, _) = setup(Approach::Buffered);
        let crater = Crater::new(1, 10.0, 0.0, 0.0);
        assert!(classifier.in_range(&crater, 10_000.0));
        assert!(!classifier.in_range(&crater, 10_000.0 + 1e-6));
    }

    #[test]
    fn within_range_carries_geodesic_distance() {
        let (classifier, region) = setup(Approach::Buffered);
        // 0.1° west of the western edge, about 3.03 km
        let crater = Crater::new(9, 4.0, -0.1, 0.0);
        let classified = classifier.classify(&region, &crater).unwrap().unwrap();
        assert!(!classified.is_inside());
        assert_relative_eq!(classified.distance, 0.1 * metres_per_degree(), max_relative = 1e-6);
    }
}
