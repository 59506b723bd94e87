//! Decomposes holed polygons into hole-free rings.
//!
//! Every hole is opened by subtracting a thin north-south strip through its
//! centroid that spans the whole part. The outlines of the resulting pieces
//! enclose the same area as the holed part, so growing them reproduces the
//! grown part.

use geo::{BooleanOps, BoundingRect, Centroid, LineString, MultiPolygon, Polygon, Rect};
use tracing::trace;

use crate::error::{CsfdError, Result};

/// Latitude margin of a cut strip beyond the part's extent, degrees.
const CUT_MARGIN_DEG: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RingSegmenter {
    cut_epsilon: f64,
}

impl RingSegmenter {
    pub fn new(cut_epsilon: f64) -> Self {
        Self { cut_epsilon }
    }

    /// Simply-connected outer rings equivalent to `part`.
    ///
    /// # Errors
    ///
    /// `DegenerateGeometry` if a hole survives both the centroid cut and the
    /// fallback cut through the middle of its bounding box.
    pub fn segment(&self, part: &Polygon<f64>, feature: &str) -> Result<Vec<LineString<f64>>> {
        if part.interiors().is_empty() {
            return Ok(vec![part.exterior().clone()]);
        }
        let extent = part.bounding_rect().ok_or_else(|| CsfdError::DegenerateGeometry {
            feature: feature.to_string(),
            reason: "part has no extent".to_string(),
        })?;

        let mut pieces = MultiPolygon::new(vec![part.clone()]);
        for hole in part.interiors() {
            let hole_polygon = Polygon::new(hole.clone(), vec![]);
            let cut_lon = match hole_polygon.centroid() {
                Some(c) => c.x(),
                None => mid_lon(hole).unwrap_or(extent.center().x),
            };
            pieces = pieces.difference(&self.strip(cut_lon, &extent));
        }

        // a strip may miss a hole whose centroid sits on a neighbouring cut
        let leftover: Vec<LineString<f64>> = pieces
            .iter()
            .flat_map(|p| p.interiors().iter().cloned())
            .collect();
        for hole in &leftover {
            if let Some(cut_lon) = mid_lon(hole) {
                pieces = pieces.difference(&self.strip(cut_lon, &extent));
            }
        }
        if pieces.iter().any(|p| !p.interiors().is_empty()) {
            return Err(CsfdError::DegenerateGeometry {
                feature: feature.to_string(),
                reason: "hole could not be opened by cut lines".to_string(),
            });
        }

        trace!(
            feature,
            holes = part.interiors().len(),
            pieces = pieces.0.len(),
            "segmented holed part"
        );
        Ok(pieces.into_iter().map(|p| p.exterior().clone()).collect())
    }

    fn strip(&self, lon: f64, extent: &Rect<f64>) -> MultiPolygon<f64> {
        let rect = Rect::new(
            (lon - self.cut_epsilon, extent.min().y - CUT_MARGIN_DEG),
            (lon + self.cut_epsilon, extent.max().y + CUT_MARGIN_DEG),
        );
        MultiPolygon::new(vec![rect.to_polygon()])
    }
}

fn mid_lon(ring: &LineString<f64>) -> Option<f64> {
    ring.bounding_rect().map(|r| r.center().x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Region;
    use approx::assert_relative_eq;
    use geo::Area;

    fn holed() -> Polygon<f64> {
        Region::new("r", vec![[0.0, 0.0], [0.0, 10.0], [10.0, 10.0], [10.0, 0.0]])
            .with_hole(vec![[2.0, 2.0], [4.0, 2.0], [4.0, 4.0], [2.0, 4.0]])
            .with_hole(vec![[6.0, 5.0], [8.0, 5.0], [8.0, 8.0], [6.0, 8.0]])
            .to_polygon()
            .unwrap()
    }

    #[test]
    fn hole_free_part_passes_through() {
        let part = Region::new("r", vec![[0.0, 0.0], [0.0, 1.0], [1.0, 1.0]]).to_polygon().unwrap();
        let rings = RingSegmenter::new(1e-6).segment(&part, "r").unwrap();
        assert_eq!(rings.len(), 1);
        assert_eq!(&rings[0], part.exterior());
    }

    #[test]
    fn holes_are_opened_and_area_is_kept() {
        let part = holed();
        let rings = RingSegmenter::new(1e-6).segment(&part, "r").unwrap();
        assert!(rings.len() >= 3);
        let total: f64 = rings
            .iter()
            .map(|r| Polygon::new(r.clone(), vec![]).unsigned_area())
            .sum();
        // two strips of width 2e-6 spanning the part are removed
        assert_relative_eq!(total, part.unsigned_area(), epsilon = 1e-4);
    }
}
