//! Plain geometry records exchanged with the geometry provider, and the
//! planar helpers shared by the segmenter, buffer engine and classifier.
//!
//! Records hold `[lon, lat]` vertex lists so that they can be copied to
//! workers and serialised freely; `geo` types are rebuilt where needed.

use geo::{
    Area, BooleanOps, BoundingRect, Centroid, Closest, ClosestPoint, Contains, Coord, LineString,
    MultiPolygon, Point, Polygon, Winding,
};
use serde::{Deserialize, Serialize};

use crate::error::{CsfdError, Result};

/// A ring as delivered by the provider: `[lon, lat]` pairs, open or closed.
pub type RingCoords = Vec<[f64; 2]>;

/// Reference region: one outer ring plus optional holes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub outer: RingCoords,
    #[serde(default)]
    pub inners: Vec<RingCoords>,
}

impl Region {
    pub fn new(id: impl Into<String>, outer: RingCoords) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            outer,
            inners: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_hole(mut self, hole: RingCoords) -> Self {
        self.inners.push(hole);
        self
    }

    /// Builds the geographic polygon, rejecting rings without an area.
    pub fn to_polygon(&self) -> Result<Polygon<f64>> {
        let feature = format!("region '{}'", self.id);
        polygon_from_rings(&feature, &self.outer, &self.inners)
    }
}

/// Digitised crater rim polygon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CraterFootprint {
    /// Provider identifier; input order is used when absent.
    #[serde(default)]
    pub id: Option<u64>,
    pub outer: RingCoords,
    #[serde(default)]
    pub inners: Vec<RingCoords>,
}

impl CraterFootprint {
    pub fn new(outer: RingCoords) -> Self {
        Self {
            id: None,
            outer,
            inners: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn to_polygon(&self, index: usize) -> Result<Polygon<f64>> {
        let feature = match self.id {
            Some(id) => format!("crater footprint {id}"),
            None => format!("crater footprint #{index}"),
        };
        polygon_from_rings(&feature, &self.outer, &self.inners)
    }
}

fn polygon_from_rings(feature: &str, outer: &[[f64; 2]], inners: &[RingCoords]) -> Result<Polygon<f64>> {
    let exterior = ring_from_coords(feature, "outer ring", outer)?;
    let interiors = inners
        .iter()
        .enumerate()
        .map(|(i, ring)| ring_from_coords(feature, &format!("inner ring {i}"), ring))
        .collect::<Result<Vec<_>>>()?;
    Ok(Polygon::new(exterior, interiors))
}

fn ring_from_coords(feature: &str, ring_name: &str, coords: &[[f64; 2]]) -> Result<LineString<f64>> {
    if coords.is_empty() {
        // typically an un-exploded multi-part feature
        return Err(degenerate(feature, &format!("{ring_name} has no vertices")));
    }
    if coords.iter().any(|c| !(c[0].is_finite() && c[1].is_finite())) {
        return Err(degenerate(feature, &format!("{ring_name} has non-finite vertices")));
    }
    let mut ring: Vec<Coord<f64>> = Vec::with_capacity(coords.len() + 1);
    for c in coords {
        let coord = Coord { x: c[0], y: c[1] };
        if ring.last() != Some(&coord) {
            ring.push(coord);
        }
    }
    if ring.len() > 1 && ring.first() == ring.last() {
        ring.pop();
    }
    if ring.len() < 3 {
        return Err(degenerate(
            feature,
            &format!("{ring_name} has {} distinct vertices", ring.len()),
        ));
    }
    let ring = close_ring(ring);
    if Polygon::new(ring.clone(), vec![]).unsigned_area() == 0.0 {
        return Err(degenerate(feature, &format!("{ring_name} encloses no area")));
    }
    Ok(ring)
}

fn degenerate(feature: &str, reason: &str) -> CsfdError {
    CsfdError::DegenerateGeometry {
        feature: feature.to_string(),
        reason: reason.to_string(),
    }
}

/// Closes an open coordinate sequence.
pub fn close_ring(mut coords: Vec<Coord<f64>>) -> LineString<f64> {
    if let (Some(first), Some(last)) = (coords.first().copied(), coords.last().copied()) {
        if first != last {
            coords.push(first);
        }
    }
    LineString::new(coords)
}

/// Closed ring wound clockwise, the orientation the buffer engine grows outward.
pub fn clockwise(ring: &LineString<f64>) -> LineString<f64> {
    let mut ring = ring.clone();
    if ring.is_ccw() {
        ring.0.reverse();
    }
    ring
}

/// Inserts vertices so that no segment is longer than `step` (planar degrees).
pub fn densify_ring(ring: &LineString<f64>, step: f64) -> LineString<f64> {
    let mut out: Vec<Coord<f64>> = Vec::with_capacity(ring.0.len());
    for line in ring.lines() {
        out.push(line.start);
        let dx = line.end.x - line.start.x;
        let dy = line.end.y - line.start.y;
        let length = dx.hypot(dy);
        let pieces = (length / step).ceil() as usize;
        for k in 1..pieces {
            let t = k as f64 / pieces as f64;
            out.push(Coord {
                x: line.start.x + t * dx,
                y: line.start.y + t * dy,
            });
        }
    }
    if let Some(last) = ring.0.last() {
        out.push(*last);
    }
    LineString::new(out)
}

pub fn densify_polygon(polygon: &Polygon<f64>, step: f64) -> Polygon<f64> {
    Polygon::new(
        densify_ring(polygon.exterior(), step),
        polygon.interiors().iter().map(|r| densify_ring(r, step)).collect(),
    )
}

pub fn densify_multipolygon(multi: &MultiPolygon<f64>, step: f64) -> MultiPolygon<f64> {
    MultiPolygon::new(multi.iter().map(|p| densify_polygon(p, step)).collect())
}

/// Planar nearest point on a ring.
pub fn nearest_on_ring(ring: &LineString<f64>, point: Coord<f64>) -> Option<Coord<f64>> {
    match ring.closest_point(&Point::from(point)) {
        Closest::Intersection(p) | Closest::SinglePoint(p) => Some(p.0),
        Closest::Indeterminate => None,
    }
}

/// Planar distance from a point to a polygon, zero inside.
pub fn planar_distance_to_polygon(polygon: &Polygon<f64>, point: Coord<f64>) -> f64 {
    if polygon.contains(&Point::from(point)) {
        return 0.0;
    }
    std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .filter_map(|ring| nearest_on_ring(ring, point))
        .map(|c| (c.x - point.x).hypot(c.y - point.y))
        .fold(f64::INFINITY, f64::min)
}

/// A point strictly inside a simple closed ring.
///
/// Uses the centroid when it falls inside, otherwise the midpoint of the
/// widest span cut by a horizontal line through the ring's vertical middle.
pub fn interior_point(ring: &LineString<f64>) -> Option<Coord<f64>> {
    let polygon = Polygon::new(ring.clone(), vec![]);
    if let Some(centroid) = polygon.centroid() {
        if polygon.contains(&centroid) {
            return Some(centroid.0);
        }
    }
    let rect = ring.bounding_rect()?;
    let y = 0.5 * (rect.min().y + rect.max().y);
    let mut crossings: Vec<f64> = ring
        .lines()
        .filter(|l| (l.start.y > y) != (l.end.y > y))
        .map(|l| l.start.x + (y - l.start.y) * (l.end.x - l.start.x) / (l.end.y - l.start.y))
        .collect();
    crossings.sort_by(f64::total_cmp);
    crossings
        .chunks_exact(2)
        .max_by(|a, b| (a[1] - a[0]).total_cmp(&(b[1] - b[0])))
        .map(|pair| Coord {
            x: 0.5 * (pair[0] + pair[1]),
            y,
        })
}

/// Union of a sequence of polygon sets.
pub fn union_all<I>(parts: I) -> MultiPolygon<f64>
where
    I: IntoIterator<Item = MultiPolygon<f64>>,
{
    parts
        .into_iter()
        .fold(MultiPolygon::new(vec![]), |acc, part| {
            if acc.0.is_empty() {
                part
            } else if part.0.is_empty() {
                acc
            } else {
                acc.union(&part)
            }
        })
}

/// Converts a polygon back into provider records.
pub fn polygon_to_rings(polygon: &Polygon<f64>) -> (RingCoords, Vec<RingCoords>) {
    let to_coords = |ring: &LineString<f64>| ring.0.iter().map(|c| [c.x, c.y]).collect::<RingCoords>();
    (
        to_coords(polygon.exterior()),
        polygon.interiors().iter().map(to_coords).collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn square() -> RingCoords {
        vec![[0.0, 0.0], [0.0, 2.0], [2.0, 2.0], [2.0, 0.0], [0.0, 0.0]]
    }

    #[test]
    fn region_polygon_is_closed() {
        let polygon = Region::new("r1", square()[..4].to_vec()).to_polygon().unwrap();
        assert_eq!(polygon.exterior().0.len(), 5);
        assert_relative_eq!(polygon.unsigned_area(), 4.0);
    }

    #[test]
    fn empty_ring_is_degenerate() {
        let region = Region::new("multi", square()).with_hole(vec![]);
        let err = region.to_polygon().unwrap_err();
        assert!(matches!(err, CsfdError::DegenerateGeometry { .. }));
        assert!(err.to_string().contains("inner ring 0"));
    }

    #[test]
    fn collinear_ring_is_degenerate() {
        let region = Region::new("line", vec![[0.0, 0.0], [1.0, 1.0], [2.0, 2.0]]);
        assert!(region.to_polygon().is_err());
    }

    #[test]
    fn densify_limits_segment_length() {
        let ring = LineString::from(vec![(0.0, 0.0), (0.0, 3.5), (1.0, 3.5), (0.0, 0.0)]);
        let dense = densify_ring(&ring, 1.0);
        assert!(dense.lines().all(|l| (l.end.x - l.start.x).hypot(l.end.y - l.start.y) <= 1.0 + 1e-12));
        assert_eq!(dense.0.first(), dense.0.last());
        assert_relative_eq!(
            Polygon::new(dense, vec![]).unsigned_area(),
            Polygon::new(ring, vec![]).unsigned_area(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn clockwise_reverses_ccw_rings() {
        let ccw = LineString::from(vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0), (0.0, 0.0)]);
        assert!(ccw.is_ccw());
        assert!(clockwise(&ccw).is_cw());
    }

    #[test]
    fn planar_distance_is_zero_inside_and_positive_in_hole() {
        let polygon = Region::new("r", vec![[0.0, 0.0], [0.0, 10.0], [10.0, 10.0], [10.0, 0.0]])
            .with_hole(vec![[4.0, 4.0], [6.0, 4.0], [6.0, 6.0], [4.0, 6.0]])
            .to_polygon()
            .unwrap();
        assert_eq!(planar_distance_to_polygon(&polygon, Coord { x: 2.0, y: 2.0 }), 0.0);
        assert_relative_eq!(planar_distance_to_polygon(&polygon, Coord { x: 5.0, y: 5.0 }), 1.0);
        assert_relative_eq!(planar_distance_to_polygon(&polygon, Coord { x: 12.0, y: 5.0 }), 2.0);
    }

    #[test]
    fn interior_point_of_concave_ring_is_inside() {
        let ring = LineString::from(vec![
            (0.0, 0.0),
            (10.0, 0.0),
            (10.0, 10.0),
            (9.0, 10.0),
            (9.0, 1.0),
            (1.0, 1.0),
            (1.0, 10.0),
            (0.0, 10.0),
            (0.0, 0.0),
        ]);
        let p = interior_point(&ring).unwrap();
        assert!(Polygon::new(ring, vec![]).contains(&Point::from(p)));
    }
}
