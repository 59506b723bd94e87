//! Geodesic growth of polygons by a per-crater distance.
//!
//! Every boundary vertex contributes the two points perpendicular to its
//! incoming and outgoing edges, plus a fan of points across the outward
//! corner when the corner is convex. Those (vertex, azimuth) pairs depend on
//! the outline only, so they are computed once per outline as a
//! [`BufferTemplate`]; growing by a distance is then a direct geodesic
//! projection of each pair followed by self-intersection repair.

use geo::{Coord, LineString, MultiPolygon, Polygon};
use serde::{Deserialize, Serialize};

use crate::config::Tuning;
use crate::error::{CsfdError, Result};
use crate::geodesic::{normalize_azimuth, positive_mod, GeodesicSolver};
use crate::geometry::{clockwise, densify_ring, union_all};
use crate::repair::RingRepair;
use crate::segmenter::RingSegmenter;

/// One point of a grown outline before projection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct FanEntry {
    lon: f64,
    lat: f64,
    azimuth: f64,
}

#[derive(Debug, Clone)]
struct RingTemplate {
    /// Clockwise, densified source ring in the local frame.
    source: LineString<f64>,
    entries: Vec<FanEntry>,
}

/// Precomputed growth directions of a set of hole-free rings.
#[derive(Debug, Clone, Default)]
pub struct BufferTemplate {
    rings: Vec<RingTemplate>,
}

impl BufferTemplate {
    pub fn ring_count(&self) -> usize {
        self.rings.len()
    }

    pub fn entry_count(&self) -> usize {
        self.rings.iter().map(|r| r.entries.len()).sum()
    }
}

/// Grows local-frame polygons along geodesics.
#[derive(Debug, Clone, Copy)]
pub struct BufferEngine {
    solver: GeodesicSolver,
    tuning: Tuning,
}

impl BufferEngine {
    pub fn new(solver: GeodesicSolver, tuning: Tuning) -> Self {
        Self { solver, tuning }
    }

    pub fn solver(&self) -> &GeodesicSolver {
        &self.solver
    }

    /// Segments every part of `area` into hole-free rings and precomputes
    /// their growth directions.
    pub fn template(&self, area: &MultiPolygon<f64>, feature: &str) -> Result<BufferTemplate> {
        let segmenter = RingSegmenter::new(self.tuning.cut_epsilon_deg);
        let mut rings = Vec::new();
        for part in area.iter() {
            for ring in segmenter.segment(part, feature)? {
                rings.push(self.ring_template(&ring, feature)?);
            }
        }
        Ok(BufferTemplate { rings })
    }

    fn ring_template(&self, ring: &LineString<f64>, feature: &str) -> Result<RingTemplate> {
        let source = densify_ring(&clockwise(ring), self.tuning.densify_step_deg);
        let mut vertices: Vec<Coord<f64>> = Vec::with_capacity(source.0.len());
        for c in source.0.iter().take(source.0.len().saturating_sub(1)) {
            if vertices.last() != Some(c) {
                vertices.push(*c);
            }
        }
        if vertices.len() > 1 && vertices.first() == vertices.last() {
            vertices.pop();
        }
        let n = vertices.len();
        if n < 3 {
            return Err(CsfdError::DegenerateGeometry {
                feature: feature.to_string(),
                reason: format!("ring with {n} distinct vertices cannot be grown"),
            });
        }

        let edges = (0..n)
            .map(|i| {
                let (a, b) = (vertices[i], vertices[(i + 1) % n]);
                self.solver.inverse(a.y, a.x, b.y, b.x)
            })
            .collect::<Result<Vec<_>>>()?;

        let step = self.tuning.fan_step_deg;
        let mut entries = Vec::with_capacity(n * 4);
        for i in 0..n {
            let cur = vertices[i];
            let incoming = &edges[(i + n - 1) % n];
            let outgoing = &edges[i];
            let heading_in = normalize_azimuth(incoming.azimuth21 + 180.0);
            let perpendicular_in = normalize_azimuth(heading_in - 90.0);
            let perpendicular_out = normalize_azimuth(outgoing.azimuth12 - 90.0);

            let entry = |azimuth: f64| FanEntry {
                lon: cur.x,
                lat: cur.y,
                azimuth,
            };
            entries.push(entry(perpendicular_in));
            // clockwise sweep from the incoming to the outgoing perpendicular;
            // wider than 180° means the corner is concave and gets no fan
            let sweep = positive_mod(perpendicular_out - perpendicular_in, 360.0);
            if sweep <= 180.0 {
                let mut offset = step;
                while offset < sweep {
                    entries.push(entry(normalize_azimuth(perpendicular_in + offset)));
                    offset += step;
                }
            }
            entries.push(entry(perpendicular_out));
        }

        Ok(RingTemplate { source, entries })
    }

    /// Grows every ring of `template` by `distance` metres and unions them.
    ///
    /// # Errors
    ///
    /// `UngeometrizableSelfIntersection` if a grown ring cannot be repaired,
    /// `NonConvergence` from the geodesic solver.
    pub fn grow(&self, template: &BufferTemplate, distance: f64, feature: &str) -> Result<MultiPolygon<f64>> {
        let mut grown = Vec::with_capacity(template.rings.len());
        for ring in &template.rings {
            let mut candidate = ring
                .entries
                .iter()
                .map(|e| {
                    self.solver
                        .direct(e.lat, e.lon, e.azimuth, distance)
                        .map(|p| Coord { x: p.lon, y: p.lat })
                })
                .collect::<Result<Vec<_>>>()?;
            if let Some(first) = candidate.first().copied() {
                candidate.push(first);
            }
            let repair = RingRepair {
                solver: &self.solver,
                source: &ring.source,
                distance,
                max_depth: self.tuning.max_repair_depth,
                feature,
            };
            grown.push(repair.repair(&candidate)?);
        }
        Ok(union_all(grown))
    }

    /// Template and growth in one call, for outlines used only once.
    pub fn grow_area(&self, area: &MultiPolygon<f64>, distance: f64, feature: &str) -> Result<MultiPolygon<f64>> {
        let template = self.template(area, feature)?;
        self.grow(&template, distance, feature)
    }

    /// Geodesic circle of `radius` metres around a local-frame centre.
    pub fn ejecta_polygon(&self, center: Coord<f64>, radius: f64) -> Result<Polygon<f64>> {
        let n = self.tuning.ejecta_vertices;
        let mut ring = (0..n)
            .map(|k| {
                let azimuth = 360.0 * k as f64 / n as f64;
                self.solver
                    .direct(center.y, center.x, azimuth, radius)
                    .map(|p| Coord { x: p.lon, y: p.lat })
            })
            .collect::<Result<Vec<_>>>()?;
        if let Some(first) = ring.first().copied() {
            ring.push(first);
        }
        Ok(Polygon::new(LineString::new(ring), vec![]))
    }
}
