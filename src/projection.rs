//! Local reference frames and the equal-area projection used for every area
//! measurement.
//!
//! A [`LocalFrame`] shifts longitudes so that the geometry of interest sits
//! around the frame's central meridian. Geodesics are invariant under that
//! shift, so buffering and classification run on shifted coordinates without
//! any correction and never see a ±180° discontinuity.

use std::f64::consts::{FRAC_PI_2, PI, SQRT_2};

use geo::{Area, Centroid, Coord, Intersects, LineString, MapCoords, MultiPolygon, Polygon};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Tuning;
use crate::error::{CsfdError, Result};
use crate::geodesic::wrap_longitude;
use crate::geometry::densify_multipolygon;
use crate::spheroid::Spheroid;

/// Maximum Newton steps solving the Mollweide auxiliary angle.
const MOLLWEIDE_MAX_ITERATIONS: usize = 60;
const MOLLWEIDE_TOLERANCE: f64 = 1e-12;

/// Shifted-meridian geographic frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocalFrame {
    pub center_lon: f64,
    pub center_lat: f64,
    /// Set when the antimeridian heuristic moved the centre.
    pub antimeridian_shifted: bool,
}

impl Default for LocalFrame {
    fn default() -> Self {
        Self {
            center_lon: 0.0,
            center_lat: 0.0,
            antimeridian_shifted: false,
        }
    }
}

impl LocalFrame {
    #[inline]
    pub fn to_local(&self, c: Coord<f64>) -> Coord<f64> {
        Coord {
            x: wrap_longitude(c.x - self.center_lon),
            y: c.y,
        }
    }

    #[inline]
    pub fn to_geographic(&self, c: Coord<f64>) -> Coord<f64> {
        Coord {
            x: wrap_longitude(c.x + self.center_lon),
            y: c.y,
        }
    }

    pub fn polygon_to_local(&self, polygon: &Polygon<f64>) -> Polygon<f64> {
        polygon.map_coords(|c| self.to_local(c))
    }

    pub fn multipolygon_to_local(&self, multi: &MultiPolygon<f64>) -> MultiPolygon<f64> {
        multi.map_coords(|c| self.to_local(c))
    }

    pub fn polygon_to_geographic(&self, polygon: &Polygon<f64>) -> Polygon<f64> {
        polygon.map_coords(|c| self.to_geographic(c))
    }

    pub fn multipolygon_to_geographic(&self, multi: &MultiPolygon<f64>) -> MultiPolygon<f64> {
        multi.map_coords(|c| self.to_geographic(c))
    }

    /// Re-expresses coordinates of `other` in this frame.
    pub fn rebase(&self, other: &LocalFrame, c: Coord<f64>) -> Coord<f64> {
        self.to_local(other.to_geographic(c))
    }
}

/// Picks the local frame of a geographic geometry.
#[derive(Debug, Clone, Copy)]
pub struct LocalProjectionPlanner<'a> {
    tuning: &'a Tuning,
}

impl<'a> LocalProjectionPlanner<'a> {
    pub fn new(tuning: &'a Tuning) -> Self {
        Self { tuning }
    }

    /// Frame centred on the rounded planar centroid of `geometry`.
    ///
    /// Geometry touching both probe meridians is taken to straddle the
    /// antimeridian, and its naive centre (near 0°) is moved by the
    /// configured shift.
    pub fn plan(&self, geometry: &MultiPolygon<f64>) -> Result<LocalFrame> {
        let centroid = geometry.centroid().ok_or_else(|| CsfdError::DegenerateGeometry {
            feature: "projection centre".to_string(),
            reason: "geometry has no centroid".to_string(),
        })?;
        let step = self.tuning.center_rounding_deg;
        let mut center_lon = (centroid.x() / step).round() * step;
        let center_lat = ((centroid.y() / step).round() * step)
            .clamp(-self.tuning.max_center_lat, self.tuning.max_center_lat);

        let heuristic = &self.tuning.antimeridian;
        let mut shifted = false;
        if heuristic.enabled
            && self.straddles_antimeridian(geometry)
            && center_lon.abs() < heuristic.window_deg
        {
            center_lon += heuristic.shift_deg;
            shifted = true;
        }
        let frame = LocalFrame {
            center_lon: wrap_longitude(center_lon),
            center_lat,
            antimeridian_shifted: shifted,
        };
        debug!(
            center_lon = frame.center_lon,
            center_lat = frame.center_lat,
            shifted,
            "planned local frame"
        );
        Ok(frame)
    }

    pub fn plan_polygon(&self, polygon: &Polygon<f64>) -> Result<LocalFrame> {
        self.plan(&MultiPolygon::new(vec![polygon.clone()]))
    }

    fn straddles_antimeridian(&self, geometry: &MultiPolygon<f64>) -> bool {
        let probe = self.tuning.antimeridian.probe_lon;
        let west = LineString::from(vec![(-probe, -90.0), (-probe, 90.0)]);
        let east = LineString::from(vec![(probe, -90.0), (probe, 90.0)]);
        let hits = |line: &LineString<f64>| geometry.iter().any(|p| p.intersects(line));
        hits(&west) && hits(&east)
    }
}

/// Mollweide projection on the authalic sphere of a spheroid, expressed on
/// local-frame coordinates (longitude relative to the frame centre).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EqualAreaProjection {
    spheroid: Spheroid,
    radius: f64,
}

impl EqualAreaProjection {
    pub fn new(spheroid: Spheroid) -> Self {
        Self {
            spheroid,
            radius: spheroid.authalic_radius(),
        }
    }

    pub fn authalic_radius(&self) -> f64 {
        self.radius
    }

    /// Local degrees to projected metres.
    pub fn forward(&self, c: Coord<f64>) -> Coord<f64> {
        let lambda = c.x.to_radians();
        let beta = self.spheroid.authalic_latitude(c.y.to_radians());
        let theta = mollweide_theta(beta);
        Coord {
            x: self.radius * 2.0 * SQRT_2 / PI * lambda * theta.cos(),
            y: self.radius * SQRT_2 * theta.sin(),
        }
    }

    /// Projected metres to local degrees.
    pub fn inverse(&self, c: Coord<f64>) -> Coord<f64> {
        let theta = (c.y / (self.radius * SQRT_2)).clamp(-1.0, 1.0).asin();
        let beta = ((2.0 * theta + (2.0 * theta).sin()) / PI).clamp(-1.0, 1.0).asin();
        let cos_theta = theta.cos();
        let lambda = if cos_theta.abs() < f64::EPSILON {
            0.0
        } else {
            PI * c.x / (2.0 * SQRT_2 * self.radius * cos_theta)
        };
        Coord {
            x: lambda.to_degrees(),
            y: self.spheroid.geodetic_latitude(beta).to_degrees(),
        }
    }

    pub fn project(&self, multi: &MultiPolygon<f64>) -> MultiPolygon<f64> {
        multi.map_coords(|c| self.forward(c))
    }

    /// Area in km² of a local-frame polygon set, densified first.
    pub fn area_km2(&self, local: &MultiPolygon<f64>, densify_step_deg: f64) -> f64 {
        let dense = densify_multipolygon(local, densify_step_deg);
        self.project(&dense).unsigned_area() / 1.0e6
    }
}

/// Solves `2θ + sin 2θ = π sin β` by Newton iteration.
fn mollweide_theta(beta: f64) -> f64 {
    if (FRAC_PI_2 - beta.abs()) < 1e-12 {
        return beta.signum() * FRAC_PI_2;
    }
    let target = PI * beta.sin();
    let mut two_theta = 2.0 * beta;
    for _ in 0..MOLLWEIDE_MAX_ITERATIONS {
        let delta = (two_theta + two_theta.sin() - target) / (1.0 + two_theta.cos());
        two_theta -= delta;
        if delta.abs() < MOLLWEIDE_TOLERANCE {
            break;
        }
    }
    two_theta / 2.0
}
