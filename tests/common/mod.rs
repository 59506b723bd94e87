#![allow(dead_code)]

use csfdtools::geometry::{CraterFootprint, Region};
use csfdtools::spheroid::SpatialReference;
use csfdtools::{Approach, Dataset, MeasurementConfig, WorkerMode};

pub const MOON_RADIUS: f64 = 1_737_400.0;

pub fn moon() -> SpatialReference {
    SpatialReference::geographic("GCS_Moon_2000", MOON_RADIUS, MOON_RADIUS)
}

/// Degrees of arc spanning `km` on the lunar sphere.
pub fn km_to_deg(km: f64) -> f64 {
    (km * 1000.0 / MOON_RADIUS).to_degrees()
}

pub fn rect_region(id: &str, lon0: f64, lat0: f64, lon1: f64, lat1: f64) -> Region {
    Region::new(id, vec![[lon0, lat0], [lon0, lat1], [lon1, lat1], [lon1, lat0]])
}

/// Clockwise circular rim of `diameter_km` around an equatorial-ish centre.
pub fn circle_footprint(lon: f64, lat: f64, diameter_km: f64) -> CraterFootprint {
    let n = 360;
    let r_lat = km_to_deg(diameter_km / 2.0);
    let r_lon = r_lat / lat.to_radians().cos();
    let outer = (0..n)
        .map(|k| {
            let t = -2.0 * std::f64::consts::PI * k as f64 / n as f64;
            [lon + r_lon * t.cos(), lat + r_lat * t.sin()]
        })
        .collect();
    CraterFootprint::new(outer)
}

pub fn dataset(regions: Vec<Region>, craters: Vec<CraterFootprint>) -> Dataset {
    Dataset::new(moon(), regions, craters)
}

pub fn config(approach: Approach, regions: &[&str]) -> MeasurementConfig {
    MeasurementConfig::new(approach, regions.iter().copied())
        .with_workers(WorkerMode::MultiCore { workers: Some(2) })
}

/// Spherical area of a lon/lat rectangle in km².
pub fn sphere_rect_km2(lon0: f64, lat0: f64, lon1: f64, lat1: f64) -> f64 {
    let r = MOON_RADIUS / 1000.0;
    r * r * (lon1 - lon0).to_radians() * (lat1.to_radians().sin() - lat0.to_radians().sin())
}
