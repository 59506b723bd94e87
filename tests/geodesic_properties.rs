mod common;

use approx::assert_relative_eq;
use csfdtools::buffer::BufferEngine;
use csfdtools::geodesic::{positive_mod, GeodesicSolver};
use csfdtools::geometry::Region;
use csfdtools::projection::EqualAreaProjection;
use csfdtools::spheroid::Spheroid;
use csfdtools::Tuning;
use geo::MultiPolygon;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::common::MOON_RADIUS;

fn azimuth_diff(a: f64, b: f64) -> f64 {
    (positive_mod(a - b + 180.0, 360.0) - 180.0).abs()
}

fn round_trip(spheroid: Spheroid, max_distance: f64, seed: u64) {
    let solver = GeodesicSolver::new(spheroid, &Tuning::default());
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    for _ in 0..500 {
        let lat = rng.random_range(-70.0..70.0);
        let lon = rng.random_range(-180.0..180.0);
        let azimuth = rng.random_range(0.0..360.0);
        let distance = rng.random_range(1_000.0..max_distance);

        let end = solver.direct(lat, lon, azimuth, distance).unwrap();
        let back = solver.inverse(lat, lon, end.lat, end.lon).unwrap();
        assert_relative_eq!(back.distance, distance, max_relative = 1e-6);
        assert!(
            azimuth_diff(back.azimuth12, azimuth) < 1e-6,
            "azimuth {azimuth} came back as {}",
            back.azimuth12
        );
        assert!(azimuth_diff(back.azimuth21, end.back_azimuth) < 1e-6);
    }
}

#[test]
fn direct_inverse_round_trip_on_earth() {
    let wgs84 = Spheroid::from_flattening(6_378_137.0, 1.0 / 298.257_223_563).unwrap();
    round_trip(wgs84, 5_000_000.0, 7);
}

#[test]
fn direct_inverse_round_trip_on_oblate_mars() {
    let mars = Spheroid::new(3_396_190.0, 3_376_200.0).unwrap();
    round_trip(mars, 3_000_000.0, 11);
}

#[test]
fn direct_inverse_round_trip_on_the_moon() {
    round_trip(Spheroid::sphere(MOON_RADIUS).unwrap(), 2_000_000.0, 42);
}

#[test]
fn buffered_area_grows_with_distance_for_random_convex_rings() {
    let tuning = Tuning::default();
    let spheroid = Spheroid::sphere(MOON_RADIUS).unwrap();
    let engine = BufferEngine::new(GeodesicSolver::new(spheroid, &tuning), tuning);
    let projection = EqualAreaProjection::new(spheroid);
    let mut rng = ChaCha8Rng::seed_from_u64(3);

    for _ in 0..5 {
        // convex polygon from sorted angles on an ellipse
        let mut angles: Vec<f64> = (0..7).map(|_| rng.random_range(0.0..360.0_f64)).collect();
        angles.sort_by(|a, b| b.total_cmp(a));
        let (rx, ry) = (rng.random_range(0.5..2.0), rng.random_range(0.5..2.0));
        let outer = angles
            .iter()
            .map(|t| [rx * t.to_radians().cos(), ry * t.to_radians().sin()])
            .collect();
        let Ok(polygon) = Region::new("ring", outer).to_polygon() else {
            continue;
        };
        let area = MultiPolygon::new(vec![polygon]);
        let template = engine.template(&area, "ring").unwrap();

        let mut last = projection.area_km2(&area, 1.0);
        for distance in [1_000.0, 5_000.0, 20_000.0, 60_000.0] {
            let grown = engine.grow(&template, distance, "ring").unwrap();
            let size = projection.area_km2(&grown, 1.0);
            assert!(size >= last, "area fell from {last} to {size} at {distance} m");
            last = size;
        }
    }
}
