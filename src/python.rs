use numpy::{PyArray1, PyArray2, PyReadonlyArray2};
use pyo3::{exceptions::PyValueError, prelude::*};

use crate::config::{MeasurementConfig, Tuning};
use crate::crater::Crater;
use crate::error::CsfdError;
use crate::geodesic::GeodesicSolver;
use crate::geometry::CraterFootprint;
use crate::pipeline::{self, Dataset};
use crate::spheroid::Spheroid;

impl From<CsfdError> for PyErr {
    fn from(e: CsfdError) -> Self {
        PyValueError::new_err(e.to_string())
    }
}

fn solver(semi_major: f64, semi_minor: f64) -> PyResult<GeodesicSolver> {
    let spheroid = Spheroid::new(semi_major, semi_minor)?;
    Ok(GeodesicSolver::new(spheroid, &Tuning::default()))
}

/// Runs a measurement described by two JSON documents.
///
/// # Arguments
///
/// * `config_json` - A serialised `MeasurementConfig`.
/// * `dataset_json` - Regions, crater footprints and their spatial references.
///
/// # Returns
///
/// * A tuple of the total reference area in km², the counted craters as a
///   2D array (one row per crater), and the full report as JSON.
#[pyfunction]
pub fn measure<'py>(
    py: Python<'py>,
    config_json: &str,
    dataset_json: &str,
) -> PyResult<(f64, Bound<'py, PyArray2<f64>>, String)> {
    let config = MeasurementConfig::from_json(config_json)?;
    let dataset = Dataset::from_json(dataset_json)?;
    let report = py.allow_threads(|| pipeline::measure(config, &dataset))?;
    let array = report.output.to_array();
    Ok((report.total_area_km2, PyArray2::from_owned_array(py, array), report.to_json()?))
}

/// Solves the direct geodesic problem.
///
/// # Returns
///
/// * `(lat2, lon2, back_azimuth)` in degrees.
#[pyfunction]
pub fn vincenty_direct(
    lat: f64,
    lon: f64,
    azimuth: f64,
    distance: f64,
    semi_major: f64,
    semi_minor: f64,
) -> PyResult<(f64, f64, f64)> {
    let s = solver(semi_major, semi_minor)?.direct(lat, lon, azimuth, distance)?;
    Ok((s.lat, s.lon, s.back_azimuth))
}

/// Solves the inverse geodesic problem.
///
/// # Returns
///
/// * `(distance, azimuth12, azimuth21)`, metres and degrees.
#[pyfunction]
pub fn vincenty_inverse(
    lat1: f64,
    lon1: f64,
    lat2: f64,
    lon2: f64,
    semi_major: f64,
    semi_minor: f64,
) -> PyResult<(f64, f64, f64)> {
    let s = solver(semi_major, semi_minor)?.inverse(lat1, lon1, lat2, lon2)?;
    Ok((s.distance, s.azimuth12, s.azimuth21))
}

/// Equal-area diameter in km of a footprint given as an `(n, 2)` lon/lat array.
#[pyfunction]
pub fn footprint_diameter(footprint: PyReadonlyArray2<'_, f64>, semi_major: f64, semi_minor: f64) -> PyResult<f64> {
    let footprint = footprint.as_array();
    if footprint.ncols() != 2 {
        return Err(PyValueError::new_err("footprint must have shape (n, 2)"));
    }
    let outer = footprint.rows().into_iter().map(|r| [r[0], r[1]]).collect();
    let spheroid = Spheroid::new(semi_major, semi_minor)?;
    let crater = Crater::from_footprint(&CraterFootprint::new(outer), 0, &spheroid, &Tuning::default())?;
    Ok(crater.diameter_km)
}

/// Geodesic distances in metres from one point to many.
#[pyfunction]
pub fn geodesic_distances<'py>(
    py: Python<'py>,
    lat: f64,
    lon: f64,
    points: PyReadonlyArray2<'py, f64>,
    semi_major: f64,
    semi_minor: f64,
) -> PyResult<Bound<'py, PyArray1<f64>>> {
    let points = points.as_array();
    if points.ncols() != 2 {
        return Err(PyValueError::new_err("points must have shape (n, 2)"));
    }
    let solver = solver(semi_major, semi_minor)?;
    let distances = points
        .rows()
        .into_iter()
        .map(|r| solver.distance(lat, lon, r[1], r[0]))
        .collect::<Result<Vec<f64>, CsfdError>>()?;
    Ok(PyArray1::from_vec(py, distances))
}
