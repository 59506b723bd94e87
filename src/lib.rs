pub mod aggregate;
pub mod buffer;
pub mod classify;
pub mod config;
pub mod crater;
pub mod error;
pub mod geodesic;
pub mod geometry;
pub mod logging;
pub mod obliteration;
pub mod partition;
pub mod pipeline;
pub mod projection;
pub mod region;
pub mod repair;
pub mod report;
pub mod segmenter;
pub mod spheroid;

#[cfg(feature = "python")]
pub mod python;

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

pub use config::{Approach, MeasurementConfig, Tuning, WorkerMode};
pub use error::{CsfdError, MeasurementIssue, Result, Severity};
pub use pipeline::{measure, Dataset, MeasurementContext};
pub use report::{CraterOutput, MeasurementReport};

#[cfg(feature = "python")]
use pyo3::prelude::*;

#[cfg(feature = "python")]
#[pymodule]
#[pyo3(name = "_csfdtools")]
mod csfdtools {
    use super::*;

    #[pymodule]
    mod pipeline {
        #[pymodule_export]
        use crate::python::{footprint_diameter, measure};
    }

    #[pymodule]
    mod geodesic {
        #[pymodule_export]
        use crate::python::{geodesic_distances, vincenty_direct, vincenty_inverse};
    }
}
