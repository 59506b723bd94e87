//! Error types for csfdtools

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for CSFD measurement runs
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CsfdError {
    #[error("Spatial reference mismatch: regions use {regions}, craters use {craters}")]
    ReferenceMismatch { regions: String, craters: String },

    #[error("Invalid spheroid: semi-major {semi_major} m, semi-minor {semi_minor} m")]
    InvalidSpheroid { semi_major: f64, semi_minor: f64 },

    #[error("Degenerate geometry in {feature}: {reason}")]
    DegenerateGeometry { feature: String, reason: String },

    #[error("Ungeometrizable self-intersection in {feature} after {depth} repair passes")]
    UngeometrizableSelfIntersection { feature: String, depth: usize },

    #[error("{solver} did not converge within {iterations} iterations")]
    NonConvergence {
        solver: &'static str,
        iterations: usize,
    },

    #[error("Aggregated buffer area of crater {crater_id} is zero; fraction undefined")]
    ZeroAggregatedArea { crater_id: u64 },

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("No regions selected for measurement")]
    NoRegionsSelected,

    #[error("Unknown region identifier: {0}")]
    UnknownRegion(String),

    #[error("Worker pool error: {0}")]
    WorkerPool(String),

    #[error("Run cancelled after a peer worker failed")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for CsfdError {
    fn from(e: serde_json::Error) -> Self {
        CsfdError::Config(e.to_string())
    }
}

impl CsfdError {
    /// Per-feature errors that the pipeline may record and step over when the
    /// feature is not part of a sequential area chain.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CsfdError::DegenerateGeometry { .. }
                | CsfdError::UngeometrizableSelfIntersection { .. }
                | CsfdError::NonConvergence { .. }
                | CsfdError::ZeroAggregatedArea { .. }
        )
    }
}

/// How badly a recovered problem affected the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// The feature was skipped at ingestion.
    Warning,
    /// A counted crater lost its record.
    Error,
}

/// A per-feature problem the run stepped over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementIssue {
    pub feature: String,
    pub severity: Severity,
    pub message: String,
}

impl MeasurementIssue {
    pub fn new(feature: impl Into<String>, severity: Severity, error: &CsfdError) -> Self {
        Self {
            feature: feature.into(),
            severity,
            message: error.to_string(),
        }
    }
}

/// Result type alias for csfdtools operations
pub type Result<T> = std::result::Result<T, CsfdError>;
