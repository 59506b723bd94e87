//! Run configuration: approach selection, correction factors, worker mode and
//! the numeric heuristics used by the geometry engine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CsfdError, Result};

/// Smallest accepted buffer / obliteration factor.
pub const MIN_FACTOR: f64 = 1.0;
/// Largest accepted buffer / obliteration factor.
pub const MAX_FACTOR: f64 = 4.0;

/// Crater counting technique.
///
/// Serialised with the legacy tags `TRAD`, `BCC`, `NSC` and `BNSC`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Approach {
    Traditional,
    Buffered,
    NonSparsenessCorrection,
    BufferedNonSparsenessCorrection,
}

impl Approach {
    pub fn tag(self) -> &'static str {
        match self {
            Approach::Traditional => "TRAD",
            Approach::Buffered => "BCC",
            Approach::NonSparsenessCorrection => "NSC",
            Approach::BufferedNonSparsenessCorrection => "BNSC",
        }
    }

    /// Whether the approach removes area obliterated by larger craters.
    pub fn corrects_sparseness(self) -> bool {
        match self {
            Approach::Traditional | Approach::Buffered => false,
            Approach::NonSparsenessCorrection | Approach::BufferedNonSparsenessCorrection => true,
        }
    }
}

impl fmt::Display for Approach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Approach {
    type Err = CsfdError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TRAD" | "TRADITIONAL" => Ok(Approach::Traditional),
            "BCC" | "BUFFERED" => Ok(Approach::Buffered),
            "NSC" | "NONSPARSENESSCORRECTION" => Ok(Approach::NonSparsenessCorrection),
            "BNSC" | "BUFFEREDNONSPARSENESSCORRECTION" => {
                Ok(Approach::BufferedNonSparsenessCorrection)
            }
            _ => Err(CsfdError::InvalidParameter {
                name: "approach",
                value: s.to_string(),
                reason: "expected one of TRAD, BCC, NSC, BNSC".to_string(),
            }),
        }
    }
}

impl TryFrom<String> for Approach {
    type Error = CsfdError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Approach> for String {
    fn from(value: Approach) -> Self {
        value.tag().to_string()
    }
}

/// How the crater work lists are distributed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum WorkerMode {
    SingleCore,
    /// `workers = None` uses available parallelism minus one (at least one).
    MultiCore { workers: Option<usize> },
}

impl Default for WorkerMode {
    fn default() -> Self {
        WorkerMode::MultiCore { workers: None }
    }
}

impl WorkerMode {
    /// Number of workers to spawn for `items` work units.
    pub fn resolve(self, items: usize) -> usize {
        let wanted = match self {
            WorkerMode::SingleCore => 1,
            WorkerMode::MultiCore { workers: Some(n) } => n,
            WorkerMode::MultiCore { workers: None } => std::thread::available_parallelism()
                .map(|n| n.get().saturating_sub(1))
                .unwrap_or(1),
        };
        wanted.max(1).min(items.max(1))
    }
}

/// Longitude shift applied to regions that straddle the antimeridian.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AntimeridianHeuristic {
    pub enabled: bool,
    /// Longitude of the two synthetic probe meridians (at `-probe` and `+probe`).
    pub probe_lon: f64,
    /// Amount added to the centre longitude when the heuristic fires.
    pub shift_deg: f64,
    /// The shift is applied only while the naive centre lies within `±window_deg`.
    pub window_deg: f64,
}

impl Default for AntimeridianHeuristic {
    fn default() -> Self {
        Self {
            enabled: true,
            probe_lon: 179.0,
            shift_deg: 100.0,
            window_deg: 80.0,
        }
    }
}

/// Numeric constants of the geometry engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    /// Angular step of the rounded-corner fan, degrees.
    pub fan_step_deg: f64,
    /// Planar distance (local degrees) under which a crater counts as inside.
    pub boundary_epsilon: f64,
    /// Maximum vertex spacing of region outlines before buffering, degrees.
    pub densify_step_deg: f64,
    /// Half width of the strips cutting holes open, degrees.
    pub cut_epsilon_deg: f64,
    /// Vertex count of an ejecta polygon around a crater centroid.
    pub ejecta_vertices: usize,
    pub vincenty_tolerance: f64,
    pub vincenty_max_iterations: usize,
    /// Recursion bound of the self-intersection repair.
    pub max_repair_depth: usize,
    /// Projection centres are rounded to multiples of this, degrees.
    pub center_rounding_deg: f64,
    /// Projection centre latitudes are clamped to `±max_center_lat`.
    pub max_center_lat: f64,
    pub antimeridian: AntimeridianHeuristic,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            fan_step_deg: 8.0,
            boundary_epsilon: 0.001,
            densify_step_deg: 1.0,
            cut_epsilon_deg: 1e-6,
            ejecta_vertices: 180,
            vincenty_tolerance: 1e-12,
            vincenty_max_iterations: 200,
            max_repair_depth: 4,
            center_rounding_deg: 0.1,
            max_center_lat: 89.9,
            antimeridian: AntimeridianHeuristic::default(),
        }
    }
}

impl Tuning {
    pub fn validate(&self) -> Result<()> {
        positive("tuning.fan_step_deg", self.fan_step_deg)?;
        positive("tuning.boundary_epsilon", self.boundary_epsilon)?;
        positive("tuning.densify_step_deg", self.densify_step_deg)?;
        positive("tuning.cut_epsilon_deg", self.cut_epsilon_deg)?;
        positive("tuning.vincenty_tolerance", self.vincenty_tolerance)?;
        positive("tuning.center_rounding_deg", self.center_rounding_deg)?;
        if self.fan_step_deg >= 180.0 {
            return Err(invalid("tuning.fan_step_deg", self.fan_step_deg, "must be below 180"));
        }
        if self.ejecta_vertices < 3 {
            return Err(invalid(
                "tuning.ejecta_vertices",
                self.ejecta_vertices,
                "an ejecta polygon needs at least 3 vertices",
            ));
        }
        if self.vincenty_max_iterations == 0 {
            return Err(invalid("tuning.vincenty_max_iterations", 0, "must be at least 1"));
        }
        if !(0.0..90.0).contains(&self.max_center_lat) {
            return Err(invalid(
                "tuning.max_center_lat",
                self.max_center_lat,
                "must lie in [0, 90)",
            ));
        }
        Ok(())
    }
}

/// Everything a measurement run needs besides the geometry itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurementConfig {
    pub approach: Approach,
    pub buffer_factor: f64,
    pub obliteration_factor: f64,
    pub selected_regions: Vec<String>,
    pub workers: WorkerMode,
    /// Attach the per-crater modified polygons to the report.
    pub export_geometry: bool,
    pub tuning: Tuning,
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        Self {
            approach: Approach::Traditional,
            buffer_factor: 1.0,
            obliteration_factor: 1.0,
            selected_regions: Vec::new(),
            workers: WorkerMode::default(),
            export_geometry: false,
            tuning: Tuning::default(),
        }
    }
}

impl MeasurementConfig {
    pub fn new<I, S>(approach: Approach, regions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            approach,
            selected_regions: regions.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_buffer_factor(mut self, factor: f64) -> Self {
        self.buffer_factor = factor;
        self
    }

    pub fn with_obliteration_factor(mut self, factor: f64) -> Self {
        self.obliteration_factor = factor;
        self
    }

    pub fn with_workers(mut self, workers: WorkerMode) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_export_geometry(mut self, export: bool) -> Self {
        self.export_geometry = export;
        self
    }

    pub fn with_tuning(mut self, tuning: Tuning) -> Self {
        self.tuning = tuning;
        self
    }

    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: MeasurementConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Checks factor ranges, region selection, worker count and tuning.
    pub fn validate(&self) -> Result<()> {
        factor("buffer_factor", self.buffer_factor)?;
        factor("obliteration_factor", self.obliteration_factor)?;
        if self.selected_regions.is_empty() {
            return Err(CsfdError::NoRegionsSelected);
        }
        if let WorkerMode::MultiCore { workers: Some(0) } = self.workers {
            return Err(invalid("workers", 0, "at least one worker is required"));
        }
        self.tuning.validate()
    }
}

fn factor(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && (MIN_FACTOR..=MAX_FACTOR).contains(&value) {
        Ok(())
    } else {
        Err(invalid(name, value, "must lie in [1, 4]"))
    }
}

fn positive(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(name, value, "must be positive and finite"))
    }
}

fn invalid(name: &'static str, value: impl ToString, reason: &str) -> CsfdError {
    CsfdError::InvalidParameter {
        name,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approach_parses_legacy_tags() {
        assert_eq!("trad".parse::<Approach>().unwrap(), Approach::Traditional);
        assert_eq!("BCC".parse::<Approach>().unwrap(), Approach::Buffered);
        assert_eq!(" nsc ".parse::<Approach>().unwrap(), Approach::NonSparsenessCorrection);
        assert_eq!(
            "Bnsc".parse::<Approach>().unwrap(),
            Approach::BufferedNonSparsenessCorrection
        );
        assert!("SCC".parse::<Approach>().is_err());
    }

    #[test]
    fn config_from_json_fills_defaults() {
        let config = MeasurementConfig::from_json(
            r#"{"approach": "BNSC", "buffer_factor": 2.0, "selected_regions": ["Unit A"]}"#,
        )
        .unwrap();
        assert_eq!(config.approach, Approach::BufferedNonSparsenessCorrection);
        assert_eq!(config.buffer_factor, 2.0);
        assert_eq!(config.obliteration_factor, 1.0);
        assert_eq!(config.tuning.fan_step_deg, 8.0);
        assert_eq!(config.workers, WorkerMode::MultiCore { workers: None });
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = MeasurementConfig::new(Approach::Buffered, ["a", "b"])
            .with_buffer_factor(1.5)
            .with_workers(WorkerMode::SingleCore);
        let json = config.to_json().unwrap();
        assert!(json.contains("\"BCC\""));
        assert_eq!(MeasurementConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn factors_outside_range_are_rejected() {
        let config = MeasurementConfig::new(Approach::Buffered, ["a"]).with_buffer_factor(4.5);
        assert!(matches!(
            config.validate(),
            Err(CsfdError::InvalidParameter { name: "buffer_factor", .. })
        ));
        let config = MeasurementConfig::new(Approach::Buffered, ["a"]).with_obliteration_factor(0.5);
        assert!(config.validate().is_err());
        let config = MeasurementConfig::new(Approach::Buffered, Vec::<String>::new());
        assert_eq!(config.validate(), Err(CsfdError::NoRegionsSelected));
    }

    #[test]
    fn worker_mode_is_capped_by_items() {
        assert_eq!(WorkerMode::SingleCore.resolve(100), 1);
        assert_eq!(WorkerMode::MultiCore { workers: Some(8) }.resolve(3), 3);
        assert_eq!(WorkerMode::MultiCore { workers: Some(8) }.resolve(0), 1);
        assert!(WorkerMode::MultiCore { workers: None }.resolve(1000) >= 1);
    }
}
