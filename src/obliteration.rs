//! Detection of craters that sit on a larger crater's ejecta blanket.

use std::collections::BTreeSet;

use tracing::{debug, info_span};

use crate::config::{Approach, MeasurementConfig};
use crate::crater::{ClassifiedCrater, Crater, ObliterationTag};
use crate::error::{CsfdError, Result};
use crate::geodesic::GeodesicSolver;
use crate::partition::WorkerPool;

#[derive(Debug, Clone, Copy)]
pub struct ObliterationResolver {
    solver: GeodesicSolver,
    approach: Approach,
    buffer_factor: f64,
    obliteration_factor: f64,
}

impl ObliterationResolver {
    pub fn new(solver: GeodesicSolver, config: &MeasurementConfig) -> Self {
        Self {
            solver,
            approach: config.approach,
            buffer_factor: config.buffer_factor,
            obliteration_factor: config.obliteration_factor,
        }
    }

    /// Centroid distance below which `smaller` counts as obliterated by
    /// `larger`. `None` for approaches without sparseness correction.
    pub fn threshold(&self, larger: &Crater, smaller: &Crater) -> Option<f64> {
        match self.approach {
            Approach::Traditional | Approach::Buffered => None,
            Approach::NonSparsenessCorrection => Some(larger.radius_m() * self.obliteration_factor),
            Approach::BufferedNonSparsenessCorrection => {
                Some(larger.radius_m() * self.obliteration_factor - smaller.radius_m() * self.buffer_factor)
            }
        }
    }

    /// Ids of the craters in `craters` that a strictly larger one obliterates.
    pub fn obliterated(&self, craters: &[ClassifiedCrater], pool: &WorkerPool) -> Result<BTreeSet<u64>> {
        if !self.approach.corrects_sparseness() || craters.len() < 2 {
            return Ok(BTreeSet::new());
        }
        let _span = info_span!("obliteration", craters = craters.len()).entered();

        let hits = pool.map((0..craters.len()).collect(), |i| self.scan(craters, i))?;
        let obliterated: BTreeSet<u64> = hits.into_iter().flatten().collect();
        debug!(obliterated = obliterated.len(), "obliteration scan finished");
        Ok(obliterated)
    }

    fn scan(&self, craters: &[ClassifiedCrater], index: usize) -> Result<Vec<u64>> {
        let larger = &craters[index].crater;
        let mut hits = Vec::new();
        for other in craters {
            let smaller = &other.crater;
            if smaller.diameter_km >= larger.diameter_km {
                continue;
            }
            let Some(threshold) = self.threshold(larger, smaller) else {
                continue;
            };
            if threshold <= 0.0 {
                continue;
            }
            match self
                .solver
                .distance(larger.lat, larger.lon, smaller.lat, smaller.lon)
            {
                Ok(d) if d < threshold => hits.push(smaller.id),
                Ok(_) => {}
                // only near-antipodal pairs fail to converge
                Err(CsfdError::NonConvergence { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(hits)
    }
}

/// Marks every crater whose id is in `obliterated`.
pub fn apply_tags(craters: &mut [ClassifiedCrater], obliterated: &BTreeSet<u64>) {
    for c in craters.iter_mut() {
        if obliterated.contains(&c.crater.id) {
            c.tag = ObliterationTag::Obliterates;
        }
    }
}
