//! Duplicate resolution across overlapping regions and per-crater area
//! fractions.

use std::collections::HashMap;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::crater::{sort_by_diameter_desc, ClassifiedCrater};
use crate::error::{CsfdError, MeasurementIssue, Severity};

/// Measured area for one crater before aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CraterAreaRecord {
    pub crater_id: u64,
    pub diameter_km: f64,
    pub lon: f64,
    pub lat: f64,
    pub ejecta_diameter_km: f64,
    pub area_km2: f64,
}

/// One counted crater of a BCC, NSC or BNSC run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CraterFraction {
    pub crater_id: u64,
    pub diameter_km: f64,
    pub fraction: f64,
    pub lon: f64,
    pub lat: f64,
    pub ejecta_diameter_km: f64,
    pub buffer_area_km2: f64,
}

/// One counted crater of a traditional run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TraditionalRecord {
    pub crater_id: u64,
    pub diameter_km: f64,
    pub fraction: f64,
    pub lon: f64,
    pub lat: f64,
    pub topo_scale_factor: f64,
}

impl From<&ClassifiedCrater> for TraditionalRecord {
    fn from(c: &ClassifiedCrater) -> Self {
        Self {
            crater_id: c.crater.id,
            diameter_km: c.crater.diameter_km,
            fraction: 1.0,
            lon: c.crater.lon,
            lat: c.crater.lat,
            topo_scale_factor: 1.0,
        }
    }
}

/// Keeps the entry with the smallest distance for every crater id and
/// returns them largest first.
pub fn resolve_duplicates<I>(classified: I) -> Vec<ClassifiedCrater>
where
    I: IntoIterator<Item = ClassifiedCrater>,
{
    let mut best: HashMap<u64, ClassifiedCrater> = HashMap::new();
    for c in classified {
        best.entry(c.crater.id)
            .and_modify(|kept| {
                if c.distance < kept.distance {
                    *kept = c;
                }
            })
            .or_insert(c);
    }
    let mut out: Vec<ClassifiedCrater> = best.into_values().collect();
    sort_by_diameter_desc(&mut out);
    out
}

/// Sums measured areas per crater id and derives fractions of the total
/// reference area.
#[derive(Debug, Clone, Copy)]
pub struct FractionAggregator {
    total_area_km2: f64,
}

impl FractionAggregator {
    pub fn new(total_area_km2: f64) -> Self {
        Self { total_area_km2 }
    }

    /// Fractions in descending diameter order. Craters whose summed area is
    /// zero are reported instead of divided by.
    pub fn aggregate(&self, records: &[CraterAreaRecord]) -> (Vec<CraterFraction>, Vec<MeasurementIssue>) {
        let mut fractions = Vec::new();
        let mut issues = Vec::new();

        let sorted = records.iter().sorted_by(|a, b| {
            b.diameter_km
                .total_cmp(&a.diameter_km)
                .then(a.crater_id.cmp(&b.crater_id))
        });
        for (crater_id, group) in &sorted.chunk_by(|r| r.crater_id) {
            let group: Vec<&CraterAreaRecord> = group.collect();
            let summed: f64 = group.iter().map(|r| r.area_km2).sum();
            let first = group[0];
            if summed <= 0.0 || !summed.is_finite() {
                let error = CsfdError::ZeroAggregatedArea { crater_id };
                warn!(crater_id, "aggregated buffer area is zero");
                issues.push(MeasurementIssue::new(format!("crater {crater_id}"), Severity::Error, &error));
                continue;
            }
            fractions.push(CraterFraction {
                crater_id,
                diameter_km: first.diameter_km,
                fraction: self.total_area_km2 / summed,
                lon: first.lon,
                lat: first.lat,
                ejecta_diameter_km: first.ejecta_diameter_km,
                buffer_area_km2: summed,
            });
        }
        (fractions, issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crater::Crater;
    use approx::assert_relative_eq;

    fn record(id: u64, diameter: f64, area: f64) -> CraterAreaRecord {
        CraterAreaRecord {
            crater_id: id,
            diameter_km: diameter,
            lon: 1.0,
            lat: 2.0,
            ejecta_diameter_km: diameter * 2.0,
            area_km2: area,
        }
    }

    #[test]
    fn duplicates_keep_minimum_distance() {
        let c = Crater::new(7, 3.0, 0.0, 0.0);
        let other = Crater::new(8, 9.0, 0.0, 0.0);
        let out = resolve_duplicates([
            ClassifiedCrater::within_range(c, 1200.0),
            ClassifiedCrater::within_range(other, 50.0),
            ClassifiedCrater::within_range(c, 800.0),
        ]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].crater.id, 8);
        assert_eq!(out[1].distance, 800.0);

        let out = resolve_duplicates([ClassifiedCrater::within_range(c, 800.0), ClassifiedCrater::inside(c)]);
        assert!(out[0].is_inside());
    }

    #[test]
    fn fractions_sum_by_id() {
        let aggregator = FractionAggregator::new(100.0);
        let (fractions, issues) = aggregator.aggregate(&[
            record(1, 2.0, 60.0),
            record(2, 5.0, 110.0),
            record(1, 2.0, 65.0),
        ]);
        assert!(issues.is_empty());
        assert_eq!(fractions.len(), 2);
        assert_eq!(fractions[0].crater_id, 2);
        assert_relative_eq!(fractions[1].buffer_area_km2, 125.0);
        assert_relative_eq!(fractions[1].fraction, 0.8);
        for f in &fractions {
            assert_relative_eq!(f.fraction * f.buffer_area_km2, 100.0, max_relative = 1e-12);
        }
    }

    #[test]
    fn zero_area_is_reported_not_divided() {
        let (fractions, issues) = FractionAggregator::new(100.0).aggregate(&[record(4, 1.0, 0.0), record(5, 1.0, 10.0)]);
        assert_eq!(fractions.len(), 1);
        assert_eq!(fractions[0].crater_id, 5);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].feature, "crater 4");
        assert!(fractions.iter().all(|f| f.fraction.is_finite()));
    }

    #[test]
    fn traditional_record_has_unit_factors() {
        let rec = TraditionalRecord::from(&ClassifiedCrater::inside(Crater::new(3, 4.5, 10.0, -3.0)));
        assert_eq!(rec.fraction, 1.0);
        assert_eq!(rec.topo_scale_factor, 1.0);
        assert_eq!(rec.diameter_km, 4.5);
    }
}
