//! One measurement run: ingestion, classification, the approach-specific
//! area modification, and aggregation.
//!
//! Everything a run needs is held by an immutable [`MeasurementContext`].
//! Workers only ever see shared references to it, and the sequential
//! NSC/BNSC subtraction chain runs on the calling thread.

use geo::{BooleanOps, MultiPolygon, Polygon};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn};

use crate::aggregate::{
    resolve_duplicates, CraterAreaRecord, CraterFraction, FractionAggregator, TraditionalRecord,
};
use crate::buffer::BufferEngine;
use crate::classify::CraterClassifier;
use crate::config::{Approach, MeasurementConfig};
use crate::crater::{ClassifiedCrater, Crater, CraterCatalog};
use crate::error::{CsfdError, MeasurementIssue, Result, Severity};
use crate::geodesic::GeodesicSolver;
use crate::geometry::{densify_polygon, polygon_to_rings, union_all, CraterFootprint, Region};
use crate::obliteration::{apply_tags, ObliterationResolver};
use crate::partition::{interleave_by_diameter, WorkerPool};
use crate::projection::{EqualAreaProjection, LocalFrame, LocalProjectionPlanner};
use crate::region::{PreparedRegion, RegionSummary};
use crate::report::{CraterOutput, ExportedGeometry, ExportedPolygon, MeasurementReport};
use crate::spheroid::{SpatialReference, Spheroid};

/// Plain records delivered by the geometry provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub region_reference: SpatialReference,
    pub crater_reference: SpatialReference,
    pub regions: Vec<Region>,
    pub craters: Vec<CraterFootprint>,
}

impl Dataset {
    /// Regions and craters sharing one geographic reference.
    pub fn new(reference: SpatialReference, regions: Vec<Region>, craters: Vec<CraterFootprint>) -> Self {
        Self {
            region_reference: reference.clone(),
            crater_reference: reference,
            regions,
            craters,
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Result of measuring a single crater in a parallel step.
enum Outcome {
    Measured(CraterAreaRecord, Option<ExportedGeometry>),
    Skipped(MeasurementIssue),
}

/// Records, exported geometry and issues of an area-modification pass.
#[derive(Default)]
struct AreaPass {
    records: Vec<CraterAreaRecord>,
    geometry: Vec<ExportedGeometry>,
    issues: Vec<MeasurementIssue>,
}

impl AreaPass {
    fn absorb(&mut self, outcomes: Vec<Outcome>) {
        for outcome in outcomes {
            match outcome {
                Outcome::Measured(record, geometry) => {
                    self.records.push(record);
                    self.geometry.extend(geometry);
                }
                Outcome::Skipped(issue) => self.issues.push(issue),
            }
        }
    }

    fn sort(&mut self) {
        self.records.sort_by(|a, b| {
            b.diameter_km
                .total_cmp(&a.diameter_km)
                .then(a.crater_id.cmp(&b.crater_id))
        });
    }
}

/// Immutable state of a measurement run.
#[derive(Debug, Clone)]
pub struct MeasurementContext {
    config: MeasurementConfig,
    spheroid: Spheroid,
    solver: GeodesicSolver,
    projection: EqualAreaProjection,
    regions: Vec<PreparedRegion>,
    craters: Vec<Crater>,
    working_frame: LocalFrame,
    /// Union of the selected regions in `working_frame` coordinates.
    working_area: MultiPolygon<f64>,
    ingestion_issues: Vec<MeasurementIssue>,
}

impl MeasurementContext {
    /// Validates the configuration and ingests the dataset.
    ///
    /// # Errors
    ///
    /// Configuration, reference and region-selection problems, and duplicate
    /// crater ids, all before any measurement starts.
    pub fn new(config: MeasurementConfig, dataset: &Dataset) -> Result<Self> {
        config.validate()?;
        dataset.region_reference.ensure_matches(&dataset.crater_reference)?;
        let spheroid = Spheroid::from_reference(&dataset.region_reference)?;
        let solver = GeodesicSolver::new(spheroid, &config.tuning);
        let projection = EqualAreaProjection::new(spheroid);
        let mut ingestion_issues = Vec::new();

        let mut regions = Vec::new();
        let mut geographic = Vec::new();
        for selected in dedup_selection(&config.selected_regions) {
            let matching: Vec<&Region> = dataset.regions.iter().filter(|r| &r.id == selected).collect();
            if matching.is_empty() {
                return Err(CsfdError::UnknownRegion(selected.clone()));
            }
            for region in matching {
                match PreparedRegion::prepare(region, &projection, &config.tuning) {
                    Ok(prepared) => {
                        geographic.push(prepared.geographic.clone());
                        regions.push(prepared);
                    }
                    Err(e) if e.is_recoverable() => {
                        warn!(region = %region.id, error = %e, "skipping region");
                        ingestion_issues.push(MeasurementIssue::new(
                            format!("region '{}'", region.id),
                            Severity::Warning,
                            &e,
                        ));
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        if regions.is_empty() {
            return Err(CsfdError::NoRegionsSelected);
        }

        let working_frame = LocalProjectionPlanner::new(&config.tuning).plan(&MultiPolygon::new(geographic))?;
        let working_area = union_all(regions.iter().map(|r| {
            let local = densify_polygon(
                &working_frame.polygon_to_local(&r.geographic),
                config.tuning.densify_step_deg,
            );
            MultiPolygon::new(vec![local])
        }));

        let catalog = CraterCatalog::ingest(&dataset.craters, &spheroid, &config.tuning)?;
        ingestion_issues.extend(catalog.issues);

        info!(
            approach = %config.approach,
            regions = regions.len(),
            craters = catalog.craters.len(),
            "measurement context ready"
        );
        Ok(Self {
            config,
            spheroid,
            solver,
            projection,
            regions,
            craters: catalog.craters,
            working_frame,
            working_area,
            ingestion_issues,
        })
    }

    pub fn config(&self) -> &MeasurementConfig {
        &self.config
    }

    pub fn spheroid(&self) -> &Spheroid {
        &self.spheroid
    }

    pub fn craters(&self) -> &[Crater] {
        &self.craters
    }

    pub fn regions(&self) -> &[PreparedRegion] {
        &self.regions
    }

    pub fn working_frame(&self) -> &LocalFrame {
        &self.working_frame
    }

    /// Sum of the selected regions' equal-area sizes.
    pub fn total_area_km2(&self) -> f64 {
        self.regions.iter().map(|r| r.area_km2).sum()
    }

    fn buffer_engine(&self) -> BufferEngine {
        BufferEngine::new(self.solver, self.config.tuning)
    }

    fn area_km2(&self, local: &MultiPolygon<f64>) -> f64 {
        self.projection.area_km2(local, self.config.tuning.densify_step_deg)
    }

    /// Runs the configured approach.
    pub fn measure(&self) -> Result<MeasurementReport> {
        let pool = WorkerPool::new(self.config.workers, self.craters.len())?;
        let (relevant, summaries) = self.classify(&pool)?;
        let total_area_km2 = self.total_area_km2();
        let mut issues = self.ingestion_issues.clone();

        let (output, obliterated, geometry) = match self.config.approach {
            Approach::Traditional => {
                let records = relevant
                    .iter()
                    .filter(|c| c.is_inside())
                    .map(TraditionalRecord::from)
                    .collect();
                (CraterOutput::Traditional(records), Vec::new(), Vec::new())
            }
            Approach::Buffered => {
                let pass = self.buffered_counting(&pool, &relevant)?;
                let fractions = aggregate(&pass.records, total_area_km2, &mut issues, pass.issues);
                (CraterOutput::Fractions(fractions), Vec::new(), pass.geometry)
            }
            Approach::NonSparsenessCorrection | Approach::BufferedNonSparsenessCorrection => {
                let mut craters = relevant;
                let resolver = ObliterationResolver::new(self.solver, &self.config);
                let obliterated = resolver.obliterated(&craters, &pool)?;
                apply_tags(&mut craters, &obliterated);
                let pass = self.sparseness_correction(&pool, &craters)?;
                let fractions = aggregate(&pass.records, total_area_km2, &mut issues, pass.issues);
                (
                    CraterOutput::Fractions(fractions),
                    obliterated.into_iter().collect(),
                    pass.geometry,
                )
            }
        };

        info!(
            counted = output.len(),
            obliterated = obliterated.len(),
            issues = issues.len(),
            total_area_km2,
            "measurement finished"
        );
        Ok(MeasurementReport {
            approach: self.config.approach,
            spheroid: self.spheroid,
            total_area_km2,
            regions: summaries,
            output,
            obliterated,
            issues,
            geometry: if self.config.export_geometry { geometry } else { Vec::new() },
        })
    }

    /// Relevant craters of all selected regions, duplicates resolved and
    /// sorted largest first, plus the per-region counts.
    pub fn classify(&self, pool: &WorkerPool) -> Result<(Vec<ClassifiedCrater>, Vec<RegionSummary>)> {
        let _span = info_span!("classify", regions = self.regions.len()).entered();
        let classifier = CraterClassifier::new(self.solver, &self.config);

        let mut all = Vec::new();
        let mut summaries = Vec::with_capacity(self.regions.len());
        for region in &self.regions {
            let found: Vec<ClassifiedCrater> = pool
                .map(self.craters.clone(), |crater| match classifier.classify(region, &crater) {
                    Ok(c) => Ok(c),
                    // only craters near the region's antipode fail to converge
                    Err(CsfdError::NonConvergence { .. }) => Ok(None),
                    Err(e) => Err(e),
                })?
                .into_iter()
                .flatten()
                .collect();
            let inside = found.iter().filter(|c| c.is_inside()).count();
            debug!(region = %region.id, inside, in_range = found.len() - inside, "classified region");
            summaries.push(RegionSummary {
                id: region.id.clone(),
                name: region.name.clone(),
                area_km2: region.area_km2,
                craters_inside: inside,
                craters_in_range: found.len() - inside,
            });
            all.extend(found);
        }
        let relevant = resolve_duplicates(all);
        info!(relevant = relevant.len(), "classification finished");
        Ok((relevant, summaries))
    }

    /// BCC: the whole working area grown by each crater's buffer distance.
    fn buffered_counting(&self, pool: &WorkerPool, craters: &[ClassifiedCrater]) -> Result<AreaPass> {
        let _span = info_span!("bcc", craters = craters.len()).entered();
        let engine = self.buffer_engine();
        let template = engine.template(&self.working_area, "working area")?;
        let factor = self.config.buffer_factor;

        let items = interleave_by_diameter(craters.to_vec(), |c| c.crater.diameter_km);
        let outcomes = pool.map(items, |c| {
            let crater = c.crater;
            let distance = crater.radius_m() * factor;
            let feature = format!("crater {}", crater.id);
            match engine.grow(&template, distance, &feature) {
                Ok(grown) => {
                    let area_km2 = self.area_km2(&grown);
                    debug!(crater = crater.id, distance, area_km2, "buffered working area");
                    Ok(Outcome::Measured(
                        area_record(&crater, crater.diameter_km * factor, area_km2),
                        self.export(&crater, &grown, area_km2, distance),
                    ))
                }
                Err(e) if e.is_recoverable() => {
                    warn!(crater = crater.id, error = %e, "crater dropped from buffered counting");
                    Ok(Outcome::Skipped(MeasurementIssue::new(feature, Severity::Error, &e)))
                }
                Err(e) => Err(e),
            }
        })?;

        let mut pass = AreaPass::default();
        pass.absorb(outcomes);
        pass.sort();
        Ok(pass)
    }

    /// NSC and BNSC: ejecta blankets of larger craters removed from the
    /// working area in descending diameter order.
    fn sparseness_correction(&self, pool: &WorkerPool, craters: &[ClassifiedCrater]) -> Result<AreaPass> {
        let engine = self.buffer_engine();
        let obliteration_factor = self.config.obliteration_factor;
        let ejecta: Vec<Polygon<f64>> = pool.map(craters.to_vec(), |c| {
            let center = self.working_frame.to_local(c.crater.centroid());
            engine.ejecta_polygon(center, c.crater.radius_m() * obliteration_factor)
        })?;

        let bnsc = self.config.approach == Approach::BufferedNonSparsenessCorrection;
        let mut pass = AreaPass::default();
        let mut snapshots: Vec<(Crater, MultiPolygon<f64>)> = Vec::new();
        {
            let _span = info_span!("nsc_chain", craters = craters.len()).entered();
            let mut remaining = self.working_area.clone();
            for (i, classified) in craters.iter().enumerate() {
                if i > 0 {
                    remaining = remaining.difference(&MultiPolygon::new(vec![ejecta[i - 1].clone()]));
                }
                if classified.is_obliterated() {
                    continue;
                }
                let crater = classified.crater;
                if bnsc {
                    snapshots.push((crater, remaining.clone()));
                } else if classified.is_inside() {
                    let area_km2 = self.area_km2(&remaining);
                    debug!(crater = crater.id, area_km2, "remaining working area");
                    pass.records.push(area_record(
                        &crater,
                        crater.diameter_km * obliteration_factor,
                        area_km2,
                    ));
                    pass.geometry.extend(self.export(&crater, &remaining, area_km2, 0.0));
                }
            }
        }
        if !bnsc {
            return Ok(pass);
        }

        let _span = info_span!("bnsc_grow", craters = snapshots.len()).entered();
        let buffer_factor = self.config.buffer_factor;
        let items = interleave_by_diameter(snapshots, |(c, _)| c.diameter_km);
        let outcomes = pool.map(items, |(crater, snapshot)| {
            let distance = crater.radius_m() * buffer_factor;
            let feature = format!("crater {}", crater.id);
            let grown = if snapshot.0.is_empty() {
                snapshot
            } else {
                engine.grow_area(&snapshot, distance, &feature)?
            };
            let area_km2 = self.area_km2(&grown);
            if area_km2 <= 0.0 {
                debug!(crater = crater.id, "working area fully obliterated");
                let e = CsfdError::ZeroAggregatedArea { crater_id: crater.id };
                return Ok(Outcome::Skipped(MeasurementIssue::new(feature, Severity::Warning, &e)));
            }
            Ok(Outcome::Measured(
                area_record(&crater, crater.diameter_km * obliteration_factor, area_km2),
                self.export(&crater, &grown, area_km2, distance),
            ))
        })?;
        pass.absorb(outcomes);
        pass.sort();
        Ok(pass)
    }

    fn export(
        &self,
        crater: &Crater,
        local: &MultiPolygon<f64>,
        area_km2: f64,
        buffer_distance_m: f64,
    ) -> Option<ExportedGeometry> {
        if !self.config.export_geometry {
            return None;
        }
        let geographic = self.working_frame.multipolygon_to_geographic(local);
        let polygons = geographic
            .iter()
            .map(|p| {
                let (outer, inners) = polygon_to_rings(p);
                ExportedPolygon { outer, inners }
            })
            .collect();
        Some(ExportedGeometry {
            crater_id: crater.id,
            area_km2,
            buffer_distance_m,
            polygons,
        })
    }
}

fn area_record(crater: &Crater, ejecta_diameter_km: f64, area_km2: f64) -> CraterAreaRecord {
    CraterAreaRecord {
        crater_id: crater.id,
        diameter_km: crater.diameter_km,
        lon: crater.lon,
        lat: crater.lat,
        ejecta_diameter_km,
        area_km2,
    }
}

fn aggregate(
    records: &[CraterAreaRecord],
    total_area_km2: f64,
    issues: &mut Vec<MeasurementIssue>,
    pass_issues: Vec<MeasurementIssue>,
) -> Vec<CraterFraction> {
    issues.extend(pass_issues);
    let (fractions, zero) = FractionAggregator::new(total_area_km2).aggregate(records);
    issues.extend(zero);
    fractions
}

fn dedup_selection(selected: &[String]) -> Vec<&String> {
    let mut out: Vec<&String> = Vec::with_capacity(selected.len());
    for id in selected {
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out
}

/// Builds the context and runs the configured approach.
pub fn measure(config: MeasurementConfig, dataset: &Dataset) -> Result<MeasurementReport> {
    MeasurementContext::new(config, dataset)?.measure()
}

/// Classified craters of a dataset without any area modification, largest
/// first. Useful to inspect what a run would count.
pub fn classify_only(config: MeasurementConfig, dataset: &Dataset) -> Result<Vec<ClassifiedCrater>> {
    let context = MeasurementContext::new(config, dataset)?;
    let pool = WorkerPool::new(context.config.workers, context.craters.len())?;
    let (relevant, _) = context.classify(&pool)?;
    Ok(relevant)
}
