//! Classical hazard-curve engine.
//!
//! Walks sources, then ruptures, then sites, and folds every rupture's
//! exceedance probabilities into a [`ProbabilityMap`]. The engine holds no
//! shared mutable state: it can be run on any subset of sources and the
//! partial maps merged afterwards.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::json;

use crate::error::{Error, Result};
use crate::gsim::GsimSet;
use crate::imt::Imtls;
use crate::logging::{self, log_abort, log_hazard_done, log_source_skipped, ProfileScope};
use crate::numeric::interp;
use crate::probability::{exceedance_probabilities, ProbabilityMap};
use crate::rupture::Rupture;
use crate::site::SiteCollection;
use crate::source::{check_sources, Source};

// =============================================================================
// Source/site filtering
// =============================================================================

/// Distance-based pruning applied first per source, then per rupture.
pub trait SiteFilter: Send + Sync {
    fn filter_source(&self, source: &Source, sites: &SiteCollection) -> SiteCollection;
    fn filter_rupture(&self, rupture: &Rupture, sites: &SiteCollection) -> SiteCollection;
}

/// Keeps every site.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFilter;

impl SiteFilter for NoFilter {
    fn filter_source(&self, _source: &Source, sites: &SiteCollection) -> SiteCollection {
        sites.clone()
    }

    fn filter_rupture(&self, _rupture: &Rupture, sites: &SiteCollection) -> SiteCollection {
        sites.clone()
    }
}

/// Integration distance in km, per tectonic region type with a fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct MaximumDistance {
    default: f64,
    by_trt: BTreeMap<String, f64>,
}

impl MaximumDistance {
    pub fn new(default: f64) -> Self {
        Self { default, by_trt: BTreeMap::new() }
    }

    pub fn with_trt(mut self, trt: &str, distance: f64) -> Self {
        self.by_trt.insert(trt.to_string(), distance);
        self
    }

    pub fn from_map(default: f64, by_trt: &BTreeMap<String, f64>) -> Self {
        Self { default, by_trt: by_trt.clone() }
    }

    pub fn get(&self, trt: &str) -> f64 {
        self.by_trt.get(trt).copied().unwrap_or(self.default)
    }
}

impl SiteFilter for MaximumDistance {
    fn filter_source(&self, source: &Source, sites: &SiteCollection) -> SiteCollection {
        let max = self.get(source.trt());
        sites.filter(|s| source.min_distance(&s.location) <= max)
    }

    fn filter_rupture(&self, rupture: &Rupture, sites: &SiteCollection) -> SiteCollection {
        let max = self.get(&rupture.trt);
        sites.filter(|s| rupture.surface.rjb(&s.location) <= max)
    }
}

// =============================================================================
// Hazard curves
// =============================================================================

/// Immutable inputs shared by every unit of hazard work.
#[derive(Clone, Copy)]
pub struct HazardSetup<'a> {
    pub imtls: &'a Imtls,
    /// One output column per set.
    pub gsims: &'a [GsimSet],
    /// None means untruncated.
    pub truncation_level: Option<f64>,
    pub time_span: f64,
    pub filter: &'a dyn SiteFilter,
}

impl HazardSetup<'_> {
    /// Configuration checks done before any rupture is generated.
    pub fn validate(&self) -> Result<()> {
        if self.imtls.is_empty() {
            return Err(Error::config("intensity_measure_types_and_levels", "no IMTs requested"));
        }
        if self.gsims.is_empty() {
            return Err(Error::config("gsims", "at least one ground-motion model set is required"));
        }
        if let Some(t) = self.truncation_level {
            if !(t >= 0.0) {
                return Err(Error::config("truncation_level", "must be non-negative"));
            }
        }
        if !(self.time_span > 0.0) {
            return Err(Error::config("investigation_time", "must be positive"));
        }
        for set in self.gsims {
            set.check_imts(self.imtls)?;
        }
        Ok(())
    }
}

fn aborted(abort: Option<&AtomicBool>) -> bool {
    abort.map(|a| a.load(Ordering::Relaxed)).unwrap_or(false)
}

/// Folds one rupture into `pmap` for the given sites.
fn add_rupture(
    pmap: &mut ProbabilityMap,
    rupture: &Rupture,
    sites: &SiteCollection,
    setup: &HazardSetup<'_>,
) -> Result<()> {
    let p_occ = rupture.probability_of_occurrence(setup.time_span);
    if p_occ <= 0.0 {
        return Ok(());
    }
    let rctx = rupture.context();
    for site in sites {
        let dctx = rupture.distances(&site.location);
        for (g, set) in setup.gsims.iter().enumerate() {
            let model = set.get(&rupture.trt)?;
            let mut offset = 0;
            for (imt, levels) in setup.imtls.iter() {
                let (mean, stddev) = model.mean_and_stddev(&rctx, &dctx, site, imt)?;
                let poes: Vec<f64> = exceedance_probabilities(mean, stddev, levels, setup.truncation_level)
                    .into_iter()
                    .map(|p| p * p_occ)
                    .collect();
                pmap.setdefault(site.id).combine_poes(g, offset, &poes);
                offset += levels.len();
            }
        }
    }
    Ok(())
}

/// Hazard curves for `sites` from `sources`.
///
/// Every source is checked up front, in range of a site or not. A source or
/// rupture with no site in range contributes nothing. A model
/// that cannot serve a requested IMT fails the whole calculation. The abort
/// flag is polled between ruptures.
pub fn hazard_curves(
    sources: &[Source],
    sites: &SiteCollection,
    setup: &HazardSetup<'_>,
    abort: Option<&AtomicBool>,
) -> Result<ProbabilityMap> {
    setup.validate()?;
    check_sources(sources)?;
    let _prof = ProfileScope::with_context("hazard_curves", &[("sources", json!(sources.len()))]);
    let mut pmap = ProbabilityMap::new(setup.imtls.num_levels(), setup.gsims.len());
    let mut num_ruptures = 0u64;

    for source in sources {
        let source_sites = setup.filter.filter_source(source, sites);
        if source_sites.is_empty() {
            log_source_skipped(source.id(), "no sites within maximum distance");
            continue;
        }
        for rupture in source.ruptures() {
            if aborted(abort) {
                log_abort("hazard_curves", num_ruptures);
                return Err(Error::Aborted);
            }
            num_ruptures += 1;
            let rupture_sites = setup.filter.filter_rupture(&rupture, &source_sites);
            if rupture_sites.is_empty() {
                continue;
            }
            add_rupture(&mut pmap, &rupture, &rupture_sites, setup)?;
        }
    }

    log_hazard_done(sources.len(), num_ruptures, sites.len());
    Ok(pmap)
}

// =============================================================================
// Realizations
// =============================================================================

/// Transformation applied to every source before rupture generation.
pub type UncertaintyFn = Arc<dyn Fn(&Source) -> Source + Send + Sync>;

/// One logic-tree path: its weight, its model set and the source
/// uncertainty it applies.
#[derive(Clone)]
pub struct Realization {
    pub weight: f64,
    pub gsims: GsimSet,
    pub uncertainty: Option<UncertaintyFn>,
}

impl Realization {
    pub fn new(weight: f64, gsims: GsimSet) -> Self {
        Self { weight, gsims, uncertainty: None }
    }

    pub fn with_uncertainty(mut self, f: UncertaintyFn) -> Self {
        self.uncertainty = Some(f);
        self
    }

    pub fn apply(&self, sources: &[Source]) -> Vec<Source> {
        match &self.uncertainty {
            Some(f) => sources.iter().map(|s| f(s)).collect(),
            None => sources.to_vec(),
        }
    }
}

/// One single-column map per realization, in input order.
#[allow(clippy::too_many_arguments)]
pub fn realization_curves(
    sources: &[Source],
    sites: &SiteCollection,
    realizations: &[Realization],
    imtls: &Imtls,
    truncation_level: Option<f64>,
    time_span: f64,
    filter: &dyn SiteFilter,
    abort: Option<&AtomicBool>,
) -> Result<Vec<ProbabilityMap>> {
    let maps = realizations
        .iter()
        .map(|rlz| {
            let gsims = std::slice::from_ref(&rlz.gsims);
            let setup = HazardSetup { imtls, gsims, truncation_level, time_span, filter };
            hazard_curves(&rlz.apply(sources), sites, &setup, abort)
        })
        .collect::<Result<Vec<_>>>()?;
    log_realizations(maps.len());
    Ok(maps)
}

// =============================================================================
// Hazard maps
// =============================================================================

/// Intensity level at which the curve reaches `poe`, interpolated linearly
/// in level space against the decreasing poes. Values outside the curve
/// clamp to the extreme levels; a curve with no positive poe yields 0.
pub fn interpolate_iml(levels: &[f64], poes: &[f64], poe: f64) -> f64 {
    if !poes.iter().any(|p| *p > 0.0) {
        return 0.0;
    }
    let xs: Vec<f64> = poes.iter().rev().copied().collect();
    let ys: Vec<f64> = levels.iter().rev().copied().collect();
    interp(poe, &xs, &ys)
}

/// Hazard map values of one IMT: one interpolated level per site and poe.
pub fn hazard_map(
    pmap: &ProbabilityMap,
    imtls: &Imtls,
    imt: &crate::imt::Imt,
    site_ids: &[usize],
    gsim: usize,
    poes: &[f64],
) -> Result<Vec<Vec<f64>>> {
    let levels = imtls
        .levels(imt)
        .ok_or_else(|| Error::config("intensity_measure_types_and_levels", format!("IMT {} not computed", imt)))?;
    site_ids
        .iter()
        .map(|sid| {
            let curve = pmap.imt_poes(imtls, imt, *sid, gsim)?;
            Ok(poes.iter().map(|p| interpolate_iml(levels, &curve, *p)).collect())
        })
        .collect()
}

fn log_realizations(n: usize) {
    logging::log(
        logging::Level::Info,
        logging::Domain::Hazard,
        "realizations_done",
        logging::obj(&[("realizations", json!(n))]),
    );
}
