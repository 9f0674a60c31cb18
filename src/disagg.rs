//! Disaggregation of a hazard level into magnitude, distance, location,
//! epsilon and tectonic-region bins.
//!
//! The ruptures contributing to the site are collected once, bin edges are
//! derived from their extent, then each rupture's exceedance is spread over
//! the cells it falls in. Cell masses are scaled so that the whole matrix
//! sums to the site's exceedance probability at the target level,
//! `1 - Π(1 - p_i)`, which is what the hazard engine reports for the same
//! rupture set.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{Error, Result};
use crate::gsim::GsimSet;
use crate::hazard::{interpolate_iml, SiteFilter};
use crate::imt::Imt;
use crate::logging::{log_abort, log_disagg_done, log_disagg_skip, ProfileScope};
use crate::numeric::{linspace, norm_cdf};
use crate::rupture::PoissonTom;
use crate::site::{Site, SiteCollection};
use crate::source::{check_sources, Source};

/// Largest per-rupture exceedance used when converting to rates.
const MAX_RUPTURE_POE: f64 = 1.0 - 1e-15;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisaggBins {
    pub mag_bin_width: f64,
    pub distance_bin_width: f64,
    pub coordinate_bin_width: f64,
    pub num_epsilon_bins: usize,
}

impl DisaggBins {
    pub fn validate(&self) -> Result<()> {
        if !(self.mag_bin_width > 0.0) {
            return Err(Error::config("mag_bin_width", "must be positive"));
        }
        if !(self.distance_bin_width > 0.0) {
            return Err(Error::config("distance_bin_width", "must be positive"));
        }
        if !(self.coordinate_bin_width > 0.0) {
            return Err(Error::config("coordinate_bin_width", "must be positive"));
        }
        if self.num_epsilon_bins == 0 {
            return Err(Error::config("num_epsilon_bins", "must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinEdges {
    pub mag: Vec<f64>,
    pub dist: Vec<f64>,
    pub lon: Vec<f64>,
    pub lat: Vec<f64>,
    pub eps: Vec<f64>,
    pub trts: Vec<String>,
}

impl BinEdges {
    pub fn shape(&self) -> [usize; 6] {
        [
            self.mag.len() - 1,
            self.dist.len() - 1,
            self.lon.len() - 1,
            self.lat.len() - 1,
            self.eps.len() - 1,
            self.trts.len(),
        ]
    }
}

/// Edges covering `[lo, hi]` on multiples of `width`; always at least one bin.
fn regular_edges(lo: f64, hi: f64, width: f64) -> Vec<f64> {
    let first = (lo / width).floor() as i64;
    let mut last = (hi / width).ceil() as i64;
    if last <= first {
        last = first + 1;
    }
    (first..=last).map(|k| k as f64 * width).collect()
}

/// Bins are right-open except the last, which is closed. Values outside the
/// edges (floating-point noise at the extremes) go to the nearest end bin.
pub fn bin_index(value: f64, edges: &[f64]) -> usize {
    let nbins = edges.len().saturating_sub(1);
    if nbins == 0 || value <= edges[0] {
        return 0;
    }
    if value >= edges[nbins] {
        return nbins - 1;
    }
    edges.partition_point(|e| *e <= value) - 1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisaggAxis {
    Mag,
    Dist,
    Lon,
    Lat,
    Eps,
    Trt,
}

impl DisaggAxis {
    fn index(self) -> usize {
        match self {
            DisaggAxis::Mag => 0,
            DisaggAxis::Dist => 1,
            DisaggAxis::Lon => 2,
            DisaggAxis::Lat => 3,
            DisaggAxis::Eps => 4,
            DisaggAxis::Trt => 5,
        }
    }
}

/// Probability mass indexed (mag, dist, lon, lat, eps, trt), row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisaggMatrix {
    shape: [usize; 6],
    values: Vec<f64>,
}

impl DisaggMatrix {
    pub fn zeros(shape: [usize; 6]) -> Self {
        Self { shape, values: vec![0.0; shape.iter().product()] }
    }

    pub fn shape(&self) -> [usize; 6] {
        self.shape
    }

    fn flat_index(&self, idx: [usize; 6]) -> usize {
        idx.iter().zip(&self.shape).fold(0, |acc, (i, n)| acc * n + i)
    }

    pub fn get(&self, idx: [usize; 6]) -> f64 {
        self.values[self.flat_index(idx)]
    }

    fn add(&mut self, idx: [usize; 6], mass: f64) {
        let flat = self.flat_index(idx);
        self.values[flat] += mass;
    }

    pub fn total(&self) -> f64 {
        self.values.iter().sum()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Sums out every axis not listed; the result is row-major over `keep`.
    pub fn marginal(&self, keep: &[DisaggAxis]) -> Vec<f64> {
        let kept: Vec<usize> = keep.iter().map(|a| a.index()).collect();
        let size: usize = kept.iter().map(|k| self.shape[*k]).product();
        let mut out = vec![0.0; size];
        let mut idx = [0usize; 6];
        for v in &self.values {
            let flat = kept.iter().fold(0, |acc, k| acc * self.shape[*k] + idx[*k]);
            out[flat] += v;
            // odometer increment over the full shape
            for axis in (0..6).rev() {
                idx[axis] += 1;
                if idx[axis] < self.shape[axis] {
                    break;
                }
                idx[axis] = 0;
            }
        }
        out
    }
}

/// One rupture's contribution before binning.
struct Contribution {
    mag: f64,
    dist: f64,
    lon: f64,
    lat: f64,
    trt: String,
    poe: f64,
    /// Share of the rupture's exceedance falling in each epsilon bin.
    eps_share: Vec<f64>,
}

/// Split of the truncated exceedance `P(ε > ε_target)` over epsilon bins.
fn epsilon_shares(mean: f64, stddev: f64, target_iml: f64, eps_edges: &[f64], truncation: f64) -> (f64, Vec<f64>) {
    let nbins = eps_edges.len() - 1;
    let ln_iml = target_iml.ln();
    if stddev <= 0.0 {
        let mut share = vec![0.0; nbins];
        if mean > ln_iml {
            share[bin_index(0.0, eps_edges)] = 1.0;
            return (1.0, share);
        }
        return (0.0, share);
    }
    let eps_target = (ln_iml - mean) / stddev;
    let norm = norm_cdf(truncation) - norm_cdf(-truncation);
    let masses: Vec<f64> = eps_edges
        .windows(2)
        .map(|w| ((norm_cdf(w[1]) - norm_cdf(w[0].max(eps_target))) / norm).max(0.0))
        .collect();
    let poe: f64 = masses.iter().sum();
    if poe <= 0.0 {
        return (0.0, vec![0.0; nbins]);
    }
    let share = masses.iter().map(|m| m / poe).collect();
    (poe.min(1.0), share)
}

fn min_max(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)))
}

/// Disaggregation of `target_iml` for one site and IMT.
///
/// Returns `None` when no rupture in range exceeds the level. The truncation
/// level must be finite and positive since it bounds the epsilon axis.
#[allow(clippy::too_many_arguments)]
pub fn disaggregate(
    sources: &[Source],
    site: &Site,
    imt: &Imt,
    target_iml: f64,
    gsims: &GsimSet,
    tom: &PoissonTom,
    truncation_level: Option<f64>,
    bins: &DisaggBins,
    filter: &dyn SiteFilter,
    abort: Option<&AtomicBool>,
) -> Result<Option<(BinEdges, DisaggMatrix)>> {
    bins.validate()?;
    check_sources(sources)?;
    let truncation = match truncation_level {
        Some(t) if t > 0.0 && t.is_finite() => t,
        _ => {
            return Err(Error::config(
                "truncation_level",
                "disaggregation requires a finite positive truncation level",
            ))
        }
    };
    if !(target_iml > 0.0) {
        return Err(Error::config("target_iml", "must be positive"));
    }
    let _prof = ProfileScope::with_context("disaggregate", &[("site_id", json!(site.id))]);
    let eps_edges = linspace(-truncation, truncation, bins.num_epsilon_bins + 1);
    let single = SiteCollection::new(vec![site.clone()])?;

    let mut contributions = Vec::new();
    let mut seen = 0u64;
    for source in sources {
        if filter.filter_source(source, &single).is_empty() {
            continue;
        }
        // fresh iterator: independent of any hazard pass over the same source
        for rupture in source.ruptures() {
            if abort.map(|a| a.load(Ordering::Relaxed)).unwrap_or(false) {
                log_abort("disaggregate", seen);
                return Err(Error::Aborted);
            }
            seen += 1;
            if filter.filter_rupture(&rupture, &single).is_empty() {
                continue;
            }
            let p_occ = tom.probability_of_occurrence(&rupture);
            if p_occ <= 0.0 {
                continue;
            }
            let model = gsims.get(&rupture.trt)?;
            let dists = rupture.distances(&site.location);
            let (mean, stddev) = model.mean_and_stddev(&rupture.context(), &dists, site, imt)?;
            let (poe_gm, eps_share) = epsilon_shares(mean, stddev, target_iml, &eps_edges, truncation);
            let poe = p_occ * poe_gm;
            if poe <= 0.0 {
                continue;
            }
            let centroid = rupture.surface.centroid();
            contributions.push(Contribution {
                mag: rupture.mag,
                dist: dists.rjb,
                lon: centroid.lon,
                lat: centroid.lat,
                trt: rupture.trt.clone(),
                poe,
                eps_share,
            });
        }
    }
    if contributions.is_empty() {
        return Ok(None);
    }

    let (min_mag, max_mag) = min_max(contributions.iter().map(|c| c.mag));
    let (min_dist, max_dist) = min_max(contributions.iter().map(|c| c.dist));
    let (min_lon, max_lon) = min_max(contributions.iter().map(|c| c.lon));
    let (min_lat, max_lat) = min_max(contributions.iter().map(|c| c.lat));
    let trts: Vec<String> = contributions
        .iter()
        .map(|c| c.trt.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let edges = BinEdges {
        mag: regular_edges(min_mag, max_mag, bins.mag_bin_width),
        dist: regular_edges(min_dist, max_dist, bins.distance_bin_width),
        lon: regular_edges(min_lon, max_lon, bins.coordinate_bin_width),
        lat: regular_edges(min_lat, max_lat, bins.coordinate_bin_width),
        eps: eps_edges,
        trts,
    };

    // Rates are additive across cells; rescaling by the combined poe keeps
    // the matrix total equal to the aggregated exceedance.
    let total_poe = 1.0 - contributions.iter().map(|c| 1.0 - c.poe).product::<f64>();
    let rates: Vec<f64> = contributions
        .iter()
        .map(|c| -(1.0 - c.poe.min(MAX_RUPTURE_POE)).ln())
        .collect();
    let total_rate: f64 = rates.iter().sum();

    let mut matrix = DisaggMatrix::zeros(edges.shape());
    if total_rate > 0.0 {
        for (c, rate) in contributions.iter().zip(&rates) {
            let trt_idx = edges.trts.iter().position(|t| *t == c.trt).unwrap_or(0);
            let base = [
                bin_index(c.mag, &edges.mag),
                bin_index(c.dist, &edges.dist),
                bin_index(c.lon, &edges.lon),
                bin_index(c.lat, &edges.lat),
                0,
                trt_idx,
            ];
            for (k, share) in c.eps_share.iter().enumerate() {
                if *share > 0.0 {
                    let mut idx = base;
                    idx[4] = k;
                    matrix.add(idx, total_poe * rate * share / total_rate);
                }
            }
        }
    }

    log_disagg_done(site.id, target_iml, total_poe, contributions.len());
    Ok(Some((edges, matrix)))
}

/// Disaggregation output for one site, IMT and poe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisaggResult {
    pub site_id: usize,
    pub imt: String,
    pub poe: f64,
    pub target_iml: f64,
    pub investigation_time: f64,
    pub edges: BinEdges,
    pub matrix: DisaggMatrix,
}

impl DisaggResult {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Disaggregates the level a site's hazard curve reaches at `poe`.
///
/// Sites whose curve is identically zero carry no information and are
/// skipped with `Ok(None)`.
#[allow(clippy::too_many_arguments)]
pub fn disaggregate_site(
    sources: &[Source],
    site: &Site,
    imt: &Imt,
    levels: &[f64],
    curve_poes: &[f64],
    poe: f64,
    gsims: &GsimSet,
    tom: &PoissonTom,
    truncation_level: Option<f64>,
    bins: &DisaggBins,
    filter: &dyn SiteFilter,
    abort: Option<&AtomicBool>,
) -> Result<Option<DisaggResult>> {
    if curve_poes.iter().all(|p| *p <= 0.0) {
        log_disagg_skip(site.id, "hazard curve is identically zero");
        return Ok(None);
    }
    let target_iml = interpolate_iml(levels, curve_poes, poe);
    let out = disaggregate(sources, site, imt, target_iml, gsims, tom, truncation_level, bins, filter, abort)?;
    Ok(out.map(|(edges, matrix)| DisaggResult {
        site_id: site.id,
        imt: imt.to_string(),
        poe,
        target_iml,
        investigation_time: tom.time_span,
        edges,
        matrix,
    }))
}
