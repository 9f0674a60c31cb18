//! Probability aggregation.
//!
//! Maps store the probability of NON-exceedance `q` per site, level and
//! ground-motion model set. An empty curve is the identity (all ones) and
//! contributions combine multiplicatively, `q *= 1 - p`, so the result does
//! not depend on the order in which ruptures or partial maps arrive.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::imt::{Imt, Imtls};
use crate::numeric::{norm_cdf, norm_sf};

/// Probability that a lognormal ground motion with log-mean `mean` and
/// log-sigma `stddev` exceeds `level`, truncated at `truncation` sigmas.
pub fn exceedance_probability(mean: f64, stddev: f64, level: f64, truncation: Option<f64>) -> f64 {
    let ln_level = level.ln();
    if stddev <= 0.0 || truncation == Some(0.0) {
        return if mean > ln_level { 1.0 } else { 0.0 };
    }
    let z = (ln_level - mean) / stddev;
    match truncation {
        None => norm_sf(z),
        Some(tau) => {
            if z > tau {
                0.0
            } else if z < -tau {
                1.0
            } else {
                let upper = norm_cdf(tau);
                let norm = upper - norm_cdf(-tau);
                ((upper - norm_cdf(z)) / norm).clamp(0.0, 1.0)
            }
        }
    }
}

pub fn exceedance_probabilities(mean: f64, stddev: f64, levels: &[f64], truncation: Option<f64>) -> Vec<f64> {
    levels
        .iter()
        .map(|l| exceedance_probability(mean, stddev, *l, truncation))
        .collect()
}

/// Non-exceedance probabilities of one site, laid out level-major:
/// `values[level * num_gsims + gsim]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityCurve {
    num_gsims: usize,
    values: Vec<f64>,
}

impl ProbabilityCurve {
    pub fn identity(num_levels: usize, num_gsims: usize) -> Self {
        Self { num_gsims, values: vec![1.0; num_levels * num_gsims] }
    }

    pub fn num_levels(&self) -> usize {
        if self.num_gsims == 0 {
            0
        } else {
            self.values.len() / self.num_gsims
        }
    }

    pub fn num_gsims(&self) -> usize {
        self.num_gsims
    }

    /// Folds the exceedance probabilities of one contribution into column
    /// `gsim`, starting at flattened level `offset`.
    pub fn combine_poes(&mut self, gsim: usize, offset: usize, poes: &[f64]) {
        for (i, p) in poes.iter().enumerate() {
            let idx = (offset + i) * self.num_gsims + gsim;
            self.values[idx] *= 1.0 - p.clamp(0.0, 1.0);
        }
    }

    /// Combines another curve computed for a disjoint set of ruptures.
    pub fn merge(&mut self, other: &ProbabilityCurve) -> Result<()> {
        if other.values.len() != self.values.len() || other.num_gsims != self.num_gsims {
            return Err(Error::Numerical(format!(
                "cannot merge curves of shape {}x{} and {}x{}",
                self.num_levels(),
                self.num_gsims,
                other.num_levels(),
                other.num_gsims
            )));
        }
        for (q, o) in self.values.iter_mut().zip(&other.values) {
            *q *= o;
        }
        Ok(())
    }

    pub fn non_exceedance(&self, level: usize, gsim: usize) -> f64 {
        self.values[level * self.num_gsims + gsim]
    }

    pub fn poe(&self, level: usize, gsim: usize) -> f64 {
        1.0 - self.non_exceedance(level, gsim)
    }

    /// Exceedance probabilities of column `gsim`, one per level.
    pub fn poes(&self, gsim: usize) -> Vec<f64> {
        (0..self.num_levels()).map(|l| self.poe(l, gsim)).collect()
    }

    pub fn is_zero(&self) -> bool {
        self.values.iter().all(|q| *q >= 1.0)
    }
}

/// Site id -> curve. Sites never touched by a rupture are absent and read as
/// all-zero exceedance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityMap {
    num_levels: usize,
    num_gsims: usize,
    curves: BTreeMap<usize, ProbabilityCurve>,
}

impl ProbabilityMap {
    pub fn new(num_levels: usize, num_gsims: usize) -> Self {
        Self { num_levels, num_gsims, curves: BTreeMap::new() }
    }

    pub fn num_levels(&self) -> usize {
        self.num_levels
    }

    pub fn num_gsims(&self) -> usize {
        self.num_gsims
    }

    pub fn len(&self) -> usize {
        self.curves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.curves.is_empty()
    }

    pub fn site_ids(&self) -> impl Iterator<Item = usize> + '_ {
        self.curves.keys().copied()
    }

    pub fn get(&self, site_id: usize) -> Option<&ProbabilityCurve> {
        self.curves.get(&site_id)
    }

    /// Curve for `site_id`, created as the identity if absent.
    pub fn setdefault(&mut self, site_id: usize) -> &mut ProbabilityCurve {
        let (levels, gsims) = (self.num_levels, self.num_gsims);
        self.curves
            .entry(site_id)
            .or_insert_with(|| ProbabilityCurve::identity(levels, gsims))
    }

    /// In-place combination with a map built from other ruptures.
    pub fn combine(&mut self, other: &ProbabilityMap) -> Result<()> {
        if other.num_levels != self.num_levels || other.num_gsims != self.num_gsims {
            return Err(Error::Numerical(format!(
                "cannot combine maps of shape {}x{} and {}x{}",
                self.num_levels, self.num_gsims, other.num_levels, other.num_gsims
            )));
        }
        for (sid, curve) in &other.curves {
            self.setdefault(*sid).merge(curve)?;
        }
        Ok(())
    }

    /// Exceedance probabilities over all flattened levels for one column;
    /// all zeros for an untouched site.
    pub fn poes(&self, site_id: usize, gsim: usize) -> Vec<f64> {
        match self.curves.get(&site_id) {
            Some(curve) => curve.poes(gsim),
            None => vec![0.0; self.num_levels],
        }
    }

    /// Exceedance probabilities of one IMT for one site and column.
    pub fn imt_poes(&self, imtls: &Imtls, imt: &Imt, site_id: usize, gsim: usize) -> Result<Vec<f64>> {
        let offset = imtls
            .offset(imt)
            .ok_or_else(|| Error::config("intensity_measure_types_and_levels", format!("IMT {} not computed", imt)))?;
        let n = imtls.levels(imt).map(|l| l.len()).unwrap_or(0);
        let all = self.poes(site_id, gsim);
        Ok(all[offset..offset + n].to_vec())
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "num_levels": self.num_levels,
            "num_gsims": self.num_gsims,
            "poes": self.curves.iter().map(|(sid, c)| {
                let cols: Vec<Vec<f64>> = (0..self.num_gsims).map(|g| c.poes(g)).collect();
                (sid.to_string(), serde_json::json!(cols))
            }).collect::<serde_json::Map<String, serde_json::Value>>(),
        })
    }
}
