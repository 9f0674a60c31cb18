//! Vulnerability and fragility models.
//!
//! A vulnerability function maps intensity to a loss-ratio distribution;
//! a fragility model maps intensity to limit-state exceedance. Randomness
//! never lives inside these types: sampling takes explicit epsilons, which
//! callers draw from a seeded generator with [`epsilons`].

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution as _, StandardNormal};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::imt::Imt;
use crate::numeric::{incomplete_beta, incomplete_beta_inv, interp, linspace, norm_cdf, norm_sf};

// =============================================================================
// Distributions
// =============================================================================

/// Loss-ratio uncertainty model, resolved once when the function is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Distribution {
    LogNormal,
    Beta,
    /// Explicit probability mass over loss ratios; the mass lives on the
    /// owning [`VulnerabilityFunction`].
    Discrete,
    /// All mass at the mean.
    Degenerate,
}

fn step_survival(loss_ratio: f64, mean: f64) -> f64 {
    if loss_ratio < mean {
        1.0
    } else {
        0.0
    }
}

fn lognormal_params(mean: f64, stddev: f64) -> (f64, f64) {
    let variance = stddev * stddev;
    let sigma = (variance / (mean * mean) + 1.0).ln().sqrt();
    let ln_scale = (mean * mean / (variance + mean * mean).sqrt()).ln();
    (ln_scale, sigma)
}

fn beta_params(mean: f64, stddev: f64) -> (f64, f64) {
    let k = (1.0 - mean) / (stddev * stddev) - 1.0 / mean;
    (k * mean * mean, k * (mean - mean * mean))
}

impl Distribution {
    /// P(loss ratio > `loss_ratio`) given the mean and standard deviation.
    /// Zero spread degrades to a step at the mean.
    pub fn survival(&self, loss_ratio: f64, mean: f64, stddev: f64) -> f64 {
        if stddev <= 0.0 || mean <= 0.0 {
            return step_survival(loss_ratio, mean);
        }
        match self {
            Distribution::LogNormal => {
                if loss_ratio <= 0.0 {
                    return 1.0;
                }
                let (ln_scale, sigma) = lognormal_params(mean, stddev);
                norm_sf((loss_ratio.ln() - ln_scale) / sigma)
            }
            Distribution::Beta => {
                let (a, b) = beta_params(mean, stddev);
                if !(a > 0.0 && b > 0.0) {
                    return step_survival(loss_ratio, mean);
                }
                if loss_ratio <= 0.0 {
                    1.0
                } else if loss_ratio >= 1.0 {
                    0.0
                } else {
                    1.0 - incomplete_beta(a, b, loss_ratio)
                }
            }
            Distribution::Discrete | Distribution::Degenerate => step_survival(loss_ratio, mean),
        }
    }

    /// Loss ratio at standard-normal quantile `epsilon`.
    pub fn sample(&self, mean: f64, cov: f64, epsilon: f64) -> f64 {
        let stddev = mean * cov;
        if stddev <= 0.0 || mean <= 0.0 {
            return mean;
        }
        match self {
            Distribution::LogNormal => {
                let (ln_scale, sigma) = lognormal_params(mean, stddev);
                (ln_scale + epsilon * sigma).exp()
            }
            Distribution::Beta => {
                let (a, b) = beta_params(mean, stddev);
                if !(a > 0.0 && b > 0.0) {
                    return mean;
                }
                incomplete_beta_inv(a, b, norm_cdf(epsilon))
            }
            Distribution::Discrete | Distribution::Degenerate => mean,
        }
    }

    pub fn sample_many(&self, means: &[f64], covs: &[f64], epsilons: &[f64]) -> Vec<f64> {
        if *self == Distribution::Degenerate {
            return means.to_vec();
        }
        means
            .iter()
            .zip(covs)
            .zip(epsilons)
            .map(|((m, c), e)| self.sample(*m, *c, *e))
            .collect()
    }
}

/// Standard-normal epsilons, `[asset][sample]`, seeded and optionally
/// equicorrelated across assets: `ε_i = √ρ z₀ + √(1-ρ) z_i`.
pub fn epsilons(num_assets: usize, num_samples: usize, seed: u64, correlation: f64) -> Result<Vec<Vec<f64>>> {
    if !(0.0..=1.0).contains(&correlation) {
        return Err(Error::config("asset_correlation", "must be within [0, 1]"));
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut out = vec![Vec::with_capacity(num_samples); num_assets];
    let shared = correlation.sqrt();
    let own = (1.0 - correlation).sqrt();
    for _ in 0..num_samples {
        let z0: f64 = StandardNormal.sample(&mut rng);
        for row in out.iter_mut() {
            let zi: f64 = StandardNormal.sample(&mut rng);
            row.push(shared * z0 + own * zi);
        }
    }
    Ok(out)
}

// =============================================================================
// Vulnerability functions
// =============================================================================

/// Loss-ratio exceedance matrix: `matrix[i][j]` is the probability that the
/// loss ratio exceeds `loss_ratios[i]` at intensity level `j`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lrem {
    pub loss_ratios: Vec<f64>,
    pub matrix: Vec<Vec<f64>>,
}

/// Splits every interval of `[first, ratios.., last]` into `steps` equal
/// parts. `steps = 2` over `[1, 2]` gives `[1, 1.5, 2]`.
pub fn evenly_spaced_loss_ratios(ratios: &[f64], steps: usize, first: &[f64], last: &[f64]) -> Vec<f64> {
    let all: Vec<f64> = first.iter().chain(ratios).chain(last).copied().collect();
    let mut out = Vec::with_capacity(all.len().saturating_sub(1) * steps + 1);
    for w in all.windows(2) {
        let seg = linspace(w[0], w[1], steps + 1);
        out.extend_from_slice(&seg[..steps]);
    }
    if let Some(end) = all.last() {
        out.push(*end);
    }
    out
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VulnerabilityFunction {
    pub id: String,
    pub imt: Imt,
    imls: Vec<f64>,
    mean_loss_ratios: Vec<f64>,
    covs: Vec<f64>,
    distribution: Distribution,
    /// `[loss ratio][iml]` probabilities, only for the discrete form.
    pmf: Option<(Vec<f64>, Vec<Vec<f64>>)>,
}

fn check_imls(imls: &[f64]) -> Result<()> {
    if imls.len() < 2 {
        return Err(Error::config("vulnerability.imls", "at least two intensity levels are required"));
    }
    if imls[0] < 0.0 || !imls.windows(2).all(|w| w[0] < w[1]) {
        return Err(Error::config("vulnerability.imls", "must be non-negative and strictly increasing"));
    }
    Ok(())
}

impl VulnerabilityFunction {
    /// Continuous function. With every cov at zero the distribution
    /// collapses to [`Distribution::Degenerate`].
    pub fn new(
        id: &str,
        imt: Imt,
        imls: Vec<f64>,
        mean_loss_ratios: Vec<f64>,
        covs: Vec<f64>,
        distribution: Distribution,
    ) -> Result<Self> {
        check_imls(&imls)?;
        if mean_loss_ratios.len() != imls.len() || covs.len() != imls.len() {
            return Err(Error::config(
                "vulnerability.mean_loss_ratios",
                format!("function {} needs one loss ratio and one cov per level", id),
            ));
        }
        if mean_loss_ratios.iter().any(|lr| !(0.0..=1.0).contains(lr)) {
            return Err(Error::config("vulnerability.mean_loss_ratios", "must be within [0, 1]"));
        }
        if covs.iter().any(|c| !(*c >= 0.0)) {
            return Err(Error::config("vulnerability.covs", "must be non-negative"));
        }
        if mean_loss_ratios.iter().zip(&covs).any(|(lr, c)| *lr == 0.0 && *c > 0.0) {
            return Err(Error::config(
                "vulnerability.covs",
                format!("function {} has a zero loss ratio with positive cov", id),
            ));
        }
        if distribution == Distribution::Discrete {
            return Err(Error::config("vulnerability.distribution", "discrete functions are built with from_pmf"));
        }
        let distribution = if covs.iter().any(|c| *c > 0.0) { distribution } else { Distribution::Degenerate };
        Ok(Self { id: id.to_string(), imt, imls, mean_loss_ratios, covs, distribution, pmf: None })
    }

    /// Discrete function: `probs[i][j]` is P(loss ratio = `loss_ratios[i]`)
    /// at `imls[j]`; every column must sum to one.
    pub fn from_pmf(id: &str, imt: Imt, imls: Vec<f64>, loss_ratios: Vec<f64>, probs: Vec<Vec<f64>>) -> Result<Self> {
        check_imls(&imls)?;
        if loss_ratios.is_empty() || !loss_ratios.windows(2).all(|w| w[0] < w[1]) {
            return Err(Error::config("vulnerability.loss_ratios", "must be strictly increasing"));
        }
        if loss_ratios.iter().any(|lr| !(0.0..=1.0).contains(lr)) {
            return Err(Error::config("vulnerability.loss_ratios", "must be within [0, 1]"));
        }
        if probs.len() != loss_ratios.len() || probs.iter().any(|row| row.len() != imls.len()) {
            return Err(Error::config("vulnerability.probabilities", "shape must be loss ratios x levels"));
        }
        let mut means = Vec::with_capacity(imls.len());
        let mut covs = Vec::with_capacity(imls.len());
        for j in 0..imls.len() {
            let column: Vec<f64> = probs.iter().map(|row| row[j]).collect();
            let total: f64 = column.iter().sum();
            if column.iter().any(|p| *p < 0.0) || (total - 1.0).abs() > 1e-6 {
                return Err(Error::config(
                    "vulnerability.probabilities",
                    format!("column {} of function {} is not a distribution", j, id),
                ));
            }
            let mean: f64 = loss_ratios.iter().zip(&column).map(|(lr, p)| lr * p).sum();
            let var: f64 = loss_ratios.iter().zip(&column).map(|(lr, p)| p * (lr - mean).powi(2)).sum();
            means.push(mean);
            covs.push(if mean > 0.0 { var.sqrt() / mean } else { 0.0 });
        }
        Ok(Self {
            id: id.to_string(),
            imt,
            imls,
            mean_loss_ratios: means,
            covs,
            distribution: Distribution::Discrete,
            pmf: Some((loss_ratios, probs)),
        })
    }

    pub fn imls(&self) -> &[f64] {
        &self.imls
    }

    pub fn mean_loss_ratios(&self) -> &[f64] {
        &self.mean_loss_ratios
    }

    pub fn covs(&self) -> &[f64] {
        &self.covs
    }

    pub fn distribution(&self) -> Distribution {
        self.distribution
    }

    fn min_iml(&self) -> f64 {
        self.imls[0]
    }

    fn max_iml(&self) -> f64 {
        self.imls[self.imls.len() - 1]
    }

    /// Fails when the hazard was computed for another IMT.
    pub fn check_imt(&self, hazard_imt: &Imt) -> Result<()> {
        if *hazard_imt != self.imt {
            return Err(Error::IncompatibleImt { expected: self.imt.to_string(), found: hazard_imt.to_string() });
        }
        Ok(())
    }

    /// Interpolated mean loss ratio; 0 below the first level, clipped to
    /// the last level above the range.
    pub fn mean_loss_ratio(&self, iml: f64) -> f64 {
        if iml < self.min_iml() {
            return 0.0;
        }
        interp(iml.min(self.max_iml()), &self.imls, &self.mean_loss_ratios)
    }

    fn cov(&self, iml: f64) -> f64 {
        interp(iml.clamp(self.min_iml(), self.max_iml()), &self.imls, &self.covs)
    }

    /// Sampled loss ratios, one per ground-motion value, each driven by the
    /// matching epsilon.
    pub fn loss_ratios(&self, imls: &[f64], epsilons: &[f64]) -> Result<Vec<f64>> {
        if epsilons.len() < imls.len() {
            return Err(Error::config(
                "epsilons",
                format!("{} epsilons for {} ground-motion values", epsilons.len(), imls.len()),
            ));
        }
        Ok(imls
            .iter()
            .zip(epsilons)
            .map(|(iml, eps)| {
                if *iml < self.min_iml() {
                    return 0.0;
                }
                match &self.pmf {
                    Some((lrs, probs)) => self.sample_pmf(lrs, probs, *iml, *eps),
                    None => self.distribution.sample(self.mean_loss_ratio(*iml), self.cov(*iml), *eps),
                }
            })
            .collect())
    }

    /// Inverse-CDF draw from the column PMF interpolated at `iml`.
    fn sample_pmf(&self, lrs: &[f64], probs: &[Vec<f64>], iml: f64, eps: f64) -> f64 {
        let iml = iml.min(self.max_iml());
        let u = norm_cdf(eps);
        let mut acc = 0.0;
        for (lr, row) in lrs.iter().zip(probs) {
            acc += interp(iml, &self.imls, row);
            if u <= acc {
                return *lr;
            }
        }
        lrs[lrs.len() - 1]
    }

    /// Exceedance of `loss_ratio` at the `col`-th intensity level.
    pub fn survival_at(&self, loss_ratio: f64, col: usize) -> f64 {
        match &self.pmf {
            Some((lrs, probs)) => lrs
                .iter()
                .zip(probs)
                .filter(|(lr, _)| **lr > loss_ratio)
                .map(|(_, row)| row[col])
                .sum::<f64>()
                .min(1.0),
            None => {
                let mean = self.mean_loss_ratios[col];
                self.distribution.survival(loss_ratio, mean, mean * self.covs[col])
            }
        }
    }

    /// LREM over the mean loss ratios split into `steps`, bounded by 0 and 1.
    pub fn loss_ratio_exceedance_matrix(&self, steps: usize) -> Result<Lrem> {
        if steps == 0 {
            return Err(Error::config("lrem_steps_per_interval", "must be at least 1"));
        }
        let loss_ratios = evenly_spaced_loss_ratios(&self.mean_loss_ratios, steps, &[0.0], &[1.0]);
        let matrix = loss_ratios
            .iter()
            .map(|lr| (0..self.imls.len()).map(|j| self.survival_at(*lr, j)).collect())
            .collect();
        Ok(Lrem { loss_ratios, matrix })
    }

    /// Bin boundaries around the intensity levels: first half-step below the
    /// first level (not below zero), midpoints, half-step past the last.
    pub fn mean_imls(&self) -> Vec<f64> {
        let n = self.imls.len();
        let first = (self.imls[0] - (self.imls[1] - self.imls[0]) / 2.0).max(0.0);
        let last = self.imls[n - 1] + (self.imls[n - 1] - self.imls[n - 2]) / 2.0;
        let mut out = Vec::with_capacity(n + 1);
        out.push(first);
        out.extend(self.imls.windows(2).map(|w| (w[0] + w[1]) / 2.0));
        out.push(last);
        out
    }
}

// =============================================================================
// Fragility
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FragilityFunction {
    /// Lognormal CDF given the mean and standard deviation of the
    /// intensity (not of its logarithm).
    Continuous { mean: f64, stddev: f64 },
    Discrete { imls: Vec<f64>, poes: Vec<f64>, no_damage_limit: Option<f64> },
}

impl FragilityFunction {
    fn check(&self) -> Result<()> {
        match self {
            FragilityFunction::Continuous { mean, stddev } => {
                if !(*mean > 0.0) || !(*stddev >= 0.0) {
                    return Err(Error::config("fragility", "continuous functions need mean > 0 and stddev >= 0"));
                }
            }
            FragilityFunction::Discrete { imls, poes, .. } => {
                if imls.is_empty() || imls.len() != poes.len() || !imls.windows(2).all(|w| w[0] < w[1]) {
                    return Err(Error::config("fragility.imls", "must be strictly increasing and match the poes"));
                }
                if poes.iter().any(|p| !(0.0..=1.0).contains(p)) {
                    return Err(Error::config("fragility.poes", "must be within [0, 1]"));
                }
            }
        }
        Ok(())
    }

    /// Probability of reaching or exceeding the limit state at `iml`.
    pub fn poe(&self, iml: f64) -> f64 {
        match self {
            FragilityFunction::Continuous { mean, stddev } => {
                if iml <= 0.0 {
                    return 0.0;
                }
                if *stddev <= 0.0 {
                    return if iml >= *mean { 1.0 } else { 0.0 };
                }
                let (ln_scale, sigma) = lognormal_params(*mean, *stddev);
                norm_cdf((iml.ln() - ln_scale) / sigma)
            }
            FragilityFunction::Discrete { imls, poes, no_damage_limit } => {
                if let Some(limit) = no_damage_limit {
                    if iml < *limit {
                        return 0.0;
                    }
                }
                if iml < imls[0] {
                    return 0.0;
                }
                interp(iml, imls, poes)
            }
        }
    }
}

/// Limit-state functions ordered by increasing severity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragilityModel {
    pub id: String,
    pub imt: Imt,
    pub limit_states: Vec<String>,
    functions: Vec<FragilityFunction>,
}

impl FragilityModel {
    pub fn new(id: &str, imt: Imt, limit_states: Vec<String>, functions: Vec<FragilityFunction>) -> Result<Self> {
        if functions.is_empty() || functions.len() != limit_states.len() {
            return Err(Error::config("fragility.limit_states", "need one function per limit state"));
        }
        for f in &functions {
            f.check()?;
        }
        Ok(Self { id: id.to_string(), imt, limit_states, functions })
    }

    pub fn functions(&self) -> &[FragilityFunction] {
        &self.functions
    }

    pub fn num_damage_states(&self) -> usize {
        self.functions.len() + 1
    }

    pub fn check_imt(&self, hazard_imt: &Imt) -> Result<()> {
        if *hazard_imt != self.imt {
            return Err(Error::IncompatibleImt { expected: self.imt.to_string(), found: hazard_imt.to_string() });
        }
        Ok(())
    }

    /// Fractions in each damage state (no damage first) at `iml`, from the
    /// differences of `[1, PoE(LS1), .., PoE(LSn), 0]`. A more severe state
    /// never exceeds a milder one, so every fraction is non-negative and
    /// they sum to one.
    pub fn damage_fractions(&self, iml: f64) -> Vec<f64> {
        let mut cumulative = Vec::with_capacity(self.functions.len() + 2);
        cumulative.push(1.0);
        let mut running = 1.0f64;
        for f in &self.functions {
            running = running.min(f.poe(iml).clamp(0.0, 1.0));
            cumulative.push(running);
        }
        cumulative.push(0.0);
        cumulative.windows(2).map(|w| w[0] - w[1]).collect()
    }
}
