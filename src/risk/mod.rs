//! Loss and damage calculators.
//!
//! All calculators are pure functions of their inputs: they hold no state
//! between calls and can be re-run on the same inputs with identical
//! results.

pub mod bcr;
pub mod classical;
pub mod event_based;
pub mod scenario;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::numeric::{interp, pairwise_diff, pairwise_mean};

pub use bcr::{bcr, BcrParams, BcrResult};
pub use classical::{classical, classical_with_lrem};
pub use event_based::{event_based, insured_loss_curve, insured_losses};
pub use scenario::{mean_std, scenario_damage, scenario_loss, DamageDistribution, ScenarioLoss};

/// Loss (or loss ratio) exceedance curve, losses increasing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LossCurve {
    pub losses: Vec<f64>,
    pub poes: Vec<f64>,
}

impl LossCurve {
    pub fn new(losses: Vec<f64>, poes: Vec<f64>) -> Result<Self> {
        if losses.len() != poes.len() {
            return Err(Error::Numerical(format!(
                "loss curve with {} losses and {} poes",
                losses.len(),
                poes.len()
            )));
        }
        Ok(Self { losses, poes })
    }

    pub fn len(&self) -> usize {
        self.losses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.losses.is_empty()
    }

    /// Losses non-decreasing and poes non-increasing, within `tol`.
    pub fn is_monotonic(&self, tol: f64) -> bool {
        self.losses.windows(2).all(|w| w[1] >= w[0] - tol) && self.poes.windows(2).all(|w| w[1] <= w[0] + tol)
    }

    pub fn average_loss(&self) -> f64 {
        average_loss(&self.losses, &self.poes)
    }

    pub fn conditional_loss(&self, poe: f64) -> f64 {
        conditional_loss_ratio(&self.losses, &self.poes, poe)
    }

    /// Loss-ratio curve turned into an absolute loss curve.
    pub fn scaled(&self, value: f64) -> LossCurve {
        LossCurve { losses: self.losses.iter().map(|l| l * value).collect(), poes: self.poes.clone() }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({ "losses": self.losses, "poes": self.poes })
    }
}

/// Trapezoidal expectation of the curve: Σ mean(adjacent losses) ×
/// difference(adjacent poes).
pub fn average_loss(losses: &[f64], poes: &[f64]) -> f64 {
    pairwise_mean(losses)
        .iter()
        .zip(pairwise_diff(poes))
        .map(|(l, dp)| l * dp)
        .sum()
}

/// Loss at which the curve reaches `probability`.
///
/// Above the highest poe the loss is 0; below the lowest it is the largest
/// loss. Where several losses share one poe the largest loss wins.
pub fn conditional_loss_ratio(losses: &[f64], poes: &[f64], probability: f64) -> f64 {
    if losses.is_empty() {
        return 0.0;
    }
    let mut pairs: Vec<(f64, f64)> = losses.iter().copied().zip(poes.iter().copied()).collect();
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
    let min_poe = pairs.iter().map(|p| p.1).fold(f64::INFINITY, f64::min);
    let max_poe = pairs.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max);
    if probability < min_poe {
        return pairs[pairs.len() - 1].0;
    }
    if probability > max_poe {
        return 0.0;
    }

    // (poe, loss) with unique poes; a later (larger) loss replaces an earlier one
    let mut inverse: Vec<(f64, f64)> = Vec::with_capacity(pairs.len());
    for (loss, poe) in pairs {
        match inverse.iter_mut().find(|(p, _)| *p == poe) {
            Some(entry) => entry.1 = loss,
            None => inverse.push((poe, loss)),
        }
    }
    inverse.sort_by(|a, b| a.0.total_cmp(&b.0));
    let xs: Vec<f64> = inverse.iter().map(|p| p.0).collect();
    let ys: Vec<f64> = inverse.iter().map(|p| p.1).collect();
    interp(probability, &xs, &ys)
}
