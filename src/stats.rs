//! Statistics across logic-tree realizations.
//!
//! Weights are the realization weights of an enumerated logic tree, or
//! `None` for Monte Carlo sampling where every realization counts the same.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::numeric::interp;
use crate::probability::ProbabilityMap;
use crate::risk::LossCurve;

fn resolve_weights(n: usize, weights: Option<&[f64]>) -> Result<Vec<f64>> {
    if n == 0 {
        return Err(Error::config("realizations", "no realizations to aggregate"));
    }
    match weights {
        None => Ok(vec![1.0 / n as f64; n]),
        Some(w) => {
            if w.len() != n {
                return Err(Error::config("weights", format!("{} weights for {} realizations", w.len(), n)));
            }
            let total: f64 = w.iter().sum();
            if w.iter().any(|x| *x < 0.0) || !(total > 0.0) {
                return Err(Error::config("weights", "must be non-negative with a positive sum"));
            }
            Ok(w.iter().map(|x| x / total).collect())
        }
    }
}

fn check_quantiles(quantiles: &[f64]) -> Result<()> {
    if quantiles.iter().any(|q| !(0.0..=1.0).contains(q)) {
        return Err(Error::config("quantiles", "must be within [0, 1]"));
    }
    Ok(())
}

/// Weighted quantile: the sorted values interpolated at `q` on their
/// cumulative weights.
pub fn weighted_quantile(values: &[f64], weights: &[f64], q: f64) -> f64 {
    let mut pairs: Vec<(f64, f64)> = values.iter().copied().zip(weights.iter().copied()).collect();
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
    let mut acc = 0.0;
    let cum: Vec<f64> = pairs
        .iter()
        .map(|(_, w)| {
            acc += w;
            acc
        })
        .collect();
    let sorted: Vec<f64> = pairs.iter().map(|(v, _)| *v).collect();
    interp(q, &cum, &sorted)
}

/// Pointwise weighted mean of equally long curves (one row per realization).
pub fn mean_curve(curves: &[Vec<f64>], weights: &[f64]) -> Vec<f64> {
    let m = curves.first().map(|c| c.len()).unwrap_or(0);
    let mut out = vec![0.0; m];
    for (curve, w) in curves.iter().zip(weights) {
        for (acc, v) in out.iter_mut().zip(curve) {
            *acc += w * v;
        }
    }
    out
}

pub fn quantile_curve(curves: &[Vec<f64>], weights: &[f64], q: f64) -> Vec<f64> {
    let m = curves.first().map(|c| c.len()).unwrap_or(0);
    (0..m)
        .map(|j| {
            let column: Vec<f64> = curves.iter().map(|c| c[j]).collect();
            weighted_quantile(&column, weights, q)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveStatistics {
    pub mean: Vec<f64>,
    /// (quantile, curve) in the requested order.
    pub quantiles: Vec<(f64, Vec<f64>)>,
}

pub fn curve_statistics(curves: &[Vec<f64>], weights: Option<&[f64]>, quantiles: &[f64]) -> Result<CurveStatistics> {
    let w = resolve_weights(curves.len(), weights)?;
    check_quantiles(quantiles)?;
    let m = curves[0].len();
    if curves.iter().any(|c| c.len() != m) {
        return Err(Error::Numerical("realization curves differ in length".to_string()));
    }
    Ok(CurveStatistics {
        mean: mean_curve(curves, &w),
        quantiles: quantiles.iter().map(|q| (*q, quantile_curve(curves, &w, *q))).collect(),
    })
}

// =============================================================================
// Hazard
// =============================================================================

/// Mean and quantile hazard curves per site over flattened levels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HazardStatistics {
    pub sites: BTreeMap<usize, CurveStatistics>,
}

impl HazardStatistics {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Statistics over single-column realization maps. A site missing from a
/// realization counts as a zero curve there.
pub fn hazard_statistics(
    pmaps: &[ProbabilityMap],
    weights: Option<&[f64]>,
    quantiles: &[f64],
) -> Result<HazardStatistics> {
    let w = resolve_weights(pmaps.len(), weights)?;
    check_quantiles(quantiles)?;
    let mut site_ids: Vec<usize> = pmaps.iter().flat_map(|p| p.site_ids()).collect();
    site_ids.sort_unstable();
    site_ids.dedup();

    let mut sites = BTreeMap::new();
    for sid in site_ids {
        let curves: Vec<Vec<f64>> = pmaps.iter().map(|p| p.poes(sid, 0)).collect();
        sites.insert(sid, curve_statistics(&curves, Some(&w), quantiles)?);
    }
    Ok(HazardStatistics { sites })
}

// =============================================================================
// Loss curves and maps
// =============================================================================

/// Brings event-based curves onto one loss axis: the axis of the curve
/// with the largest maximum loss. Poes outside a curve's own range are 0.
pub fn normalize_curves(curves: &[LossCurve]) -> (Vec<f64>, Vec<Vec<f64>>) {
    let non_trivial: Vec<&LossCurve> = curves
        .iter()
        .filter(|c| c.losses.last().map(|l| *l > 0.0).unwrap_or(false))
        .collect();
    let reference = non_trivial
        .iter()
        .copied()
        .max_by(|a, b| {
            let la = a.losses.last().copied().unwrap_or(0.0);
            let lb = b.losses.last().copied().unwrap_or(0.0);
            la.total_cmp(&lb)
        });
    let Some(reference) = reference else {
        let losses = curves.first().map(|c| c.losses.clone()).unwrap_or_default();
        return (losses, curves.iter().map(|c| c.poes.clone()).collect());
    };
    let axis = reference.losses.clone();
    let poes = curves
        .iter()
        .map(|c| {
            axis.iter()
                .map(|x| {
                    let lo = c.losses.first().copied().unwrap_or(0.0);
                    let hi = c.losses.last().copied().unwrap_or(0.0);
                    if c.losses.is_empty() || *x < lo || *x > hi {
                        return 0.0;
                    }
                    let v = interp(*x, &c.losses, &c.poes);
                    if v.is_nan() {
                        0.0
                    } else {
                        v
                    }
                })
                .collect()
        })
        .collect();
    (axis, poes)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LossCurveStatistics {
    pub losses: Vec<f64>,
    pub mean: LossCurve,
    pub quantiles: Vec<(f64, LossCurve)>,
}

/// Mean and quantile loss curves. Classical curves share their loss-ratio
/// axis already; event-based ones are normalized first.
pub fn loss_curve_statistics(
    curves: &[LossCurve],
    weights: Option<&[f64]>,
    quantiles: &[f64],
    normalize: bool,
) -> Result<LossCurveStatistics> {
    if curves.is_empty() {
        return Err(Error::config("realizations", "no loss curves to aggregate"));
    }
    let (losses, poes) = if normalize {
        normalize_curves(curves)
    } else {
        (curves[0].losses.clone(), curves.iter().map(|c| c.poes.clone()).collect())
    };
    let stats = curve_statistics(&poes, weights, quantiles)?;
    Ok(LossCurveStatistics {
        mean: LossCurve::new(losses.clone(), stats.mean)?,
        quantiles: stats
            .quantiles
            .into_iter()
            .map(|(q, p)| LossCurve::new(losses.clone(), p).map(|c| (q, c)))
            .collect::<Result<Vec<_>>>()?,
        losses,
    })
}

/// Mean and quantiles of conditional losses; `maps[r][k]` is the loss of
/// realization `r` at the k-th poe.
pub fn loss_map_statistics(maps: &[Vec<f64>], weights: Option<&[f64]>, quantiles: &[f64]) -> Result<CurveStatistics> {
    curve_statistics(maps, weights, quantiles)
}
