//! Empirical loss curves from stochastic event sets, and insurance.

use crate::error::{Error, Result};
use crate::numeric::{interp, linspace};

use super::LossCurve;

fn is_close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-8 + 1e-5 * b.abs()
}

/// Exceedance curve of per-event losses over `tses` years of stochastic
/// events, expressed as poes over `time_span` and resampled on
/// `curve_resolution` evenly spaced poes.
///
/// Fewer than two distinct losses collapse to a two-point curve between the
/// smallest and the largest value.
pub fn event_based(loss_values: &[f64], tses: f64, time_span: f64, curve_resolution: usize) -> Result<LossCurve> {
    if loss_values.is_empty() {
        return Err(Error::config("loss_values", "at least one loss value is required"));
    }
    if !(tses > 0.0) {
        return Err(Error::config("tses", "must be positive"));
    }
    if !(time_span > 0.0) {
        return Err(Error::config("investigation_time", "must be positive"));
    }
    if curve_resolution < 2 {
        return Err(Error::config("loss_curve_resolution", "must be at least 2"));
    }

    let mut sorted = loss_values.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));

    // index i counts the losses strictly above sorted[i]
    let mut times: Vec<usize> = sorted
        .windows(2)
        .enumerate()
        .filter(|(_, w)| !is_close(w[1], w[0]))
        .map(|(i, _)| i)
        .collect();
    if times.len() < 2 {
        times = vec![0, sorted.len() - 1];
    }

    let losses: Vec<f64> = times.iter().map(|i| sorted[*i]).collect();
    let poes: Vec<f64> = times
        .iter()
        .map(|i| 1.0 - (-(*i as f64 / tses) * time_span).exp())
        .collect();

    let min_poe = poes.iter().copied().fold(f64::INFINITY, f64::min);
    let max_poe = poes.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let reference_poes = linspace(min_poe, max_poe, curve_resolution);
    let values: Vec<f64> = reference_poes.iter().map(|p| interp(*p, &poes, &losses)).collect();

    // ascending losses
    let losses: Vec<f64> = values.into_iter().rev().collect();
    let poes: Vec<f64> = reference_poes.into_iter().rev().collect();
    LossCurve::new(losses, poes)
}

/// Insured share of each loss under a contract with `deductible` and
/// `insured_limit`: nothing below the deductible, the excess over it up to
/// the limit, and `insured_limit - deductible` beyond.
pub fn insured_losses(losses: &[f64], deductible: f64, insured_limit: f64) -> Vec<f64> {
    losses
        .iter()
        .map(|l| if *l < deductible { 0.0 } else { l.min(insured_limit) - deductible })
        .collect()
}

/// Event-based curve of the insured losses.
pub fn insured_loss_curve(
    losses: &[f64],
    deductible: f64,
    insured_limit: f64,
    tses: f64,
    time_span: f64,
    curve_resolution: usize,
) -> Result<LossCurve> {
    if insured_limit < deductible {
        return Err(Error::config("insured_limit", "must not be below the deductible"));
    }
    event_based(&insured_losses(losses, deductible, insured_limit), tses, time_span, curve_resolution)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insured_losses_boundaries() {
        assert_eq!(insured_losses(&[3.0, 20.0, 101.0], 5.0, 100.0), vec![0.0, 15.0, 95.0]);
        assert_eq!(insured_losses(&[5.0, 100.0], 5.0, 100.0), vec![0.0, 95.0]);
    }

    #[test]
    fn test_event_based_curve_is_monotonic() {
        let losses = [0.12, 0.05, 0.4, 0.05, 0.22, 0.31, 0.01, 0.09];
        let curve = event_based(&losses, 50.0, 50.0, 20).unwrap();
        assert_eq!(curve.len(), 20);
        assert!(curve.is_monotonic(1e-12));
        assert!(curve.poes.iter().all(|p| (0.0..=1.0).contains(p)));
        // the largest loss is never exceeded
        assert_eq!(curve.poes[curve.len() - 1], 0.0);
        assert!((curve.losses[curve.len() - 1] - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_single_distinct_value_collapses() {
        let curve = event_based(&[0.3, 0.3, 0.3], 10.0, 1.0, 5).unwrap();
        assert_eq!(curve.len(), 5);
        assert!(curve.is_monotonic(0.0));
        let one = event_based(&[0.2], 10.0, 1.0, 3).unwrap();
        assert!(one.losses.iter().all(|l| (*l - 0.2).abs() < 1e-12));
    }

    #[test]
    fn test_event_based_rejects_bad_input() {
        assert!(event_based(&[], 1.0, 1.0, 10).is_err());
        assert!(event_based(&[0.1, 0.2], 0.0, 1.0, 10).is_err());
        assert!(event_based(&[0.1, 0.2], 1.0, 1.0, 1).is_err());
        assert!(insured_loss_curve(&[1.0], 10.0, 5.0, 1.0, 1.0, 10).is_err());
    }
}
