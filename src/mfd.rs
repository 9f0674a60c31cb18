//! Magnitude-frequency distributions and magnitude scaling relationships.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Mfd {
    /// Gutenberg-Richter relation truncated at both ends; `a` is the
    /// cumulative annual rate intercept.
    TruncatedGr {
        a_val: f64,
        b_val: f64,
        min_mag: f64,
        max_mag: f64,
        bin_width: f64,
    },
    /// Explicit annual rates for bins centred on `min_mag + i * bin_width`.
    EvenlyDiscretized {
        min_mag: f64,
        bin_width: f64,
        occurrence_rates: Vec<f64>,
    },
}

impl Mfd {
    pub fn check(&self) -> Result<()> {
        match self {
            Mfd::TruncatedGr { b_val, min_mag, max_mag, bin_width, .. } => {
                if *bin_width <= 0.0 {
                    return Err(Error::config("mfd.bin_width", "must be positive"));
                }
                if *b_val <= 0.0 {
                    return Err(Error::config("mfd.b_val", "must be positive"));
                }
                if max_mag - min_mag < *bin_width {
                    return Err(Error::config("mfd.max_mag", "range must span at least one bin"));
                }
            }
            Mfd::EvenlyDiscretized { bin_width, occurrence_rates, .. } => {
                if *bin_width <= 0.0 {
                    return Err(Error::config("mfd.bin_width", "must be positive"));
                }
                if occurrence_rates.is_empty() || occurrence_rates.iter().any(|r| *r < 0.0) {
                    return Err(Error::config("mfd.occurrence_rates", "must be non-empty and non-negative"));
                }
            }
        }
        Ok(())
    }

    /// Centre magnitudes of the first and last bins.
    pub fn min_max_mag(&self) -> (f64, f64) {
        match self {
            Mfd::TruncatedGr { min_mag, max_mag, bin_width, .. } => {
                let lo = (min_mag / bin_width).round() * bin_width + bin_width / 2.0;
                let hi = (max_mag / bin_width).round() * bin_width - bin_width / 2.0;
                (lo, hi)
            }
            Mfd::EvenlyDiscretized { min_mag, bin_width, occurrence_rates } => {
                (*min_mag, min_mag + bin_width * (occurrence_rates.len().saturating_sub(1)) as f64)
            }
        }
    }

    /// (magnitude, annual rate) pairs, one per bin.
    pub fn rates(&self) -> Vec<(f64, f64)> {
        match self {
            Mfd::TruncatedGr { a_val, b_val, bin_width, .. } => {
                let (lo, hi) = self.min_max_mag();
                let n = ((hi - lo) / bin_width).round() as usize + 1;
                (0..n)
                    .map(|i| {
                        let mag = lo + i as f64 * bin_width;
                        let lower = 10f64.powf(a_val - b_val * (mag - bin_width / 2.0));
                        let upper = 10f64.powf(a_val - b_val * (mag + bin_width / 2.0));
                        (mag, lower - upper)
                    })
                    .collect()
            }
            Mfd::EvenlyDiscretized { min_mag, bin_width, occurrence_rates } => occurrence_rates
                .iter()
                .enumerate()
                .map(|(i, rate)| (min_mag + i as f64 * bin_width, *rate))
                .collect(),
        }
    }

    pub fn total_rate(&self) -> f64 {
        self.rates().iter().map(|(_, r)| r).sum()
    }
}

// =============================================================================
// Magnitude scaling
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MagScaling {
    /// Wells & Coppersmith (1994) magnitude-area, rake dependent.
    Wc1994,
    /// PEER test relation, area = 10^(M - 4).
    Peer,
}

impl MagScaling {
    /// Median rupture area in km².
    pub fn median_area(&self, mag: f64, rake: Option<f64>) -> f64 {
        match self {
            MagScaling::Peer => 10f64.powf(mag - 4.0),
            MagScaling::Wc1994 => match rake {
                None => 10f64.powf(-3.49 + 0.91 * mag),
                Some(rake) if (-45.0..=45.0).contains(&rake) || rake >= 135.0 || rake <= -135.0 => {
                    10f64.powf(-3.42 + 0.90 * mag)
                }
                Some(rake) if rake > 0.0 => 10f64.powf(-3.99 + 0.98 * mag),
                Some(_) => 10f64.powf(-2.87 + 0.82 * mag),
            },
        }
    }

    /// Standard deviation of log10(area).
    pub fn std_dev(&self, rake: Option<f64>) -> f64 {
        match self {
            MagScaling::Peer => 0.25,
            MagScaling::Wc1994 => match rake {
                None => 0.24,
                Some(rake) if (-45.0..=45.0).contains(&rake) || rake >= 135.0 || rake <= -135.0 => 0.22,
                Some(rake) if rake > 0.0 => 0.26,
                Some(_) => 0.22,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncated_gr_bins() {
        let mfd = Mfd::TruncatedGr { a_val: 4.0, b_val: 1.0, min_mag: 5.0, max_mag: 6.0, bin_width: 0.1 };
        mfd.check().unwrap();
        let rates = mfd.rates();
        assert_eq!(rates.len(), 10);
        assert!((rates[0].0 - 5.05).abs() < 1e-9);
        assert!((rates[9].0 - 5.95).abs() < 1e-9);
        // Bin rates telescope to the cumulative difference
        let total: f64 = rates.iter().map(|(_, r)| r).sum();
        let expected = 10f64.powf(4.0 - 5.0) - 10f64.powf(4.0 - 6.0);
        assert!((total - expected).abs() < 1e-12);
    }

    #[test]
    fn test_evenly_discretized() {
        let mfd = Mfd::EvenlyDiscretized { min_mag: 5.0, bin_width: 0.5, occurrence_rates: vec![0.1, 0.05, 0.01] };
        assert_eq!(mfd.min_max_mag(), (5.0, 6.0));
        assert_eq!(mfd.rates()[2], (6.0, 0.01));
        assert!(Mfd::EvenlyDiscretized { min_mag: 5.0, bin_width: 0.5, occurrence_rates: vec![] }
            .check()
            .is_err());
    }

    #[test]
    fn test_wc1994_by_rake() {
        let m = 6.0;
        assert!((MagScaling::Wc1994.median_area(m, None) - 10f64.powf(-3.49 + 5.46)).abs() < 1e-9);
        assert!((MagScaling::Wc1994.median_area(m, Some(0.0)) - 10f64.powf(-3.42 + 5.4)).abs() < 1e-9);
        assert!((MagScaling::Wc1994.median_area(m, Some(90.0)) - 10f64.powf(-3.99 + 5.88)).abs() < 1e-9);
        assert!((MagScaling::Wc1994.median_area(m, Some(-90.0)) - 10f64.powf(-2.87 + 4.92)).abs() < 1e-9);
        assert_eq!(MagScaling::Peer.median_area(5.0, None), 10.0);
    }
}
