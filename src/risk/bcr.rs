//! Benefit-cost ratio of a retrofit.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// `(EALo - EALr) · value · (1 - e^(-r t)) / (r · C)`, the discounted
/// benefit of retrofitting over its cost. EALs are loss ratios.
pub fn bcr(
    eal_original: f64,
    eal_retrofitted: f64,
    interest_rate: f64,
    asset_life_expectancy: f64,
    asset_value: f64,
    retrofitting_cost: f64,
) -> f64 {
    (eal_original - eal_retrofitted) * asset_value * (1.0 - (-interest_rate * asset_life_expectancy).exp())
        / (interest_rate * retrofitting_cost)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BcrParams {
    pub interest_rate: f64,
    pub asset_life_expectancy: f64,
}

impl BcrParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.interest_rate > 0.0) {
            return Err(Error::config("interest_rate", "must be positive"));
        }
        if !(self.asset_life_expectancy > 0.0) {
            return Err(Error::config("asset_life_expectancy", "must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BcrResult {
    pub asset_id: String,
    pub eal_original: f64,
    pub eal_retrofitted: f64,
    pub bcr: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bcr_closed_form() {
        let r = 0.05;
        let t = 40.0;
        let value = bcr(0.009, 0.004, r, t, 1000.0, 20.0);
        let expected = 0.005 * 1000.0 * (1.0 - (-2.0f64).exp()) / (0.05 * 20.0);
        assert!((value - expected).abs() < 1e-12);
        // no benefit without a loss reduction
        assert_eq!(bcr(0.01, 0.01, r, t, 1000.0, 20.0), 0.0);
    }

    #[test]
    fn test_params_validation() {
        assert!(BcrParams { interest_rate: 0.0, asset_life_expectancy: 10.0 }.validate().is_err());
        assert!(BcrParams { interest_rate: 0.05, asset_life_expectancy: 10.0 }.validate().is_ok());
    }
}
