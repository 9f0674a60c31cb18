//! Scenario damage and scenario loss over ground-motion realizations.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::vulnerability::{FragilityModel, VulnerabilityFunction};

/// Damage-state fractions, one row per ground-motion value.
pub fn scenario_damage(model: &FragilityModel, gmvs: &[f64]) -> Vec<Vec<f64>> {
    gmvs.iter().map(|gmv| model.damage_fractions(*gmv)).collect()
}

/// Column mean and sample standard deviation (ddof = 1) of an N x M
/// matrix. With a single row the deviation is undefined and reported as NaN.
pub fn mean_std(rows: &[Vec<f64>]) -> (Vec<f64>, Vec<f64>) {
    let n = rows.len();
    let m = rows.first().map(|r| r.len()).unwrap_or(0);
    let mut mean = vec![0.0; m];
    for row in rows {
        for (acc, v) in mean.iter_mut().zip(row) {
            *acc += v;
        }
    }
    for v in mean.iter_mut() {
        *v /= n as f64;
    }
    let std = (0..m)
        .map(|j| {
            if n < 2 {
                return f64::NAN;
            }
            let ss: f64 = rows.iter().map(|r| (r[j] - mean[j]).powi(2)).sum();
            (ss / (n - 1) as f64).sqrt()
        })
        .collect();
    (mean, std)
}

/// Summary of an asset's damage across realizations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamageDistribution {
    pub asset_id: String,
    pub damage_states: Vec<String>,
    /// Mean number of units in each state.
    pub mean: Vec<f64>,
    pub stddev: Vec<f64>,
}

impl DamageDistribution {
    pub fn compute(asset_id: &str, model: &FragilityModel, gmvs: &[f64], number_of_units: f64) -> Result<Self> {
        if gmvs.is_empty() {
            return Err(Error::config("gmvs", format!("no ground-motion values for asset {}", asset_id)));
        }
        let fractions = scenario_damage(model, gmvs);
        let (mean, stddev) = mean_std(&fractions);
        let mut damage_states = vec!["no_damage".to_string()];
        damage_states.extend(model.limit_states.iter().cloned());
        Ok(Self {
            asset_id: asset_id.to_string(),
            damage_states,
            mean: mean.iter().map(|v| v * number_of_units).collect(),
            stddev: stddev.iter().map(|v| v * number_of_units).collect(),
        })
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioLoss {
    pub asset_id: String,
    /// One absolute loss per realization.
    pub losses: Vec<f64>,
    pub mean: f64,
    pub stddev: f64,
}

/// Sampled losses of one asset across realizations, with their mean and
/// sample standard deviation.
pub fn scenario_loss(
    asset_id: &str,
    vf: &VulnerabilityFunction,
    gmvs: &[f64],
    epsilons: &[f64],
    asset_value: f64,
) -> Result<ScenarioLoss> {
    if gmvs.is_empty() {
        return Err(Error::config("gmvs", format!("no ground-motion values for asset {}", asset_id)));
    }
    let losses: Vec<f64> = vf
        .loss_ratios(gmvs, epsilons)?
        .into_iter()
        .map(|lr| lr * asset_value)
        .collect();
    let rows: Vec<Vec<f64>> = losses.iter().map(|l| vec![*l]).collect();
    let (mean, std) = mean_std(&rows);
    Ok(ScenarioLoss { asset_id: asset_id.to_string(), losses, mean: mean[0], stddev: std[0] })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imt::Imt;
    use crate::vulnerability::{Distribution, FragilityFunction};

    #[test]
    fn test_mean_std_uses_sample_deviation() {
        let rows = vec![vec![1.0, 0.0], vec![3.0, 0.0]];
        let (mean, std) = mean_std(&rows);
        assert_eq!(mean, vec![2.0, 0.0]);
        assert!((std[0] - 2f64.sqrt()).abs() < 1e-12);
        assert_eq!(std[1], 0.0);
        assert!(mean_std(&[vec![1.0]]).1[0].is_nan());
    }

    #[test]
    fn test_damage_distribution_scales_units() {
        let model = FragilityModel::new(
            "ff",
            Imt::Pga,
            vec!["slight".into(), "complete".into()],
            vec![
                FragilityFunction::Continuous { mean: 0.2, stddev: 0.05 },
                FragilityFunction::Continuous { mean: 0.5, stddev: 0.1 },
            ],
        )
        .unwrap();
        let dd = DamageDistribution::compute("a1", &model, &[0.1, 0.3, 0.6], 10.0).unwrap();
        assert_eq!(dd.damage_states, vec!["no_damage", "slight", "complete"]);
        assert!((dd.mean.iter().sum::<f64>() - 10.0).abs() < 1e-9);
        assert!(dd.stddev.iter().all(|s| *s >= 0.0));
    }

    #[test]
    fn test_scenario_loss_degenerate() {
        let vf = VulnerabilityFunction::new(
            "vf",
            Imt::Pga,
            vec![0.1, 0.5],
            vec![0.1, 0.5],
            vec![0.0, 0.0],
            Distribution::LogNormal,
        )
        .unwrap();
        let out = scenario_loss("a1", &vf, &[0.1, 0.5], &[0.0, 0.0], 1000.0).unwrap();
        assert_eq!(out.losses, vec![100.0, 500.0]);
        assert!((out.mean - 300.0).abs() < 1e-9);
    }
}
