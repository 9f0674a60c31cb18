//! Calculation parameters.
//!
//! Built once per run (defaults, then an optional `QR_*` environment
//! overlay), validated, then passed by reference to every entry point.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::disagg::DisaggBins;
use crate::error::{Error, Result};
use crate::hazard::MaximumDistance;
use crate::imt::{Imt, Imtls, DEFAULT_SA_DAMPING};
use crate::risk::BcrParams;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalcConfig {
    /// Years.
    pub investigation_time: f64,
    /// Standard deviations; None leaves the ground-motion distribution
    /// untruncated.
    pub truncation_level: Option<f64>,
    pub imtls: Imtls,
    /// Integration distance in km for tectonic regions without an entry in
    /// `maximum_distance_by_trt`.
    pub maximum_distance: f64,
    pub maximum_distance_by_trt: BTreeMap<String, f64>,
    /// 0 means full enumeration of the logic tree.
    pub number_of_logic_tree_samples: usize,
    pub conditional_loss_poes: Vec<f64>,
    pub quantile_hazard_curves: Vec<f64>,
    pub quantile_loss_curves: Vec<f64>,
    pub loss_curve_resolution: usize,
    pub lrem_steps_per_interval: usize,
    pub insured_losses: bool,
    pub default_sa_damping: f64,

    pub poes_disagg: Vec<f64>,
    pub mag_bin_width: f64,
    pub distance_bin_width: f64,
    pub coordinate_bin_width: f64,
    pub num_epsilon_bins: usize,

    pub master_seed: u64,
    /// Correlation of sampled loss-ratio epsilons across assets.
    pub asset_correlation: f64,

    pub interest_rate: f64,
    pub asset_life_expectancy: f64,
}

impl Default for CalcConfig {
    fn default() -> Self {
        Self {
            investigation_time: 50.0,
            truncation_level: Some(3.0),
            imtls: Imtls::default(),
            maximum_distance: 200.0,
            maximum_distance_by_trt: BTreeMap::new(),
            number_of_logic_tree_samples: 0,
            conditional_loss_poes: vec![0.1, 0.02],
            quantile_hazard_curves: Vec::new(),
            quantile_loss_curves: Vec::new(),
            loss_curve_resolution: 50,
            lrem_steps_per_interval: 2,
            insured_losses: false,
            default_sa_damping: DEFAULT_SA_DAMPING,
            poes_disagg: Vec::new(),
            mag_bin_width: 0.5,
            distance_bin_width: 10.0,
            coordinate_bin_width: 1.0,
            num_epsilon_bins: 6,
            master_seed: 42,
            asset_correlation: 0.0,
            interest_rate: 0.05,
            asset_life_expectancy: 50.0,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_list(key: &str) -> Option<Vec<f64>> {
    std::env::var(key).ok().and_then(|v| {
        v.split(',')
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.trim().parse().ok())
            .collect()
    })
}

impl CalcConfig {
    /// Defaults overlaid with `QR_*` environment variables. Unparseable
    /// values fall back to the default.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            investigation_time: env_parse("QR_INVESTIGATION_TIME").unwrap_or(d.investigation_time),
            truncation_level: match std::env::var("QR_TRUNCATION_LEVEL").as_deref() {
                Ok("none") => None,
                Ok(v) => v.parse().ok().or(d.truncation_level),
                Err(_) => d.truncation_level,
            },
            imtls: d.imtls,
            maximum_distance: env_parse("QR_MAXIMUM_DISTANCE").unwrap_or(d.maximum_distance),
            maximum_distance_by_trt: d.maximum_distance_by_trt,
            number_of_logic_tree_samples: env_parse("QR_LT_SAMPLES").unwrap_or(d.number_of_logic_tree_samples),
            conditional_loss_poes: env_list("QR_CONDITIONAL_LOSS_POES").unwrap_or(d.conditional_loss_poes),
            quantile_hazard_curves: env_list("QR_QUANTILE_HAZARD_CURVES").unwrap_or(d.quantile_hazard_curves),
            quantile_loss_curves: env_list("QR_QUANTILE_LOSS_CURVES").unwrap_or(d.quantile_loss_curves),
            loss_curve_resolution: env_parse("QR_LOSS_CURVE_RESOLUTION").unwrap_or(d.loss_curve_resolution),
            lrem_steps_per_interval: env_parse("QR_LREM_STEPS").unwrap_or(d.lrem_steps_per_interval),
            insured_losses: std::env::var("QR_INSURED_LOSSES")
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(d.insured_losses),
            default_sa_damping: env_parse("QR_SA_DAMPING").unwrap_or(d.default_sa_damping),
            poes_disagg: env_list("QR_POES_DISAGG").unwrap_or(d.poes_disagg),
            mag_bin_width: env_parse("QR_MAG_BIN_WIDTH").unwrap_or(d.mag_bin_width),
            distance_bin_width: env_parse("QR_DISTANCE_BIN_WIDTH").unwrap_or(d.distance_bin_width),
            coordinate_bin_width: env_parse("QR_COORDINATE_BIN_WIDTH").unwrap_or(d.coordinate_bin_width),
            num_epsilon_bins: env_parse("QR_NUM_EPSILON_BINS").unwrap_or(d.num_epsilon_bins),
            master_seed: env_parse("QR_MASTER_SEED").unwrap_or(d.master_seed),
            asset_correlation: env_parse("QR_ASSET_CORRELATION").unwrap_or(d.asset_correlation),
            interest_rate: env_parse("QR_INTEREST_RATE").unwrap_or(d.interest_rate),
            asset_life_expectancy: env_parse("QR_ASSET_LIFE_EXPECTANCY").unwrap_or(d.asset_life_expectancy),
        }
    }

    pub fn with_imtls(mut self, imtls: Imtls) -> Self {
        self.imtls = imtls;
        self
    }

    /// Adds levels for an IMT given by name, e.g. `SA(0.2)`, using the
    /// configured default damping.
    pub fn add_imt(&mut self, name: &str, levels: Vec<f64>) -> Result<Imt> {
        let imt = Imt::parse(name, self.default_sa_damping)?;
        self.imtls.insert(imt, levels)?;
        Ok(imt)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.investigation_time > 0.0) {
            return Err(Error::config("investigation_time", "must be positive"));
        }
        if let Some(t) = self.truncation_level {
            if !(t >= 0.0) {
                return Err(Error::config("truncation_level", "must be non-negative"));
            }
        }
        if !(self.maximum_distance > 0.0) || self.maximum_distance_by_trt.values().any(|d| !(*d > 0.0)) {
            return Err(Error::config("maximum_distance", "must be positive"));
        }
        let unit = |p: &f64| (0.0..=1.0).contains(p);
        if !self.conditional_loss_poes.iter().all(unit) {
            return Err(Error::config("conditional_loss_poes", "must be within [0, 1]"));
        }
        if !self.quantile_hazard_curves.iter().all(unit) {
            return Err(Error::config("quantile_hazard_curves", "must be within [0, 1]"));
        }
        if !self.quantile_loss_curves.iter().all(unit) {
            return Err(Error::config("quantile_loss_curves", "must be within [0, 1]"));
        }
        if !self.poes_disagg.iter().all(|p| *p > 0.0 && *p < 1.0) {
            return Err(Error::config("poes_disagg", "must be within (0, 1)"));
        }
        if self.loss_curve_resolution < 2 {
            return Err(Error::config("loss_curve_resolution", "must be at least 2"));
        }
        if self.lrem_steps_per_interval == 0 {
            return Err(Error::config("lrem_steps_per_interval", "must be at least 1"));
        }
        if !(self.default_sa_damping > 0.0) {
            return Err(Error::config("default_sa_damping", "must be positive"));
        }
        if !(0.0..=1.0).contains(&self.asset_correlation) {
            return Err(Error::config("asset_correlation", "must be within [0, 1]"));
        }
        self.disagg_bins().validate()?;
        self.bcr_params().validate()?;
        Ok(())
    }

    pub fn maximum_distance(&self) -> MaximumDistance {
        MaximumDistance::from_map(self.maximum_distance, &self.maximum_distance_by_trt)
    }

    pub fn disagg_bins(&self) -> DisaggBins {
        DisaggBins {
            mag_bin_width: self.mag_bin_width,
            distance_bin_width: self.distance_bin_width,
            coordinate_bin_width: self.coordinate_bin_width,
            num_epsilon_bins: self.num_epsilon_bins,
        }
    }

    pub fn bcr_params(&self) -> BcrParams {
        BcrParams { interest_rate: self.interest_rate, asset_life_expectancy: self.asset_life_expectancy }
    }

    /// Realizations are sampled, so statistics weigh them equally.
    pub fn sampling(&self) -> bool {
        self.number_of_logic_tree_samples > 0
    }

    /// SHA-256 of the JSON form, stable across runs with equal parameters.
    pub fn fingerprint(&self) -> String {
        let canonical = serde_json::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(CalcConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validation_names_parameter() {
        let cfg = CalcConfig { loss_curve_resolution: 1, ..CalcConfig::default() };
        match cfg.validate() {
            Err(Error::Config { param, .. }) => assert_eq!(param, "loss_curve_resolution"),
            other => panic!("unexpected {:?}", other),
        }
        let cfg = CalcConfig { mag_bin_width: 0.0, ..CalcConfig::default() };
        assert!(cfg.validate().unwrap_err().to_string().contains("mag_bin_width"));
        let cfg = CalcConfig { asset_correlation: 1.5, ..CalcConfig::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_add_imt_uses_default_damping() {
        let mut cfg = CalcConfig { default_sa_damping: 2.0, ..CalcConfig::default() };
        let imt = cfg.add_imt("SA(0.2)", vec![0.1, 0.2]).unwrap();
        assert_eq!(imt, Imt::Sa { period: 0.2, damping: 2.0 });
        assert!(cfg.add_imt("SA(0.2)", vec![0.1]).is_err());
    }

    #[test]
    fn test_fingerprint_tracks_parameters() {
        let a = CalcConfig::default();
        let b = CalcConfig::default();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
        let c = CalcConfig { master_seed: 7, ..CalcConfig::default() };
        assert_ne!(a.fingerprint(), c.fingerprint());
    }
}
