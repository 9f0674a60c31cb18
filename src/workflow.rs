//! Calculation drivers: tie a validated [`CalcConfig`] to the hazard and
//! risk calculators, asset by asset.
//!
//! Errors here carry the asset or site that failed on top of the core
//! error, so they are `anyhow` results.

use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::CalcConfig;
use crate::disagg::{disaggregate_site, DisaggResult};
use crate::gmf::GroundMotionFields;
use crate::hazard::{realization_curves, Realization};
use crate::imt::Imt;
use crate::logging::{log, log_asset_result, obj, Domain, Level, ProfileScope};
use crate::probability::ProbabilityMap;
use crate::risk::{
    bcr, classical_with_lrem, event_based, insured_loss_curve, scenario_loss, BcrResult, DamageDistribution,
    LossCurve, ScenarioLoss,
};
use crate::rupture::PoissonTom;
use crate::site::SiteCollection;
use crate::source::Source;
use crate::stats::{
    hazard_statistics, loss_curve_statistics, loss_map_statistics, CurveStatistics, HazardStatistics,
    LossCurveStatistics,
};
use crate::vulnerability::{epsilons, FragilityModel, Lrem, VulnerabilityFunction};

/// Vulnerability functions by taxonomy.
pub type VulnerabilityModel = BTreeMap<String, VulnerabilityFunction>;
/// Fragility models by taxonomy.
pub type FragilityModels = BTreeMap<String, FragilityModel>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: String,
    pub taxonomy: String,
    pub site_id: usize,
    pub value: f64,
    #[serde(default)]
    pub deductible: f64,
    #[serde(default)]
    pub insured_limit: f64,
    #[serde(default)]
    pub retrofitting_cost: Option<f64>,
    #[serde(default = "one")]
    pub number_of_units: f64,
}

fn one() -> f64 {
    1.0
}

impl Asset {
    pub fn new(id: &str, taxonomy: &str, site_id: usize, value: f64) -> Self {
        Self {
            id: id.to_string(),
            taxonomy: taxonomy.to_string(),
            site_id,
            value,
            deductible: 0.0,
            insured_limit: 0.0,
            retrofitting_cost: None,
            number_of_units: 1.0,
        }
    }
}

/// Per-asset output of the classical and event-based loss calculators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetLosses {
    pub asset_id: String,
    pub loss_ratio_curve: LossCurve,
    /// Absolute losses.
    pub loss_curve: LossCurve,
    pub average_loss: f64,
    /// (poe, absolute loss) per configured conditional-loss poe.
    pub loss_map: Vec<(f64, f64)>,
    pub insured_curve: Option<LossCurve>,
}

impl AssetLosses {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

fn vulnerability<'a>(model: &'a VulnerabilityModel, asset: &Asset, imt: &Imt) -> Result<&'a VulnerabilityFunction> {
    let vf = model
        .get(&asset.taxonomy)
        .ok_or_else(|| anyhow!("no vulnerability function for taxonomy `{}`", asset.taxonomy))?;
    vf.check_imt(imt)?;
    Ok(vf)
}

fn asset_losses(asset: &Asset, ratio_curve: LossCurve, insured_curve: Option<LossCurve>, cfg: &CalcConfig) -> AssetLosses {
    let loss_curve = ratio_curve.scaled(asset.value);
    let loss_map = cfg
        .conditional_loss_poes
        .iter()
        .map(|poe| (*poe, loss_curve.conditional_loss(*poe)))
        .collect();
    AssetLosses {
        asset_id: asset.id.clone(),
        average_loss: loss_curve.average_loss(),
        loss_ratio_curve: ratio_curve,
        loss_curve,
        loss_map,
        insured_curve,
    }
}

// =============================================================================
// Hazard
// =============================================================================

#[derive(Debug, Clone)]
pub struct HazardOutputs {
    /// One single-column map per realization.
    pub realizations: Vec<ProbabilityMap>,
    pub weights: Vec<f64>,
    pub statistics: Option<HazardStatistics>,
}

/// Curves for every realization plus, with more than one, their mean and
/// configured quantiles. Sampled realizations are weighted equally.
pub fn classical_hazard(
    cfg: &CalcConfig,
    sources: &[Source],
    sites: &SiteCollection,
    realizations: &[Realization],
    abort: Option<&AtomicBool>,
) -> Result<HazardOutputs> {
    cfg.validate()?;
    if realizations.is_empty() {
        return Err(anyhow!("no logic-tree realizations"));
    }
    let filter = cfg.maximum_distance();
    let maps = realization_curves(
        sources,
        sites,
        realizations,
        &cfg.imtls,
        cfg.truncation_level,
        cfg.investigation_time,
        &filter,
        abort,
    )
    .context("computing hazard curves")?;
    let weights: Vec<f64> = realizations.iter().map(|r| r.weight).collect();
    let statistics = if maps.len() > 1 {
        let w = if cfg.sampling() { None } else { Some(weights.as_slice()) };
        Some(hazard_statistics(&maps, w, &cfg.quantile_hazard_curves).context("hazard statistics")?)
    } else {
        None
    };
    Ok(HazardOutputs { realizations: maps, weights, statistics })
}

/// Disaggregation of one realization at every configured poe, for every
/// site with a non-zero curve.
pub fn disaggregation(
    cfg: &CalcConfig,
    sources: &[Source],
    sites: &SiteCollection,
    realization: &Realization,
    pmap: &ProbabilityMap,
    imt: &Imt,
    abort: Option<&AtomicBool>,
) -> Result<Vec<DisaggResult>> {
    cfg.validate()?;
    let levels = cfg
        .imtls
        .levels(imt)
        .ok_or_else(|| anyhow!("IMT {} has no hazard levels", imt))?;
    let filter = cfg.maximum_distance();
    let tom = PoissonTom::new(cfg.investigation_time);
    let bins = cfg.disagg_bins();
    let sources = realization.apply(sources);
    let mut out = Vec::new();
    for site in sites {
        let curve = pmap
            .imt_poes(&cfg.imtls, imt, site.id, 0)
            .with_context(|| format!("hazard curve of site {}", site.id))?;
        for poe in &cfg.poes_disagg {
            let result = disaggregate_site(
                &sources,
                site,
                imt,
                levels,
                &curve,
                *poe,
                &realization.gsims,
                &tom,
                cfg.truncation_level,
                &bins,
                &filter,
                abort,
            )
            .with_context(|| format!("disaggregating site {} at poe {}", site.id, poe))?;
            out.extend(result);
        }
    }
    Ok(out)
}

// =============================================================================
// Classical risk
// =============================================================================

/// Loss curves from the hazard curves at each asset's site. One LREM is
/// built per taxonomy and shared by its assets.
pub fn classical_risk(
    cfg: &CalcConfig,
    assets: &[Asset],
    model: &VulnerabilityModel,
    hazard: &ProbabilityMap,
    imt: &Imt,
) -> Result<Vec<AssetLosses>> {
    cfg.validate()?;
    let _prof = ProfileScope::with_context("classical_risk", &[("assets", json!(assets.len()))]);
    let imls = cfg
        .imtls
        .levels(imt)
        .ok_or_else(|| anyhow!("IMT {} has no hazard levels", imt))?;
    let mut lrems: BTreeMap<String, Lrem> = BTreeMap::new();
    let mut out = Vec::with_capacity(assets.len());
    for asset in assets {
        let vf = vulnerability(model, asset, imt).with_context(|| format!("asset {}", asset.id))?;
        if !lrems.contains_key(&asset.taxonomy) {
            let lrem = vf
                .loss_ratio_exceedance_matrix(cfg.lrem_steps_per_interval)
                .with_context(|| format!("loss ratio exceedance matrix of `{}`", asset.taxonomy))?;
            lrems.insert(asset.taxonomy.clone(), lrem);
        }
        let lrem = lrems
            .get(&asset.taxonomy)
            .ok_or_else(|| anyhow!("missing matrix for `{}`", asset.taxonomy))?;
        let poes = hazard
            .imt_poes(&cfg.imtls, imt, asset.site_id, 0)
            .with_context(|| format!("hazard curve of site {} for asset {}", asset.site_id, asset.id))?;
        let curve = classical_with_lrem(vf, lrem, imls, &poes).with_context(|| format!("asset {}", asset.id))?;
        let result = asset_losses(asset, curve, None, cfg);
        log_asset_result("classical", &asset.id, result.average_loss);
        out.push(result);
    }
    Ok(out)
}

/// Benefit-cost ratio of retrofitting each asset, comparing the average
/// loss ratios under the original and the retrofitted vulnerability.
pub fn classical_bcr(
    cfg: &CalcConfig,
    assets: &[Asset],
    original: &VulnerabilityModel,
    retrofitted: &VulnerabilityModel,
    hazard: &ProbabilityMap,
    imt: &Imt,
) -> Result<Vec<BcrResult>> {
    let before = classical_risk(cfg, assets, original, hazard, imt).context("original vulnerability")?;
    let after = classical_risk(cfg, assets, retrofitted, hazard, imt).context("retrofitted vulnerability")?;
    let params = cfg.bcr_params();
    assets
        .iter()
        .zip(before.iter().zip(&after))
        .map(|(asset, (o, r))| {
            let cost = asset
                .retrofitting_cost
                .ok_or_else(|| anyhow!("asset {} has no retrofitting cost", asset.id))?;
            let eal_original = o.loss_ratio_curve.average_loss();
            let eal_retrofitted = r.loss_ratio_curve.average_loss();
            let ratio = bcr(
                eal_original,
                eal_retrofitted,
                params.interest_rate,
                params.asset_life_expectancy,
                asset.value,
                cost,
            );
            log_asset_result("classical_bcr", &asset.id, ratio);
            Ok(BcrResult { asset_id: asset.id.clone(), eal_original, eal_retrofitted, bcr: ratio })
        })
        .collect()
}

// =============================================================================
// Ground-motion driven risk
// =============================================================================

fn site_gmvs<'a>(gmfs: &'a GroundMotionFields, imt: &Imt, asset: &Asset) -> Result<&'a [f64]> {
    gmfs.site(imt, asset.site_id)
        .ok_or_else(|| anyhow!("no {} ground motion at site {} for asset {}", imt, asset.site_id, asset.id))
}

fn asset_epsilons(cfg: &CalcConfig, gmfs: &GroundMotionFields, num_assets: usize) -> Result<Vec<Vec<f64>>> {
    let num_samples = gmfs.values.first().and_then(|v| v.first()).map(|r| r.len()).unwrap_or(0);
    Ok(epsilons(num_assets, num_samples, cfg.master_seed, cfg.asset_correlation)?)
}

/// Loss curves from ground-motion fields of a stochastic event set
/// spanning `tses` years, one field per event. Epsilons are drawn once per
/// asset and event from the master seed.
pub fn event_based_risk(
    cfg: &CalcConfig,
    assets: &[Asset],
    model: &VulnerabilityModel,
    gmfs: &GroundMotionFields,
    imt: &Imt,
    tses: f64,
) -> Result<Vec<AssetLosses>> {
    cfg.validate()?;
    let _prof = ProfileScope::with_context("event_based_risk", &[("assets", json!(assets.len()))]);
    let eps = asset_epsilons(cfg, gmfs, assets.len())?;
    let mut out = Vec::with_capacity(assets.len());
    for (asset, asset_eps) in assets.iter().zip(&eps) {
        let vf = vulnerability(model, asset, imt).with_context(|| format!("asset {}", asset.id))?;
        let gmvs = site_gmvs(gmfs, imt, asset)?;
        let ratios = vf.loss_ratios(gmvs, asset_eps).with_context(|| format!("asset {}", asset.id))?;
        let curve = event_based(&ratios, tses, cfg.investigation_time, cfg.loss_curve_resolution)
            .with_context(|| format!("loss curve of asset {}", asset.id))?;
        let insured = if cfg.insured_losses {
            let losses: Vec<f64> = ratios.iter().map(|r| r * asset.value).collect();
            Some(
                insured_loss_curve(
                    &losses,
                    asset.deductible,
                    asset.insured_limit,
                    tses,
                    cfg.investigation_time,
                    cfg.loss_curve_resolution,
                )
                .with_context(|| format!("insured loss curve of asset {}", asset.id))?,
            )
        } else {
            None
        };
        let result = asset_losses(asset, curve, insured, cfg);
        log_asset_result("event_based", &asset.id, result.average_loss);
        out.push(result);
    }
    Ok(out)
}

/// Damage distribution per asset over the scenario's ground-motion fields.
pub fn scenario_damage(
    assets: &[Asset],
    models: &FragilityModels,
    gmfs: &GroundMotionFields,
    imt: &Imt,
) -> Result<Vec<DamageDistribution>> {
    let mut out = Vec::with_capacity(assets.len());
    let mut totals: Vec<f64> = Vec::new();
    for asset in assets {
        let model = models
            .get(&asset.taxonomy)
            .ok_or_else(|| anyhow!("no fragility model for taxonomy `{}`", asset.taxonomy))?;
        model.check_imt(imt).with_context(|| format!("asset {}", asset.id))?;
        let gmvs = site_gmvs(gmfs, imt, asset)?;
        let dist = DamageDistribution::compute(&asset.id, model, gmvs, asset.number_of_units)?;
        if totals.len() < dist.mean.len() {
            totals.resize(dist.mean.len(), 0.0);
        }
        for (t, m) in totals.iter_mut().zip(&dist.mean) {
            *t += m;
        }
        out.push(dist);
    }
    log(
        Level::Info,
        Domain::Risk,
        "scenario_damage_done",
        obj(&[("assets", json!(assets.len())), ("units_per_state", json!(totals))]),
    );
    Ok(out)
}

/// Sampled losses per asset over the scenario's ground-motion fields.
pub fn scenario_losses(
    cfg: &CalcConfig,
    assets: &[Asset],
    model: &VulnerabilityModel,
    gmfs: &GroundMotionFields,
    imt: &Imt,
) -> Result<Vec<ScenarioLoss>> {
    cfg.validate()?;
    let eps = asset_epsilons(cfg, gmfs, assets.len())?;
    assets
        .iter()
        .zip(&eps)
        .map(|(asset, asset_eps)| {
            let vf = vulnerability(model, asset, imt).with_context(|| format!("asset {}", asset.id))?;
            let gmvs = site_gmvs(gmfs, imt, asset)?;
            let loss = scenario_loss(&asset.id, vf, gmvs, asset_eps, asset.value)
                .with_context(|| format!("asset {}", asset.id))?;
            log_asset_result("scenario", &asset.id, loss.mean);
            Ok(loss)
        })
        .collect()
}

// =============================================================================
// Statistics
// =============================================================================

/// Statistics of one asset across realizations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetStatistics {
    pub asset_id: String,
    pub curves: LossCurveStatistics,
    /// Conditional-loss poes, in the order of the loss map columns.
    pub poes: Vec<f64>,
    /// Mean and quantile absolute losses at `poes`.
    pub loss_map: CurveStatistics,
}

/// Mean and quantile loss-ratio curves and loss maps per asset across
/// realizations. `per_realization[r]` holds the assets of realization `r`
/// in a common order; event-based curves are normalized onto one loss axis
/// first.
pub fn loss_statistics(
    cfg: &CalcConfig,
    per_realization: &[Vec<AssetLosses>],
    weights: &[f64],
    normalize: bool,
) -> Result<Vec<AssetStatistics>> {
    let first = per_realization.first().ok_or_else(|| anyhow!("no realizations"))?;
    let w = if cfg.sampling() { None } else { Some(weights) };
    (0..first.len())
        .map(|k| {
            let assets: Vec<&AssetLosses> = per_realization
                .iter()
                .map(|rlz| rlz.get(k).ok_or_else(|| anyhow!("realization is missing asset #{}", k)))
                .collect::<Result<_>>()?;
            let asset_id = first[k].asset_id.clone();
            let curves: Vec<LossCurve> = assets.iter().map(|a| a.loss_ratio_curve.clone()).collect();
            let curve_stats = loss_curve_statistics(&curves, w, &cfg.quantile_loss_curves, normalize)
                .with_context(|| format!("statistics of asset {}", asset_id))?;

            let poes: Vec<f64> = first[k].loss_map.iter().map(|(poe, _)| *poe).collect();
            let maps: Vec<Vec<f64>> = assets.iter().map(|a| a.loss_map.iter().map(|(_, l)| *l).collect()).collect();
            let map_stats = loss_map_statistics(&maps, w, &cfg.quantile_loss_curves)
                .with_context(|| format!("loss map statistics of asset {}", asset_id))?;
            Ok(AssetStatistics { asset_id, curves: curve_stats, poes, loss_map: map_stats })
        })
        .collect()
}
