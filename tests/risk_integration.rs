//! Risk end to end: hazard curves and ground-motion fields through
//! vulnerability and fragility models to loss curves, damage and ratios.

use std::collections::BTreeMap;

use quakerisk::config::CalcConfig;
use quakerisk::geo::Point;
use quakerisk::gmf::{ground_motion_fields, GroundMotionFields, Jb2009};
use quakerisk::gsim::LinearAttenuation;
use quakerisk::imt::{Imt, Imtls};
use quakerisk::probability::ProbabilityMap;
use quakerisk::risk::{classical, conditional_loss_ratio, event_based, insured_losses, LossCurve};
use quakerisk::rupture::{Occurrence, Rupture, RuptureSurface};
use quakerisk::site::{Site, SiteCollection};
use quakerisk::vulnerability::{Distribution, FragilityFunction, FragilityModel, VulnerabilityFunction};
use quakerisk::workflow::{
    classical_bcr, classical_risk, event_based_risk, loss_statistics, scenario_damage, scenario_losses, Asset,
    FragilityModels, VulnerabilityModel,
};

const HAZARD_IMLS: [f64; 7] = [0.01, 0.08, 0.17, 0.26, 0.36, 0.55, 0.70];
const HAZARD_POES: [f64; 7] = [0.99, 0.96, 0.89, 0.82, 0.70, 0.40, 0.01];

fn reference_vf() -> VulnerabilityFunction {
    VulnerabilityFunction::new(
        "RC",
        Imt::Pga,
        vec![0.1, 0.2, 0.4, 0.6],
        vec![0.05, 0.08, 0.2, 0.4],
        vec![0.5, 0.3, 0.2, 0.1],
        Distribution::LogNormal,
    )
    .unwrap()
}

fn retrofitted_vf() -> VulnerabilityFunction {
    VulnerabilityFunction::new(
        "RC",
        Imt::Pga,
        vec![0.1, 0.2, 0.4, 0.6],
        vec![0.02, 0.04, 0.1, 0.2],
        vec![0.5, 0.3, 0.2, 0.1],
        Distribution::LogNormal,
    )
    .unwrap()
}

fn model(vf: VulnerabilityFunction) -> VulnerabilityModel {
    let mut m = BTreeMap::new();
    m.insert("RC".to_string(), vf);
    m
}

fn hazard_config() -> CalcConfig {
    CalcConfig::default().with_imtls(Imtls::from_pairs(vec![(Imt::Pga, HAZARD_IMLS.to_vec())]).unwrap())
}

fn hazard_map() -> ProbabilityMap {
    let mut pmap = ProbabilityMap::new(HAZARD_IMLS.len(), 1);
    pmap.setdefault(0).combine_poes(0, 0, &HAZARD_POES);
    pmap
}

fn poe_at(curve: &LossCurve, loss: f64) -> f64 {
    let k = curve
        .losses
        .iter()
        .position(|l| (l - loss).abs() < 1e-9)
        .unwrap_or_else(|| panic!("loss {} not on the curve", loss));
    curve.poes[k]
}

fn fields(site_values: Vec<Vec<f64>>) -> GroundMotionFields {
    GroundMotionFields {
        imts: vec![Imt::Pga],
        site_ids: (0..site_values.len()).collect(),
        values: vec![site_values],
    }
}

#[test]
fn test_classical_reference_curve() {
    let curve = classical(&reference_vf(), &HAZARD_IMLS, &HAZARD_POES, 2).unwrap();
    let expected = [(0.0, 0.96), (0.05, 0.91), (0.08, 0.83), (0.2, 0.60), (0.4, 0.23), (0.7, 0.0), (1.0, 0.0)];
    for (loss, poe) in expected {
        let got = poe_at(&curve, loss);
        assert!((got - poe).abs() < 0.005, "loss ratio {}: {} vs {}", loss, got, poe);
    }
    assert!(curve.is_monotonic(1e-12));
    assert_eq!(curve.losses.first().copied(), Some(0.0));
    assert_eq!(curve.losses.last().copied(), Some(1.0));
}

#[test]
fn test_classical_workflow_matches_direct_call() {
    let cfg = hazard_config();
    let asset = Asset::new("a1", "RC", 0, 2000.0);
    let out = classical_risk(&cfg, &[asset], &model(reference_vf()), &hazard_map(), &Imt::Pga).unwrap();
    assert_eq!(out.len(), 1);
    let direct = classical(&reference_vf(), &HAZARD_IMLS, &HAZARD_POES, cfg.lrem_steps_per_interval).unwrap();
    assert_eq!(out[0].loss_ratio_curve, direct);
    assert!((out[0].average_loss - 2000.0 * direct.average_loss()).abs() < 1e-9);
    assert_eq!(out[0].loss_map.len(), cfg.conditional_loss_poes.len());
    for (poe, loss) in &out[0].loss_map {
        assert!(*loss >= 0.0 && *loss <= 2000.0, "poe {}: loss {}", poe, loss);
    }
    // rarer poe, larger loss
    assert!(out[0].loss_map[1].1 >= out[0].loss_map[0].1);
}

#[test]
fn test_missing_taxonomy_names_the_asset() {
    let cfg = hazard_config();
    let asset = Asset::new("a9", "URM", 0, 100.0);
    let err = classical_risk(&cfg, &[asset], &model(reference_vf()), &hazard_map(), &Imt::Pga).unwrap_err();
    let text = format!("{:#}", err);
    assert!(text.contains("a9") && text.contains("URM"), "{}", text);
}

#[test]
fn test_imt_mismatch_is_rejected() {
    let cfg = hazard_config();
    let vf = VulnerabilityFunction::new("RC", Imt::sa(1.0), vec![0.1, 0.2], vec![0.1, 0.2], vec![0.0, 0.0], Distribution::LogNormal)
        .unwrap();
    let asset = Asset::new("a1", "RC", 0, 100.0);
    assert!(classical_risk(&cfg, &[asset], &model(vf), &hazard_map(), &Imt::Pga).is_err());
}

#[test]
fn test_retrofit_benefit_cost_ratio() {
    let cfg = hazard_config();
    let mut asset = Asset::new("a1", "RC", 0, 1000.0);
    asset.retrofitting_cost = Some(50.0);
    let out = classical_bcr(
        &cfg,
        &[asset.clone()],
        &model(reference_vf()),
        &model(retrofitted_vf()),
        &hazard_map(),
        &Imt::Pga,
    )
    .unwrap();
    assert_eq!(out.len(), 1);
    assert!(out[0].eal_original > out[0].eal_retrofitted);
    let r = cfg.interest_rate;
    let t = cfg.asset_life_expectancy;
    let expected = (out[0].eal_original - out[0].eal_retrofitted) * 1000.0 * (1.0 - (-r * t).exp()) / (r * 50.0);
    assert!((out[0].bcr - expected).abs() < 1e-9);

    asset.retrofitting_cost = None;
    assert!(classical_bcr(&cfg, &[asset], &model(reference_vf()), &model(retrofitted_vf()), &hazard_map(), &Imt::Pga)
        .is_err());
}

#[test]
fn test_insured_losses_contract_boundaries() {
    assert_eq!(insured_losses(&[3.0, 20.0, 101.0], 5.0, 100.0), vec![0.0, 15.0, 95.0]);
}

#[test]
fn test_degenerate_sampling_returns_means() {
    let means = [0.1, 0.25, 0.0];
    let sampled = Distribution::Degenerate.sample_many(&means, &[0.3, 0.3, 0.0], &[2.0, -1.0, 0.5]);
    assert_eq!(sampled, means.to_vec());
}

#[test]
fn test_conditional_loss_bounds() {
    let losses = [0.0, 0.1, 0.2];
    let poes = [0.5, 0.3, 0.1];
    assert_eq!(conditional_loss_ratio(&losses, &poes, 0.05), 0.2);
    assert_eq!(conditional_loss_ratio(&losses, &poes, 0.6), 0.0);
    let mid = conditional_loss_ratio(&losses, &poes, 0.3);
    assert!((mid - 0.1).abs() < 1e-12);
}

#[test]
fn test_event_based_curve_shape() {
    let losses = [0.3, 0.1, 0.1, 0.0, 0.6, 0.2];
    let curve = event_based(&losses, 50.0, 50.0, 11).unwrap();
    assert_eq!(curve.len(), 11);
    assert!(curve.is_monotonic(1e-12));
    assert_eq!(curve.losses.last().copied(), Some(0.6));
    assert!(curve.poes.iter().all(|p| (0.0..1.0).contains(p)));
}

#[test]
fn test_event_based_risk_and_statistics() {
    let cfg = CalcConfig {
        quantile_loss_curves: vec![0.5],
        insured_losses: true,
        loss_curve_resolution: 20,
        ..CalcConfig::default()
    };
    let mut a1 = Asset::new("a1", "RC", 0, 1000.0);
    a1.deductible = 50.0;
    a1.insured_limit = 400.0;
    let a2 = Asset::new("a2", "RC", 1, 500.0);
    let assets = [a1, a2];
    let vf = model(reference_vf());

    let low = fields(vec![vec![0.05, 0.12, 0.2, 0.08, 0.3], vec![0.1, 0.15, 0.05, 0.02, 0.25]]);
    let high = fields(vec![vec![0.15, 0.3, 0.45, 0.2, 0.6], vec![0.2, 0.35, 0.15, 0.1, 0.5]]);
    let r1 = event_based_risk(&cfg, &assets, &vf, &low, &Imt::Pga, 500.0).unwrap();
    let r2 = event_based_risk(&cfg, &assets, &vf, &high, &Imt::Pga, 500.0).unwrap();
    for out in r1.iter().chain(&r2) {
        assert!(out.loss_ratio_curve.is_monotonic(1e-12));
        assert!(out.insured_curve.is_some());
        assert!(out.average_loss >= 0.0);
    }
    // insured losses never exceed limit minus deductible
    let insured = r1[0].insured_curve.as_ref().unwrap();
    assert!(insured.losses.iter().all(|l| *l <= 350.0 + 1e-9));

    // same seed, same sampled losses
    let again = event_based_risk(&cfg, &assets, &vf, &low, &Imt::Pga, 500.0).unwrap();
    assert_eq!(again, r1);

    let stats = loss_statistics(&cfg, &[r1.clone(), r2.clone()], &[0.5, 0.5], true).unwrap();
    assert_eq!(stats.len(), 2);
    let a1_stats = &stats[0];
    assert_eq!(a1_stats.asset_id, "a1");
    let s = &a1_stats.curves;
    assert_eq!(s.quantiles.len(), 1);
    assert_eq!(s.mean.losses, s.losses);
    assert!(s.mean.poes.iter().all(|p| (0.0..=1.0).contains(p)));

    // conditional losses: equal-weight mean of the two realizations
    assert_eq!(a1_stats.poes, cfg.conditional_loss_poes);
    let map = &a1_stats.loss_map;
    assert_eq!(map.mean.len(), cfg.conditional_loss_poes.len());
    for (j, mean) in map.mean.iter().enumerate() {
        let expected = 0.5 * (r1[0].loss_map[j].1 + r2[0].loss_map[j].1);
        assert!((mean - expected).abs() < 1e-9, "poe #{}: {} vs {}", j, mean, expected);
    }
    assert_eq!(map.quantiles.len(), 1);
    assert_eq!(map.quantiles[0].0, 0.5);
}

#[test]
fn test_scenario_damage_and_losses_from_fields() {
    let rupture = Rupture {
        source_id: "scenario".to_string(),
        mag: 6.5,
        rake: 0.0,
        trt: "Active Shallow Crust".to_string(),
        hypocenter: Point::new(0.0, 0.0, 10.0),
        surface: RuptureSurface::Point(Point::new(0.0, 0.0, 10.0)),
        occurrence: Occurrence::Probability(1.0),
    };
    let sites = SiteCollection::new(vec![Site::rock(0, 0.05, 0.0), Site::rock(1, 0.3, 0.1)]).unwrap();
    let gsim = LinearAttenuation::pga_default();
    let jb = Jb2009::new(false);
    let gmfs = ground_motion_fields(&rupture, &sites, &[Imt::Pga], &gsim, Some(3.0), 40, Some(&jb), 7).unwrap();
    assert_eq!(gmfs.site(&Imt::Pga, 1).map(|v| v.len()), Some(40));
    let same = ground_motion_fields(&rupture, &sites, &[Imt::Pga], &gsim, Some(3.0), 40, Some(&jb), 7).unwrap();
    assert_eq!(gmfs, same);

    let fragility = FragilityModel::new(
        "RC",
        Imt::Pga,
        vec!["slight".to_string(), "collapse".to_string()],
        vec![
            FragilityFunction::Continuous { mean: 0.1, stddev: 0.05 },
            FragilityFunction::Continuous { mean: 0.4, stddev: 0.2 },
        ],
    )
    .unwrap();
    let mut models: FragilityModels = BTreeMap::new();
    models.insert("RC".to_string(), fragility);
    let mut a1 = Asset::new("a1", "RC", 0, 1000.0);
    a1.number_of_units = 10.0;
    let a2 = Asset::new("a2", "RC", 1, 800.0);
    let damage = scenario_damage(&[a1.clone(), a2.clone()], &models, &gmfs, &Imt::Pga).unwrap();
    assert_eq!(damage.len(), 2);
    assert_eq!(damage[0].damage_states, vec!["no_damage", "slight", "collapse"]);
    assert!((damage[0].mean.iter().sum::<f64>() - 10.0).abs() < 1e-9);
    assert!((damage[1].mean.iter().sum::<f64>() - 1.0).abs() < 1e-9);

    let cfg = CalcConfig::default();
    let losses = scenario_losses(&cfg, &[a1, a2], &model(reference_vf()), &gmfs, &Imt::Pga).unwrap();
    assert_eq!(losses[0].losses.len(), 40);
    assert!(losses.iter().all(|l| l.mean >= 0.0 && l.stddev >= 0.0));
    assert!(losses[0].losses.iter().all(|l| *l >= 0.0 && *l <= 1000.0));
}
