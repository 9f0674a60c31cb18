//! Hazard end to end: sources through curves, maps and disaggregation.
//!
//! These tests check the properties the downstream calculators rely on:
//! order independence of the aggregation, agreement of the threaded driver
//! with the serial one, and conservation of probability mass when a curve
//! is disaggregated.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use quakerisk::config::CalcConfig;
use quakerisk::disagg::{disaggregate_site, DisaggAxis};
use quakerisk::geo::Point;
use quakerisk::gsim::{GsimSet, LinearAttenuation};
use quakerisk::hazard::{hazard_curves, hazard_map, interpolate_iml, HazardSetup, MaximumDistance, Realization};
use quakerisk::imt::{Imt, Imtls};
use quakerisk::mfd::{MagScaling, Mfd};
use quakerisk::parallel::hazard_curves_parallel;
use quakerisk::rupture::PoissonTom;
use quakerisk::site::{Site, SiteCollection};
use quakerisk::source::{NodalPlane, PointRuptureSpec, PointSource, Pmf, Source};
use quakerisk::workflow::{classical_hazard, disaggregation};
use quakerisk::Error;

const TRT: &str = "Active Shallow Crust";

fn point_source(id: &str, lon: f64, a_val: f64) -> Source {
    Source::Point(PointSource {
        id: id.to_string(),
        trt: TRT.to_string(),
        location: Point::new(lon, 0.0, 10.0),
        spec: PointRuptureSpec {
            mfd: Mfd::TruncatedGr { a_val, b_val: 1.0, min_mag: 5.0, max_mag: 7.0, bin_width: 0.5 },
            msr: MagScaling::Wc1994,
            rupture_aspect_ratio: 1.5,
            upper_seismogenic_depth: 0.0,
            lower_seismogenic_depth: 20.0,
            nodal_planes: Pmf::single(NodalPlane { strike: 0.0, dip: 90.0, rake: 0.0 }),
            hypo_depths: Pmf::single(10.0),
            mesh_spacing: 2.0,
        },
    })
}

fn sources() -> Vec<Source> {
    vec![
        point_source("a", 0.0, 3.5),
        point_source("b", 0.4, 3.0),
        point_source("c", -0.3, 2.5),
        point_source("d", 3.0, 4.0),
    ]
}

fn sites() -> SiteCollection {
    SiteCollection::new(vec![
        Site::rock(0, 0.1, 0.0),
        Site::rock(1, 0.2, 0.1),
        Site::rock(2, 0.5, -0.2),
    ])
    .unwrap()
}

fn imtls() -> Imtls {
    Imtls::from_pairs(vec![(Imt::Pga, vec![0.005, 0.01, 0.05, 0.1, 0.2, 0.4, 0.8])]).unwrap()
}

fn gsims() -> GsimSet {
    GsimSet::single(TRT, Arc::new(LinearAttenuation::pga_default()))
}

#[test]
fn test_source_order_does_not_change_curves() {
    let imtls = imtls();
    let gsims = [gsims()];
    let filter = MaximumDistance::new(300.0);
    let setup = HazardSetup { imtls: &imtls, gsims: &gsims, truncation_level: Some(3.0), time_span: 50.0, filter: &filter };

    let forward = hazard_curves(&sources(), &sites(), &setup, None).unwrap();
    let mut reversed_sources = sources();
    reversed_sources.reverse();
    let reversed = hazard_curves(&reversed_sources, &sites(), &setup, None).unwrap();
    let threaded = hazard_curves_parallel(&sources(), &sites(), &setup, 3, None).unwrap();

    for sid in 0..3 {
        let a = forward.poes(sid, 0);
        for other in [reversed.poes(sid, 0), threaded.poes(sid, 0)] {
            for (x, y) in a.iter().zip(&other) {
                assert!((x - y).abs() < 1e-12, "site {}: {} vs {}", sid, x, y);
            }
        }
        // decreasing with the level, within [0, 1]
        assert!(a.windows(2).all(|w| w[1] <= w[0] + 1e-15));
        assert!(a.iter().all(|p| (0.0..=1.0).contains(p)));
    }
    assert!(forward.poes(0, 0)[0] > 0.0);
}

#[test]
fn test_distance_filter_drops_far_sources() {
    let imtls = imtls();
    let gsims = [gsims()];
    let near = MaximumDistance::new(300.0);
    let tight = MaximumDistance::new(20.0);
    let wide = HazardSetup { imtls: &imtls, gsims: &gsims, truncation_level: Some(3.0), time_span: 50.0, filter: &near };
    let narrow = HazardSetup { filter: &tight, ..wide };
    let far_only = vec![point_source("d", 3.0, 4.0)];
    let pmap = hazard_curves(&far_only, &sites(), &narrow, None).unwrap();
    assert!(pmap.is_empty());
    let pmap = hazard_curves(&far_only, &sites(), &wide, None).unwrap();
    assert!(!pmap.is_empty());
}

#[test]
fn test_unsupported_imt_is_fatal() {
    let imtls = Imtls::from_pairs(vec![(Imt::sa(1.0), vec![0.1, 0.2])]).unwrap();
    let gsims = [gsims()];
    let filter = MaximumDistance::new(300.0);
    let setup = HazardSetup { imtls: &imtls, gsims: &gsims, truncation_level: Some(3.0), time_span: 50.0, filter: &filter };
    match hazard_curves(&sources(), &sites(), &setup, None) {
        Err(Error::UnsupportedImt { imt, .. }) => assert_eq!(imt, "SA(1)"),
        other => panic!("expected an unsupported IMT error, got {:?}", other.map(|m| m.len())),
    }
    assert!(hazard_curves_parallel(&sources(), &sites(), &setup, 2, None).is_err());
}

#[test]
fn test_invalid_mfd_is_fatal() {
    let imtls = imtls();
    let gsims = [gsims()];
    let filter = MaximumDistance::new(300.0);
    let setup = HazardSetup { imtls: &imtls, gsims: &gsims, truncation_level: Some(3.0), time_span: 50.0, filter: &filter };
    let mut bad = point_source("narrow", 0.0, 3.0);
    if let Source::Point(ps) = &mut bad {
        // magnitude range narrower than one bin
        ps.spec.mfd = Mfd::TruncatedGr { a_val: 3.0, b_val: 1.0, min_mag: 5.0, max_mag: 5.2, bin_width: 0.5 };
    }
    let mut all = sources();
    all.push(bad);
    match hazard_curves(&all, &sites(), &setup, None) {
        Err(Error::Config { param, .. }) => assert_eq!(param, "mfd.max_mag"),
        other => panic!("expected a configuration error, got {:?}", other.map(|m| m.len())),
    }
    assert!(hazard_curves_parallel(&all, &sites(), &setup, 2, None).is_err());

    let site = Site::rock(0, 0.1, 0.0);
    let bins = CalcConfig::default().disagg_bins();
    let levels = [0.005, 0.01, 0.05];
    let curve = [0.5, 0.2, 0.05];
    let out = disaggregate_site(
        &all,
        &site,
        &Imt::Pga,
        &levels,
        &curve,
        0.1,
        &gsims[0],
        &PoissonTom::new(50.0),
        Some(3.0),
        &bins,
        &filter,
        None,
    );
    assert!(out.is_err());
}

#[test]
fn test_abort_flag_stops_the_loop() {
    let imtls = imtls();
    let gsims = [gsims()];
    let filter = MaximumDistance::new(300.0);
    let setup = HazardSetup { imtls: &imtls, gsims: &gsims, truncation_level: Some(3.0), time_span: 50.0, filter: &filter };
    let abort = AtomicBool::new(true);
    assert_eq!(hazard_curves(&sources(), &sites(), &setup, Some(&abort)).unwrap_err(), Error::Aborted);
}

#[test]
fn test_disaggregation_conserves_mass() {
    let imtls = imtls();
    let gsims = [gsims()];
    let filter = MaximumDistance::new(300.0);
    let truncation = Some(3.0);
    let setup = HazardSetup { imtls: &imtls, gsims: &gsims, truncation_level: truncation, time_span: 50.0, filter: &filter };
    let pmap = hazard_curves(&sources(), &sites(), &setup, None).unwrap();
    let levels = imtls.levels(&Imt::Pga).unwrap();
    let tom = PoissonTom::new(50.0);
    let bins = CalcConfig::default().disagg_bins();

    for site in &sites() {
        let curve = pmap.poes(site.id, 0);
        let result = disaggregate_site(
            &sources(),
            site,
            &Imt::Pga,
            levels,
            &curve,
            0.1,
            &gsims[0],
            &tom,
            truncation,
            &bins,
            &filter,
            None,
        )
        .unwrap()
        .expect("non-zero curve");
        assert!((result.target_iml - interpolate_iml(levels, &curve, 0.1)).abs() < 1e-15);

        // hazard at exactly the target level
        let at_target = Imtls::from_pairs(vec![(Imt::Pga, vec![result.target_iml])]).unwrap();
        let single = SiteCollection::new(vec![site.clone()]).unwrap();
        let setup = HazardSetup { imtls: &at_target, ..setup };
        let expected = hazard_curves(&sources(), &single, &setup, None).unwrap().poes(site.id, 0)[0];

        let total = result.matrix.total();
        assert!(
            ((total - expected) / expected).abs() < 1e-6,
            "site {}: matrix {} vs curve {}",
            site.id,
            total,
            expected
        );
        assert!(result.matrix.values().iter().all(|v| *v >= 0.0));
        let mag = result.matrix.marginal(&[DisaggAxis::Mag]);
        assert!((mag.iter().sum::<f64>() - total).abs() < 1e-12);
        assert_eq!(result.edges.trts, vec![TRT.to_string()]);
    }
}

#[test]
fn test_zero_curve_is_skipped() {
    let site = Site::rock(9, 50.0, 50.0);
    let bins = CalcConfig::default().disagg_bins();
    let out = disaggregate_site(
        &sources(),
        &site,
        &Imt::Pga,
        &[0.1, 0.2],
        &[0.0, 0.0],
        0.1,
        &gsims(),
        &PoissonTom::new(50.0),
        Some(3.0),
        &bins,
        &MaximumDistance::new(300.0),
        None,
    )
    .unwrap();
    assert!(out.is_none());
}

#[test]
fn test_hazard_map_matches_curve_interpolation() {
    let imtls = imtls();
    let gsims = [gsims()];
    let filter = MaximumDistance::new(300.0);
    let setup = HazardSetup { imtls: &imtls, gsims: &gsims, truncation_level: Some(3.0), time_span: 50.0, filter: &filter };
    let pmap = hazard_curves(&sources(), &sites(), &setup, None).unwrap();
    let map = hazard_map(&pmap, &imtls, &Imt::Pga, &[0, 1], 0, &[0.1, 0.02]).unwrap();
    assert_eq!(map.len(), 2);
    // rarer poe, larger level
    assert!(map[0][1] >= map[0][0]);
}

#[test]
fn test_workflow_statistics_and_disaggregation() {
    let mut cfg = CalcConfig {
        quantile_hazard_curves: vec![0.5],
        poes_disagg: vec![0.1],
        ..CalcConfig::default()
    };
    cfg.add_imt("PGA", vec![0.005, 0.01, 0.05, 0.1, 0.2, 0.4, 0.8]).unwrap();
    let realizations = vec![Realization::new(0.6, gsims()), Realization::new(0.4, gsims())];

    let out = classical_hazard(&cfg, &sources(), &sites(), &realizations, None).unwrap();
    assert_eq!(out.realizations.len(), 2);
    let stats = out.statistics.expect("two realizations");
    let mean = &stats.sites[&0].mean;
    let rlz = out.realizations[0].poes(0, 0);
    for (m, r) in mean.iter().zip(&rlz) {
        assert!((m - r).abs() < 1e-12);
    }

    let disagg = disaggregation(&cfg, &sources(), &sites(), &realizations[0], &out.realizations[0], &Imt::Pga, None)
        .unwrap();
    assert_eq!(disagg.len(), 3);
    assert!(disagg.iter().all(|d| d.poe == 0.1 && d.investigation_time == 50.0));
}
