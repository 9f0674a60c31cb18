//! Thread-parallel hazard driver.
//!
//! Sources are dealt round-robin into one block per worker. Workers share
//! only immutable inputs and return their own [`ProbabilityMap`]; the merge
//! happens on the calling thread once all workers have joined.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use serde_json::json;

use crate::error::{Error, Result};
use crate::hazard::{hazard_curves, HazardSetup};
use crate::logging::{log, obj, Domain, Level, ProfileScope};
use crate::probability::ProbabilityMap;
use crate::site::SiteCollection;
use crate::source::{check_sources, Source};

/// Worker count: `QR_WORKERS` when set, otherwise one per CPU.
pub fn default_workers() -> usize {
    std::env::var("QR_WORKERS")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|n| *n > 0)
        .unwrap_or_else(num_cpus::get)
}

/// Deals sources into `n` blocks, keeping heavy sources apart.
pub fn split_sources(sources: &[Source], n: usize) -> Vec<Vec<Source>> {
    let n = n.max(1).min(sources.len().max(1));
    let mut order: Vec<&Source> = sources.iter().collect();
    order.sort_by(|a, b| b.num_ruptures().cmp(&a.num_ruptures()));
    let mut blocks: Vec<Vec<Source>> = vec![Vec::new(); n];
    for (i, src) in order.into_iter().enumerate() {
        blocks[i % n].push(src.clone());
    }
    blocks.retain(|b| !b.is_empty());
    blocks
}

/// Same result as [`hazard_curves`] on all sources, computed on `workers`
/// threads. The first failing worker raises the abort flag for the others;
/// its error is returned.
pub fn hazard_curves_parallel(
    sources: &[Source],
    sites: &SiteCollection,
    setup: &HazardSetup<'_>,
    workers: usize,
    abort: Option<&AtomicBool>,
) -> Result<ProbabilityMap> {
    setup.validate()?;
    check_sources(sources)?;
    let _prof = ProfileScope::with_context("hazard_curves_parallel", &[("workers", json!(workers))]);
    let blocks = split_sources(sources, workers);
    let local_abort = AtomicBool::new(false);
    let stop = abort.unwrap_or(&local_abort);

    let results: Vec<Result<ProbabilityMap>> = thread::scope(|scope| {
        let handles: Vec<_> = blocks
            .iter()
            .map(|block| {
                scope.spawn(move || {
                    let res = hazard_curves(block, sites, setup, Some(stop));
                    if res.is_err() {
                        stop.store(true, Ordering::Relaxed);
                    }
                    res
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| {
                h.join()
                    .unwrap_or_else(|_| Err(Error::Numerical("hazard worker panicked".to_string())))
            })
            .collect()
    });

    let mut pmap = ProbabilityMap::new(setup.imtls.num_levels(), setup.gsims.len());
    let mut first_err: Option<Error> = None;
    for res in results {
        match res {
            Ok(part) => pmap.combine(&part)?,
            // a worker stopped by another's failure reports Aborted; keep the cause
            Err(Error::Aborted) => {
                if first_err.is_none() {
                    first_err = Some(Error::Aborted);
                }
            }
            Err(e) => {
                if matches!(first_err, None | Some(Error::Aborted)) {
                    first_err = Some(e);
                }
            }
        }
    }
    if let Some(e) = first_err {
        return Err(e);
    }

    log(
        Level::Info,
        Domain::Hazard,
        "parallel_merge_done",
        obj(&[("blocks", json!(blocks.len())), ("sites", json!(pmap.len()))]),
    );
    Ok(pmap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Point;
    use crate::gsim::{GsimSet, LinearAttenuation};
    use crate::hazard::NoFilter;
    use crate::imt::{Imt, Imtls};
    use crate::rupture::{Occurrence, Rupture, RuptureSurface};
    use crate::site::Site;
    use crate::source::NonParametricSource;
    use std::sync::Arc;

    const TRT: &str = "Active Shallow Crust";

    fn sources(n: usize) -> Vec<Source> {
        (0..n)
            .map(|i| {
                let hypo = Point::new(0.05 * i as f64, 0.1, 8.0);
                Source::NonParametric(NonParametricSource {
                    id: format!("s{}", i),
                    trt: TRT.to_string(),
                    ruptures: vec![Rupture {
                        source_id: format!("s{}", i),
                        mag: 5.5 + 0.1 * i as f64,
                        rake: 0.0,
                        trt: TRT.to_string(),
                        hypocenter: hypo,
                        surface: RuptureSurface::Point(hypo),
                        occurrence: Occurrence::Probability(0.05),
                    }],
                })
            })
            .collect()
    }

    #[test]
    fn test_split_keeps_every_source() {
        let blocks = split_sources(&sources(7), 3);
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks.iter().map(|b| b.len()).sum::<usize>(), 7);
        assert_eq!(split_sources(&sources(2), 8).len(), 2);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let imtls = Imtls::from_pairs(vec![(Imt::Pga, vec![0.01, 0.05, 0.2])]).unwrap();
        let gsims = vec![GsimSet::single(TRT, Arc::new(LinearAttenuation::pga_default()))];
        let sites = SiteCollection::new(vec![Site::rock(0, 0.0, 0.0), Site::rock(1, 0.3, 0.1)]).unwrap();
        let setup = HazardSetup { imtls: &imtls, gsims: &gsims, truncation_level: Some(3.0), time_span: 50.0, filter: &NoFilter };
        let srcs = sources(9);

        let seq = hazard_curves(&srcs, &sites, &setup, None).unwrap();
        let par = hazard_curves_parallel(&srcs, &sites, &setup, 4, None).unwrap();
        for sid in [0, 1] {
            for (a, b) in seq.poes(sid, 0).iter().zip(par.poes(sid, 0)) {
                assert!((a - b).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_preset_abort_is_reported() {
        let imtls = Imtls::from_pairs(vec![(Imt::Pga, vec![0.1])]).unwrap();
        let gsims = vec![GsimSet::single(TRT, Arc::new(LinearAttenuation::pga_default()))];
        let sites = SiteCollection::new(vec![Site::rock(0, 0.0, 0.0)]).unwrap();
        let setup = HazardSetup { imtls: &imtls, gsims: &gsims, truncation_level: None, time_span: 50.0, filter: &NoFilter };
        let flag = AtomicBool::new(true);
        let err = hazard_curves_parallel(&sources(3), &sites, &setup, 2, Some(&flag)).unwrap_err();
        assert_eq!(err, Error::Aborted);
    }
}
