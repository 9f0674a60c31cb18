//! Ground-motion fields for scenario calculations, with optional spatial
//! correlation of the residuals (Jayaram & Baker 2009).

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{Error, Result};
use crate::gsim::GroundMotionModel;
use crate::imt::Imt;
use crate::logging::{log, obj, Domain, Level};
use crate::numeric::{norm_cdf, norm_ppf};
use crate::rupture::Rupture;
use crate::site::SiteCollection;

/// Jayaram & Baker (2009) exponential correlation model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Jb2009 {
    /// Vs30 values clustered in space (case 2 of the paper).
    pub vs30_clustering: bool,
}

impl Jb2009 {
    pub fn new(vs30_clustering: bool) -> Self {
        Self { vs30_clustering }
    }

    /// Range parameter `b` in km.
    pub fn range(&self, imt: &Imt) -> f64 {
        let t = imt.period().unwrap_or(0.0);
        if t < 1.0 {
            if self.vs30_clustering {
                40.7 - 15.0 * t
            } else {
                8.5 + 17.2 * t
            }
        } else {
            22.0 + 3.7 * t
        }
    }

    pub fn correlation(&self, distance_km: f64, imt: &Imt) -> f64 {
        (-3.0 * distance_km / self.range(imt)).exp()
    }

    pub fn correlation_matrix(&self, sites: &SiteCollection, imt: &Imt) -> Vec<Vec<f64>> {
        let locs: Vec<_> = sites.iter().map(|s| s.location).collect();
        locs.iter()
            .map(|a| locs.iter().map(|b| self.correlation(a.epicentral_distance(b), imt)).collect())
            .collect()
    }
}

/// Lower-triangular Cholesky factor of a symmetric positive definite matrix.
pub fn cholesky(matrix: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
    let n = matrix.len();
    let mut l = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..=i {
            let s: f64 = (0..j).map(|k| l[i][k] * l[j][k]).sum();
            if i == j {
                let d = matrix[i][i] - s;
                if d <= 0.0 {
                    return Err(Error::Numerical(format!("matrix not positive definite at row {}", i)));
                }
                l[i][j] = d.sqrt();
            } else {
                l[i][j] = (matrix[i][j] - s) / l[j][j];
            }
        }
    }
    Ok(l)
}

/// Ground-motion values per IMT, laid out `[imt][site][realization]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundMotionFields {
    pub imts: Vec<Imt>,
    pub site_ids: Vec<usize>,
    pub values: Vec<Vec<Vec<f64>>>,
}

impl GroundMotionFields {
    pub fn get(&self, imt: &Imt) -> Option<&Vec<Vec<f64>>> {
        self.imts.iter().position(|i| i == imt).map(|k| &self.values[k])
    }

    /// Realizations at one site for one IMT.
    pub fn site(&self, imt: &Imt, site_id: usize) -> Option<&[f64]> {
        let k = self.imts.iter().position(|i| i == imt)?;
        let s = self.site_ids.iter().position(|id| *id == site_id)?;
        Some(&self.values[k][s])
    }
}

/// One standard normal draw. A truncated draw inverts the CDF of a
/// uniform sample on `[Phi(-t), Phi(t))`, so it costs the same for any `t`.
fn standard_normal(rng: &mut StdRng, truncation: Option<f64>) -> f64 {
    match truncation {
        None => StandardNormal.sample(rng),
        Some(t) if t == 0.0 => 0.0,
        Some(t) => {
            let lo = norm_cdf(-t);
            let hi = norm_cdf(t);
            let u: f64 = rng.gen();
            norm_ppf(lo + (hi - lo) * u).clamp(-t, t)
        }
    }
}

/// Scenario fields from one rupture. Residuals are truncated at
/// `truncation_level` sigmas and, with a correlation model, spatially
/// correlated through the Cholesky factor of its matrix.
#[allow(clippy::too_many_arguments)]
pub fn ground_motion_fields(
    rupture: &Rupture,
    sites: &SiteCollection,
    imts: &[Imt],
    gsim: &dyn GroundMotionModel,
    truncation_level: Option<f64>,
    realizations: usize,
    correlation: Option<&Jb2009>,
    seed: u64,
) -> Result<GroundMotionFields> {
    if let Some(t) = truncation_level {
        if !(t >= 0.0) {
            return Err(Error::config("truncation_level", "must be non-negative"));
        }
    }
    if realizations == 0 {
        return Err(Error::config("number_of_ground_motion_fields", "must be at least 1"));
    }
    for imt in imts {
        if !gsim.supports(imt) {
            return Err(Error::UnsupportedImt { gsim: gsim.name().to_string(), imt: imt.to_string() });
        }
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let rctx = rupture.context();
    let mut values = Vec::with_capacity(imts.len());

    for imt in imts {
        let stats: Vec<(f64, f64)> = sites
            .iter()
            .map(|site| gsim.mean_and_stddev(&rctx, &rupture.distances(&site.location), site, imt))
            .collect::<Result<_>>()?;

        if truncation_level == Some(0.0) {
            values.push(stats.iter().map(|(m, _)| vec![m.exp(); realizations]).collect());
            continue;
        }

        // [site][realization]
        let mut eps: Vec<Vec<f64>> = (0..sites.len())
            .map(|_| (0..realizations).map(|_| standard_normal(&mut rng, truncation_level)).collect())
            .collect();
        if let Some(model) = correlation {
            let l = cholesky(&model.correlation_matrix(sites, imt))?;
            let raw = eps.clone();
            for (i, row) in l.iter().enumerate() {
                for r in 0..realizations {
                    eps[i][r] = row.iter().take(i + 1).zip(&raw).map(|(c, e)| c * e[r]).sum();
                }
            }
        }

        values.push(
            stats
                .iter()
                .zip(&eps)
                .map(|((mean, sd), e)| e.iter().map(|z| (mean + sd * z).exp()).collect())
                .collect(),
        );
    }

    log(
        Level::Debug,
        Domain::Risk,
        "gmfs_done",
        obj(&[
            ("source_id", json!(rupture.source_id)),
            ("sites", json!(sites.len())),
            ("realizations", json!(realizations)),
        ]),
    );
    Ok(GroundMotionFields { imts: imts.to_vec(), site_ids: sites.ids(), values })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Point;
    use crate::gsim::LinearAttenuation;
    use crate::rupture::{Occurrence, RuptureSurface};
    use crate::site::Site;

    fn rupture() -> Rupture {
        let hypo = Point::new(0.0, 0.0, 10.0);
        Rupture {
            source_id: "scenario".to_string(),
            mag: 6.5,
            rake: 0.0,
            trt: "Active Shallow Crust".to_string(),
            hypocenter: hypo,
            surface: RuptureSurface::Point(hypo),
            occurrence: Occurrence::Probability(1.0),
        }
    }

    #[test]
    fn test_jb2009_correlation_value() {
        let sites = SiteCollection::new(vec![Site::rock(0, 2.0, -40.0), Site::rock(1, 2.0, -40.1)]).unwrap();
        let m = Jb2009::new(false).correlation_matrix(&sites, &Imt::sa(0.1));
        assert!((m[0][0] - 1.0).abs() < 1e-12);
        assert!((m[0][1] - 0.03823366).abs() < 1e-6);
        assert_eq!(Jb2009::new(true).range(&Imt::Pga), 40.7);
        assert!((Jb2009::new(false).range(&Imt::sa(2.0)) - 29.4).abs() < 1e-12);
    }

    #[test]
    fn test_cholesky_reconstructs() {
        let a = vec![vec![4.0, 2.0], vec![2.0, 3.0]];
        let l = cholesky(&a).unwrap();
        for i in 0..2 {
            for j in 0..2 {
                let v: f64 = (0..2).map(|k| l[i][k] * l[j][k]).sum();
                assert!((v - a[i][j]).abs() < 1e-12);
            }
        }
        assert!(cholesky(&[vec![1.0, 2.0], vec![2.0, 1.0]]).is_err());
    }

    #[test]
    fn test_fields_are_seeded_and_truncated() {
        let gsim = LinearAttenuation::pga_default();
        let sites = SiteCollection::new(vec![Site::rock(0, 0.0, 0.0), Site::rock(1, 0.05, 0.0)]).unwrap();
        let a = ground_motion_fields(&rupture(), &sites, &[Imt::Pga], &gsim, Some(2.0), 50, Some(&Jb2009::new(false)), 3).unwrap();
        let b = ground_motion_fields(&rupture(), &sites, &[Imt::Pga], &gsim, Some(2.0), 50, Some(&Jb2009::new(false)), 3).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.site(&Imt::Pga, 1).map(|v| v.len()), Some(50));

        let median = ground_motion_fields(&rupture(), &sites, &[Imt::Pga], &gsim, Some(0.0), 4, None, 3).unwrap();
        let row = median.site(&Imt::Pga, 0).unwrap();
        assert!(row.iter().all(|v| (*v - row[0]).abs() < 1e-15));
    }

    #[test]
    fn test_truncated_draws_stay_in_bounds() {
        let mut rng = StdRng::seed_from_u64(11);
        for t in [1e-9, 0.5, 3.0] {
            for _ in 0..1000 {
                let z = standard_normal(&mut rng, Some(t));
                assert!(z.abs() <= t, "t={} z={}", t, z);
            }
        }
        assert_eq!(standard_normal(&mut rng, Some(0.0)), 0.0);

        // a narrow window still centres on zero and spreads across it
        let draws: Vec<f64> = (0..4000).map(|_| standard_normal(&mut rng, Some(0.5))).collect();
        let mean = draws.iter().sum::<f64>() / draws.len() as f64;
        assert!(mean.abs() < 0.02, "mean {}", mean);
        assert!(draws.iter().any(|z| *z > 0.4) && draws.iter().any(|z| *z < -0.4));
    }

    #[test]
    fn test_unsupported_imt_rejected() {
        let gsim = LinearAttenuation::pga_default();
        let sites = SiteCollection::new(vec![Site::rock(0, 0.0, 0.0)]).unwrap();
        assert!(ground_motion_fields(&rupture(), &sites, &[Imt::sa(1.0)], &gsim, None, 1, None, 0).is_err());
    }
}
