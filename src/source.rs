//! Seismic sources.
//!
//! Sources form a closed set of variants. Each variant knows how to
//! enumerate its ruptures; `Source::ruptures` hands out a fresh iterator on
//! every call, so the hazard pass and the disaggregation pass can walk the
//! same logical source independently.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geo::{PlanarSurface, Point};
use crate::mfd::{MagScaling, Mfd};
use crate::rupture::{Occurrence, Rupture, RuptureSurface};

const PMF_TOLERANCE: f64 = 1e-6;

/// Probability mass function over a finite set of values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pmf<T> {
    items: Vec<(f64, T)>,
}

impl<T> Pmf<T> {
    pub fn new(items: Vec<(f64, T)>) -> Result<Self> {
        if items.is_empty() {
            return Err(Error::config("pmf", "must contain at least one item"));
        }
        if items.iter().any(|(p, _)| !(*p > 0.0 && *p <= 1.0)) {
            return Err(Error::config("pmf", "probabilities must be in (0, 1]"));
        }
        let total: f64 = items.iter().map(|(p, _)| p).sum();
        if (total - 1.0).abs() > PMF_TOLERANCE {
            return Err(Error::config("pmf", format!("probabilities sum to {} instead of 1", total)));
        }
        Ok(Self { items })
    }

    pub fn single(value: T) -> Self {
        Self { items: vec![(1.0, value)] }
    }

    pub fn iter(&self) -> impl Iterator<Item = &(f64, T)> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodalPlane {
    pub strike: f64,
    pub dip: f64,
    pub rake: f64,
}

/// Parameters shared by point-like sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointRuptureSpec {
    pub mfd: Mfd,
    pub msr: MagScaling,
    pub rupture_aspect_ratio: f64,
    pub upper_seismogenic_depth: f64,
    pub lower_seismogenic_depth: f64,
    pub nodal_planes: Pmf<NodalPlane>,
    pub hypo_depths: Pmf<f64>,
    pub mesh_spacing: f64,
}

impl PointRuptureSpec {
    fn check(&self) -> Result<()> {
        self.mfd.check()?;
        if self.rupture_aspect_ratio <= 0.0 {
            return Err(Error::config("rupture_aspect_ratio", "must be positive"));
        }
        if self.lower_seismogenic_depth <= self.upper_seismogenic_depth {
            return Err(Error::config(
                "lower_seismogenic_depth",
                "must be deeper than upper_seismogenic_depth",
            ));
        }
        for (_, depth) in self.hypo_depths.iter() {
            if *depth < self.upper_seismogenic_depth || *depth > self.lower_seismogenic_depth {
                return Err(Error::config("hypo_depths", "must lie within the seismogenic layer"));
            }
        }
        Ok(())
    }

    /// Ruptures of one location, each carrying `rate_scale` of the MFD rate.
    fn ruptures_at<'a>(
        &'a self,
        source_id: &'a str,
        trt: &'a str,
        location: Point,
        rate_scale: f64,
    ) -> impl Iterator<Item = Rupture> + 'a {
        self.mfd
            .rates()
            .into_iter()
            .filter(|(_, rate)| *rate > 0.0)
            .flat_map(move |(mag, rate)| {
                self.nodal_planes.iter().flat_map(move |(np_prob, np)| {
                    self.hypo_depths.iter().map(move |(hd_prob, depth)| {
                        let hypocenter = Point::new(location.lon, location.lat, *depth);
                        let area = self.msr.median_area(mag, Some(np.rake));
                        let length = (area * self.rupture_aspect_ratio).sqrt();
                        let width = (area / self.rupture_aspect_ratio).sqrt();
                        let surface = PlanarSurface::from_hypocenter(
                            hypocenter,
                            np.strike,
                            np.dip,
                            length,
                            width,
                            self.upper_seismogenic_depth,
                            self.lower_seismogenic_depth,
                            self.mesh_spacing,
                        );
                        Rupture {
                            source_id: source_id.to_string(),
                            mag,
                            rake: np.rake,
                            trt: trt.to_string(),
                            hypocenter,
                            surface: RuptureSurface::Planar(surface),
                            occurrence: Occurrence::Poissonian {
                                rate: rate * np_prob * hd_prob * rate_scale,
                            },
                        }
                    })
                })
            })
    }

    fn num_ruptures(&self) -> usize {
        let bins = self.mfd.rates().iter().filter(|(_, r)| *r > 0.0).count();
        bins * self.nodal_planes.len() * self.hypo_depths.len()
    }

    /// Half-length of the largest rupture, the enlargement used by the
    /// source-site filter.
    fn max_rupture_radius(&self) -> f64 {
        let (_, max_mag) = self.mfd.min_max_mag();
        self.nodal_planes
            .iter()
            .map(|(_, np)| {
                let area = self.msr.median_area(max_mag, Some(np.rake));
                let length = (area * self.rupture_aspect_ratio).sqrt();
                let width = (area / self.rupture_aspect_ratio).sqrt();
                (length * length + width * width).sqrt() / 2.0
            })
            .fold(0.0, f64::max)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointSource {
    pub id: String,
    pub trt: String,
    pub location: Point,
    pub spec: PointRuptureSpec,
}

/// Area source already discretised into a grid of locations; the MFD rate is
/// split evenly among them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaSource {
    pub id: String,
    pub trt: String,
    pub locations: Vec<Point>,
    pub spec: PointRuptureSpec,
}

/// Fault source with a fixed surface; every MFD bin ruptures the whole plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacteristicSource {
    pub id: String,
    pub trt: String,
    pub surface: PlanarSurface,
    pub mfd: Mfd,
    pub rake: f64,
}

/// Explicit ruptures, each with its own probability of occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NonParametricSource {
    pub id: String,
    pub trt: String,
    pub ruptures: Vec<Rupture>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Source {
    Point(PointSource),
    Area(AreaSource),
    Characteristic(CharacteristicSource),
    NonParametric(NonParametricSource),
}

impl Source {
    pub fn id(&self) -> &str {
        match self {
            Source::Point(s) => &s.id,
            Source::Area(s) => &s.id,
            Source::Characteristic(s) => &s.id,
            Source::NonParametric(s) => &s.id,
        }
    }

    pub fn trt(&self) -> &str {
        match self {
            Source::Point(s) => &s.trt,
            Source::Area(s) => &s.trt,
            Source::Characteristic(s) => &s.trt,
            Source::NonParametric(s) => &s.trt,
        }
    }

    pub fn check(&self) -> Result<()> {
        match self {
            Source::Point(s) => s.spec.check(),
            Source::Area(s) => {
                if s.locations.is_empty() {
                    return Err(Error::config("area_source.locations", format!("source {} has no locations", s.id)));
                }
                s.spec.check()
            }
            Source::Characteristic(s) => s.mfd.check(),
            Source::NonParametric(s) => {
                for rup in &s.ruptures {
                    if let Occurrence::Probability(p) = rup.occurrence {
                        if !(0.0..=1.0).contains(&p) {
                            return Err(Error::config(
                                "non_parametric.probability",
                                format!("source {} has probability {}", s.id, p),
                            ));
                        }
                    }
                }
                Ok(())
            }
        }
    }

    /// A fresh, finite iterator over the source's ruptures.
    pub fn ruptures(&self) -> Box<dyn Iterator<Item = Rupture> + '_> {
        match self {
            Source::Point(s) => Box::new(s.spec.ruptures_at(&s.id, &s.trt, s.location, 1.0)),
            Source::Area(s) => {
                let scale = 1.0 / s.locations.len().max(1) as f64;
                Box::new(
                    s.locations
                        .iter()
                        .flat_map(move |loc| s.spec.ruptures_at(&s.id, &s.trt, *loc, scale)),
                )
            }
            Source::Characteristic(s) => Box::new(
                s.mfd
                    .rates()
                    .into_iter()
                    .filter(|(_, rate)| *rate > 0.0)
                    .map(move |(mag, rate)| {
                        let hypocenter = s.surface.centroid();
                        Rupture {
                            source_id: s.id.clone(),
                            mag,
                            rake: s.rake,
                            trt: s.trt.clone(),
                            hypocenter,
                            surface: RuptureSurface::Planar(s.surface.clone()),
                            occurrence: Occurrence::Poissonian { rate },
                        }
                    }),
            ),
            Source::NonParametric(s) => Box::new(s.ruptures.iter().cloned()),
        }
    }

    pub fn num_ruptures(&self) -> usize {
        match self {
            Source::Point(s) => s.spec.num_ruptures(),
            Source::Area(s) => s.spec.num_ruptures() * s.locations.len(),
            Source::Characteristic(s) => s.mfd.rates().iter().filter(|(_, r)| *r > 0.0).count(),
            Source::NonParametric(s) => s.ruptures.len(),
        }
    }

    /// Lower bound of the Joyner-Boore distance from any rupture of the
    /// source to `site`, in km.
    pub fn min_distance(&self, site: &Point) -> f64 {
        match self {
            Source::Point(s) => (s.location.epicentral_distance(site) - s.spec.max_rupture_radius()).max(0.0),
            Source::Area(s) => {
                let radius = s.spec.max_rupture_radius();
                s.locations
                    .iter()
                    .map(|loc| (loc.epicentral_distance(site) - radius).max(0.0))
                    .fold(f64::INFINITY, f64::min)
            }
            Source::Characteristic(s) => s.surface.rjb(site),
            Source::NonParametric(s) => s
                .ruptures
                .iter()
                .map(|r| r.surface.rjb(site))
                .fold(f64::INFINITY, f64::min),
        }
    }
}

/// Checks every source before any rupture is generated.
pub fn check_sources(sources: &[Source]) -> Result<()> {
    sources.iter().try_for_each(Source::check)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> PointRuptureSpec {
        PointRuptureSpec {
            mfd: Mfd::EvenlyDiscretized { min_mag: 5.0, bin_width: 0.5, occurrence_rates: vec![0.02, 0.01, 0.0] },
            msr: MagScaling::Peer,
            rupture_aspect_ratio: 1.5,
            upper_seismogenic_depth: 0.0,
            lower_seismogenic_depth: 20.0,
            nodal_planes: Pmf::new(vec![
                (0.5, NodalPlane { strike: 0.0, dip: 90.0, rake: 0.0 }),
                (0.5, NodalPlane { strike: 45.0, dip: 60.0, rake: 90.0 }),
            ])
            .unwrap(),
            hypo_depths: Pmf::new(vec![(0.3, 5.0), (0.7, 10.0)]).unwrap(),
            mesh_spacing: 2.0,
        }
    }

    #[test]
    fn test_pmf_must_sum_to_one() {
        assert!(Pmf::new(vec![(0.4, 1.0), (0.4, 2.0)]).is_err());
        assert!(Pmf::new(vec![(0.5, 1.0), (0.5, 2.0)]).is_ok());
    }

    #[test]
    fn test_point_source_rates_are_split() {
        let src = Source::Point(PointSource {
            id: "p1".to_string(),
            trt: "Active Shallow Crust".to_string(),
            location: Point::surface(10.0, 45.0),
            spec: spec(),
        });
        src.check().unwrap();
        // zero-rate bin is dropped: 2 mags x 2 planes x 2 depths
        assert_eq!(src.num_ruptures(), 8);
        let ruptures: Vec<Rupture> = src.ruptures().collect();
        assert_eq!(ruptures.len(), 8);
        let total: f64 = ruptures
            .iter()
            .map(|r| match r.occurrence {
                Occurrence::Poissonian { rate } => rate,
                Occurrence::Probability(_) => 0.0,
            })
            .sum();
        assert!((total - 0.03).abs() < 1e-12);
    }

    #[test]
    fn test_ruptures_are_restartable() {
        let src = Source::Area(AreaSource {
            id: "a1".to_string(),
            trt: "Stable Continental".to_string(),
            locations: vec![Point::surface(0.0, 0.0), Point::surface(0.1, 0.0)],
            spec: spec(),
        });
        let first: Vec<Rupture> = src.ruptures().collect();
        let second: Vec<Rupture> = src.ruptures().collect();
        assert_eq!(first.len(), 16);
        assert_eq!(first, second);
    }

    #[test]
    fn test_min_distance_accounts_for_rupture_size() {
        let src = Source::Point(PointSource {
            id: "p1".to_string(),
            trt: "Active Shallow Crust".to_string(),
            location: Point::surface(0.0, 0.0),
            spec: spec(),
        });
        let site = Point::surface(0.0, 1.0);
        let d = src.min_distance(&site);
        assert!(d < site.epicentral_distance(&Point::surface(0.0, 0.0)));
        assert!(d > 0.0);
    }

    #[test]
    fn test_hypo_depth_outside_layer_rejected() {
        let mut bad = spec();
        bad.hypo_depths = Pmf::single(25.0);
        let src = Source::Point(PointSource {
            id: "p1".to_string(),
            trt: "x".to_string(),
            location: Point::surface(0.0, 0.0),
            spec: bad,
        });
        assert!(src.check().is_err());
    }
}
