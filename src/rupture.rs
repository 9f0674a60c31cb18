//! Ruptures: the unit of work of the hazard and disaggregation loops.

use serde::{Deserialize, Serialize};

use crate::geo::{PlanarSurface, Point};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RuptureSurface {
    /// Degenerate surface collapsed on the hypocentre.
    Point(Point),
    Planar(PlanarSurface),
}

impl RuptureSurface {
    pub fn rrup(&self, site: &Point) -> f64 {
        match self {
            RuptureSurface::Point(p) => p.distance(site),
            RuptureSurface::Planar(s) => s.rrup(site),
        }
    }

    pub fn rjb(&self, site: &Point) -> f64 {
        match self {
            RuptureSurface::Point(p) => p.epicentral_distance(site),
            RuptureSurface::Planar(s) => s.rjb(site),
        }
    }

    pub fn centroid(&self) -> Point {
        match self {
            RuptureSurface::Point(p) => *p,
            RuptureSurface::Planar(s) => s.centroid(),
        }
    }

    pub fn top_edge_depth(&self) -> f64 {
        match self {
            RuptureSurface::Point(p) => p.depth,
            RuptureSurface::Planar(s) => s.top_edge_depth(),
        }
    }

    pub fn dip(&self) -> f64 {
        match self {
            RuptureSurface::Point(_) => 90.0,
            RuptureSurface::Planar(s) => s.dip,
        }
    }
}

/// How often a rupture happens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Occurrence {
    /// Annual rate of a time-independent Poissonian process.
    Poissonian { rate: f64 },
    /// Probability of occurrence over the investigation time, for
    /// time-dependent or sampled ruptures.
    Probability(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rupture {
    pub source_id: String,
    pub mag: f64,
    pub rake: f64,
    pub trt: String,
    pub hypocenter: Point,
    pub surface: RuptureSurface,
    pub occurrence: Occurrence,
}

impl Rupture {
    /// Probability that the rupture occurs at least once in `time_span`
    /// years.
    pub fn probability_of_occurrence(&self, time_span: f64) -> f64 {
        match self.occurrence {
            Occurrence::Poissonian { rate } => 1.0 - (-rate * time_span).exp(),
            Occurrence::Probability(p) => p.clamp(0.0, 1.0),
        }
    }

    pub fn context(&self) -> RuptureContext {
        RuptureContext {
            mag: self.mag,
            rake: self.rake,
            dip: self.surface.dip(),
            ztor: self.surface.top_edge_depth(),
            hypo_depth: self.hypocenter.depth,
        }
    }

    pub fn distances(&self, site: &Point) -> DistanceContext {
        DistanceContext {
            rrup: self.surface.rrup(site),
            rjb: self.surface.rjb(site),
            repi: self.hypocenter.epicentral_distance(site),
            rhypo: self.hypocenter.distance(site),
        }
    }
}

/// Poissonian temporal occurrence model over an investigation time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoissonTom {
    pub time_span: f64,
}

impl PoissonTom {
    pub fn new(time_span: f64) -> Self {
        Self { time_span }
    }

    pub fn probability_of_occurrence(&self, rupture: &Rupture) -> f64 {
        rupture.probability_of_occurrence(self.time_span)
    }

    /// Probability of at least one occurrence given an annual rate.
    pub fn poe_from_rate(&self, rate: f64) -> f64 {
        1.0 - (-rate * self.time_span).exp()
    }
}

/// Rupture parameters seen by a ground-motion model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuptureContext {
    pub mag: f64,
    pub rake: f64,
    pub dip: f64,
    pub ztor: f64,
    pub hypo_depth: f64,
}

/// Source-to-site distances in km.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceContext {
    pub rrup: f64,
    pub rjb: f64,
    pub repi: f64,
    pub rhypo: f64,
}
