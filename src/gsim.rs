//! Ground-motion models.
//!
//! A model maps (rupture, distances, site, IMT) to the mean and total
//! standard deviation of the natural logarithm of ground motion. Models are
//! shared read-only between workers, hence the `Send + Sync` bound.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::imt::{Imt, Imtls};
use crate::rupture::{DistanceContext, RuptureContext};
use crate::site::Site;

pub trait GroundMotionModel: Send + Sync {
    fn name(&self) -> &str;

    fn supports(&self, imt: &Imt) -> bool;

    /// (mean of ln(gm), total sigma) for one rupture-site pair.
    fn mean_and_stddev(
        &self,
        rup: &RuptureContext,
        dists: &DistanceContext,
        site: &Site,
        imt: &Imt,
    ) -> Result<(f64, f64)>;
}

/// One ground-motion model per tectonic region type.
#[derive(Clone, Default)]
pub struct GsimSet {
    by_trt: BTreeMap<String, Arc<dyn GroundMotionModel>>,
}

impl GsimSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(trt: &str, model: Arc<dyn GroundMotionModel>) -> Self {
        let mut set = Self::new();
        set.insert(trt, model);
        set
    }

    pub fn insert(&mut self, trt: &str, model: Arc<dyn GroundMotionModel>) {
        self.by_trt.insert(trt.to_string(), model);
    }

    pub fn get(&self, trt: &str) -> Result<&dyn GroundMotionModel> {
        self.by_trt
            .get(trt)
            .map(|m| m.as_ref())
            .ok_or_else(|| Error::UnknownTectonicRegion(trt.to_string()))
    }

    pub fn trts(&self) -> impl Iterator<Item = &str> {
        self.by_trt.keys().map(|k| k.as_str())
    }

    /// Fails on the first model that cannot serve one of the requested IMTs.
    pub fn check_imts(&self, imtls: &Imtls) -> Result<()> {
        for model in self.by_trt.values() {
            for imt in imtls.imts() {
                if !model.supports(imt) {
                    return Err(Error::UnsupportedImt {
                        gsim: model.name().to_string(),
                        imt: imt.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for GsimSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.by_trt.iter().map(|(trt, m)| (trt, m.name())))
            .finish()
    }
}

// =============================================================================
// Reference parametric model
// =============================================================================

/// Coefficients of `ln(y) = c0 + c1 (M - 6) + c2 ln(sqrt(rjb² + h²)) + c3 ln(vs30 / 760)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttenuationCoeffs {
    pub c0: f64,
    pub c1: f64,
    pub c2: f64,
    pub c3: f64,
    pub h: f64,
    pub sigma: f64,
}

/// Simple magnitude/distance/site attenuation relation with per-IMT
/// coefficients.
#[derive(Debug, Clone)]
pub struct LinearAttenuation {
    name: String,
    coeffs: Vec<(Imt, AttenuationCoeffs)>,
}

impl LinearAttenuation {
    pub fn new(name: &str, coeffs: Vec<(Imt, AttenuationCoeffs)>) -> Self {
        Self { name: name.to_string(), coeffs }
    }

    /// PGA-only model with crustal-like coefficients.
    pub fn pga_default() -> Self {
        Self::new(
            "LinearAttenuation",
            vec![(
                Imt::Pga,
                AttenuationCoeffs { c0: -0.5, c1: 0.9, c2: -1.1, c3: -0.4, h: 6.0, sigma: 0.6 },
            )],
        )
    }

    fn coeffs_for(&self, imt: &Imt) -> Option<&AttenuationCoeffs> {
        self.coeffs.iter().find(|(i, _)| i == imt).map(|(_, c)| c)
    }
}

impl GroundMotionModel for LinearAttenuation {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, imt: &Imt) -> bool {
        self.coeffs_for(imt).is_some()
    }

    fn mean_and_stddev(
        &self,
        rup: &RuptureContext,
        dists: &DistanceContext,
        site: &Site,
        imt: &Imt,
    ) -> Result<(f64, f64)> {
        let c = self.coeffs_for(imt).ok_or_else(|| Error::UnsupportedImt {
            gsim: self.name.clone(),
            imt: imt.to_string(),
        })?;
        let r = (dists.rjb * dists.rjb + c.h * c.h).sqrt();
        let mean = c.c0 + c.c1 * (rup.mag - 6.0) + c.c2 * r.ln() + c.c3 * (site.vs30 / 760.0).ln();
        Ok((mean, c.sigma))
    }
}
