//! Probabilistic seismic hazard and risk.
//!
//! Hazard: sources generate ruptures, ground-motion models turn them into
//! exceedance probabilities that are folded into per-site curves, then
//! disaggregated by magnitude, distance, location, epsilon and tectonic
//! region. Risk: vulnerability and fragility models turn hazard curves or
//! ground-motion fields into loss curves, loss maps and damage
//! distributions, summarized across logic-tree realizations.

pub mod config;
pub mod disagg;
pub mod error;
pub mod geo;
pub mod gmf;
pub mod gsim;
pub mod hazard;
pub mod imt;
pub mod logging;
pub mod mfd;
pub mod numeric;
pub mod parallel;
pub mod probability;
pub mod risk;
pub mod rupture;
pub mod seismicity;
pub mod site;
pub mod source;
pub mod stats;
pub mod vulnerability;
pub mod workflow;

pub use error::{Error, Result};
