//! Earthquake catalogue tools used to prepare source models: declustering
//! and completeness analysis.

pub mod catalogue;
pub mod completeness;
pub mod declustering;

pub use catalogue::{decimal_year, Catalogue, Event};
pub use completeness::{CompletenessTable, Stepp1971, TimeBins};
pub use declustering::{Declustered, GardnerKnopoff, GardnerKnopoffWindow};
