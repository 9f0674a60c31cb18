//! Intensity measure types.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::{Error, Result};

pub const DEFAULT_SA_DAMPING: f64 = 5.0;

/// Ground-motion metric used as a mapping key. Spectral acceleration is
/// keyed on both period and damping.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum Imt {
    Pga,
    Pgv,
    Pgd,
    Mmi,
    Sa { period: f64, damping: f64 },
}

impl Imt {
    pub fn sa(period: f64) -> Self {
        Imt::Sa { period, damping: DEFAULT_SA_DAMPING }
    }

    /// Parses `PGA`, `PGV`, `PGD`, `MMI` and `SA(<period>)`.
    pub fn parse(s: &str, default_damping: f64) -> Result<Self> {
        let s = s.trim();
        match s {
            "PGA" => return Ok(Imt::Pga),
            "PGV" => return Ok(Imt::Pgv),
            "PGD" => return Ok(Imt::Pgd),
            "MMI" => return Ok(Imt::Mmi),
            _ => {}
        }
        let inner = s
            .strip_prefix("SA(")
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(|| Error::config("intensity_measure_types", format!("unknown IMT `{}`", s)))?;
        let period: f64 = inner
            .trim()
            .parse()
            .map_err(|_| Error::config("intensity_measure_types", format!("bad SA period in `{}`", s)))?;
        if period <= 0.0 {
            return Err(Error::config(
                "intensity_measure_types",
                format!("SA period must be positive in `{}`", s),
            ));
        }
        Ok(Imt::Sa { period, damping: default_damping })
    }

    pub fn period(&self) -> Option<f64> {
        match self {
            Imt::Sa { period, .. } => Some(*period),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Imt::Pga => 0,
            Imt::Pgv => 1,
            Imt::Pgd => 2,
            Imt::Mmi => 3,
            Imt::Sa { .. } => 4,
        }
    }
}

impl PartialEq for Imt {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Imt {}

impl Hash for Imt {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        if let Imt::Sa { period, damping } = self {
            period.to_bits().hash(state);
            damping.to_bits().hash(state);
        }
    }
}

impl PartialOrd for Imt {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Imt {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Imt::Sa { period: p1, damping: d1 }, Imt::Sa { period: p2, damping: d2 }) => {
                p1.total_cmp(p2).then(d1.total_cmp(d2))
            }
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl fmt::Display for Imt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Imt::Pga => write!(f, "PGA"),
            Imt::Pgv => write!(f, "PGV"),
            Imt::Pgd => write!(f, "PGD"),
            Imt::Mmi => write!(f, "MMI"),
            Imt::Sa { period, damping } if *damping == DEFAULT_SA_DAMPING => write!(f, "SA({})", period),
            Imt::Sa { period, damping } => write!(f, "SA({}, {})", period, damping),
        }
    }
}

/// Ordered mapping IMT -> strictly increasing intensity levels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Imtls {
    entries: Vec<(Imt, Vec<f64>)>,
}

impl Imtls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs(pairs: Vec<(Imt, Vec<f64>)>) -> Result<Self> {
        let mut imtls = Self::new();
        for (imt, levels) in pairs {
            imtls.insert(imt, levels)?;
        }
        Ok(imtls)
    }

    pub fn insert(&mut self, imt: Imt, levels: Vec<f64>) -> Result<()> {
        if levels.is_empty() {
            return Err(Error::config("intensity_measure_types_and_levels", format!("no levels for {}", imt)));
        }
        if !levels.windows(2).all(|w| w[0] < w[1]) || levels[0] <= 0.0 {
            return Err(Error::config(
                "intensity_measure_types_and_levels",
                format!("levels for {} must be positive and strictly increasing", imt),
            ));
        }
        if self.entries.iter().any(|(i, _)| *i == imt) {
            return Err(Error::config("intensity_measure_types_and_levels", format!("duplicate IMT {}", imt)));
        }
        self.entries.push((imt, levels));
        Ok(())
    }

    pub fn levels(&self, imt: &Imt) -> Option<&[f64]> {
        self.entries.iter().find(|(i, _)| i == imt).map(|(_, l)| l.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Imt, &[f64])> {
        self.entries.iter().map(|(i, l)| (i, l.as_slice()))
    }

    pub fn imts(&self) -> impl Iterator<Item = &Imt> {
        self.entries.iter().map(|(i, _)| i)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of levels across all IMTs.
    pub fn num_levels(&self) -> usize {
        self.entries.iter().map(|(_, l)| l.len()).sum()
    }

    /// Offset of the first level of `imt` in a flattened level array.
    pub fn offset(&self, imt: &Imt) -> Option<usize> {
        let mut offset = 0;
        for (i, levels) in &self.entries {
            if i == imt {
                return Some(offset);
            }
            offset += levels.len();
        }
        None
    }
}
