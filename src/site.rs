//! Sites and site collections.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geo::Point;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub id: usize,
    pub location: Point,
    pub vs30: f64,
    pub vs30_measured: bool,
    pub z1pt0: f64,
    pub z2pt5: f64,
}

impl Site {
    pub fn new(id: usize, location: Point, vs30: f64, vs30_measured: bool, z1pt0: f64, z2pt5: f64) -> Self {
        Self { id, location, vs30, vs30_measured, z1pt0, z2pt5 }
    }

    /// Rock site with reference soil parameters.
    pub fn rock(id: usize, lon: f64, lat: f64) -> Self {
        Self::new(id, Point::surface(lon, lat), 760.0, false, 40.0, 1.0)
    }
}

/// Ordered, immutable set of sites with unique ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteCollection {
    sites: Vec<Site>,
}

impl SiteCollection {
    pub fn new(sites: Vec<Site>) -> Result<Self> {
        let mut ids: Vec<usize> = sites.iter().map(|s| s.id).collect();
        ids.sort_unstable();
        if ids.windows(2).any(|w| w[0] == w[1]) {
            return Err(Error::config("sites", "site ids must be unique"));
        }
        for site in &sites {
            if !(site.vs30 > 0.0) {
                return Err(Error::config("sites", format!("site {} has non-positive vs30", site.id)));
            }
        }
        Ok(Self { sites })
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Site> {
        self.sites.iter()
    }

    pub fn ids(&self) -> Vec<usize> {
        self.sites.iter().map(|s| s.id).collect()
    }

    pub fn get(&self, id: usize) -> Option<&Site> {
        self.sites.iter().find(|s| s.id == id)
    }

    /// Reduced collection of the sites satisfying `keep`; ids are preserved.
    pub fn filter<F>(&self, mut keep: F) -> SiteCollection
    where
        F: FnMut(&Site) -> bool,
    {
        SiteCollection {
            sites: self.sites.iter().filter(|s| keep(s)).cloned().collect(),
        }
    }

    /// Sites within `max_distance` km (epicentral) of `point`.
    pub fn within(&self, point: &Point, max_distance: f64) -> SiteCollection {
        self.filter(|s| s.location.epicentral_distance(point) <= max_distance)
    }
}

impl<'a> IntoIterator for &'a SiteCollection {
    type Item = &'a Site;
    type IntoIter = std::slice::Iter<'a, Site>;

    fn into_iter(self) -> Self::IntoIter {
        self.sites.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_ids_rejected() {
        let sites = vec![Site::rock(1, 0.0, 0.0), Site::rock(1, 1.0, 1.0)];
        assert!(SiteCollection::new(sites).is_err());
    }

    #[test]
    fn test_filter_preserves_ids() {
        let sites = SiteCollection::new(vec![
            Site::rock(7, 0.0, 0.0),
            Site::rock(9, 0.0, 1.0),
            Site::rock(11, 0.0, 2.0),
        ])
        .unwrap();
        let near = sites.within(&Point::surface(0.0, 0.0), 120.0);
        assert_eq!(near.ids(), vec![7, 9]);
        assert!(sites.within(&Point::surface(50.0, 50.0), 10.0).is_empty());
    }
}
