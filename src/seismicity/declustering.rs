//! Gardner & Knopoff (1974) window declustering.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{Error, Result};
use crate::geo::geodetic_distance;
use crate::logging::{log, obj, Domain, Level};

use super::catalogue::Catalogue;

const DAYS_PER_YEAR: f64 = 364.75;

/// Magnitude-dependent space (km) and time (years) windows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GardnerKnopoffWindow;

impl GardnerKnopoffWindow {
    pub fn space_km(&self, magnitude: f64) -> f64 {
        10f64.powf(0.1238 * magnitude + 0.983)
    }

    pub fn time_years(&self, magnitude: f64) -> f64 {
        let days = if magnitude >= 6.5 {
            10f64.powf(0.032 * magnitude + 2.7389)
        } else {
            10f64.powf(0.5409 * magnitude - 0.547)
        };
        days / DAYS_PER_YEAR
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GardnerKnopoff {
    pub window: GardnerKnopoffWindow,
    /// Share of the time window searched before the mainshock.
    pub fs_time_prop: f64,
    /// When false, an event already assigned to a cluster can be taken over
    /// by the window of a later (smaller or equal) mainshock, and its flag is
    /// rewritten.
    pub exclude_flagged: bool,
}

impl Default for GardnerKnopoff {
    fn default() -> Self {
        Self { window: GardnerKnopoffWindow, fs_time_prop: 1.0, exclude_flagged: false }
    }
}

/// Cluster index per event (0 = not clustered) and flag
/// (0 mainshock or isolated, 1 aftershock, -1 foreshock), in catalogue order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declustered {
    pub cluster: Vec<usize>,
    pub flag: Vec<i8>,
}

impl Declustered {
    pub fn num_clusters(&self) -> usize {
        self.cluster.iter().copied().max().unwrap_or(0)
    }

    /// Mask of the events kept in a declustered catalogue.
    pub fn mainshocks(&self) -> Vec<bool> {
        self.flag.iter().map(|f| *f == 0).collect()
    }
}

impl GardnerKnopoff {
    pub fn new(fs_time_prop: f64) -> Self {
        Self { fs_time_prop, ..Self::default() }
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.fs_time_prop) {
            return Err(Error::config("fs_time_prop", "must be within [0, 1]"));
        }
        Ok(())
    }

    /// Events are visited from the largest magnitude down; each one not yet
    /// in a cluster opens a window and claims the events inside it.
    pub fn decluster(&self, catalogue: &Catalogue) -> Result<Declustered> {
        self.validate()?;
        let n = catalogue.len();
        let years = catalogue.decimal_years()?;
        let events = &catalogue.events;

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|a, b| {
            events[*b]
                .magnitude
                .total_cmp(&events[*a].magnitude)
                .then(b.cmp(a))
        });

        // indexed by catalogue position
        let mut cluster = vec![0usize; n];
        let mut flag = vec![0i8; n];
        let mut num_clusters = 0usize;

        for &i in order.iter().take(n.saturating_sub(1)) {
            if cluster[i] != 0 {
                continue;
            }
            let main = &events[i];
            let sw_time = self.window.time_years(main.magnitude);
            let sw_space = self.window.space_km(main.magnitude);

            let selected: Vec<usize> = (0..n)
                .filter(|&j| {
                    let dt = years[j] - years[i];
                    dt >= -sw_time * self.fs_time_prop
                        && dt <= sw_time
                        && (!self.exclude_flagged || flag[j] == 0)
                })
                .filter(|&j| {
                    geodetic_distance(events[j].longitude, events[j].latitude, main.longitude, main.latitude)
                        <= sw_space
                })
                .collect();

            if !selected.iter().any(|&j| j != i) {
                continue;
            }
            num_clusters += 1;
            for &j in &selected {
                cluster[j] = num_clusters;
                flag[j] = if years[j] - years[i] < 0.0 && j != i { -1 } else { 1 };
            }
            cluster[i] = num_clusters;
            flag[i] = 0;
        }

        log(
            Level::Info,
            Domain::Seismicity,
            "declustering_done",
            obj(&[("events", json!(n)), ("clusters", json!(num_clusters))]),
        );
        Ok(Declustered { cluster, flag })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seismicity::catalogue::Event;

    #[test]
    fn test_window_values() {
        let w = GardnerKnopoffWindow;
        assert!((w.space_km(5.0) - 10f64.powf(1.602)).abs() < 1e-9);
        assert!((w.time_years(7.0) - 10f64.powf(2.9629) / 364.75).abs() < 1e-9);
        assert!((w.time_years(5.0) - 10f64.powf(2.1575) / 364.75).abs() < 1e-9);
    }

    fn sequence() -> Catalogue {
        Catalogue::new(vec![
            Event::on(2000, 1, 1, 10.0, 45.0, 4.5),  // foreshock
            Event::on(2000, 1, 10, 10.0, 45.0, 6.0), // mainshock
            Event::on(2000, 1, 20, 10.05, 45.0, 4.8), // aftershock
            Event::on(2000, 2, 1, 30.0, 10.0, 5.0),  // far away
            Event::on(2010, 1, 1, 10.0, 45.0, 4.0),  // much later
        ])
    }

    #[test]
    fn test_foreshock_and_aftershock_flags() {
        let out = GardnerKnopoff::new(1.0).decluster(&sequence()).unwrap();
        assert_eq!(out.flag, vec![-1, 0, 1, 0, 0]);
        assert_eq!(out.cluster, vec![1, 1, 1, 0, 0]);
        assert_eq!(out.num_clusters(), 1);
        assert_eq!(out.mainshocks(), vec![false, true, false, true, true]);
    }

    #[test]
    fn test_no_foreshock_window() {
        let out = GardnerKnopoff::new(0.0).decluster(&sequence()).unwrap();
        assert_eq!(out.flag[0], 0);
        assert_eq!(out.flag[2], 1);
    }

    #[test]
    fn test_rejects_bad_fraction() {
        assert!(GardnerKnopoff::new(1.5).decluster(&sequence()).is_err());
    }
}
