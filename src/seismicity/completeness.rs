//! Stepp (1971) completeness analysis.
//!
//! For each magnitude bin the standard deviation of the Poisson rate
//! estimate, `sigma = sqrt(n / T) / sqrt(T)`, is computed over windows of
//! growing duration `T` ending at the most recent year. While the catalogue
//! is complete sigma follows the `T^-0.5` line; the completeness period is
//! the crossover of a two-segment fit in log10 space whose first slope is
//! fixed at -0.5.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{Error, Result};
use crate::logging::{log, log_convergence_failure, obj, Domain, Level};

use super::catalogue::Catalogue;

const FIXED_SLOPE: f64 = -0.5;
const MIN_SIGMA: f64 = 1e-9;
const GRID_POINTS: usize = 200;
const GOLDEN_ITERATIONS: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TimeBins {
    /// Regular windows of this many years back from the last full year.
    Width(f64),
    /// Explicit window start years, most recent first. The first entry is
    /// taken as the end year of the analysis.
    Edges(Vec<f64>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stepp1971 {
    pub magnitude_bin: f64,
    pub time_bins: TimeBins,
    /// Completeness periods never shrink towards larger magnitudes.
    pub increment_lock: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletenessTable {
    /// (year of completeness, magnitude bin centre); the year is NaN where
    /// the fit failed.
    pub rows: Vec<(f64, f64)>,
    /// Window durations in years.
    pub durations: Vec<f64>,
    /// `sigma[t][m]` for window `t` and magnitude bin `m`.
    pub sigma: Vec<Vec<f64>>,
    /// Fitted second-segment slope per magnitude bin.
    pub slopes: Vec<f64>,
    /// (magnitude bin centre, reason) for every bin without a result.
    pub failures: Vec<(f64, String)>,
}

/// Two-segment line with slope `FIXED_SLOPE` up to `crossover`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct BilinearFit {
    slope: f64,
    crossover: f64,
    intercept: f64,
    rss: f64,
}

fn bilinear(x: f64, slope: f64, crossover: f64, intercept: f64) -> f64 {
    if x <= crossover {
        FIXED_SLOPE * x + intercept
    } else {
        FIXED_SLOPE * crossover + intercept + slope * (x - crossover)
    }
}

/// Best slope and intercept for a fixed crossover. The model is linear in
/// both, so this is least squares with the slope bounded above by -0.5.
fn fit_at(xs: &[f64], ys: &[f64], crossover: f64) -> BilinearFit {
    let n = xs.len() as f64;
    let r: Vec<f64> = xs.iter().zip(ys).map(|(x, y)| y - FIXED_SLOPE * x.min(crossover)).collect();
    let u: Vec<f64> = xs.iter().map(|x| (x - crossover).max(0.0)).collect();
    let mean_r = r.iter().sum::<f64>() / n;
    let mean_u = u.iter().sum::<f64>() / n;
    let suu: f64 = u.iter().map(|v| (v - mean_u).powi(2)).sum();
    let sur: f64 = u.iter().zip(&r).map(|(a, b)| (a - mean_u) * (b - mean_r)).sum();

    let mut slope = if suu > 0.0 { sur / suu } else { FIXED_SLOPE };
    if slope > FIXED_SLOPE {
        slope = FIXED_SLOPE;
    }
    let intercept = mean_r - slope * mean_u;
    let rss = xs
        .iter()
        .zip(ys)
        .map(|(x, y)| (y - bilinear(*x, slope, crossover, intercept)).powi(2))
        .sum();
    BilinearFit { slope, crossover, intercept, rss }
}

/// Crossover constrained to `[0, max(x)]`: a grid scan followed by golden
/// section refinement around the best grid node.
fn fit_bilinear(xs: &[f64], ys: &[f64]) -> std::result::Result<BilinearFit, String> {
    if xs.iter().chain(ys).any(|v| !v.is_finite()) {
        return Err("non-finite data".to_string());
    }
    let upper = xs.iter().copied().fold(0.0, f64::max);
    if upper <= 0.0 {
        return Ok(fit_at(xs, ys, 0.0));
    }
    let step = upper / GRID_POINTS as f64;
    let mut best = fit_at(xs, ys, 0.0);
    let mut best_k = 0;
    for k in 1..=GRID_POINTS {
        let fit = fit_at(xs, ys, k as f64 * step);
        if fit.rss < best.rss {
            best = fit;
            best_k = k;
        }
    }

    let phi = (5f64.sqrt() - 1.0) / 2.0;
    let mut a = (best_k.saturating_sub(1)) as f64 * step;
    let mut b = ((best_k + 1).min(GRID_POINTS)) as f64 * step;
    let mut c = b - phi * (b - a);
    let mut d = a + phi * (b - a);
    let mut fc = fit_at(xs, ys, c);
    let mut fd = fit_at(xs, ys, d);
    for _ in 0..GOLDEN_ITERATIONS {
        if fc.rss < fd.rss {
            b = d;
            d = c;
            fd = fc;
            c = b - phi * (b - a);
            fc = fit_at(xs, ys, c);
        } else {
            a = c;
            c = d;
            fc = fd;
            d = a + phi * (b - a);
            fd = fit_at(xs, ys, d);
        }
    }
    for fit in [fc, fd] {
        if fit.rss < best.rss {
            best = fit;
        }
    }
    if !best.rss.is_finite() {
        return Err("residuals did not converge".to_string());
    }
    Ok(best)
}

impl Stepp1971 {
    pub fn new(magnitude_bin: f64, time_bin: f64) -> Self {
        Self { magnitude_bin, time_bins: TimeBins::Width(time_bin), increment_lock: false }
    }

    pub fn with_increment_lock(mut self) -> Self {
        self.increment_lock = true;
        self
    }

    fn magnitude_edges(&self, magnitudes: &[f64]) -> Result<Vec<f64>> {
        if !(self.magnitude_bin > 0.0) {
            return Err(Error::config("magnitude_bin", "must be positive"));
        }
        let min = magnitudes.iter().copied().fold(f64::INFINITY, f64::min);
        let max = magnitudes.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if max - min < self.magnitude_bin {
            return Err(Error::config("magnitude_bin", "bin width greater than the magnitude range"));
        }
        let start = min.floor();
        let stop = max.ceil();
        let count = ((stop - start) / self.magnitude_bin - 1e-9).ceil() as usize;
        Ok((0..count)
            .map(|k| start + k as f64 * self.magnitude_bin)
            .filter(|edge| edge - max < self.magnitude_bin && min - edge < self.magnitude_bin)
            .collect())
    }

    /// (end year, window start years from most recent to oldest).
    fn time_edges(&self, years: &[f64]) -> Result<(f64, Vec<f64>)> {
        match &self.time_bins {
            TimeBins::Edges(edges) => {
                if edges.is_empty() {
                    return Err(Error::config("time_bin", "no time windows given"));
                }
                if edges.windows(2).any(|w| w[1] - w[0] > 0.0) {
                    return Err(Error::config("time_bin", "time windows must be ordered from recent to oldest"));
                }
                Ok((edges[0], edges.clone()))
            }
            TimeBins::Width(width) => {
                if !(*width > 0.0) {
                    return Err(Error::config("time_bin", "must be positive"));
                }
                let end = years.iter().copied().fold(f64::NEG_INFINITY, f64::max).floor();
                let start = years.iter().copied().fold(f64::INFINITY, f64::min).floor();
                if end - start < *width {
                    return Err(Error::config("time_bin", "catalogue duration smaller than the time bin width"));
                }
                let mut edges = Vec::new();
                let mut t = end - width;
                while t > start - width {
                    edges.push(t);
                    t -= width;
                }
                Ok((end, edges))
            }
        }
    }

    pub fn completeness(&self, catalogue: &Catalogue) -> Result<CompletenessTable> {
        if catalogue.is_empty() {
            return Err(Error::config("catalogue", "no events"));
        }
        let years = catalogue.decimal_years()?;
        let mags = catalogue.magnitudes();
        let mag_edges = self.magnitude_edges(&mags)?;
        if mag_edges.len() < 2 {
            return Err(Error::config("magnitude_bin", "fewer than two magnitude bin edges"));
        }
        let (end_year, time_edges) = self.time_edges(&years)?;
        let n_mags = mag_edges.len() - 1;
        let last_year = years.iter().copied().fold(f64::NEG_INFINITY, f64::max).floor();
        let durations: Vec<f64> = time_edges.iter().map(|t| last_year - t).collect();

        let sigma: Vec<Vec<f64>> = time_edges
            .iter()
            .zip(&durations)
            .map(|(t0, duration)| {
                let mut counts = vec![0usize; n_mags];
                for (m, y) in mags.iter().zip(&years) {
                    if y > t0 {
                        if let Some(k) = histogram_bin(&mag_edges, *m) {
                            counts[k] += 1;
                        }
                    }
                }
                counts
                    .iter()
                    .map(|c| if *c > 0 { (*c as f64 / duration).sqrt() / duration.sqrt() } else { 0.0 })
                    .collect()
            })
            .collect();

        let centres: Vec<f64> = mag_edges.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect();
        let mut comp_time = vec![f64::NAN; n_mags];
        let mut slopes = vec![f64::NAN; n_mags];
        let mut failures = Vec::new();
        for m in 0..n_mags {
            let (xs, ys): (Vec<f64>, Vec<f64>) = durations
                .iter()
                .zip(&sigma)
                .filter(|(_, row)| row[m] >= MIN_SIGMA)
                .map(|(d, row)| (d.log10(), row[m].log10()))
                .unzip();
            let unit = format!("magnitude_bin_{:.2}", centres[m]);
            if xs.len() < 3 {
                let reason = "fewer than 3 populated time windows".to_string();
                log_convergence_failure(&unit, &reason);
                failures.push((centres[m], reason));
                continue;
            }
            match fit_bilinear(&xs, &ys) {
                Ok(fit) => {
                    comp_time[m] = 10f64.powf(fit.crossover);
                    slopes[m] = fit.slope;
                }
                Err(reason) => {
                    log_convergence_failure(&unit, &reason);
                    failures.push((centres[m], reason));
                }
            }
        }

        if self.increment_lock {
            for m in 1..n_mags {
                if comp_time[m].is_nan() || comp_time[m] < comp_time[m - 1] {
                    comp_time[m] = comp_time[m - 1];
                }
            }
        }

        let rows: Vec<(f64, f64)> = comp_time
            .iter()
            .zip(&centres)
            .map(|(t, c)| ((end_year - t).floor(), *c))
            .collect();
        log(
            Level::Info,
            Domain::Seismicity,
            "completeness_done",
            obj(&[("magnitude_bins", json!(n_mags)), ("failures", json!(failures.len()))]),
        );
        Ok(CompletenessTable { rows, durations, sigma, slopes, failures })
    }
}

/// Right-open bins with the last one closed.
fn histogram_bin(edges: &[f64], value: f64) -> Option<usize> {
    let last = *edges.last()?;
    if value < edges[0] || value > last {
        return None;
    }
    if value == last {
        return Some(edges.len() - 2);
    }
    edges.windows(2).position(|w| value >= w[0] && value < w[1])
}
