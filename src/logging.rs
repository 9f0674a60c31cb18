//! Structured logging for hazard and risk calculations.
//!
//! Every record is a single JSON line on stderr carrying a run id, a
//! monotonic sequence number, a level and a domain. The core never writes
//! files; collecting the stream is the job of the surrounding tooling.
//!
//! Filtering:
//! - `LOG_LEVEL` sets the minimum level (default `info`)
//! - `LOG_DOMAINS` is a comma-separated list of enabled domains, or `all`
//! - `PROFILE_SAMPLE` is the share of profile scopes that report

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

// =============================================================================
// Levels and domains
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

const LEVELS: [Level; 6] = [Level::Trace, Level::Debug, Level::Info, Level::Warn, Level::Error, Level::Fatal];

impl Level {
    pub fn parse(s: &str) -> Option<Self> {
        LEVELS.iter().copied().find(|l| l.as_str().eq_ignore_ascii_case(s.trim()))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    /// Source and rupture loops, probability maps.
    Hazard,
    Disagg,
    /// Loss curves, damage, BCR.
    Risk,
    Stats,
    /// Declustering and completeness.
    Seismicity,
    /// Configuration, workers, cancellation.
    System,
    Profile,
}

const DOMAINS: [Domain; 7] = [
    Domain::Hazard,
    Domain::Disagg,
    Domain::Risk,
    Domain::Stats,
    Domain::Seismicity,
    Domain::System,
    Domain::Profile,
];

impl Domain {
    pub fn parse(s: &str) -> Option<Self> {
        DOMAINS.iter().copied().find(|d| d.as_str() == s.trim())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Hazard => "hazard",
            Domain::Disagg => "disagg",
            Domain::Risk => "risk",
            Domain::Stats => "stats",
            Domain::Seismicity => "seismicity",
            Domain::System => "system",
            Domain::Profile => "profile",
        }
    }
}

/// Level and domain filter, read once per process. Hazard loops log per
/// source, so the environment is not consulted on every record.
#[derive(Debug, Clone, PartialEq)]
struct Filter {
    min_level: Level,
    /// None enables every domain.
    domains: Option<Vec<Domain>>,
    /// Share of profile scopes that report, in [0, 1].
    profile_sample: f64,
}

impl Filter {
    fn parse(level: Option<&str>, domains: Option<&str>, profile_sample: Option<&str>) -> Self {
        let domains = match domains.map(str::trim) {
            None | Some("all") | Some("") => None,
            Some(list) => Some(list.split(',').filter_map(Domain::parse).collect()),
        };
        Self {
            min_level: level.and_then(Level::parse).unwrap_or(Level::Info),
            domains,
            profile_sample: profile_sample
                .and_then(|v| v.trim().parse::<f64>().ok())
                .map(|p| p.clamp(0.0, 1.0))
                .unwrap_or(1.0),
        }
    }

    fn from_env() -> Self {
        let var = |k: &str| std::env::var(k).ok();
        Self::parse(
            var("LOG_LEVEL").as_deref(),
            var("LOG_DOMAINS").as_deref(),
            var("PROFILE_SAMPLE").as_deref(),
        )
    }

    fn allows(&self, level: Level, domain: Domain) -> bool {
        level >= self.min_level && self.domains.as_ref().map_or(true, |d| d.contains(&domain))
    }
}

static FILTER: OnceLock<Filter> = OnceLock::new();

fn filter() -> &'static Filter {
    FILTER.get_or_init(Filter::from_env)
}

pub fn enabled(level: Level, domain: Domain) -> bool {
    filter().allows(level, domain)
}

// =============================================================================
// Sequence counter and run id
// =============================================================================

static LOG_SEQ: AtomicU64 = AtomicU64::new(0);
static PROFILE_SEQ: AtomicU64 = AtomicU64::new(0);
static RUN_ID: OnceLock<String> = OnceLock::new();

fn next_seq() -> u64 {
    LOG_SEQ.fetch_add(1, Ordering::Relaxed)
}

pub fn run_id() -> &'static str {
    RUN_ID.get_or_init(|| {
        std::env::var("RUN_ID").unwrap_or_else(|_| format!("qr-{}-{}", Utc::now().timestamp_millis(), process::id()))
    })
}

// =============================================================================
// Records
// =============================================================================

/// One JSON line on stderr, if the level and domain pass the filter.
pub fn log(level: Level, domain: Domain, event: &str, fields: Map<String, Value>) {
    if !enabled(level, domain) {
        return;
    }
    eprintln!("{}", render(level, domain, event, fields));
}

fn render(level: Level, domain: Domain, event: &str, mut fields: Map<String, Value>) -> String {
    let msg = fields.remove("msg").unwrap_or(Value::Null);
    json!({
        "ts": Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        "run_id": run_id(),
        "seq": next_seq(),
        "lvl": level.as_str(),
        "domain": domain.as_str(),
        "event": event,
        "msg": msg,
        "data": Value::Object(fields),
    })
    .to_string()
}

// =============================================================================
// Domain helpers
// =============================================================================

pub fn log_source_skipped(source_id: &str, reason: &str) {
    log(
        Level::Trace,
        Domain::Hazard,
        "source_skipped",
        obj(&[("source_id", v_str(source_id)), ("reason", v_str(reason))]),
    );
}

pub fn log_hazard_done(num_sources: usize, num_ruptures: u64, num_sites: usize) {
    log(
        Level::Info,
        Domain::Hazard,
        "hazard_curves_done",
        obj(&[
            ("sources", json!(num_sources)),
            ("ruptures", json!(num_ruptures)),
            ("sites", json!(num_sites)),
        ]),
    );
}

pub fn log_disagg_skip(site_id: usize, reason: &str) {
    log(
        Level::Info,
        Domain::Disagg,
        "disagg_skipped",
        obj(&[("site_id", json!(site_id)), ("reason", v_str(reason))]),
    );
}

pub fn log_disagg_done(site_id: usize, target_iml: f64, poe: f64, ruptures: usize) {
    log(
        Level::Debug,
        Domain::Disagg,
        "disagg_done",
        obj(&[
            ("site_id", json!(site_id)),
            ("target_iml", v_num(target_iml)),
            ("poe", v_num(poe)),
            ("ruptures", json!(ruptures)),
        ]),
    );
}

pub fn log_convergence_failure(unit: &str, reason: &str) {
    log(
        Level::Warn,
        Domain::Seismicity,
        "convergence_failure",
        obj(&[("unit", v_str(unit)), ("reason", v_str(reason))]),
    );
}

pub fn log_asset_result(workflow: &str, asset_id: &str, average_loss: f64) {
    log(
        Level::Debug,
        Domain::Risk,
        "asset_done",
        obj(&[
            ("workflow", v_str(workflow)),
            ("asset_id", v_str(asset_id)),
            ("average_loss", v_num(average_loss)),
        ]),
    );
}

pub fn log_abort(stage: &str, processed: u64) {
    log(
        Level::Warn,
        Domain::System,
        "aborted",
        obj(&[("stage", v_str(stage)), ("processed", json!(processed))]),
    );
}

// =============================================================================
// Field helpers
// =============================================================================

pub fn obj(pairs: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (k, v) in pairs {
        map.insert((*k).to_string(), v.clone());
    }
    map
}

pub fn v_str(s: &str) -> Value {
    Value::String(s.to_string())
}

/// Non-finite numbers are not valid JSON; they are logged as strings.
pub fn v_num(n: f64) -> Value {
    if n.is_finite() {
        json!(n)
    } else {
        Value::String(n.to_string())
    }
}

// =============================================================================
// Profiling
// =============================================================================

/// Trace record with the elapsed wall time, emitted when dropped. With
/// `PROFILE_SAMPLE=p` only about a share `p` of scopes report.
pub struct ProfileScope {
    label: &'static str,
    started: Instant,
    /// None when this scope was not sampled.
    fields: Option<Map<String, Value>>,
}

impl ProfileScope {
    pub fn new(label: &'static str) -> Self {
        Self::with_context(label, &[])
    }

    pub fn with_context(label: &'static str, fields: &[(&str, Value)]) -> Self {
        let report = sampled(filter().profile_sample, PROFILE_SEQ.fetch_add(1, Ordering::Relaxed));
        Self { label, started: Instant::now(), fields: report.then(|| obj(fields)) }
    }
}

/// Every n-th scope reports, n = round(1 / rate).
fn sampled(rate: f64, seq: u64) -> bool {
    if rate <= 0.0 {
        return false;
    }
    let every = (1.0 / rate).round().max(1.0) as u64;
    seq % every == 0
}

impl Drop for ProfileScope {
    fn drop(&mut self) {
        if let Some(mut fields) = self.fields.take() {
            fields.insert("label".to_string(), v_str(self.label));
            fields.insert("elapsed_ms".to_string(), v_num(self.started.elapsed().as_secs_f64() * 1e3));
            log(Level::Trace, Domain::Profile, "profile", fields);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
