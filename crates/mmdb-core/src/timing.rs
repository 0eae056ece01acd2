//! Opt-in latency sampling for store operations.
//!
//! Enabled with `MMDB_TIMING=1` or the CLI's `--timing`. Samples are kept
//! process-wide so operations run from worker threads are counted too.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

static ENABLED: AtomicBool = AtomicBool::new(false);
static SAMPLES: Mutex<BTreeMap<&'static str, Vec<Duration>>> = Mutex::new(BTreeMap::new());

/// Latency summary for one operation name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpTiming {
    pub name: String,
    pub count: usize,
    #[serde(rename = "p50_us", serialize_with = "as_micros")]
    pub p50: Duration,
    #[serde(rename = "p95_us", serialize_with = "as_micros")]
    pub p95: Duration,
    #[serde(rename = "p99_us", serialize_with = "as_micros")]
    pub p99: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TimingReport {
    pub operations: Vec<OpTiming>,
}

fn as_micros<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(u64::try_from(d.as_micros()).unwrap_or(u64::MAX))
}

/// True when `MMDB_TIMING` is set to `1`, `true`, `yes`, or `on`.
#[must_use]
pub fn enabled_from_env() -> bool {
    std::env::var("MMDB_TIMING").is_ok_and(|v| {
        matches!(
            v.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

pub fn set_enabled(enabled: bool) {
    ENABLED.store(enabled, Ordering::Relaxed);
    if !enabled {
        reset();
    }
}

#[must_use]
pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

/// Drop every recorded sample.
pub fn reset() {
    if let Ok(mut samples) = SAMPLES.lock() {
        samples.clear();
    }
}

/// Run `f`, recording its wall time under `name` when timing is enabled.
pub fn timed<R>(name: &'static str, f: impl FnOnce() -> R) -> R {
    if !is_enabled() {
        return f();
    }
    let started = Instant::now();
    let out = f();
    record(name, started.elapsed());
    out
}

fn record(name: &'static str, elapsed: Duration) {
    if let Ok(mut samples) = SAMPLES.lock() {
        samples.entry(name).or_default().push(elapsed);
    }
}

/// Drain recorded samples into a per-operation report.
#[must_use]
pub fn take_report() -> TimingReport {
    let drained = SAMPLES
        .lock()
        .map(|mut samples| std::mem::take(&mut *samples))
        .unwrap_or_default();

    let operations = drained
        .into_iter()
        .map(|(name, mut values)| {
            values.sort_unstable();
            OpTiming {
                name: name.to_string(),
                count: values.len(),
                p50: nearest_rank(&values, 50),
                p95: nearest_rank(&values, 95),
                p99: nearest_rank(&values, 99),
            }
        })
        .collect();

    TimingReport { operations }
}

fn nearest_rank(sorted: &[Duration], pct: usize) -> Duration {
    let Some(last) = sorted.len().checked_sub(1) else {
        return Duration::ZERO;
    };
    let rank = (pct.min(100) * sorted.len()).div_ceil(100);
    sorted[rank.saturating_sub(1).min(last)]
}

impl TimingReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Plain-text table for stderr.
    #[must_use]
    pub fn render_text(&self) -> String {
        if self.is_empty() {
            return "no timing samples\n".to_string();
        }
        let mut out = format!(
            "{:<20} {:>7} {:>10} {:>10} {:>10}\n",
            "operation", "count", "p50", "p95", "p99"
        );
        for op in &self.operations {
            let _ = writeln!(
                out,
                "{:<20} {:>7} {:>10} {:>10} {:>10}",
                op.name,
                op.count,
                format!("{:?}", op.p50),
                format!("{:?}", op.p95),
                format!("{:?}", op.p99),
            );
        }
        out
    }
}
