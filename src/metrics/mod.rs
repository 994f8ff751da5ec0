//! Metrics Sink (spec.md §4.C): a process-wide Prometheus registry exposing
//! a backend-command counter and a request-latency histogram.
//!
//! Grounded on the teacher's `prometheus/mod.rs` (a `once_cell::Lazy` static
//! `Registry` plus `Lazy` metric statics registered into it once, namespaced
//! `remiro` per SPEC_FULL §C).

use once_cell::sync::Lazy;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder};
use std::time::Instant;

static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

/// Which backing store a metered operation targeted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Source,
    Destination,
}

impl Target {
    fn label(self) -> &'static str {
        match self {
            Target::Source => "source",
            Target::Destination => "destination",
        }
    }
}

static BACKEND_COMMANDS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "remiro_backend_commands_total",
            "Total backend commands issued by the proxy, labeled by target backend and command name.",
        ),
        &["target", "command"],
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

const LATENCY_BUCKETS: &[f64] = &[
    0.0, 25.0, 50.0, 75.0, 100.0, 200.0, 400.0, 600.0, 800.0, 1000.0,
];

static REQUEST_LATENCY_MS: Lazy<Histogram> = Lazy::new(|| {
    let histogram = Histogram::with_opts(
        HistogramOpts::new(
            "remiro_request_latency_ms",
            "Client-observed latency of one dispatched command, in milliseconds.",
        )
        .buckets(LATENCY_BUCKETS.to_vec()),
    )
    .unwrap();
    REGISTRY.register(Box::new(histogram.clone())).unwrap();
    histogram
});

/// Records one backend command's occurrence. Non-blocking: Prometheus'
/// `IntCounterVec` uses lock-free atomics internally, and recording never
/// fails (spec.md I4) — there is nothing to drop on contention here beyond
/// what the `prometheus` crate itself already guarantees.
pub fn record_backend_command(target: Target, command: &str) {
    BACKEND_COMMANDS_TOTAL
        .with_label_values(&[target.label(), command])
        .inc();
}

/// A started latency measurement. Dropping it without calling
/// [`LatencyTimer::observe`] simply discards the sample — `dispatch` always
/// calls `observe` on every exit path (spec.md §4.F step 1), but the type
/// itself does not enforce it.
pub struct LatencyTimer {
    start: Instant,
}

pub fn start_latency_timer() -> LatencyTimer {
    LatencyTimer {
        start: Instant::now(),
    }
}

impl LatencyTimer {
    pub fn observe(self) {
        let elapsed_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        REQUEST_LATENCY_MS.observe(elapsed_ms);
    }
}

/// Renders the registry in Prometheus text exposition format.
pub fn gather_text() -> Result<Vec<u8>, prometheus::Error> {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&families, &mut buffer)?;
    Ok(buffer)
}

pub fn content_type() -> &'static str {
    "text/plain; version=0.0.4"
}
