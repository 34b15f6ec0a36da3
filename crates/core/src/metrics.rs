//! Prometheus metrics for the attempt engine.
//!
//! This module provides metrics for:
//! - Polling (poll counts and scan latency)
//! - Claims (attempts by seat and result)
//! - Workers (launches and terminal outcomes)
//! - Page drift (layout fallbacks, carrier filter degradation)

use once_cell::sync::Lazy;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Polling
// =============================================================================

/// Result-table polls total.
pub static POLLS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("seatrace_polls_total", "Total result table polls").unwrap()
});

/// Time spent scanning the result table per poll, in seconds.
pub static POLL_SCAN_DURATION: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "seatrace_poll_scan_duration_seconds",
            "Duration of result table scans",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
    )
    .unwrap()
});

// =============================================================================
// Claims
// =============================================================================

/// Claim attempts by seat column and result.
pub static CLAIM_ATTEMPTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("seatrace_claim_attempts_total", "Total claim attempts"),
        &["seat", "result"], // result: "confirmed", "lost", "not_activated"
    )
    .unwrap()
});

// =============================================================================
// Workers
// =============================================================================

/// Workers currently running.
pub static WORKERS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("seatrace_workers_active", "Number of running workers").unwrap()
});

/// Worker terminal outcomes.
pub static WORKER_OUTCOMES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("seatrace_worker_outcomes_total", "Worker terminal outcomes"),
        &["result"], // "succeeded" or an error kind
    )
    .unwrap()
});

/// Browser launch retries with the legacy headless flag.
pub static HEADLESS_FALLBACKS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "seatrace_headless_fallbacks_total",
        "Launches retried with the legacy headless flag",
    )
    .unwrap()
});

// =============================================================================
// Page drift
// =============================================================================

/// Column detections that fell back to the default mapping.
pub static LAYOUT_FALLBACKS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "seatrace_layout_fallbacks_total",
        "Column detections that used the default mapping",
    )
    .unwrap()
});

/// Carrier filters disabled because no row matched.
pub static CARRIER_FILTER_DEGRADED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "seatrace_carrier_filter_degraded_total",
        "Carrier filters disabled after a poll with no matching rows",
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(POLLS_TOTAL.clone()),
        Box::new(POLL_SCAN_DURATION.clone()),
        Box::new(CLAIM_ATTEMPTS.clone()),
        Box::new(WORKERS_ACTIVE.clone()),
        Box::new(WORKER_OUTCOMES.clone()),
        Box::new(HEADLESS_FALLBACKS.clone()),
        Box::new(LAYOUT_FALLBACKS.clone()),
        Box::new(CARRIER_FILTER_DEGRADED.clone()),
    ]
}
