//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Update aggregation (queued updates, flushes, batch sizes)
//! - Retry coordination (attempts, exhaustion, circuit breaker)
//! - Persistence (writes, load-time discards)

use once_cell::sync::Lazy;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Update Aggregation
// =============================================================================

/// Updates accepted by the aggregator.
pub static UPDATES_QUEUED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "dlsync_updates_queued_total",
        "Total job updates queued for aggregation",
    )
    .unwrap()
});

/// Flushes by trigger.
pub static FLUSHES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("dlsync_flushes_total", "Total aggregator flushes"),
        &["trigger"], // "debounce", "forced", "immediate"
    )
    .unwrap()
});

/// Jobs committed per flush.
pub static FLUSH_BATCH_SIZE: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "dlsync_flush_batch_size",
            "Number of jobs committed per aggregator flush",
        )
        .buckets(vec![1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0]),
    )
    .unwrap()
});

/// Commits rejected by the state sink.
pub static SINK_ERRORS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "dlsync_sink_errors_total",
        "Total failed commits to the state sink",
    )
    .unwrap()
});

// =============================================================================
// Retry Coordination
// =============================================================================

/// Operation attempts by result.
pub static RETRY_ATTEMPTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "dlsync_retry_attempts_total",
            "Total attempts made by the retry coordinator",
        ),
        &["result"], // "success", "failure"
    )
    .unwrap()
});

/// Operations that ran out of retries.
pub static RETRIES_EXHAUSTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "dlsync_retries_exhausted_total",
        "Total operations that exhausted their retries",
    )
    .unwrap()
});

/// Calls rejected because the circuit was open.
pub static CIRCUIT_REJECTIONS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "dlsync_circuit_rejections_total",
        "Total calls rejected by an open circuit breaker",
    )
    .unwrap()
});

/// Transitions of a circuit from closed to open.
pub static CIRCUITS_OPENED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "dlsync_circuits_opened_total",
        "Total circuit breaker trips",
    )
    .unwrap()
});

// =============================================================================
// Persistence
// =============================================================================

/// Durable writes by result.
pub static PERSISTENCE_WRITES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("dlsync_persistence_writes_total", "Total durable writes"),
        &["result"], // "success", "failure"
    )
    .unwrap()
});

/// Durable write duration in seconds.
pub static PERSISTENCE_WRITE_DURATION: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "dlsync_persistence_write_duration_seconds",
            "Duration of durable writes",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
    )
    .unwrap()
});

/// Records dropped while loading from storage.
pub static LOAD_DISCARDED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "dlsync_load_discarded_total",
            "Records discarded while loading persisted jobs",
        ),
        &["reason"], // "expired", "invalid"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Aggregation
        Box::new(UPDATES_QUEUED.clone()),
        Box::new(FLUSHES.clone()),
        Box::new(FLUSH_BATCH_SIZE.clone()),
        Box::new(SINK_ERRORS.clone()),
        // Retry
        Box::new(RETRY_ATTEMPTS.clone()),
        Box::new(RETRIES_EXHAUSTED.clone()),
        Box::new(CIRCUIT_REJECTIONS.clone()),
        Box::new(CIRCUITS_OPENED.clone()),
        // Persistence
        Box::new(PERSISTENCE_WRITES.clone()),
        Box::new(PERSISTENCE_WRITE_DURATION.clone()),
        Box::new(LOAD_DISCARDED.clone()),
    ]
}
