//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the dlsync server:
//! - HTTP request metrics (latency, counts)
//! - Engine events received
//! - Job table and persistence status (collected dynamically)
//!
//! Core coordinator metrics are registered in the same registry.

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry, TextEncoder,
};

use dlsync_core::JobStatus;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "dlsync_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("dlsync_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "dlsync_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Job Metrics
// =============================================================================

/// Progress events received from the engine.
pub static EVENTS_RECEIVED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "dlsync_events_received_total",
        "Total job progress events received",
    )
    .unwrap()
});

/// Current job count by status.
pub static JOBS_BY_STATUS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("dlsync_jobs_by_status", "Current job count by status"),
        &["status"],
    )
    .unwrap()
});

/// Whether the job table has unsaved changes (1 = dirty).
pub static PERSISTENCE_DIRTY: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "dlsync_persistence_dirty",
        "Whether the job table has changes not yet written to storage",
    )
    .unwrap()
});

/// Register all metrics with the registry.
fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // Jobs
    registry
        .register(Box::new(EVENTS_RECEIVED.clone()))
        .unwrap();
    registry
        .register(Box::new(JOBS_BY_STATUS.clone()))
        .unwrap();
    registry
        .register(Box::new(PERSISTENCE_DIRTY.clone()))
        .unwrap();

    // Core metrics (aggregation, retry, persistence)
    for metric in dlsync_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding metrics to update gauges with current values from
/// the download manager.
pub fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let status = state.manager().status();
    PERSISTENCE_DIRTY.set(if status.dirty { 1 } else { 0 });

    for job_status in JobStatus::ALL {
        let count = status
            .by_status
            .get(job_status.as_str())
            .copied()
            .unwrap_or(0);
        JOBS_BY_STATUS
            .with_label_values(&[job_status.as_str()])
            .set(count as i64);
    }
}

static UUID_REGEX: Lazy<regex_lite::Regex> = Lazy::new(|| {
    regex_lite::Regex::new(
        r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
    )
    .unwrap()
});

static NUMERIC_REGEX: Lazy<regex_lite::Regex> =
    Lazy::new(|| regex_lite::Regex::new(r"/\d+(/|$)").unwrap());

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    let result = UUID_REGEX.replace_all(path, "{id}");
    let result = NUMERIC_REGEX.replace_all(&result, "/{id}$1");
    result.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_uuid() {
        let path = "/api/v1/jobs/550e8400-e29b-41d4-a716-446655440000";
        assert_eq!(normalize_path(path), "/api/v1/jobs/{id}");
    }

    #[test]
    fn test_normalize_path_nested() {
        let path = "/api/v1/jobs/550e8400-e29b-41d4-a716-446655440000/retry-stats";
        assert_eq!(normalize_path(path), "/api/v1/jobs/{id}/retry-stats");
    }

    #[test]
    fn test_normalize_path_numeric() {
        assert_eq!(normalize_path("/api/v1/jobs/42/retry"), "/api/v1/jobs/{id}/retry");
        assert_eq!(normalize_path("/api/v1/jobs/42"), "/api/v1/jobs/{id}");
    }

    #[test]
    fn test_normalize_path_static() {
        assert_eq!(normalize_path("/api/v1/status"), "/api/v1/status");
    }

    #[test]
    fn test_encode_metrics_returns_prometheus_format() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/api/v1/health", "200"])
            .inc();
        dlsync_core::metrics::UPDATES_QUEUED.inc();

        let output = encode_metrics();
        assert!(output.contains("dlsync_http_requests_total"));
        assert!(output.contains("dlsync_updates_queued_total"));
    }
}
