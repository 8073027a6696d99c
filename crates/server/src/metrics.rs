//! Prometheus metrics for observability.
//!
//! The server registers its HTTP metrics next to the core collectors
//! (fetcher, feed, scraper, detection, notifications and sync runs) and
//! gathers tracking gauges from the store on each scrape.

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder,
};
use tracing::warn;

use threadwatch_core::store::TrackingFilter;

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
            "threadwatch_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["method", "path", "status"],
    )
    .expect("valid metric definition")
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("threadwatch_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .expect("valid metric definition")
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "threadwatch_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .expect("valid metric definition")
});

// =============================================================================
// Tracking Metrics (collected dynamically)
// =============================================================================

/// Tracking rows per user.
pub static TRACKED_WORKS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("threadwatch_tracked_works", "Tracked works per user"),
        &["user"],
    )
    .expect("valid metric definition")
});

/// Rows waiting for acknowledgement per user.
pub static PENDING_UPDATES: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("threadwatch_pending_updates", "Tracked works awaiting acknowledgement per user"),
        &["user"],
    )
    .expect("valid metric definition")
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    let server: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(HTTP_REQUEST_DURATION.clone()),
        Box::new(HTTP_REQUESTS_TOTAL.clone()),
        Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()),
        Box::new(TRACKED_WORKS.clone()),
        Box::new(PENDING_UPDATES.clone()),
    ];

    for metric in server.into_iter().chain(threadwatch_core::metrics::all_metrics()) {
        if let Err(e) = registry.register(metric) {
            warn!(error = %e, "Failed to register metric");
        }
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Refresh the tracking gauges from the store.
pub fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let store = state.store();
    let users = match store.list_users() {
        Ok(users) => users,
        Err(e) => {
            warn!(error = %e, "Failed to list users for metrics");
            return;
        }
    };

    for user in users {
        if let Ok(rows) = store.list_tracking(user.id, &TrackingFilter::new()) {
            let pending = rows.iter().filter(|r| r.needs_acknowledgement()).count();
            TRACKED_WORKS
                .with_label_values(&[&user.username])
                .set(rows.len() as i64);
            PENDING_UPDATES
                .with_label_values(&[&user.username])
                .set(pending as i64);
        }
    }
}

/// Normalize a path for metric labels (numeric segments become `{id}`).
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()) {
                "{id}"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_numeric() {
        assert_eq!(
            normalize_path("/api/v1/users/3/tracking/42/acknowledge"),
            "/api/v1/users/{id}/tracking/{id}/acknowledge"
        );
        assert_eq!(normalize_path("/api/v1/users/3/tracking"), "/api/v1/users/{id}/tracking");
    }

    #[test]
    fn test_normalize_path_keeps_mixed_segments() {
        assert_eq!(normalize_path("/images/ab12.jpg"), "/images/ab12.jpg");
        assert_eq!(normalize_path("/api/v1/health"), "/api/v1/health");
    }

    #[test]
    fn test_encode_includes_core_metrics() {
        threadwatch_core::metrics::SYNC_RUNS.with_label_values(&["manual"]).inc();
        HTTP_REQUESTS_IN_FLIGHT.set(0);
        let text = encode_metrics();
        assert!(text.contains("threadwatch_sync_runs_total"));
        assert!(text.contains("threadwatch_http_requests_in_flight"));
    }
}
