//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Fetcher (attempts per route, proxy escalations)
//! - Feed and scraper calls
//! - Change detection and notifications
//! - Sync runs

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Fetcher
// =============================================================================

/// Fetch attempts by route and outcome.
pub static FETCH_ATTEMPTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("threadwatch_fetch_attempts_total", "Total HTTP fetch attempts"),
        &["route", "outcome"], // route: "direct" | "proxy"; outcome: "ok" | "http_error" | "transport_error"
    )
    .expect("valid metric definition")
});

/// Times a request escalated from direct to proxied attempts.
pub static PROXY_ACTIVATIONS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "threadwatch_proxy_activations_total",
        "Total direct-to-proxy escalations",
    )
    .expect("valid metric definition")
});

// =============================================================================
// Upstream forum
// =============================================================================

/// Feed requests by status filter and result.
pub static FEED_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("threadwatch_feed_requests_total", "Total RSS feed requests"),
        &["filter", "result"], // result: "ok" | "failed"
    )
    .expect("valid metric definition")
});

/// Thread scrapes by result.
pub static SCRAPES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("threadwatch_scrapes_total", "Total thread page scrapes"),
        &["result"], // "ok" | "failed" | "skipped_no_credentials"
    )
    .expect("valid metric definition")
});

/// Scrape duration in seconds.
pub static SCRAPE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "threadwatch_scrape_duration_seconds",
            "Duration of a full thread scrape including login",
        )
        .buckets(vec![1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0, 120.0]),
        &[],
    )
    .expect("valid metric definition")
});

// =============================================================================
// Detection and sync
// =============================================================================

/// Works checked by result.
pub static WORKS_CHECKED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("threadwatch_works_checked_total", "Total change-detection runs"),
        &["result"], // "ok" | "failed"
    )
    .expect("valid metric definition")
});

/// Notifications by kind and result.
pub static NOTIFICATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("threadwatch_notifications_total", "Total push notifications"),
        &["kind", "result"], // result: "sent" | "skipped" | "failed"
    )
    .expect("valid metric definition")
});

/// Sync runs by trigger.
pub static SYNC_RUNS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("threadwatch_sync_runs_total", "Total sync runs"),
        &["trigger"], // "scheduled" | "manual" | "single" | "skipped"
    )
    .expect("valid metric definition")
});

/// Get all core metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(FETCH_ATTEMPTS.clone()),
        Box::new(PROXY_ACTIVATIONS.clone()),
        Box::new(FEED_REQUESTS.clone()),
        Box::new(SCRAPES.clone()),
        Box::new(SCRAPE_DURATION.clone()),
        Box::new(WORKS_CHECKED.clone()),
        Box::new(NOTIFICATIONS.clone()),
        Box::new(SYNC_RUNS.clone()),
    ]
}
