//! Prometheus metrics for the Chartvault server.
//!
//! Exposes counters for committed and failed uploads, committed bytes, commit
//! latency and the number of temp blobs currently held.
//!
//! # Security Note
//!
//! The `/metrics` endpoint is unauthenticated to allow Prometheus scraping.
//! Metrics carry no repository names, paths or digests, only aggregate usage.
//! Restrict the endpoint to scraper addresses at the network level.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

pub static UPLOADS_COMMITTED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "chartvault_uploads_committed_total",
        "Total number of uploads committed to a repository",
    )
    .expect("metric creation failed")
});

pub static UPLOADS_FAILED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "chartvault_upload_failures_total",
            "Total number of rejected or failed uploads by error code",
        ),
        &["code"],
    )
    .expect("metric creation failed")
});

pub static BYTES_COMMITTED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "chartvault_bytes_committed_total",
        "Total payload bytes of committed uploads",
    )
    .expect("metric creation failed")
});

pub static BLOBS_DEDUPLICATED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "chartvault_blobs_deduplicated_total",
        "Total number of commits that reused an existing blob object",
    )
    .expect("metric creation failed")
});

pub static COMMIT_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "chartvault_commit_duration_seconds",
            "Time spent persisting blob and asset record",
        )
        .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
    )
    .expect("metric creation failed")
});

pub static TEMP_BLOBS_LIVE: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "chartvault_temp_blobs_live",
        "Number of spooled upload payloads not yet released",
    )
    .expect("metric creation failed")
});

static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(UPLOADS_COMMITTED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPLOADS_FAILED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BYTES_COMMITTED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BLOBS_DEDUPLICATED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(COMMIT_DURATION.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(TEMP_BLOBS_LIVE.clone()))
            .expect("metric registration failed");
    });
}

/// GET /metrics - Prometheus metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

/// Helper to record upload failures by error code.
pub fn record_upload_failure(code: &str) {
    UPLOADS_FAILED.with_label_values(&[code]).inc();
}
