//! Prometheus Metrics Definitions
//!
//! Defines the gateway metrics with their labels and types.
//! Exposes a /metrics endpoint for Prometheus scraping.

use axum::{http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, CounterVec, Encoder, Gauge,
    HistogramVec, TextEncoder,
};

use crate::error::{ApiError, ApiResult};

/// HTTP request latency buckets (seconds)
/// Covers: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Upstream fetch latency buckets (seconds), up to the default upstream timeout
const UPSTREAM_LATENCY_BUCKETS: &[f64] = &[0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0, 30.0];

/// Global metrics instance - initialized once at startup
pub static METRICS: Lazy<ApiResult<GatewayMetrics>> = Lazy::new(GatewayMetrics::new);

/// Container for all gateway metrics.
#[derive(Clone)]
pub struct GatewayMetrics {
    /// HTTP request counter - labels: method, path, status
    pub http_requests_total: CounterVec,

    /// HTTP request duration histogram - labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// Cache lookups - labels: result (hit/miss)
    pub cache_lookups_total: CounterVec,

    /// Upstream fetches - labels: status (success/error)
    pub upstream_fetches_total: CounterVec,

    /// Upstream fetch duration histogram - labels: status
    pub upstream_fetch_duration_seconds: HistogramVec,

    /// Searches waiting for admission
    pub queue_pending: Gauge,

    /// Searches holding an admission slot
    pub queue_in_flight: Gauge,

    /// Live cache entries
    pub cache_entries: Gauge,

    /// Last sampled resident memory in bytes
    pub resident_memory_bytes: Gauge,
}

impl GatewayMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "icongate_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register http_requests_total: {}", e)))?,

            http_request_duration_seconds: register_histogram_vec!(
                "icongate_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register http_request_duration_seconds: {}", e)))?,

            cache_lookups_total: register_counter_vec!(
                "icongate_cache_lookups_total",
                "Search cache lookups by result",
                &["result"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register cache_lookups_total: {}", e)))?,

            upstream_fetches_total: register_counter_vec!(
                "icongate_upstream_fetches_total",
                "Upstream search fetches by outcome",
                &["status"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register upstream_fetches_total: {}", e)))?,

            upstream_fetch_duration_seconds: register_histogram_vec!(
                "icongate_upstream_fetch_duration_seconds",
                "Upstream search fetch duration in seconds",
                &["status"],
                UPSTREAM_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register upstream_fetch_duration_seconds: {}", e)))?,

            queue_pending: register_gauge!(
                "icongate_queue_pending",
                "Searches waiting for an admission slot"
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register queue_pending: {}", e)))?,

            queue_in_flight: register_gauge!(
                "icongate_queue_in_flight",
                "Searches currently holding an admission slot"
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register queue_in_flight: {}", e)))?,

            cache_entries: register_gauge!(
                "icongate_cache_entries",
                "Entries currently held by the search cache"
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register cache_entries: {}", e)))?,

            resident_memory_bytes: register_gauge!(
                "icongate_resident_memory_bytes",
                "Resident memory at the last sample"
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register resident_memory_bytes: {}", e)))?,
        })
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, &status_str])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    /// Record a cache lookup.
    pub fn record_cache_lookup(&self, hit: bool) {
        let result = if hit { "hit" } else { "miss" };
        self.cache_lookups_total.with_label_values(&[result]).inc();
    }

    /// Record an upstream fetch.
    pub fn record_upstream_fetch(&self, success: bool, duration_secs: f64) {
        let status = if success { "success" } else { "error" };
        self.upstream_fetches_total.with_label_values(&[status]).inc();
        self.upstream_fetch_duration_seconds
            .with_label_values(&[status])
            .observe(duration_secs);
    }

    /// Set the admission queue gauges.
    pub fn set_queue_depth(&self, pending: usize, in_flight: usize) {
        self.queue_pending.set(pending as f64);
        self.queue_in_flight.set(in_flight as f64);
    }

    pub fn set_cache_entries(&self, entries: usize) {
        self.cache_entries.set(entries as f64);
    }

    pub fn set_resident_memory(&self, bytes: u64) {
        self.resident_memory_bytes.set(bytes as f64);
    }
}

/// Run `f` against the global metrics, skipping it when registration failed.
pub fn with_metrics(f: impl FnOnce(&GatewayMetrics)) {
    if let Ok(metrics) = METRICS.as_ref() {
        f(metrics);
    }
}

/// Handler for GET /metrics endpoint.
///
/// Returns Prometheus text format metrics.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::core::Collector;

    #[test]
    fn test_metrics_creation() -> Result<(), String> {
        let metrics = METRICS
            .as_ref()
            .map_err(|e| format!("Metrics init failed: {}", e.message))?;
        assert!(!metrics.http_requests_total.desc().is_empty());
        Ok(())
    }

    #[test]
    fn test_record_http_request() -> Result<(), String> {
        let metrics = METRICS
            .as_ref()
            .map_err(|e| format!("Metrics init failed: {}", e.message))?;
        metrics.record_http_request("GET", "/api/search", 200, 0.015);
        let count = metrics
            .http_requests_total
            .with_label_values(&["GET", "/api/search", "200"])
            .get();
        assert!(count >= 1.0);
        Ok(())
    }

    #[test]
    fn test_cache_lookup_labels() -> Result<(), String> {
        let metrics = METRICS
            .as_ref()
            .map_err(|e| format!("Metrics init failed: {}", e.message))?;
        let before = metrics.cache_lookups_total.with_label_values(&["hit"]).get();
        metrics.record_cache_lookup(true);
        metrics.record_cache_lookup(false);
        let after = metrics.cache_lookups_total.with_label_values(&["hit"]).get();
        assert!(after >= before + 1.0);
        Ok(())
    }

    #[test]
    fn test_gauges_take_last_value() -> Result<(), String> {
        let metrics = METRICS
            .as_ref()
            .map_err(|e| format!("Metrics init failed: {}", e.message))?;
        metrics.set_resident_memory(123_456);
        metrics.record_upstream_fetch(false, 0.2);
        assert!(metrics.resident_memory_bytes.get() > 0.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_metrics_handler_renders_text() {
        with_metrics(|m| m.set_cache_entries(3));
        let response = metrics_handler().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("icongate_cache_entries"));
    }
}
