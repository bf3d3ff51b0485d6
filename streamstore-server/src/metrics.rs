//! Metrics support for the server

use std::sync::Arc;

use iroh_metrics::{Counter, MetricsGroup, MetricsGroupSet};

/// Metrics for the HTTP server
#[derive(Debug, Default, MetricsGroup)]
#[metrics(name = "http")]
pub struct HttpMetrics {
    /// Number of HTTP requests
    pub requests: Counter,
    /// Number of HTTP requests with a 2xx status code
    pub requests_success: Counter,
    /// Number of HTTP requests with a non-2xx status code
    pub requests_error: Counter,
    /// Total duration of all HTTP requests
    pub requests_duration_ms: Counter,
}

/// All metrics tracked by the server.
#[derive(Debug, Default, Clone, MetricsGroupSet)]
#[metrics(name = "streamstore_server")]
pub struct ServerMetrics {
    /// Metrics of the store.
    pub store: Arc<streamstore::metrics::Metrics>,
    /// Metrics of the HTTP server.
    pub http: Arc<HttpMetrics>,
}
