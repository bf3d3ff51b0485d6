//! Shared state for the server

use std::sync::Arc;

use streamstore::Store;

use crate::metrics::HttpMetrics;

/// The shared app state.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The record store
    pub store: Store,
    /// Metrics of the HTTP server
    pub metrics: Arc<HttpMetrics>,
}
