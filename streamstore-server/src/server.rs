//! The main server, wiring the store to the HTTP server.

use std::sync::{Arc, RwLock};

use anyhow::Result;
use iroh_metrics::Registry;
use streamstore::Store;
use tracing::{info, warn};

use crate::{
    config::Config,
    http::HttpServer,
    metrics::{HttpMetrics, ServerMetrics},
    state::AppState,
};

/// Spawn the server and run until the `Ctrl-C` signal is received, then shutdown.
pub async fn run_with_config_until_ctrl_c(config: Config) -> Result<()> {
    let backend = config.backend_config()?;
    info!(?backend, "opening store");
    let store = Store::open(&backend)?;
    let server = Server::spawn(config, store).await?;
    tokio::signal::ctrl_c().await?;
    info!("shutdown");
    server.shutdown().await?;
    Ok(())
}

/// The streamstore server.
#[derive(Debug)]
pub struct Server {
    http_server: HttpServer,
    metrics: ServerMetrics,
    metrics_task: tokio::task::JoinHandle<()>,
}

impl Server {
    /// Spawn the server.
    ///
    /// This will spawn two background tasks:
    /// * A HTTP server task
    /// * A metrics server task, unless disabled in the config
    pub async fn spawn(config: Config, store: Store) -> Result<Self> {
        let metrics = ServerMetrics {
            store: store.metrics().clone(),
            http: Arc::new(HttpMetrics::default()),
        };
        let state = AppState {
            store,
            metrics: metrics.http.clone(),
        };

        let metrics_addr = config.metrics_addr();
        let registry = {
            let mut registry = Registry::default();
            registry.register_all(&metrics);
            Arc::new(RwLock::new(registry))
        };
        let metrics_task = tokio::task::spawn(async move {
            if let Some(addr) = metrics_addr {
                if let Err(err) = iroh_metrics::service::start_metrics_server(addr, registry).await
                {
                    warn!("metrics server failed: {err:?}");
                }
            }
        });
        let http_server = HttpServer::spawn(config.http, state).await?;
        Ok(Self {
            http_server,
            metrics,
            metrics_task,
        })
    }

    /// The metrics tracked by this server.
    pub fn metrics(&self) -> &ServerMetrics {
        &self.metrics
    }

    /// Cancel the server tasks and wait for all tasks to complete.
    pub async fn shutdown(self) -> Result<()> {
        self.metrics_task.abort();
        self.http_server.shutdown().await
    }

    /// Wait for all tasks to complete.
    ///
    /// This will run forever unless the HTTP server fails, or `Self::shutdown` is called.
    pub async fn run_until_error(self) -> Result<()> {
        let res = self.http_server.run_until_done().await;
        self.metrics_task.abort();
        res
    }

    /// Spawn a server suitable for testing.
    ///
    /// Binds the HTTP server to an ephemeral port on localhost and disables the metrics
    /// server. Returns the server handle and the base [`Url`](url::Url) of the HTTP server.
    #[cfg(test)]
    pub async fn spawn_for_tests(store: Store) -> Result<(Self, url::Url)> {
        use std::net::{IpAddr, Ipv4Addr};

        use crate::config::MetricsConfig;

        let mut config = Config::default();
        config.http.port = 0;
        config.http.bind_addr = Some(IpAddr::V4(Ipv4Addr::LOCALHOST));
        config.metrics = Some(MetricsConfig::disabled());

        let server = Self::spawn(config, store).await?;
        let http_addr = server.http_server.http_addr();
        let http_url = format!("http://{http_addr}").parse()?;
        Ok((server, http_url))
    }
}
