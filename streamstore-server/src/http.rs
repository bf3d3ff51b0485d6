//! HTTP server part of streamstore-server

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Instant,
};

use anyhow::Result;
use axum::{
    Router,
    extract::{ConnectInfo, DefaultBodyLimit, Request, State},
    http::Method,
    middleware::{self, Next},
    response::IntoResponse,
    routing::{get, post, put},
};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, task::JoinSet};
use tower_http::{
    cors::{self, CorsLayer},
    trace::TraceLayer,
};
use tracing::{Level, info, span, warn};

mod error;
mod records;

use crate::state::AppState;

/// Largest accepted request body. Write payloads are base64 encoded inside JSON.
const MAX_BODY_SIZE: usize = 64 * 1024 * 1024;

/// Config for the HTTP server
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HttpConfig {
    /// Port to bind to
    pub port: u16,
    /// Optionally set a custom bind address (will use 0.0.0.0 if unset)
    pub bind_addr: Option<IpAddr>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            bind_addr: None,
        }
    }
}

/// The HTTP server part of streamstore-server
#[derive(Debug)]
pub struct HttpServer {
    tasks: JoinSet<std::io::Result<()>>,
    http_addr: SocketAddr,
}

impl HttpServer {
    /// Spawn the server
    pub async fn spawn(config: HttpConfig, state: AppState) -> Result<Self> {
        let app = create_app(state);

        let mut tasks = JoinSet::new();
        let bind_addr = SocketAddr::new(
            config.bind_addr.unwrap_or(Ipv4Addr::UNSPECIFIED.into()),
            config.port,
        );
        let listener = TcpListener::bind(bind_addr).await?.into_std()?;
        let http_addr = listener.local_addr()?;
        let fut = axum_server::from_tcp(listener)
            .serve(app.into_make_service_with_connect_info::<SocketAddr>());
        info!("HTTP server listening on {http_addr}");
        tasks.spawn(fut);

        Ok(Self { tasks, http_addr })
    }

    /// Get the bound address of the HTTP socket.
    pub fn http_addr(&self) -> SocketAddr {
        self.http_addr
    }

    /// Shutdown the server and wait for all tasks to complete.
    pub async fn shutdown(mut self) -> Result<()> {
        // TODO: Graceful shutdown through axum_server::Handle, letting in-flight batches finish.
        self.tasks.abort_all();
        self.run_until_done().await?;
        Ok(())
    }

    /// Wait for all tasks to complete.
    ///
    /// Runs forever unless tasks fail.
    pub async fn run_until_done(mut self) -> Result<()> {
        let mut final_res: anyhow::Result<()> = Ok(());
        while let Some(res) = self.tasks.join_next().await {
            match res {
                Ok(Ok(())) => {}
                Err(err) if err.is_cancelled() => {}
                Ok(Err(err)) => {
                    warn!(?err, "task failed");
                    final_res = Err(anyhow::Error::from(err));
                }
                Err(err) => {
                    warn!(?err, "task panicked");
                    final_res = Err(err.into());
                }
            }
        }
        final_res
    }
}

pub(crate) fn create_app(state: AppState) -> Router {
    // configure cors middleware
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_origin(cors::Any);

    // configure tracing middleware
    let trace = TraceLayer::new_for_http().make_span_with(|request: &http::Request<_>| {
        let src = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0);
        span!(
            Level::DEBUG,
            "http_request",
            method = ?request.method(),
            uri = ?request.uri(),
            src = ?src,
        )
    });

    let router = Router::new()
        .route(
            "/records/{id}",
            put(records::create)
                .get(records::stat)
                .delete(records::delete),
        )
        .route("/records/{id}/write", post(records::write))
        .route("/records/{id}/read", post(records::read))
        .route("/healthcheck", get(|| async { "OK" }))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            metrics_middleware,
        ))
        .with_state(state);

    router
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .layer(cors)
        .layer(trace)
}

/// Record request metrics.
async fn metrics_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> impl IntoResponse {
    let start = Instant::now();
    let response = next.run(req).await;
    let latency = start.elapsed().as_millis();
    let status = response.status();
    let metrics = &state.metrics;
    metrics.requests_duration_ms.inc_by(latency as u64);
    metrics.requests.inc();
    if status.is_success() {
        metrics.requests_success.inc();
    } else {
        metrics.requests_error.inc();
    }
    response
}
