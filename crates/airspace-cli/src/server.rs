//! HTTP server for health and metrics endpoints.

use airspace_core::health::{Component, ComponentStatus, HealthStatus};
use airspace_core::Monitors;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{error, info};

/// Shared state for HTTP endpoints.
pub struct ServerState {
    pub monitors: Monitors,
}

impl ServerState {
    pub fn new(monitors: Monitors) -> Self {
        Self { monitors }
    }
}

/// Health response structure.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub running: bool,
    pub components: BTreeMap<Component, ComponentStatus>,
}

/// Bind the monitoring port and serve until shutdown.
///
/// A bind failure is logged; the pipeline keeps running without the endpoints.
pub async fn start_server(
    state: Arc<ServerState>,
    port: u16,
    shutdown_rx: broadcast::Receiver<()>,
) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, port, "Failed to bind health server");
            return;
        }
    };

    info!(port, "Health and metrics server started");
    serve(listener, state, shutdown_rx).await;
}

pub async fn serve(
    listener: TcpListener,
    state: Arc<ServerState>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let server = axum::serve(listener, router(state)).with_graceful_shutdown(async move {
        let _ = shutdown_rx.recv().await;
        info!("HTTP server shutting down");
    });

    if let Err(e) = server.await {
        error!(error = %e, "HTTP server error");
    }
}

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Full health report; 503 once any component is unhealthy.
async fn health_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let health = &state.monitors.health;
    let overall = health.overall_status();

    let response = HealthResponse {
        status: overall,
        running: health.is_running(),
        components: health.get_all_statuses(),
    };

    let status_code = match overall {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(response))
}

/// Liveness: 503 once any component is unhealthy.
async fn healthz_handler(State(state): State<Arc<ServerState>>) -> StatusCode {
    if state.monitors.health.is_operational() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Readiness: the loop is running and every component has reported.
async fn readyz_handler(State(state): State<Arc<ServerState>>) -> StatusCode {
    if state.monitors.health.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn metrics_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.monitors.metrics.export_prometheus_text(),
    )
}
