//! Axum HTTP server for metrics and health checks

use std::net::SocketAddr;

use axum::{http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use tracing::info;

use crate::controller::metrics;
use crate::{Error, Result};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Metrics endpoint handler
pub async fn metrics_handler() -> (StatusCode, String) {
    match metrics::encode() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to encode metrics: {e}"),
        ),
    }
}

pub fn router() -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/metrics", get(metrics_handler))
}

/// Serve `/metrics` and `/healthz` until the process exits.
pub async fn run_server(addr: SocketAddr) -> Result<()> {
    info!("Metrics server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::InvalidConfig(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, router())
        .await
        .map_err(|e| Error::ExecutionFailed(format!("Server error: {}", e)))?;
    Ok(())
}
