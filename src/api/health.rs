//! Health check endpoint
//!
//! `/health` reports liveness and the number of connected subscribers.

use axum::extract::Extension;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use kubecast_core::Hub;
use serde::Serialize;
use std::sync::Arc;

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub subscribers: usize,
    pub version: &'static str,
}

async fn health_check(Extension(hub): Extension<Arc<Hub>>) -> Json<HealthResponse> {
    let status = if hub.is_shut_down() {
        "shutting_down"
    } else {
        "healthy"
    };
    Json(HealthResponse {
        status,
        subscribers: hub.subscriber_count(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Health routes
pub fn health_routes() -> Router {
    Router::new().route("/health", get(health_check))
}
