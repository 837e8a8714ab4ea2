//! `GET /health/dependencies` JSON route and a Prometheus text-exposition handler.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use serde_json::json;

use crate::facade::DependencyHealth;

/// `{"status": "healthy"|"degraded", "dependencies": {name: bool, ...}}`.
async fn dependencies_handler(State(core): State<Arc<DependencyHealth>>) -> impl IntoResponse {
    let health = core.health();
    let status = if health.values().all(|h| *h) { "healthy" } else { "degraded" };
    Json(json!({ "status": status, "dependencies": health }))
}

pub fn dependencies_router(core: Arc<DependencyHealth>) -> Router {
    Router::new().route("/health/dependencies", get(dependencies_handler)).with_state(core)
}

/// Thin adapter over `DependencyHealth::metrics_text`; the core owns the encode logic.
async fn metrics_handler_impl(State(core): State<Arc<DependencyHealth>>) -> Response {
    match core.metrics_text() {
        Ok(body) => (StatusCode::OK, [("content-type", prometheus::TextEncoder::new().format_type())], body).into_response(),
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics").into_response(),
    }
}

pub fn metrics_handler(core: Arc<DependencyHealth>) -> Router {
    Router::new().route("/metrics", get(metrics_handler_impl)).with_state(core)
}
