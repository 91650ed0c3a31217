use axum::{Json, extract::State, response::IntoResponse};

use crate::AppState;
use crate::metrics;

/// Health check endpoint - returns server status and what is known about
/// the responder
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let connections = state.hub.len().await as u64;
    let tracker = state.tracker.status();

    Json(metrics::HealthStatus {
        status: "healthy".to_string(),
        connections,
        uptime_secs: state.metrics.uptime_secs(),
        responder: metrics::ResponderHealth {
            state: tracker.state.to_string(),
            last_heartbeat_secs: state.tracker.heartbeat_age().map(|age| age.as_secs()),
        },
    })
}

/// Metrics endpoint - returns detailed server metrics
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let active = state.hub.len().await as u64;
    Json(state.metrics.snapshot(active))
}

/// Liveness probe - returns 200 if the server is running
pub async fn health_live_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "alive" }))
}
