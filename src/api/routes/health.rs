//! Health Routes
//!
//! Health check endpoints for monitoring and Kubernetes probes.
//!
//! - GET /health/live - Liveness probe (process is alive)
//! - GET /health/ready - Readiness probe (hub accepts connections)
//! - GET /health - Full health status

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::api::dto::HealthResponse;
use crate::api::state::AppState;
use crate::hub::HubState;

/// GET /health/live
///
/// Kubernetes liveness probe.
/// Returns 200 if the process is alive, no dependency checks.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// GET /health/ready
///
/// Kubernetes readiness probe.
/// Returns 200 only while the hub is running.
pub async fn readiness(State(state): State<Arc<AppState>>) -> StatusCode {
    match state.hub.state() {
        HubState::Running => StatusCode::OK,
        HubState::Draining | HubState::Stopped => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// GET /health
///
/// Full health status with hub details.
pub async fn full_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let hub_state = state.hub.state();
    let status = match hub_state {
        HubState::Running => "healthy",
        HubState::Draining => "draining",
        HubState::Stopped => "stopped",
    };

    Json(HealthResponse {
        status: status.to_string(),
        hub: hub_state,
        clients: state.hub.client_count().await,
        uptime_seconds: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
