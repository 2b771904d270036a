//! Send Route
//!
//! - POST /api/v1/send - Push a message to connected clients

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::api::dto::{SendRequest, SendResponse};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::hub::{Envelope, HubState, Target};

/// POST /api/v1/send
///
/// Queues the message on the hub; delivery is asynchronous.
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SendRequest>,
) -> ApiResult<(StatusCode, Json<SendResponse>)> {
    if req.kind.trim().is_empty() {
        return Err(ApiError::Validation("type cannot be empty".to_string()));
    }

    if state.hub.state() != HubState::Running {
        return Err(ApiError::ServiceUnavailable(
            "hub is shutting down".to_string(),
        ));
    }

    let envelope = match &req.data {
        Some(data) => Envelope::new(req.kind, data)?,
        None => Envelope::empty(req.kind),
    };

    let targets = (!req.targets.is_empty()).then_some(req.targets.len());
    state.hub.send(envelope, Target::Only(req.targets));

    Ok((
        StatusCode::ACCEPTED,
        Json(SendResponse {
            status: "accepted".to_string(),
            targets,
        }),
    ))
}
