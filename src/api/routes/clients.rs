//! Client Routes
//!
//! - GET /api/v1/clients - List connected clients
//! - GET /api/v1/clients/:id - Get one client
//! - DELETE /api/v1/clients/:id - Disconnect a client

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::api::dto::{ClientDto, ClientsResponse};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::hub::SessionId;

/// GET /api/v1/clients
///
/// Point-in-time snapshot of the connected clients.
pub async fn list_clients(State(state): State<Arc<AppState>>) -> Json<ClientsResponse> {
    let clients: Vec<ClientDto> = state.hub.clients().await.iter().map(ClientDto::from).collect();

    Json(ClientsResponse {
        count: clients.len(),
        clients,
    })
}

/// GET /api/v1/clients/:id
pub async fn get_client(
    State(state): State<Arc<AppState>>,
    Path(id): Path<SessionId>,
) -> ApiResult<Json<ClientDto>> {
    let clients = state.hub.clients().await;
    let session = clients
        .iter()
        .find(|s| s.id() == id)
        .ok_or_else(|| ApiError::NotFound(format!("client {}", id)))?;

    Ok(Json(ClientDto::from(session)))
}

/// DELETE /api/v1/clients/:id
///
/// Closes the client's connection and waits for its teardown.
pub async fn disconnect_client(
    State(state): State<Arc<AppState>>,
    Path(id): Path<SessionId>,
) -> ApiResult<StatusCode> {
    let session = state
        .hub
        .clients()
        .await
        .into_iter()
        .find(|s| s.id() == id)
        .ok_or_else(|| ApiError::NotFound(format!("client {}", id)))?;

    session.close_and_wait().await;
    tracing::info!(session_id = %id, "Client disconnected via API");

    Ok(StatusCode::NO_CONTENT)
}
