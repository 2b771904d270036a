//! WebSocket Route
//!
//! - GET /api/v1/ws - Upgrade to a WebSocket and join the hub
//!
//! The upgrade is the transport handshake; once it succeeds the socket is
//! handed to the hub, which owns it from then on.

use axum::{
    extract::{ws::WebSocketUpgrade, ConnectInfo, State},
    http::{header::USER_AGENT, HeaderMap},
    response::Response,
};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::api::error::{ApiError, ApiResult};
use crate::api::state::{AppState, ConnectionInfo};
use crate::hub::{HandshakeError, HubState};

/// GET /api/v1/ws
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Response> {
    if state.hub.state() != HubState::Running {
        return Err(ApiError::ServiceUnavailable(
            "hub is shutting down".to_string(),
        ));
    }

    let info = ConnectionInfo {
        remote_addr: connect_info.map(|ConnectInfo(addr)| addr),
        user_agent: headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    };
    let hub = state.hub.clone();

    let response = ws
        .on_failed_upgrade(|e| {
            let err = HandshakeError::from(e);
            tracing::warn!(error = %err, "WebSocket upgrade failed");
        })
        .on_upgrade(move |socket| async move {
            let remote_addr = info.remote_addr;
            match hub.register(socket, info).await {
                Ok(session) => {
                    tracing::debug!(
                        session_id = %session.id(),
                        remote_addr = ?remote_addr,
                        "WebSocket connected"
                    );
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to register WebSocket connection");
                }
            }
        });

    Ok(response)
}
