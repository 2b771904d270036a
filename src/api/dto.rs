//! Data Transfer Objects
//!
//! Request and response types for the API endpoints.
//! These types are serialized/deserialized to/from JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::state::ConnectionInfo;
use crate::hub::{HubState, Session, SessionId, SessionState};

// ============================================
// CLIENT DTOs
// ============================================

/// A connected client as seen in the hub snapshot
#[derive(Debug, Serialize)]
pub struct ClientDto {
    pub id: SessionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_addr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub connected_at: DateTime<Utc>,
    pub state: SessionState,
}

impl From<&Session<ConnectionInfo>> for ClientDto {
    fn from(session: &Session<ConnectionInfo>) -> Self {
        let info = session.attachment();
        Self {
            id: session.id(),
            remote_addr: info.remote_addr.map(|addr| addr.to_string()),
            user_agent: info.user_agent.clone(),
            connected_at: session.connected_at(),
            state: session.state(),
        }
    }
}

/// Client list response
#[derive(Debug, Serialize)]
pub struct ClientsResponse {
    pub count: usize,
    pub clients: Vec<ClientDto>,
}

// ============================================
// SEND DTOs
// ============================================

/// Request to push a message to connected clients
#[derive(Debug, Deserialize)]
pub struct SendRequest {
    /// Message type
    #[serde(rename = "type")]
    pub kind: String,
    /// Message payload; omitted means no payload
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    /// Recipients; empty means every connected client
    #[serde(default)]
    pub targets: Vec<SessionId>,
}

/// Send response
#[derive(Debug, Serialize)]
pub struct SendResponse {
    /// Status: "accepted"
    pub status: String,
    /// Number of explicit targets, absent for a broadcast
    #[serde(skip_serializing_if = "Option::is_none")]
    pub targets: Option<usize>,
}

// ============================================
// HEALTH DTOs
// ============================================

/// Full health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall status: healthy, draining, stopped
    pub status: String,
    /// Hub lifecycle state
    pub hub: HubState,
    /// Connected clients
    pub clients: usize,
    /// Server uptime in seconds
    pub uptime_seconds: u64,
    /// Application version
    pub version: String,
}
