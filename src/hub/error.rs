//! Hub error types
//!
//! Per-connection failures never surface here: they end the session and show
//! up as a removal. These are the errors returned synchronously to callers.

use thiserror::Error;

/// Errors returned by the hub façade
#[derive(Debug, Error)]
pub enum HubError {
    /// The control loop has stopped; the hub cannot be restarted
    #[error("Hub has stopped")]
    Stopped,

    /// The hub is draining and its drain policy rejects new sessions
    #[error("Hub is shutting down")]
    ShuttingDown,
}

/// A value or envelope could not be serialized
#[derive(Debug, Error)]
pub enum EncodingError {
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The payload bytes are not a valid serialized value for this codec
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

/// Inbound bytes could not be turned into an envelope or value
#[derive(Debug, Error)]
pub enum DecodingError {
    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Envelope has no payload")]
    EmptyPayload,
}

/// Reading from or writing to a transport failed
#[derive(Debug, Error)]
pub enum TransportError {
    /// The other side of the transport is gone
    #[error("Transport closed")]
    Closed,

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] axum::Error),
}

/// The transport handshake (e.g. WebSocket upgrade) failed
#[derive(Debug, Error)]
#[error("Handshake failed: {0}")]
pub struct HandshakeError(pub String);

impl From<axum::Error> for HandshakeError {
    fn from(err: axum::Error) -> Self {
        HandshakeError(err.to_string())
    }
}
