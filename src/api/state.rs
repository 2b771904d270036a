//! Application State
//!
//! Shared state accessible by all API handlers.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use crate::config::ServerConfig;
use crate::hub::{Hub, HubConfig};

/// Attachment carried by every WebSocket session
#[derive(Debug, Clone, Default)]
pub struct ConnectionInfo {
    /// Peer address, when the server runs with connect info
    pub remote_addr: Option<SocketAddr>,
    /// `User-Agent` header of the upgrade request
    pub user_agent: Option<String>,
}

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Connection hub routing messages between WebSocket clients
    pub hub: Hub<ConnectionInfo>,
    /// Server configuration
    pub config: Arc<ServerConfig>,
    /// Server start time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    /// Create state around an already running hub
    pub fn new(hub: Hub<ConnectionInfo>, config: ServerConfig) -> Self {
        Self {
            hub,
            config: Arc::new(config),
            start_time: Instant::now(),
        }
    }

    /// Start a hub with default hooks and wrap it
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_hub_config(hub_config: HubConfig, config: ServerConfig) -> Self {
        Self::new(Hub::new(hub_config), config)
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
