//! # Switchyard
//!
//! A connection hub for long-lived message streams. Clients connect over
//! WebSocket (or any [`hub::Transport`]); the hub keeps the authoritative set
//! of connected sessions and routes envelopes between them.
//!
//! ## Features
//!
//! - **Single writer**: one control loop owns all membership and routing
//! - **Backpressure**: bounded per-client queues, slow consumers are evicted
//! - **Graceful shutdown**: clients are closed and drained before stopping
//! - **Pluggable**: custom message handlers, codecs and transports
//!
//! ## Modules
//!
//! - [`hub`]: Control loop, sessions, envelopes and transports
//! - [`api`]: WebSocket endpoint and REST API with Axum
//! - [`config`]: TOML and environment configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use switchyard::hub::{Envelope, Hub, HubConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Echo every message back to its sender
//!     let hub: Hub<()> = Hub::builder()
//!         .config(HubConfig::default())
//!         .on_message(|hub, session, envelope| {
//!             hub.send_to(envelope, [session.id()]);
//!             Ok(())
//!         })
//!         .build();
//!
//!     hub.broadcast(Envelope::new("notice", "hello")?);
//!
//!     // Graceful shutdown
//!     hub.shutdown().await;
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod hub;

pub use config::Config;
pub use hub::{Envelope, Hub, HubConfig, HubError, Session, SessionId, Target};
