//! Connection Hub
//!
//! Accepts many concurrent message streams, keeps the authoritative set of
//! connected sessions and routes envelopes between them.
//!
//! ## Architecture
//!
//! - **Hub**: cloneable façade; talks to the control loop only via commands
//! - **Control loop**: single task owning the active set and all routing
//! - **Session**: one transport plus an inbound and an outbound pump
//! - **Envelope / Codec**: typed message unit and its wire encoding
//!
//! ## Example
//!
//! ```rust,no_run
//! use switchyard::hub::{memory, Envelope, Hub, HubConfig};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let hub: Hub<String> = Hub::builder()
//!     .config(HubConfig::default())
//!     .on_session_removed(|_, session| {
//!         tracing::info!(user = %session.attachment(), "left");
//!     })
//!     .build();
//!
//! let (transport, _peer) = memory::pair(16);
//! let session = hub.register(transport, "alice".to_string()).await?;
//!
//! hub.send_to(Envelope::new("welcome", "hello alice")?, [session.id()]);
//! hub.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod codec;
mod control;
mod envelope;
mod error;
mod handle;
mod session;
mod transport;

pub use codec::{Codec, JsonCodec};
pub use control::{HubState, Target};
pub use envelope::Envelope;
pub use error::{DecodingError, EncodingError, HandshakeError, HubError, TransportError};
pub use handle::{
    DrainPolicy, Hooks, Hub, HubBuilder, HubConfig, MessageFn, MessageHandler, SessionHook,
};
pub use session::{Session, SessionId, SessionState};
pub use transport::{memory, Frame, FrameSink, FrameStream, Transport};
