//! Hub façade
//!
//! The thread-safe, cloneable API in front of the control loop. Every method
//! talks to the loop through its command queue; the only shared state is the
//! membership snapshot used for listing.

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use tokio::runtime::Handle;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch, RwLock};

use super::codec::{Codec, JsonCodec};
use super::control::{Command, ControlLoop, HubState, Target};
use super::envelope::Envelope;
use super::error::HubError;
use super::session::{Session, SessionId};
use super::transport::Transport;

/// Configuration for the hub
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HubConfig {
    /// Envelopes buffered per session before it is evicted as a slow consumer
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Capacity of the control loop's command queue
    #[serde(default = "default_control_capacity")]
    pub control_capacity: usize,

    /// What the hub still accepts once shutdown has started
    #[serde(default)]
    pub drain_policy: DrainPolicy,
}

fn default_queue_capacity() -> usize {
    10
}

fn default_control_capacity() -> usize {
    256
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            control_capacity: default_control_capacity(),
            drain_policy: DrainPolicy::default(),
        }
    }
}

/// Handling of registrations and sends that arrive while the hub drains
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrainPolicy {
    /// Keep processing registrations and sends. Sessions registered during
    /// the drain are closed right away so the drain can complete.
    #[default]
    Service,
    /// Refuse registrations with [`HubError::ShuttingDown`] and drop sends
    Reject,
}

/// Hook fired on the control loop when a session joins or leaves
pub type SessionHook<A> = Box<dyn FnMut(&Hub<A>, &Session<A>) + Send>;

/// Custom inbound message handler, run on the control loop
pub type MessageFn<A> =
    Box<dyn FnMut(&Hub<A>, &Session<A>, Arc<Envelope>) -> anyhow::Result<()> + Send>;

/// What to do with an envelope received from a session
pub enum MessageHandler<A> {
    /// Forward it unchanged to every other active session
    BroadcastToOthers,
    Custom(MessageFn<A>),
}

impl<A> fmt::Debug for MessageHandler<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageHandler::BroadcastToOthers => f.write_str("BroadcastToOthers"),
            MessageHandler::Custom(_) => f.write_str("Custom"),
        }
    }
}

/// Callbacks invoked by the control loop
///
/// They run on the loop task and must return quickly. Calling
/// [`Hub::send`] from inside a hook is fine; it never waits on the loop.
pub struct Hooks<A> {
    pub on_message: MessageHandler<A>,
    pub on_session_added: Option<SessionHook<A>>,
    pub on_session_removed: Option<SessionHook<A>>,
}

impl<A> Default for Hooks<A> {
    fn default() -> Self {
        Self {
            on_message: MessageHandler::BroadcastToOthers,
            on_session_added: None,
            on_session_removed: None,
        }
    }
}

/// Builder for [`Hub`]
pub struct HubBuilder<A> {
    config: HubConfig,
    codec: Arc<dyn Codec>,
    hooks: Hooks<A>,
}

impl<A: Send + Sync + 'static> HubBuilder<A> {
    pub fn config(mut self, config: HubConfig) -> Self {
        self.config = config;
        self
    }

    pub fn codec(mut self, codec: impl Codec) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    /// Replace all hooks at once
    pub fn hooks(mut self, hooks: Hooks<A>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn on_message<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&Hub<A>, &Session<A>, Arc<Envelope>) -> anyhow::Result<()> + Send + 'static,
    {
        self.hooks.on_message = MessageHandler::Custom(Box::new(handler));
        self
    }

    pub fn on_session_added<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&Hub<A>, &Session<A>) + Send + 'static,
    {
        self.hooks.on_session_added = Some(Box::new(hook));
        self
    }

    pub fn on_session_removed<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&Hub<A>, &Session<A>) + Send + 'static,
    {
        self.hooks.on_session_removed = Some(Box::new(hook));
        self
    }

    /// Spawn the control loop and return a handle to it
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> Hub<A> {
        let (commands_tx, commands_rx) = mpsc::channel(self.config.control_capacity.max(1));
        let (state_tx, state_rx) = watch::channel(HubState::Running);
        let snapshot = Arc::new(RwLock::new(Vec::new()));

        let hub = Hub {
            commands: commands_tx,
            snapshot: Arc::clone(&snapshot),
            state: state_rx,
            runtime: Handle::current(),
        };

        let control = ControlLoop::new(
            hub.clone(),
            commands_rx,
            self.hooks,
            self.codec,
            HubConfig {
                queue_capacity: self.config.queue_capacity.max(1),
                ..self.config
            },
            snapshot,
            state_tx,
        );
        tokio::spawn(control.run());

        hub
    }
}

/// Handle to a running hub
///
/// Cheap to clone; all clones talk to the same control loop. `send` and its
/// helpers may be called from any thread, inside a runtime or not.
pub struct Hub<A> {
    commands: mpsc::Sender<Command<A>>,
    snapshot: Arc<RwLock<Vec<Session<A>>>>,
    state: watch::Receiver<HubState>,
    /// Runtime the control loop lives on, used for detached forwards
    runtime: Handle,
}

impl<A> Clone for Hub<A> {
    fn clone(&self) -> Self {
        Self {
            commands: self.commands.clone(),
            snapshot: Arc::clone(&self.snapshot),
            state: self.state.clone(),
            runtime: self.runtime.clone(),
        }
    }
}

impl<A> fmt::Debug for Hub<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hub").field("state", &self.state()).finish()
    }
}

impl<A> Hub<A> {
    pub(crate) fn command_sender(&self) -> mpsc::Sender<Command<A>> {
        self.commands.clone()
    }

    /// Current hub lifecycle state
    pub fn state(&self) -> HubState {
        *self.state.borrow()
    }
}

impl<A: Send + Sync + 'static> Hub<A> {
    pub fn builder() -> HubBuilder<A> {
        HubBuilder {
            config: HubConfig::default(),
            codec: Arc::new(JsonCodec),
            hooks: Hooks::default(),
        }
    }

    /// Start a hub with default hooks and the JSON codec
    pub fn new(config: HubConfig) -> Self {
        Self::builder().config(config).build()
    }

    /// Register an established transport as a new session
    ///
    /// Returns once the session is a member of the active set, so any send
    /// issued afterwards is guaranteed to see it.
    pub async fn register<T: Transport>(
        &self,
        transport: T,
        attachment: A,
    ) -> Result<Session<A>, HubError> {
        let session = Session::new(attachment);
        let (stream, sink) = transport.into_split();
        let (reply_tx, reply_rx) = oneshot::channel();

        self.commands
            .send(Command::Register {
                session: session.clone(),
                stream,
                sink,
                reply: reply_tx,
            })
            .await
            .map_err(|_| HubError::Stopped)?;

        reply_rx.await.map_err(|_| HubError::Stopped)??;
        Ok(session)
    }

    /// Queue an envelope for delivery
    ///
    /// Never waits on the control loop. Recipients are resolved when the loop
    /// processes the send, not when it is issued. When the command queue is
    /// full the send is handed to a task on the hub's runtime.
    pub fn send(&self, envelope: impl Into<Arc<Envelope>>, target: Target) {
        let command = Command::Send {
            envelope: envelope.into(),
            target,
        };

        match self.commands.try_send(command) {
            Ok(()) => {}
            Err(TrySendError::Full(command)) => {
                let commands = self.commands.clone();
                self.runtime.spawn(async move {
                    let _ = commands.send(command).await;
                });
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!("Hub stopped, dropping send");
            }
        }
    }

    /// Send to every active session
    pub fn broadcast(&self, envelope: impl Into<Arc<Envelope>>) {
        self.send(envelope, Target::All);
    }

    /// Send to the given sessions only; an empty list means everyone
    pub fn send_to(
        &self,
        envelope: impl Into<Arc<Envelope>>,
        ids: impl IntoIterator<Item = SessionId>,
    ) {
        self.send(envelope, Target::Only(ids.into_iter().collect()));
    }

    /// Point-in-time copy of the active sessions, in registration order
    pub async fn clients(&self) -> Vec<Session<A>> {
        self.snapshot.read().await.clone()
    }

    pub async fn client_count(&self) -> usize {
        self.snapshot.read().await.len()
    }

    /// Close every session and wait until the hub has stopped
    ///
    /// Idempotent; returns immediately if the hub already stopped.
    pub async fn shutdown(&self) {
        if self.commands.send(Command::Shutdown).await.is_err() {
            tracing::debug!("Hub already stopped");
        }

        let mut state = self.state.clone();
        let _ = state.wait_for(|s| *s == HubState::Stopped).await;
    }
}
