//! Hub control loop
//!
//! The single task that owns the active-session set. Every membership change
//! and every routing decision happens here, one command at a time, so the
//! routing path needs no locks. Sessions, registrations and sends all post
//! into one bounded command queue.
//!
//! Slow consumers are evicted rather than waited on: enqueueing onto a full
//! outbound queue closes that session's transport, and its removal arrives
//! later as an ordinary `Terminated` command.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch, RwLock};

use super::codec::Codec;
use super::envelope::Envelope;
use super::error::HubError;
use super::handle::{DrainPolicy, Hooks, Hub, HubConfig, MessageHandler};
use super::session::{Session, SessionId, SessionState};
use super::transport::{FrameSink, FrameStream};

/// Lifecycle of the hub itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HubState {
    Running,
    /// Shutdown requested; waiting for every session to terminate
    Draining,
    /// Terminal, the hub cannot be restarted
    Stopped,
}

/// Recipients of a send, resolved when the control loop processes it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Every active session
    All,
    /// Only these sessions; an empty list means every active session
    Only(Vec<SessionId>),
    /// Every active session except one
    AllExcept(SessionId),
}

/// Commands consumed by the control loop
pub(crate) enum Command<A> {
    Register {
        session: Session<A>,
        stream: FrameStream,
        sink: FrameSink,
        reply: oneshot::Sender<Result<(), HubError>>,
    },
    Inbound {
        id: SessionId,
        envelope: Arc<Envelope>,
    },
    Terminated {
        id: SessionId,
    },
    Send {
        envelope: Arc<Envelope>,
        target: Target,
    },
    Shutdown,
}

impl<A> fmt::Debug for Command<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Register { session, .. } => f
                .debug_struct("Register")
                .field("id", &session.id())
                .finish_non_exhaustive(),
            Command::Inbound { id, envelope } => f
                .debug_struct("Inbound")
                .field("id", id)
                .field("kind", &envelope.kind())
                .finish(),
            Command::Terminated { id } => f.debug_struct("Terminated").field("id", id).finish(),
            Command::Send { envelope, target } => f
                .debug_struct("Send")
                .field("kind", &envelope.kind())
                .field("target", target)
                .finish(),
            Command::Shutdown => f.write_str("Shutdown"),
        }
    }
}

/// An active session together with the write end of its outbound queue
struct Member<A> {
    session: Session<A>,
    queue: mpsc::Sender<Arc<Envelope>>,
}

pub(crate) struct ControlLoop<A> {
    /// Handle passed to hooks so they can send through the hub
    hub: Hub<A>,
    commands: mpsc::Receiver<Command<A>>,
    hooks: Hooks<A>,
    codec: Arc<dyn Codec>,
    config: HubConfig,
    active: HashMap<SessionId, Member<A>>,
    snapshot: Arc<RwLock<Vec<Session<A>>>>,
    state: watch::Sender<HubState>,
}

impl<A: Send + Sync + 'static> ControlLoop<A> {
    pub(crate) fn new(
        hub: Hub<A>,
        commands: mpsc::Receiver<Command<A>>,
        hooks: Hooks<A>,
        codec: Arc<dyn Codec>,
        config: HubConfig,
        snapshot: Arc<RwLock<Vec<Session<A>>>>,
        state: watch::Sender<HubState>,
    ) -> Self {
        Self {
            hub,
            commands,
            hooks,
            codec,
            config,
            active: HashMap::new(),
            snapshot,
            state,
        }
    }

    /// Process commands until the hub has drained and stopped
    pub(crate) async fn run(mut self) {
        tracing::debug!(
            queue_capacity = self.config.queue_capacity,
            drain_policy = ?self.config.drain_policy,
            "Hub control loop started"
        );

        while let Some(command) = self.commands.recv().await {
            self.handle(command).await;
            if self.phase() == HubState::Stopped {
                break;
            }
        }

        tracing::info!("Hub stopped");
    }

    fn phase(&self) -> HubState {
        *self.state.borrow()
    }

    fn rejecting(&self) -> bool {
        self.phase() != HubState::Running && self.config.drain_policy == DrainPolicy::Reject
    }

    async fn handle(&mut self, command: Command<A>) {
        match command {
            Command::Register {
                session,
                stream,
                sink,
                reply,
            } => self.register(session, stream, sink, reply).await,
            Command::Inbound { id, envelope } => self.inbound(id, envelope),
            Command::Terminated { id } => self.remove(id).await,
            Command::Send { envelope, target } => self.dispatch(&envelope, target),
            Command::Shutdown => self.shutdown(),
        }
    }

    async fn register(
        &mut self,
        session: Session<A>,
        stream: FrameStream,
        sink: FrameSink,
        reply: oneshot::Sender<Result<(), HubError>>,
    ) {
        let id = session.id();

        if self.rejecting() {
            tracing::debug!(session_id = %id, "Rejecting registration while draining");
            session.close();
            session.advance(SessionState::Removed);
            let _ = reply.send(Err(HubError::ShuttingDown));
            return;
        }

        let (queue_tx, queue_rx) = mpsc::channel(self.config.queue_capacity);
        session.advance(SessionState::Active);
        session.spawn_pumps(
            stream,
            sink,
            queue_rx,
            Arc::clone(&self.codec),
            self.hub.command_sender(),
        );

        self.active.insert(
            id,
            Member {
                session: session.clone(),
                queue: queue_tx,
            },
        );
        self.snapshot.write().await.push(session.clone());

        if let Some(hook) = self.hooks.on_session_added.as_mut() {
            let hub = &self.hub;
            if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| hook(hub, &session))) {
                tracing::error!(
                    session_id = %id,
                    panic = %panic_message(&*panic),
                    "Session added hook panicked"
                );
            }
        }

        tracing::info!(session_id = %id, clients = self.active.len(), "Session registered");

        if self.phase() == HubState::Draining {
            // Serviced, but the drain still has to finish.
            session.close();
        }

        let _ = reply.send(Ok(()));
    }

    fn inbound(&mut self, id: SessionId, envelope: Arc<Envelope>) {
        let Some(session) = self.active.get(&id).map(|m| m.session.clone()) else {
            return;
        };

        if let MessageHandler::Custom(handler) = &mut self.hooks.on_message {
            let hub = &self.hub;
            match panic::catch_unwind(AssertUnwindSafe(|| handler(hub, &session, envelope))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!(session_id = %id, error = %e, "Message handler failed");
                }
                Err(panic) => {
                    tracing::error!(
                        session_id = %id,
                        panic = %panic_message(&*panic),
                        "Message handler panicked"
                    );
                }
            }
            return;
        }

        self.dispatch(&envelope, Target::AllExcept(id));
    }

    async fn remove(&mut self, id: SessionId) {
        let Some(member) = self.active.remove(&id) else {
            return;
        };
        drop(member.queue);

        self.snapshot.write().await.retain(|s| s.id() != id);
        member.session.advance(SessionState::Removed);

        if let Some(hook) = self.hooks.on_session_removed.as_mut() {
            let hub = &self.hub;
            let session = &member.session;
            if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| hook(hub, session))) {
                tracing::error!(
                    session_id = %id,
                    panic = %panic_message(&*panic),
                    "Session removed hook panicked"
                );
            }
        }

        tracing::info!(session_id = %id, clients = self.active.len(), "Session removed");

        if self.phase() == HubState::Draining && self.active.is_empty() {
            self.stop();
        }
    }

    fn dispatch(&mut self, envelope: &Arc<Envelope>, target: Target) {
        if self.rejecting() {
            tracing::debug!(kind = %envelope.kind(), "Dropping send while draining");
            return;
        }

        let ids: Vec<SessionId> = match target {
            Target::Only(mut ids) if !ids.is_empty() => {
                let mut seen = HashSet::with_capacity(ids.len());
                ids.retain(|id| seen.insert(*id));
                ids
            }
            Target::AllExcept(skip) => self.active.keys().copied().filter(|id| *id != skip).collect(),
            Target::All | Target::Only(_) => self.active.keys().copied().collect(),
        };

        let mut delivered = 0usize;
        for id in ids {
            let Some(member) = self.active.get(&id) else {
                continue;
            };

            match member.queue.try_send(Arc::clone(envelope)) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    if !member.session.is_closed() {
                        tracing::warn!(
                            session_id = %id,
                            capacity = self.config.queue_capacity,
                            "Outbound queue full, evicting slow consumer"
                        );
                    }
                    member.session.close();
                }
                // Outbound pump already gone; removal is on its way
                Err(TrySendError::Closed(_)) => {}
            }
        }

        tracing::trace!(kind = %envelope.kind(), delivered, "Dispatched envelope");
    }

    fn shutdown(&mut self) {
        if self.phase() != HubState::Running {
            tracing::debug!("Shutdown already in progress");
            return;
        }

        if self.active.is_empty() {
            self.stop();
            return;
        }

        tracing::info!(clients = self.active.len(), "Hub draining");
        self.state.send_replace(HubState::Draining);
        for member in self.active.values() {
            member.session.close();
        }
    }

    fn stop(&mut self) {
        self.state.send_replace(HubState::Stopped);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
