//! Client Sessions
//!
//! A session pairs one transport with two pumps:
//!
//! - the **inbound pump** reads frames, decodes data frames into envelopes and
//!   forwards them to the control loop tagged with the session id
//! - the **outbound pump** drains the session's bounded queue and writes each
//!   envelope to the transport
//!
//! Whichever pump finishes last marks the session terminated and posts a single
//! `Terminated` command, so the control loop only forgets a session once both
//! pumps are gone.

use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::codec::Codec;
use super::control::Command;
use super::envelope::Envelope;
use super::transport::{Frame, FrameSink, FrameStream};

/// Upper bound on the close handshake once the outbound pump stops
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Stable identity of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Uuid> for SessionId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Session lifecycle; transitions only move forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Handed to the hub, not yet in the active set
    Registering = 0,
    /// Member of the active set
    Active = 1,
    /// Transport closed, waiting for the pumps to finish
    Draining = 2,
    /// Removed from the active set for good
    Removed = 3,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Registering,
            1 => SessionState::Active,
            2 => SessionState::Draining,
            _ => SessionState::Removed,
        }
    }
}

struct SessionInner<A> {
    id: SessionId,
    attachment: A,
    connected_at: DateTime<Utc>,
    state: AtomicU8,
    /// Cancelling this closes the transport
    closed: CancellationToken,
    /// Cancelled once both pumps have returned
    terminated: CancellationToken,
    pumps_running: AtomicUsize,
}

/// Handle to a connected client
///
/// Cheap to clone. The attachment is caller data carried for the lifetime of
/// the session and never inspected by the hub.
pub struct Session<A> {
    inner: Arc<SessionInner<A>>,
}

impl<A> Clone for Session<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A> PartialEq for Session<A> {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl<A> Eq for Session<A> {}

impl<A> fmt::Debug for Session<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("connected_at", &self.inner.connected_at)
            .finish()
    }
}

impl<A> Session<A> {
    pub(crate) fn new(attachment: A) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                id: SessionId::new(),
                attachment,
                connected_at: Utc::now(),
                state: AtomicU8::new(SessionState::Registering as u8),
                closed: CancellationToken::new(),
                terminated: CancellationToken::new(),
                pumps_running: AtomicUsize::new(2),
            }),
        }
    }

    pub fn id(&self) -> SessionId {
        self.inner.id
    }

    pub fn attachment(&self) -> &A {
        &self.inner.attachment
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.inner.connected_at
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    /// Move the lifecycle forward; never moves it back
    pub(crate) fn advance(&self, state: SessionState) {
        self.inner.state.fetch_max(state as u8, Ordering::AcqRel);
    }

    /// Close the transport
    ///
    /// Idempotent. Both pumps unwind afterwards; use [`Session::wait`] to
    /// observe the full teardown.
    pub fn close(&self) {
        if self.state() == SessionState::Active {
            self.advance(SessionState::Draining);
        }
        self.inner.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }

    /// Wait until both pumps have terminated
    pub async fn wait(&self) {
        self.inner.terminated.cancelled().await;
    }

    pub fn is_terminated(&self) -> bool {
        self.inner.terminated.is_cancelled()
    }

    /// Close the transport and wait for the pumps to finish
    pub async fn close_and_wait(&self) {
        self.close();
        self.wait().await;
    }
}

impl<A: Send + Sync + 'static> Session<A> {
    /// Start both pumps for this session
    pub(crate) fn spawn_pumps(
        &self,
        stream: FrameStream,
        sink: FrameSink,
        queue: mpsc::Receiver<Arc<Envelope>>,
        codec: Arc<dyn Codec>,
        commands: mpsc::Sender<Command<A>>,
    ) {
        tokio::spawn(inbound_pump(
            self.clone(),
            stream,
            Arc::clone(&codec),
            commands.clone(),
        ));
        tokio::spawn(outbound_pump(self.clone(), sink, queue, codec, commands));
    }

    /// Called by each pump on exit; the last one reports the session terminated
    async fn pump_finished(&self, commands: &mpsc::Sender<Command<A>>) {
        if self.inner.pumps_running.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }

        self.inner.terminated.cancel();
        tracing::debug!(session_id = %self.id(), "Session pumps terminated");

        if commands
            .send(Command::Terminated { id: self.id() })
            .await
            .is_err()
        {
            tracing::warn!(session_id = %self.id(), "Control loop gone before session removal");
        }
    }
}

/// Transport → decoded envelope → control loop
async fn inbound_pump<A: Send + Sync + 'static>(
    session: Session<A>,
    mut stream: FrameStream,
    codec: Arc<dyn Codec>,
    commands: mpsc::Sender<Command<A>>,
) {
    let id = session.id();

    loop {
        let next = tokio::select! {
            _ = session.inner.closed.cancelled() => break,
            next = stream.next() => next,
        };

        let frame = match next {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => {
                tracing::debug!(session_id = %id, error = %e, "Transport read failed");
                break;
            }
            None => break,
        };

        if frame == Frame::Close {
            tracing::debug!(session_id = %id, "Peer requested close");
            break;
        }

        let Some(bytes) = frame.data_bytes() else {
            continue;
        };

        let envelope = match codec.decode(bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::debug!(session_id = %id, error = %e, "Dropping undecodable frame");
                continue;
            }
        };

        let command = Command::Inbound {
            id,
            envelope: Arc::new(envelope),
        };
        if commands.send(command).await.is_err() {
            break;
        }
    }

    // The peer is gone; take the outbound side down with us.
    session.close();
    drop(stream);
    session.pump_finished(&commands).await;
}

/// Outbound queue → encoded frame → transport
async fn outbound_pump<A: Send + Sync + 'static>(
    session: Session<A>,
    mut sink: FrameSink,
    mut queue: mpsc::Receiver<Arc<Envelope>>,
    codec: Arc<dyn Codec>,
    commands: mpsc::Sender<Command<A>>,
) {
    let id = session.id();

    loop {
        let envelope = tokio::select! {
            biased;
            _ = session.inner.closed.cancelled() => break,
            envelope = queue.recv() => match envelope {
                Some(envelope) => envelope,
                None => break,
            },
        };

        let bytes = match codec.encode(&envelope) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(
                    session_id = %id,
                    kind = %envelope.kind(),
                    error = %e,
                    "Skipping envelope that cannot be encoded"
                );
                continue;
            }
        };

        let write = tokio::select! {
            _ = session.inner.closed.cancelled() => break,
            write = sink.send(Frame::data(bytes)) => write,
        };

        if let Err(e) = write {
            tracing::debug!(session_id = %id, error = %e, "Transport write failed");
            session.close();
            break;
        }
    }

    queue.close();
    // Best effort close handshake; a stalled peer must not keep the pump alive.
    if timeout(CLOSE_GRACE, sink.close()).await.is_err() {
        tracing::debug!(session_id = %id, "Transport close timed out");
    }
    drop(sink);
    session.pump_finished(&commands).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::codec::JsonCodec;
    use crate::hub::transport::{memory, Transport};

    const WAIT: Duration = Duration::from_secs(5);

    struct Harness {
        session: Session<&'static str>,
        peer: memory::MemoryPeer,
        queue: mpsc::Sender<Arc<Envelope>>,
        commands: mpsc::Receiver<Command<&'static str>>,
    }

    fn start(queue_capacity: usize) -> Harness {
        let (transport, peer) = memory::pair(8);
        let (stream, sink) = transport.into_split();
        let (queue_tx, queue_rx) = mpsc::channel(queue_capacity);
        let (commands_tx, commands_rx) = mpsc::channel(16);

        let session = Session::new("attachment");
        session.advance(SessionState::Active);
        session.spawn_pumps(stream, sink, queue_rx, Arc::new(JsonCodec), commands_tx);

        Harness {
            session,
            peer,
            queue: queue_tx,
            commands: commands_rx,
        }
    }

    async fn next_command(h: &mut Harness) -> Command<&'static str> {
        timeout(WAIT, h.commands.recv())
            .await
            .expect("timed out waiting for command")
            .expect("command channel closed")
    }

    #[test]
    fn test_state_is_monotonic() {
        let session = Session::new(());
        assert_eq!(session.state(), SessionState::Registering);

        session.advance(SessionState::Removed);
        session.advance(SessionState::Active);
        assert_eq!(session.state(), SessionState::Removed);
    }

    #[test]
    fn test_close_is_idempotent() {
        let session = Session::new(());
        session.advance(SessionState::Active);

        session.close();
        session.close();
        assert!(session.is_closed());
        assert_eq!(session.state(), SessionState::Draining);
    }

    #[tokio::test]
    async fn test_inbound_forwards_decoded_envelopes() {
        let mut h = start(4);

        h.peer
            .send_text(r#"{"type":"chat","data":{"text":"hi"}}"#)
            .await
            .unwrap();

        match next_command(&mut h).await {
            Command::Inbound { id, envelope } => {
                assert_eq!(id, h.session.id());
                assert_eq!(envelope.kind(), "chat");
                assert_eq!(envelope.payload(), br#"{"text":"hi"}"#.as_slice());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_frame_does_not_end_session() {
        let mut h = start(4);

        h.peer.send_text("{not json").await.unwrap();
        h.peer.send(Frame::Ping(vec![1])).await.unwrap();
        h.peer.send_text(r#"{"type":"after"}"#).await.unwrap();

        match next_command(&mut h).await {
            Command::Inbound { envelope, .. } => assert_eq!(envelope.kind(), "after"),
            other => panic!("unexpected command: {:?}", other),
        }
        assert!(!h.session.is_closed());
    }

    #[tokio::test]
    async fn test_outbound_writes_queued_envelopes() {
        let mut h = start(4);

        h.queue
            .send(Arc::new(Envelope::empty("first")))
            .await
            .unwrap();
        h.queue
            .send(Arc::new(Envelope::from_raw("second", "1")))
            .await
            .unwrap();

        let first = timeout(WAIT, h.peer.recv()).await.unwrap();
        let second = timeout(WAIT, h.peer.recv()).await.unwrap();
        assert_eq!(first, Some(Frame::Text(r#"{"type":"first"}"#.to_string())));
        assert_eq!(
            second,
            Some(Frame::Text(r#"{"type":"second","data":1}"#.to_string()))
        );
    }

    #[tokio::test]
    async fn test_unencodable_envelope_is_skipped() {
        let mut h = start(4);

        h.queue
            .send(Arc::new(Envelope::from_raw("bad", "not json")))
            .await
            .unwrap();
        h.queue.send(Arc::new(Envelope::empty("good"))).await.unwrap();

        let frame = timeout(WAIT, h.peer.recv()).await.unwrap();
        assert_eq!(frame, Some(Frame::Text(r#"{"type":"good"}"#.to_string())));
    }

    #[tokio::test]
    async fn test_peer_close_terminates_both_pumps() {
        let mut h = start(4);

        h.peer.close();

        match next_command(&mut h).await {
            Command::Terminated { id } => assert_eq!(id, h.session.id()),
            other => panic!("unexpected command: {:?}", other),
        }
        assert!(h.session.is_terminated());
        assert_eq!(timeout(WAIT, h.peer.recv()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_close_and_wait() {
        let mut h = start(4);

        timeout(WAIT, h.session.close_and_wait()).await.unwrap();

        assert!(h.session.is_terminated());
        assert_eq!(timeout(WAIT, h.peer.recv()).await.unwrap(), None);
        assert!(matches!(
            next_command(&mut h).await,
            Command::Terminated { .. }
        ));
        // Exactly one termination report
        assert!(h.commands.try_recv().is_err());
    }
}
