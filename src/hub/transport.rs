//! Transport abstraction
//!
//! A transport is an ordered, message-framed duplex stream. Sessions split it
//! into a frame stream (read by the inbound pump) and a frame sink (written by
//! the outbound pump). Closing a transport means dropping both halves.

use std::pin::Pin;

use axum::extract::ws::{Message, WebSocket};
use futures_util::future;
use futures_util::sink::Sink;
use futures_util::stream::{BoxStream, StreamExt};
use futures_util::SinkExt;

use super::error::TransportError;

/// A single transport frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close,
}

impl Frame {
    /// Build a data frame, preferring text when the bytes are UTF-8
    pub fn data(bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(text) => Frame::Text(text),
            Err(e) => Frame::Binary(e.into_bytes()),
        }
    }

    /// Payload of a data frame, `None` for control frames
    pub fn data_bytes(&self) -> Option<&[u8]> {
        match self {
            Frame::Text(text) => Some(text.as_bytes()),
            Frame::Binary(bytes) => Some(bytes),
            _ => None,
        }
    }
}

/// Read half of a transport
pub type FrameStream = BoxStream<'static, Result<Frame, TransportError>>;

/// Write half of a transport
pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = TransportError> + Send>>;

/// A duplex frame transport owned by exactly one session
pub trait Transport: Send + 'static {
    fn into_split(self) -> (FrameStream, FrameSink);
}

impl From<Message> for Frame {
    fn from(message: Message) -> Self {
        match message {
            Message::Text(text) => Frame::Text(text),
            Message::Binary(bytes) => Frame::Binary(bytes),
            Message::Ping(bytes) => Frame::Ping(bytes),
            Message::Pong(bytes) => Frame::Pong(bytes),
            Message::Close(_) => Frame::Close,
        }
    }
}

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => Message::Text(text),
            Frame::Binary(bytes) => Message::Binary(bytes),
            Frame::Ping(bytes) => Message::Ping(bytes),
            Frame::Pong(bytes) => Message::Pong(bytes),
            Frame::Close => Message::Close(None),
        }
    }
}

impl Transport for WebSocket {
    fn into_split(self) -> (FrameStream, FrameSink) {
        let (sink, stream) = StreamExt::split(self);

        let stream = stream
            .map(|result| result.map(Frame::from).map_err(TransportError::from))
            .boxed();

        let sink = sink
            .sink_map_err(TransportError::from)
            .with(|frame: Frame| future::ready(Ok::<_, TransportError>(Message::from(frame))));

        (stream, Box::pin(sink))
    }
}

/// In-process transport backed by tokio channels
///
/// Useful for embedding the hub without a network and for tests.
pub mod memory {
    use futures_util::sink;
    use futures_util::stream::{self, StreamExt};
    use tokio::sync::mpsc;

    use super::{Frame, FrameSink, FrameStream, Transport};
    use crate::hub::error::TransportError;

    /// Hub side of an in-memory connection
    pub struct MemoryTransport {
        incoming: mpsc::Receiver<Frame>,
        outgoing: mpsc::Sender<Frame>,
    }

    /// Remote side of an in-memory connection
    pub struct MemoryPeer {
        outgoing: Option<mpsc::Sender<Frame>>,
        incoming: mpsc::Receiver<Frame>,
    }

    /// Create a connected transport/peer pair; each direction buffers `capacity` frames
    pub fn pair(capacity: usize) -> (MemoryTransport, MemoryPeer) {
        let (to_hub, from_peer) = mpsc::channel(capacity);
        let (to_peer, from_hub) = mpsc::channel(capacity);

        (
            MemoryTransport {
                incoming: from_peer,
                outgoing: to_peer,
            },
            MemoryPeer {
                outgoing: Some(to_hub),
                incoming: from_hub,
            },
        )
    }

    impl Transport for MemoryTransport {
        fn into_split(self) -> (FrameStream, FrameSink) {
            let stream = stream::unfold(self.incoming, |mut rx| async move {
                rx.recv()
                    .await
                    .map(|frame| (Ok::<_, TransportError>(frame), rx))
            })
            .boxed();

            let sink = sink::unfold(self.outgoing, |tx, frame: Frame| async move {
                tx.send(frame).await.map_err(|_| TransportError::Closed)?;
                Ok::<_, TransportError>(tx)
            });

            (stream, Box::pin(sink))
        }
    }

    impl MemoryPeer {
        /// Send a frame to the hub
        pub async fn send(&self, frame: Frame) -> Result<(), TransportError> {
            match &self.outgoing {
                Some(tx) => tx.send(frame).await.map_err(|_| TransportError::Closed),
                None => Err(TransportError::Closed),
            }
        }

        /// Send a text frame to the hub
        pub async fn send_text(&self, text: impl Into<String>) -> Result<(), TransportError> {
            self.send(Frame::Text(text.into())).await
        }

        /// Receive the next frame from the hub; `None` once the hub closed its side
        pub async fn recv(&mut self) -> Option<Frame> {
            self.incoming.recv().await
        }

        /// Close the sending direction, which ends the hub's inbound stream
        pub fn close(&mut self) {
            self.outgoing.take();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory;
    use super::*;

    #[test]
    fn test_frame_data() {
        assert_eq!(Frame::data(b"hello".to_vec()), Frame::Text("hello".to_string()));
        assert_eq!(
            Frame::data(vec![0xff, 0xfe]),
            Frame::Binary(vec![0xff, 0xfe])
        );
        assert_eq!(Frame::Ping(vec![1]).data_bytes(), None);
        assert_eq!(Frame::Close.data_bytes(), None);
        assert_eq!(
            Frame::Text("x".to_string()).data_bytes(),
            Some(b"x".as_slice())
        );
    }

    #[test]
    fn test_message_conversion() {
        let frame: Frame = Message::Text("hi".to_string()).into();
        assert_eq!(frame, Frame::Text("hi".to_string()));

        let message: Message = Frame::Close.into();
        assert!(matches!(message, Message::Close(None)));
    }

    #[tokio::test]
    async fn test_memory_pair_exchanges_frames() {
        let (transport, mut peer) = memory::pair(4);
        let (mut stream, mut sink) = transport.into_split();

        peer.send_text("from peer").await.unwrap();
        let frame = stream.next().await.unwrap().unwrap();
        assert_eq!(frame, Frame::Text("from peer".to_string()));

        sink.send(Frame::Text("from hub".to_string())).await.unwrap();
        assert_eq!(peer.recv().await, Some(Frame::Text("from hub".to_string())));
    }

    #[tokio::test]
    async fn test_memory_close_propagates() {
        let (transport, mut peer) = memory::pair(4);
        let (mut stream, sink) = transport.into_split();

        peer.close();
        assert!(stream.next().await.is_none());
        assert!(peer.send_text("late").await.is_err());

        drop(sink);
        assert_eq!(peer.recv().await, None);
    }

    #[tokio::test]
    async fn test_memory_write_fails_after_peer_dropped() {
        let (transport, peer) = memory::pair(4);
        let (_stream, mut sink) = transport.into_split();

        drop(peer);
        let result = sink.send(Frame::Text("lost".to_string())).await;
        assert!(matches!(result, Err(TransportError::Closed)));
    }
}
