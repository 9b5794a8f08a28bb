//! Worker transport abstraction
//!
//! A worker session is a pair of framed text halves behind the `FrameSink` /
//! `FrameSource` traits. Production sessions run over WebSocket via
//! tokio-tungstenite; the `local` module provides an in-process duplex used
//! by tests and embedded workers.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{Bytes, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Transport-level failures. These never propagate past the connection
/// lifecycle; callers observe them as the connection turning `closed`.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection closed")]
    Closed,

    #[error("invalid uri: {0}")]
    InvalidUri(String),

    #[error("transport failure: {0}")]
    Failed(String),
}

/// Outbound half of a worker session
#[async_trait]
pub trait FrameSink: Send {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    async fn ping(&mut self) -> Result<(), TransportError>;

    async fn close(&mut self);
}

/// Inbound half of a worker session. `Ok(None)` is a clean close.
#[async_trait]
pub trait FrameSource: Send {
    async fn next_text(&mut self) -> Result<Option<String>, TransportError>;
}

/// A connected session, split into its two halves
pub type TransportPair = (Box<dyn FrameSink>, Box<dyn FrameSource>);

/// Opens worker sessions. The dispatcher is generic over this so tests can
/// wire in-process workers instead of sockets.
#[async_trait]
pub trait Connect: Send + Sync {
    async fn connect(&self, uri: &str) -> Result<TransportPair, TransportError>;
}

// =============================================================================
// WebSocket transport
// =============================================================================

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket session opener
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnect;

#[async_trait]
impl Connect for WsConnect {
    async fn connect(&self, uri: &str) -> Result<TransportPair, TransportError> {
        if !uri.starts_with("ws://") && !uri.starts_with("wss://") {
            return Err(TransportError::InvalidUri(uri.to_string()));
        }

        let (stream, _) = connect_async(uri)
            .await
            .map_err(|e| TransportError::Failed(e.to_string()))?;
        let (sink, source) = stream.split();
        Ok((Box::new(WsSink(sink)), Box::new(WsSource(source))))
    }
}

struct WsSink(SplitSink<WsStream, Message>);

#[async_trait]
impl FrameSink for WsSink {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.0
            .send(Message::text(text))
            .await
            .map_err(|e| TransportError::Failed(e.to_string()))
    }

    async fn ping(&mut self) -> Result<(), TransportError> {
        self.0
            .send(Message::Ping(Bytes::new()))
            .await
            .map_err(|e| TransportError::Failed(e.to_string()))
    }

    async fn close(&mut self) {
        let _ = self.0.close().await;
    }
}

struct WsSource(SplitStream<WsStream>);

#[async_trait]
impl FrameSource for WsSource {
    async fn next_text(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            match self.0.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text.to_string())),
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                // Control and binary frames are not part of the protocol.
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(TransportError::Failed(e.to_string())),
            }
        }
    }
}

// =============================================================================
// In-process transport
// =============================================================================

/// In-process duplex sessions for tests and embedded workers
pub mod local {
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use super::{Connect, FrameSink, FrameSource, TransportError, TransportPair};

    /// The worker-side handle of an in-process session
    pub struct LocalPeer {
        tx: mpsc::UnboundedSender<String>,
        rx: mpsc::UnboundedReceiver<String>,
    }

    impl LocalPeer {
        /// Send a frame to the client side. Returns false once the client
        /// hung up.
        pub fn send(&self, text: impl Into<String>) -> bool {
            self.tx.send(text.into()).is_ok()
        }

        /// Receive the next frame from the client side
        pub async fn recv(&mut self) -> Option<String> {
            self.rx.recv().await
        }
    }

    struct LocalSink {
        tx: Option<mpsc::UnboundedSender<String>>,
    }

    #[async_trait]
    impl FrameSink for LocalSink {
        async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
            match &self.tx {
                Some(tx) => tx.send(text).map_err(|_| TransportError::Closed),
                None => Err(TransportError::Closed),
            }
        }

        async fn ping(&mut self) -> Result<(), TransportError> {
            match &self.tx {
                Some(tx) if !tx.is_closed() => Ok(()),
                _ => Err(TransportError::Closed),
            }
        }

        async fn close(&mut self) {
            self.tx = None;
        }
    }

    struct LocalSource {
        rx: mpsc::UnboundedReceiver<String>,
    }

    #[async_trait]
    impl FrameSource for LocalSource {
        async fn next_text(&mut self) -> Result<Option<String>, TransportError> {
            Ok(self.rx.recv().await)
        }
    }

    /// Build one in-process session: the client half as a transport pair,
    /// the worker half as a [`LocalPeer`].
    pub fn session() -> (TransportPair, LocalPeer) {
        let (client_tx, worker_rx) = mpsc::unbounded_channel();
        let (worker_tx, client_rx) = mpsc::unbounded_channel();

        let pair: TransportPair = (
            Box::new(LocalSink {
                tx: Some(client_tx),
            }),
            Box::new(LocalSource { rx: client_rx }),
        );
        let peer = LocalPeer {
            tx: worker_tx,
            rx: worker_rx,
        };
        (pair, peer)
    }

    /// A `Connect` implementation handing out pre-registered in-process
    /// sessions by URI. Each `register` call backs exactly one `connect`.
    #[derive(Default, Clone)]
    pub struct LocalConnect {
        pending: Arc<Mutex<HashMap<String, VecDeque<TransportPair>>>>,
        attempts: Arc<Mutex<HashMap<String, usize>>>,
    }

    impl LocalConnect {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue a session for `uri` and return its worker half
        pub fn register(&self, uri: &str) -> LocalPeer {
            let (pair, peer) = session();
            self.pending
                .lock()
                .unwrap()
                .entry(uri.to_string())
                .or_default()
                .push_back(pair);
            peer
        }

        /// How often `connect` was called for this URI
        pub fn attempts(&self, uri: &str) -> usize {
            self.attempts.lock().unwrap().get(uri).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl Connect for LocalConnect {
        async fn connect(&self, uri: &str) -> Result<TransportPair, TransportError> {
            *self
                .attempts
                .lock()
                .unwrap()
                .entry(uri.to_string())
                .or_insert(0) += 1;
            self.pending
                .lock()
                .unwrap()
                .get_mut(uri)
                .and_then(VecDeque::pop_front)
                .ok_or_else(|| TransportError::Failed(format!("no endpoint behind {uri}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_session_carries_frames_both_ways() {
        let ((mut sink, mut source), mut peer) = local::session();

        sink.send_text("[\"command.status\"]".to_string()).await.unwrap();
        assert_eq!(peer.recv().await.unwrap(), "[\"command.status\"]");

        assert!(peer.send("[\"status\", {\"status\": \"idle\"}]"));
        assert_eq!(
            source.next_text().await.unwrap().unwrap(),
            "[\"status\", {\"status\": \"idle\"}]"
        );
    }

    #[tokio::test]
    async fn dropped_peer_reads_as_clean_close() {
        let ((mut sink, mut source), peer) = local::session();
        drop(peer);

        assert!(source.next_text().await.unwrap().is_none());
        assert!(sink.send_text("x".to_string()).await.is_err());
        assert!(sink.ping().await.is_err());
    }

    #[tokio::test]
    async fn local_connect_hands_out_registered_sessions_once() {
        let connect = local::LocalConnect::new();
        let _peer = connect.register("ws://w0/session");

        assert!(connect.connect("ws://w0/session").await.is_ok());
        assert!(connect.connect("ws://w0/session").await.is_err());
        assert!(connect.connect("ws://other/session").await.is_err());
    }
}
