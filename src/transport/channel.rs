//! Channel handle and event loop.
//!
//! Each [`Channel`] spawns one tokio task that owns the WebSocket and
//! handles:
//!
//! - Outgoing payloads queued through [`Channel::try_send`]
//! - Incoming messages, forwarded to the [`InboundHandler`]
//! - Shutdown requested by [`Channel::close`]
//! - Remote close, stream end and socket errors
//!
//! The outbound queue is bounded. A full queue drops the new payload
//! instead of waiting, so producers are never slowed down by the consumer.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};

use super::Payload;

// ============================================================================
// Constants
// ============================================================================

/// Default capacity of the outbound queue.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 64;

// ============================================================================
// Types
// ============================================================================

/// Callback for messages received from the peer.
///
/// Called on the event loop task; must not block.
pub type InboundHandler = Arc<dyn Fn(Payload) + Send + Sync>;

/// Resolves once the channel's event loop has terminated.
pub type ClosedSignal = oneshot::Receiver<CloseReason>;

// ============================================================================
// CloseReason
// ============================================================================

/// Why a channel's event loop terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// [`Channel::close`] was called locally.
    Requested,
    /// The peer sent a close frame.
    Remote {
        /// Close code, if the peer sent one.
        code: Option<u16>,
        /// Close reason text.
        reason: String,
    },
    /// The socket failed.
    Error(String),
    /// The stream ended without a close frame.
    Ended,
}

impl CloseReason {
    /// Returns `true` if the close was initiated locally.
    #[inline]
    #[must_use]
    pub fn is_requested(&self) -> bool {
        matches!(self, Self::Requested)
    }
}

// ============================================================================
// ChannelConfig
// ============================================================================

/// Settings applied when a channel is spawned.
#[derive(Clone)]
pub struct ChannelConfig {
    /// Maximum number of queued outbound payloads.
    pub outbound_capacity: usize,
    /// Receiver of inbound messages.
    pub inbound: Option<InboundHandler>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            inbound: None,
        }
    }
}

// ============================================================================
// Channel
// ============================================================================

/// Handle to a live message channel.
///
/// Cloning the handle is cheap; all clones drive the same event loop.
///
/// # Thread Safety
///
/// `Channel` is `Send + Sync`. [`Channel::try_send`] never awaits, so it
/// can be called from any task or callback.
#[derive(Clone)]
pub struct Channel {
    /// Bounded queue feeding the event loop.
    outbound: mpsc::Sender<Payload>,
    /// Cancelled to request a local close.
    shutdown: CancellationToken,
    /// Transport-reported open state.
    open: Arc<AtomicBool>,
    /// Address of the peer, for logging.
    peer: Arc<str>,
}

impl Channel {
    /// Spawns the event loop for an established WebSocket.
    ///
    /// Returns the handle and a signal resolving with the [`CloseReason`].
    pub fn spawn<S>(
        ws_stream: WebSocketStream<S>,
        peer: impl Into<String>,
        config: ChannelConfig,
    ) -> (Self, ClosedSignal)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (outbound, outbound_rx) = mpsc::channel(config.outbound_capacity.max(1));
        let (closed_tx, closed_rx) = oneshot::channel();
        let shutdown = CancellationToken::new();
        let open = Arc::new(AtomicBool::new(true));
        let peer: Arc<str> = Arc::from(peer.into());

        tokio::spawn(Self::run_event_loop(
            ws_stream,
            outbound_rx,
            shutdown.clone(),
            Arc::clone(&open),
            config.inbound,
            Arc::clone(&peer),
            closed_tx,
        ));

        let channel = Self {
            outbound,
            shutdown,
            open,
            peer,
        };

        (channel, closed_rx)
    }

    /// Returns `true` while the event loop owns an open socket.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Returns the peer address.
    #[inline]
    #[must_use]
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Queues a payload without waiting.
    ///
    /// # Errors
    ///
    /// [`Error::SendDropped`] if the channel is closed or its queue is full.
    /// The payload is discarded in both cases.
    pub fn try_send(&self, payload: Payload) -> Result<()> {
        if !self.is_open() {
            return Err(Error::send_dropped("channel closed"));
        }

        match self.outbound.try_send(payload) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(Error::send_dropped("outbound queue full")),
            Err(TrySendError::Closed(_)) => Err(Error::send_dropped("channel closed")),
        }
    }

    /// Requests a local close.
    ///
    /// Idempotent. Queued payloads that were not yet written are discarded.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    /// Event loop that handles WebSocket I/O.
    async fn run_event_loop<S>(
        ws_stream: WebSocketStream<S>,
        mut outbound_rx: mpsc::Receiver<Payload>,
        shutdown: CancellationToken,
        open: Arc<AtomicBool>,
        inbound: Option<InboundHandler>,
        peer: Arc<str>,
        closed_tx: oneshot::Sender<CloseReason>,
    ) where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        let reason = loop {
            tokio::select! {
                biased;

                // Local close
                () = shutdown.cancelled() => {
                    debug!(peer = %peer, "Close requested");
                    let _ = ws_write.close().await;
                    break CloseReason::Requested;
                }

                // Incoming messages from the peer
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(ref handler) = inbound {
                                handler(Payload::Text(text.as_str().to_owned()));
                            }
                        }

                        Some(Ok(Message::Binary(data))) => {
                            if let Some(ref handler) = inbound {
                                handler(Payload::Binary(data));
                            }
                        }

                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (Some(u16::from(f.code)), f.reason.as_str().to_owned()))
                                .unwrap_or((None, String::new()));
                            debug!(peer = %peer, ?code, %reason, "WebSocket closed by remote");
                            break CloseReason::Remote { code, reason };
                        }

                        Some(Err(e)) => {
                            warn!(peer = %peer, error = %e, "WebSocket error");
                            break CloseReason::Error(e.to_string());
                        }

                        None => {
                            debug!(peer = %peer, "WebSocket stream ended");
                            break CloseReason::Ended;
                        }

                        // Ping/Pong are answered by tungstenite
                        Some(Ok(_)) => {}
                    }
                }

                // Outgoing payloads
                payload = outbound_rx.recv() => {
                    match payload {
                        Some(payload) => {
                            let size = payload.len();
                            if let Err(e) = ws_write.send(payload.into_message()).await {
                                warn!(peer = %peer, error = %e, "WebSocket write failed");
                                break CloseReason::Error(e.to_string());
                            }
                            trace!(peer = %peer, size, "Payload written");
                        }

                        None => {
                            debug!(peer = %peer, "All channel handles dropped");
                            let _ = ws_write.close().await;
                            break CloseReason::Requested;
                        }
                    }
                }
            }
        };

        open.store(false, Ordering::Release);
        let _ = closed_tx.send(reason);

        debug!(peer = %peer, "Channel event loop terminated");
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("peer", &self.peer)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use bytes::Bytes;
    use parking_lot::Mutex;

    use crate::testing::{LoopbackServer, PeerEvent};

    async fn open_channel(server: &mut LoopbackServer, config: ChannelConfig) -> (Channel, ClosedSignal) {
        let (ws, _) = tokio_tungstenite::connect_async(server.url())
            .await
            .expect("connect should succeed");
        let opened = Channel::spawn(ws, server.url(), config);
        assert!(matches!(server.next_event().await, PeerEvent::Opened(0)));
        opened
    }

    #[test]
    fn test_default_config() {
        let config = ChannelConfig::default();
        assert_eq!(config.outbound_capacity, DEFAULT_OUTBOUND_CAPACITY);
        assert!(config.inbound.is_none());
    }

    #[tokio::test]
    async fn test_binary_payload_is_byte_exact() {
        let mut server = LoopbackServer::bind().await;
        let (channel, _closed) = open_channel(&mut server, ChannelConfig::default()).await;

        let frame: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        channel
            .try_send(Payload::Binary(Bytes::from(frame.clone())))
            .expect("send should be queued");

        match server.next_event().await {
            PeerEvent::Message(0, Message::Binary(data)) => assert_eq!(data.as_ref(), frame.as_slice()),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_local_close_reports_requested() {
        let mut server = LoopbackServer::bind().await;
        let (channel, closed) = open_channel(&mut server, ChannelConfig::default()).await;

        channel.close();
        channel.close();

        let reason = closed.await.expect("close signal");
        assert!(reason.is_requested());
        assert!(!channel.is_open());
        assert!(matches!(server.next_event().await, PeerEvent::Closed(0)));
        assert!(channel.try_send(Payload::from("late")).is_err());
    }

    #[tokio::test]
    async fn test_remote_close_reports_remote() {
        let mut server = LoopbackServer::bind().await;
        let (channel, closed) = open_channel(&mut server, ChannelConfig::default()).await;

        server.close(0);

        let reason = tokio::time::timeout(Duration::from_secs(5), closed)
            .await
            .expect("close in time")
            .expect("close signal");
        assert!(matches!(reason, CloseReason::Remote { .. }));
        assert!(!channel.is_open());
    }

    #[tokio::test]
    async fn test_inbound_messages_reach_handler() {
        let mut server = LoopbackServer::bind().await;
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let config = ChannelConfig {
            inbound: Some(Arc::new(move |payload| sink.lock().push(payload))),
            ..ChannelConfig::default()
        };
        let (_channel, _closed) = open_channel(&mut server, config).await;

        server.send_to(0, Message::Text(r#"{"type":"ping"}"#.into()));
        server.send_to(0, Message::Binary(Bytes::from_static(b"\x01\x02")));

        for _ in 0..50 {
            if received.lock().len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let received = received.lock();
        assert_eq!(received[0], Payload::Text(r#"{"type":"ping"}"#.to_string()));
        assert_eq!(received[1], Payload::Binary(Bytes::from_static(b"\x01\x02")));
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_waiting() {
        let mut server = LoopbackServer::bind().await;
        let config = ChannelConfig {
            outbound_capacity: 2,
            ..ChannelConfig::default()
        };
        let (channel, _closed) = open_channel(&mut server, config).await;

        // No await between sends: the event loop cannot drain the queue.
        let results: Vec<_> = (0..10)
            .map(|i| channel.try_send(Payload::from(vec![i as u8])))
            .collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 2);
        assert!(results[2..]
            .iter()
            .all(|r| matches!(r, Err(Error::SendDropped { .. }))));
    }
}
