//! DevTools connection and event loop.
//!
//! The connection spawns a tokio task that handles:
//!
//! - Outgoing commands, correlated to responses by integer id
//! - Incoming responses, routed to the waiting caller
//! - Incoming events, broadcast to subscribers
//!
//! Pending commands fail with [`Error::ConnectionClosed`] when the socket
//! goes away.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::CommandId;
use crate::protocol::{CdpEvent, CdpMessage, CdpRequest};

// ============================================================================
// Constants
// ============================================================================

/// Default timeout for a single command.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum pending commands before rejecting new ones.
const MAX_PENDING_COMMANDS: usize = 100;

/// Buffered events per subscriber before the oldest are skipped.
const EVENT_CAPACITY: usize = 256;

// ============================================================================
// Types
// ============================================================================

/// Map of command ids to response channels.
type CorrelationMap = FxHashMap<CommandId, oneshot::Sender<Result<Value>>>;

/// Internal commands for the event loop.
enum LoopCommand {
    /// Write a request; the response goes to `response_tx`.
    Send {
        request: CdpRequest,
        response_tx: oneshot::Sender<Result<Value>>,
    },
    /// Remove a timed-out correlation entry.
    Forget(CommandId),
    /// Close the socket.
    Shutdown,
}

// ============================================================================
// CdpConnection
// ============================================================================

/// WebSocket connection to a browser's DevTools endpoint.
///
/// # Thread Safety
///
/// `CdpConnection` is `Send + Sync` and cheap to clone; all clones share
/// one event loop.
#[derive(Clone)]
pub struct CdpConnection {
    command_tx: mpsc::UnboundedSender<LoopCommand>,
    correlation: Arc<Mutex<CorrelationMap>>,
    events: broadcast::Sender<CdpEvent>,
}

impl CdpConnection {
    /// Connects to a DevTools WebSocket URL.
    ///
    /// # Errors
    ///
    /// [`Error::ConnectFailed`] if the handshake fails.
    pub async fn connect(url: &str) -> Result<Self> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| Error::connect_failed(url, e.to_string()))?;

        debug!(url, "DevTools connection established");
        Ok(Self::spawn(ws_stream))
    }

    /// Spawns the event loop for an established WebSocket.
    pub(crate) fn spawn<S>(ws_stream: WebSocketStream<S>) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let correlation = Arc::new(Mutex::new(CorrelationMap::default()));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        tokio::spawn(Self::run_event_loop(
            ws_stream,
            command_rx,
            Arc::clone(&correlation),
            events.clone(),
        ));

        Self {
            command_tx,
            correlation,
            events,
        }
    }

    /// Subscribes to browser events received from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CdpEvent> {
        self.events.subscribe()
    }

    /// Calls `method` with the default timeout (30s).
    ///
    /// # Errors
    ///
    /// See [`call_with_timeout`](Self::call_with_timeout).
    pub async fn call(&self, method: &str, params: Option<Value>, session_id: Option<&str>) -> Result<Value> {
        let request = CdpRequest::new(method, params).with_session(session_id);
        self.call_with_timeout(request, DEFAULT_COMMAND_TIMEOUT).await
    }

    /// Sends a request and waits for its result.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the connection is closed
    /// - [`Error::Timeout`] if no response arrives in time
    /// - [`Error::Protocol`] if the browser answers with an error, or too
    ///   many commands are pending
    pub async fn call_with_timeout(&self, request: CdpRequest, command_timeout: Duration) -> Result<Value> {
        let id = request.id;
        let method = request.method.clone();

        {
            let correlation = self.correlation.lock();
            if correlation.len() >= MAX_PENDING_COMMANDS {
                warn!(
                    pending = correlation.len(),
                    max = MAX_PENDING_COMMANDS,
                    "Too many pending DevTools commands"
                );
                return Err(Error::protocol(format!(
                    "Too many pending commands: {}/{}",
                    correlation.len(),
                    MAX_PENDING_COMMANDS
                )));
            }
        }

        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(LoopCommand::Send {
                request,
                response_tx,
            })
            .map_err(|_| Error::ConnectionClosed)?;

        match timeout(command_timeout, response_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                let _ = self.command_tx.send(LoopCommand::Forget(id));
                Err(Error::timeout(method, command_timeout.as_millis() as u64))
            }
        }
    }

    /// Returns the number of commands awaiting a response.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.correlation.lock().len()
    }

    /// Closes the socket. Idempotent.
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(LoopCommand::Shutdown);
    }

    /// Event loop that handles WebSocket I/O.
    async fn run_event_loop<S>(
        ws_stream: WebSocketStream<S>,
        mut command_rx: mpsc::UnboundedReceiver<LoopCommand>,
        correlation: Arc<Mutex<CorrelationMap>>,
        events: broadcast::Sender<CdpEvent>,
    ) where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        loop {
            tokio::select! {
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            Self::handle_incoming(text.as_str(), &correlation, &events);
                        }

                        Some(Ok(Message::Close(_))) => {
                            debug!("DevTools socket closed by browser");
                            break;
                        }

                        Some(Err(e)) => {
                            warn!(error = %e, "DevTools socket error");
                            break;
                        }

                        None => {
                            debug!("DevTools stream ended");
                            break;
                        }

                        Some(Ok(_)) => {}
                    }
                }

                command = command_rx.recv() => {
                    match command {
                        Some(LoopCommand::Send { request, response_tx }) => {
                            Self::handle_send(request, response_tx, &mut ws_write, &correlation).await;
                        }

                        Some(LoopCommand::Forget(id)) => {
                            correlation.lock().remove(&id);
                            debug!(%id, "Removed timed-out correlation");
                        }

                        Some(LoopCommand::Shutdown) | None => {
                            let _ = ws_write.close().await;
                            break;
                        }
                    }
                }
            }
        }

        Self::fail_pending(&correlation);
        debug!("DevTools event loop terminated");
    }

    fn handle_incoming(
        text: &str,
        correlation: &Mutex<CorrelationMap>,
        events: &broadcast::Sender<CdpEvent>,
    ) {
        let message: CdpMessage = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Unparseable DevTools message");
                return;
            }
        };

        if let Some(id) = message.id {
            match correlation.lock().remove(&id) {
                Some(tx) => {
                    let _ = tx.send(message.into_result());
                }
                None => trace!(%id, "Response for unknown command"),
            }
            return;
        }

        if let Some(event) = message.into_event() {
            trace!(method = %event.method, "DevTools event");
            // No subscribers is fine.
            let _ = events.send(event);
        }
    }

    async fn handle_send<S>(
        request: CdpRequest,
        response_tx: oneshot::Sender<Result<Value>>,
        ws_write: &mut SplitSink<WebSocketStream<S>, Message>,
        correlation: &Mutex<CorrelationMap>,
    ) where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let id = request.id;

        let json = match serde_json::to_string(&request) {
            Ok(json) => json,
            Err(e) => {
                let _ = response_tx.send(Err(Error::Json(e)));
                return;
            }
        };

        correlation.lock().insert(id, response_tx);

        if let Err(e) = ws_write.send(Message::Text(json.into())).await {
            if let Some(tx) = correlation.lock().remove(&id) {
                let _ = tx.send(Err(Error::WebSocket(e)));
            }
            return;
        }

        trace!(%id, method = %request.method, "DevTools command sent");
    }

    fn fail_pending(correlation: &Mutex<CorrelationMap>) {
        let pending: Vec<_> = correlation.lock().drain().collect();
        let count = pending.len();

        for (_, tx) in pending {
            let _ = tx.send(Err(Error::ConnectionClosed));
        }

        if count > 0 {
            debug!(count, "Failed pending DevTools commands");
        }
    }
}

impl std::fmt::Debug for CdpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CdpConnection")
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
