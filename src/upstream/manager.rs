//! Upstream connection ownership.
//!
//! [`ConnectionManager`] owns at most one live [`Channel`] at a time.
//! Sends are gated on the channel being open: a payload offered while the
//! link is down (or while its queue is full) is dropped with a warning and
//! counted, never buffered for later.
//!
//! Unexpected closes are reported to `on_disconnect` handlers in
//! registration order. Closes requested through
//! [`ConnectionManager::disconnect`] (including the implicit one at the
//! start of every connect) are not reported.
//!
//! # Example
//!
//! ```ignore
//! use browser_relay::upstream::{ConnectionManager, ManagerConfig};
//!
//! let manager = ConnectionManager::new(ManagerConfig::new("ws://127.0.0.1:8080"));
//! let reconnector = manager.clone();
//! manager.on_disconnect(move || {
//!     reconnector.spawn_reconnect();
//! });
//!
//! manager.connect_with_retry().await;
//! manager.send(frame_bytes);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::protocol::{ControlEvent, decode_inbound};
use crate::transport::channel::DEFAULT_OUTBOUND_CAPACITY;
use crate::transport::{
    Channel, ChannelConfig, CloseReason, ClosedSignal, Connector, InboundHandler, Payload,
    WsConnector,
};

use super::RetryPolicy;

// ============================================================================
// Types
// ============================================================================

/// Callback fired after an unexpected disconnect.
pub type DisconnectHandler = Arc<dyn Fn() + Send + Sync>;

/// Callback fired for every decoded inbound message.
pub type MessageHandler = Arc<dyn Fn(&InboundMessage) + Send + Sync>;

/// A message received from the downstream consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// A text message that parsed as JSON.
    Json(Value),
    /// A binary message.
    Binary(Bytes),
}

/// Lifecycle phase of the upstream link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// No channel.
    #[default]
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// A channel is open.
    Connected,
}

/// Send counters since the manager was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendStats {
    /// Payloads accepted by the channel.
    pub sent: u64,
    /// Payloads dropped because the link was down or its queue was full.
    pub dropped: u64,
}

// ============================================================================
// ManagerConfig
// ============================================================================

/// Upstream settings. Changes apply on the next connect.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagerConfig {
    /// Target address, e.g. `ws://127.0.0.1:8080`.
    pub url: String,
    /// Backoff policy for the reconnect loop.
    pub retry: RetryPolicy,
    /// Outbound queue capacity of each channel.
    pub outbound_capacity: usize,
}

impl ManagerConfig {
    /// Creates a config with the default retry policy and queue size.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            retry: RetryPolicy::default(),
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
        }
    }

    /// Sets the retry policy.
    #[inline]
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the outbound queue capacity.
    #[inline]
    #[must_use]
    pub fn with_outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity;
        self
    }
}

// ============================================================================
// Shared State
// ============================================================================

struct LinkState {
    phase: ConnectionState,
    channel: Option<Channel>,
    /// Bumped whenever the current channel is replaced or released.
    generation: u64,
    retry_count: u32,
}

pub(super) struct Shared<C> {
    connector: C,
    config: RwLock<ManagerConfig>,
    link: Mutex<LinkState>,
    /// Serializes connect attempts.
    connect_gate: tokio::sync::Mutex<()>,
    disconnect_handlers: Mutex<Vec<DisconnectHandler>>,
    message_handlers: Mutex<Vec<MessageHandler>>,
    pub(super) reconnecting: AtomicBool,
    sent: AtomicU64,
    dropped: AtomicU64,
}

// ============================================================================
// ConnectionManager
// ============================================================================

/// Owner of the single upstream channel.
///
/// Cloning is cheap; all clones share the same link.
///
/// # Thread Safety
///
/// `ConnectionManager` is `Send + Sync`. [`send`](Self::send) never awaits
/// and can be called from timers and callbacks.
pub struct ConnectionManager<C: Connector = WsConnector> {
    pub(super) shared: Arc<Shared<C>>,
}

impl<C: Connector> Clone for ConnectionManager<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl ConnectionManager<WsConnector> {
    /// Creates a manager that connects over WebSocket.
    #[must_use]
    pub fn new(config: ManagerConfig) -> Self {
        Self::with_connector(config, WsConnector::new())
    }
}

impl<C: Connector> ConnectionManager<C> {
    /// Creates a manager using a custom connector.
    #[must_use]
    pub fn with_connector(config: ManagerConfig, connector: C) -> Self {
        Self {
            shared: Arc::new(Shared {
                connector,
                config: RwLock::new(config),
                link: Mutex::new(LinkState {
                    phase: ConnectionState::Disconnected,
                    channel: None,
                    generation: 0,
                    retry_count: 0,
                }),
                connect_gate: tokio::sync::Mutex::new(()),
                disconnect_handlers: Mutex::new(Vec::new()),
                message_handlers: Mutex::new(Vec::new()),
                reconnecting: AtomicBool::new(false),
                sent: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Returns a snapshot of the current config.
    #[must_use]
    pub fn config(&self) -> ManagerConfig {
        self.shared.config.read().clone()
    }

    /// Modifies the config. Takes effect on the next connect.
    pub fn update_config(&self, update: impl FnOnce(&mut ManagerConfig)) {
        update(&mut self.shared.config.write());
    }

    /// Returns the configured target address.
    #[must_use]
    pub fn target(&self) -> String {
        self.shared.config.read().url.clone()
    }

    /// Returns the current lifecycle phase.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.link.lock().phase
    }

    /// Returns `true` iff a channel exists and reports itself open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.shared
            .link
            .lock()
            .channel
            .as_ref()
            .is_some_and(Channel::is_open)
    }

    /// Returns the number of failed attempts in the current retry run.
    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.shared.link.lock().retry_count
    }

    pub(super) fn set_retry_count(&self, count: u32) {
        self.shared.link.lock().retry_count = count;
    }

    /// Returns send counters.
    #[must_use]
    pub fn stats(&self) -> SendStats {
        SendStats {
            sent: self.shared.sent.load(Ordering::Relaxed),
            dropped: self.shared.dropped.load(Ordering::Relaxed),
        }
    }

    // ========================================================================
    // Handlers
    // ========================================================================

    /// Registers a handler for unexpected disconnects.
    ///
    /// Handlers run in registration order on the channel's watcher task.
    pub fn on_disconnect(&self, handler: impl Fn() + Send + Sync + 'static) {
        self.shared.disconnect_handlers.lock().push(Arc::new(handler));
    }

    /// Registers a handler for inbound messages.
    ///
    /// Text that is not valid JSON is logged and never reaches handlers.
    pub fn on_message(&self, handler: impl Fn(&InboundMessage) + Send + Sync + 'static) {
        self.shared.message_handlers.lock().push(Arc::new(handler));
    }

    // ========================================================================
    // Connect / Disconnect
    // ========================================================================

    /// Connects to the configured target. See [`connect_to`](Self::connect_to).
    ///
    /// # Errors
    ///
    /// [`Error::ConnectFailed`] if the attempt fails.
    pub async fn connect(&self) -> Result<()> {
        let target = self.target();
        self.connect_to(&target).await
    }

    /// Makes a single connect attempt to `target`.
    ///
    /// Any existing channel is released first, so at most one channel is
    /// ever live. `target` becomes the configured target. Concurrent calls
    /// are serialized.
    ///
    /// # Errors
    ///
    /// [`Error::ConnectFailed`] if the handshake fails, times out or is
    /// superseded by a [`disconnect`](Self::disconnect) while in flight.
    pub async fn connect_to(&self, target: &str) -> Result<()> {
        let _gate = self.shared.connect_gate.lock().await;

        self.disconnect();

        let generation = {
            let mut link = self.shared.link.lock();
            link.phase = ConnectionState::Connecting;
            link.generation
        };

        let channel_config = {
            let mut config = self.shared.config.write();
            target.clone_into(&mut config.url);
            ChannelConfig {
                outbound_capacity: config.outbound_capacity,
                inbound: Some(self.inbound_handler()),
            }
        };

        debug!(target, "Connecting upstream");
        let opened = self.shared.connector.open(target, channel_config).await;

        let mut link = self.shared.link.lock();

        if link.generation != generation {
            drop(link);
            if let Ok((channel, _)) = opened {
                channel.close();
            }
            return Err(Error::connect_failed(target, "superseded by disconnect"));
        }

        match opened {
            Ok((channel, closed)) => {
                link.channel = Some(channel);
                link.phase = ConnectionState::Connected;
                link.retry_count = 0;
                drop(link);

                self.watch_close(generation, closed);
                info!(target, "Upstream connected");
                Ok(())
            }

            Err(e) => {
                link.phase = ConnectionState::Disconnected;
                Err(match e {
                    e @ Error::ConnectFailed { .. } => e,
                    other => Error::connect_failed(target, other.to_string()),
                })
            }
        }
    }

    /// Releases the current channel, if any.
    ///
    /// Idempotent. Never fires `on_disconnect` handlers. An in-flight
    /// connect attempt is abandoned.
    pub fn disconnect(&self) {
        let channel = {
            let mut link = self.shared.link.lock();
            link.generation += 1;
            link.phase = ConnectionState::Disconnected;
            link.channel.take()
        };

        if let Some(channel) = channel {
            channel.close();
            info!(peer = channel.peer(), "Upstream disconnected");
        }
    }

    // ========================================================================
    // Send
    // ========================================================================

    /// Offers a payload to the current channel.
    ///
    /// Never blocks and never fails: when the link is down or its queue is
    /// full the payload is dropped, a warning is logged and the drop is
    /// counted in [`stats`](Self::stats).
    pub fn send(&self, payload: impl Into<Payload>) {
        let payload = payload.into();
        let size = payload.len();

        let result = match self.shared.link.lock().channel.as_ref() {
            Some(channel) => channel.try_send(payload),
            None => Err(Error::send_dropped("upstream not connected")),
        };

        match result {
            Ok(()) => {
                self.shared.sent.fetch_add(1, Ordering::Relaxed);
                trace!(size, "Upstream payload queued");
            }
            Err(e) => {
                self.shared.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(size, error = %e, "Upstream payload dropped");
            }
        }
    }

    /// Serializes `value` and sends it as a text message.
    pub fn send_json<T: Serialize + ?Sized>(&self, value: &T) {
        match serde_json::to_string(value) {
            Ok(text) => self.send(text),
            Err(e) => {
                self.shared.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "Failed to serialize upstream message");
            }
        }
    }

    /// Encodes a control event and sends it as a text message.
    pub fn send_event(&self, event: &ControlEvent) {
        match event.encode() {
            Ok(text) => {
                debug!(kind = event.kind(), session_id = %event.session_id(), "Sending control event");
                self.send(text);
            }
            Err(e) => {
                self.shared.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(kind = event.kind(), error = %e, "Failed to encode control event");
            }
        }
    }

    // ========================================================================
    // Internal
    // ========================================================================

    /// Builds the inbound callback for a new channel.
    fn inbound_handler(&self) -> InboundHandler {
        let shared: Weak<Shared<C>> = Arc::downgrade(&self.shared);

        Arc::new(move |payload| {
            let Some(shared) = shared.upgrade() else {
                return;
            };

            let message = match payload {
                Payload::Text(text) => match decode_inbound(&text) {
                    Some(value) => InboundMessage::Json(value),
                    None => return,
                },
                Payload::Binary(data) => {
                    debug!(size = data.len(), "Binary message received upstream");
                    InboundMessage::Binary(data)
                }
            };

            let handlers = shared.message_handlers.lock().clone();
            for handler in handlers {
                handler(&message);
            }
        })
    }

    /// Waits for the channel of `generation` to terminate.
    fn watch_close(&self, generation: u64, closed: ClosedSignal) {
        let shared: Weak<Shared<C>> = Arc::downgrade(&self.shared);

        tokio::spawn(async move {
            let reason = closed.await.unwrap_or(CloseReason::Ended);
            if let Some(shared) = shared.upgrade() {
                Self::handle_close(&shared, generation, &reason);
            }
        });
    }

    fn handle_close(shared: &Shared<C>, generation: u64, reason: &CloseReason) {
        {
            let mut link = shared.link.lock();
            if link.generation != generation || reason.is_requested() {
                trace!(?reason, "Ignoring close of released channel");
                return;
            }
            link.generation += 1;
            link.phase = ConnectionState::Disconnected;
            link.channel = None;
        }

        warn!(?reason, "Upstream connection lost");

        let handlers = shared.disconnect_handlers.lock().clone();
        for handler in handlers {
            handler();
        }
    }
}

impl<C: Connector> std::fmt::Debug for ConnectionManager<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("target", &self.target())
            .field("state", &self.state())
            .field("retry_count", &self.retry_count())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
