//! Connection establishment.
//!
//! [`Connector`] is the seam between the upstream manager and the actual
//! network. [`WsConnector`] opens a WebSocket with tokio-tungstenite; tests
//! substitute connectors that fail on demand or count attempts.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;
use tracing::debug;

use crate::error::{Error, Result};

use super::channel::{Channel, ChannelConfig, ClosedSignal};

// ============================================================================
// Constants
// ============================================================================

/// Default timeout for the TCP connect plus WebSocket handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Connector
// ============================================================================

/// Opens channels to a target address.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Opens a channel to `target`.
    ///
    /// A single attempt: implementations must not retry.
    ///
    /// # Errors
    ///
    /// Any error is treated as a failed attempt by the caller.
    async fn open(&self, target: &str, config: ChannelConfig) -> Result<(Channel, ClosedSignal)>;
}

// ============================================================================
// WsConnector
// ============================================================================

/// WebSocket connector backed by tokio-tungstenite.
#[derive(Debug, Clone)]
pub struct WsConnector {
    /// Upper bound for connect plus handshake.
    handshake_timeout: Duration,
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl WsConnector {
    /// Creates a connector with the default handshake timeout (30s).
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    /// Sets the handshake timeout.
    #[inline]
    #[must_use]
    pub const fn with_handshake_timeout(mut self, handshake_timeout: Duration) -> Self {
        self.handshake_timeout = handshake_timeout;
        self
    }

    /// Returns the handshake timeout.
    #[inline]
    #[must_use]
    pub const fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, target: &str, config: ChannelConfig) -> Result<(Channel, ClosedSignal)> {
        let (ws_stream, response) = timeout(
            self.handshake_timeout,
            tokio_tungstenite::connect_async(target),
        )
        .await
        .map_err(|_| Error::connection_timeout(self.handshake_timeout.as_millis() as u64))?
        .map_err(|e| Error::connect_failed(target, e.to_string()))?;

        debug!(target, status = %response.status(), "WebSocket handshake completed");

        Ok(Channel::spawn(ws_stream, target, config))
    }
}

// ============================================================================
// Tests
// ============================================================================
