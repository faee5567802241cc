//! Message-channel transport layer.
//!
//! This module provides the duplex, message-framed connection the upstream
//! manager sends control messages and frames through.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐                          ┌─────────────────┐
//! │  ConnectionManager   │                          │  Downstream     │
//! │                      │        WebSocket         │  consumer       │
//! │  Connector::open ────┼─────────────────────────►│                 │
//! │  → Channel           │   text: JSON control     │                 │
//! │    (event loop task) │   binary: raw frames     │                 │
//! └──────────────────────┘                          └─────────────────┘
//! ```
//!
//! # Channel Lifecycle
//!
//! 1. `Connector::open` - Handshake with the target address
//! 2. `Channel::spawn` - Event loop task takes ownership of the socket
//! 3. `Channel::try_send` - Enqueue a [`Payload`] without waiting
//! 4. `ClosedSignal` - Resolves with a [`CloseReason`] when the loop ends
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `channel` | Channel handle and its event loop |
//! | `connector` | `Connector` trait and the WebSocket implementation |

// ============================================================================
// Submodules
// ============================================================================

/// Channel handle and event loop.
pub mod channel;

/// Connection establishment.
pub mod connector;

// ============================================================================
// Imports
// ============================================================================

use bytes::Bytes;
use tokio_tungstenite::tungstenite::Message;

// ============================================================================
// Re-exports
// ============================================================================

pub use channel::{Channel, ChannelConfig, CloseReason, ClosedSignal, InboundHandler};
pub use connector::{Connector, WsConnector};

// ============================================================================
// Payload
// ============================================================================

/// One message on the channel.
///
/// Text and binary payloads share one connection and are told apart by the
/// transport's framing flag, never by inspecting their content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// UTF-8 text message (JSON control messages).
    Text(String),
    /// Binary message (captured frames), sent byte-exact.
    Binary(Bytes),
}

impl Payload {
    /// Returns `true` for binary payloads.
    #[inline]
    #[must_use]
    pub fn is_binary(&self) -> bool {
        matches!(self, Self::Binary(_))
    }

    /// Returns the payload size in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(data) => data.len(),
        }
    }

    /// Returns `true` if the payload carries no bytes.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Converts into a WebSocket message with the matching frame type.
    pub(crate) fn into_message(self) -> Message {
        match self {
            Self::Text(text) => Message::Text(text.into()),
            Self::Binary(data) => Message::Binary(data),
        }
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Bytes> for Payload {
    fn from(data: Bytes) -> Self {
        Self::Binary(data)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(data: Vec<u8>) -> Self {
        Self::Binary(Bytes::from(data))
    }
}

// ============================================================================
// Tests
// ============================================================================
