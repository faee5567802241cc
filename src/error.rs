//! Error types for browser-relay.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use browser_relay::Result;
//! use browser_relay::session::SessionRegistry;
//!
//! async fn example(registry: &SessionRegistry) -> Result<()> {
//!     let session = registry.create_session("https://example.com").await?;
//!     registry.close_session(session.id()).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::InvalidArgument`] |
//! | Upstream | [`Error::ConnectFailed`], [`Error::ConnectionTimeout`], [`Error::SendDropped`], [`Error::DecodeFailed`] |
//! | Streaming | [`Error::SessionUnavailable`], [`Error::AlreadyStreaming`], [`Error::CaptureFailed`] |
//! | Browser | [`Error::BrowserLaunch`], [`Error::Protocol`], [`Error::Timeout`], [`Error::ConnectionClosed`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::SessionId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when startup configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Invalid argument supplied by a caller.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    // ========================================================================
    // Upstream Errors
    // ========================================================================
    /// Upstream channel could not be opened.
    ///
    /// Transient: the reconnect loop retries it without inspecting the cause.
    #[error("Connect to {target} failed: {message}")]
    ConnectFailed {
        /// Address the connection was attempted to.
        target: String,
        /// Description of the failure.
        message: String,
    },

    /// Connection or handshake timeout.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Outbound message dropped before reaching the wire.
    ///
    /// Only ever logged; never returned to a frame pipeline.
    #[error("Send dropped: {reason}")]
    SendDropped {
        /// Why the message was dropped.
        reason: String,
    },

    /// Inbound message could not be decoded.
    #[error("Decode failed: {message}")]
    DecodeFailed {
        /// Parser error description.
        message: String,
    },

    // ========================================================================
    // Streaming Errors
    // ========================================================================
    /// Session does not exist or has no surface.
    #[error("Session unavailable: {session_id}")]
    SessionUnavailable {
        /// The requested session.
        session_id: SessionId,
    },

    /// A frame stream is already running for the session.
    #[error("Session {session_id} is already streaming")]
    AlreadyStreaming {
        /// The session with an active stream.
        session_id: SessionId,
    },

    /// A single capture cycle failed.
    #[error("Capture failed: {message}")]
    CaptureFailed {
        /// Description of the capture failure.
        message: String,
    },

    // ========================================================================
    // Browser Errors
    // ========================================================================
    /// Browser process failed to start or never exposed DevTools.
    #[error("Failed to launch browser: {message}")]
    BrowserLaunch {
        /// Description of the launch failure.
        message: String,
    },

    /// DevTools protocol error or unexpected response.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// Operation timeout.
    #[error("Timeout after {timeout_ms}ms: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// DevTools connection closed while a command was pending.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a connect failed error.
    #[inline]
    pub fn connect_failed(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConnectFailed {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a send dropped error.
    #[inline]
    pub fn send_dropped(reason: impl Into<String>) -> Self {
        Self::SendDropped {
            reason: reason.into(),
        }
    }

    /// Creates a decode failed error.
    #[inline]
    pub fn decode_failed(message: impl Into<String>) -> Self {
        Self::DecodeFailed {
            message: message.into(),
        }
    }

    /// Creates a session unavailable error.
    #[inline]
    pub fn session_unavailable(session_id: SessionId) -> Self {
        Self::SessionUnavailable { session_id }
    }

    /// Creates an already streaming error.
    #[inline]
    pub fn already_streaming(session_id: SessionId) -> Self {
        Self::AlreadyStreaming { session_id }
    }

    /// Creates a capture failed error.
    #[inline]
    pub fn capture_failed(message: impl Into<String>) -> Self {
        Self::CaptureFailed {
            message: message.into(),
        }
    }

    /// Creates a browser launch error.
    #[inline]
    pub fn browser_launch(message: impl Into<String>) -> Self {
        Self::BrowserLaunch {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    #[inline]
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::Timeout { .. }
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectFailed { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if a later attempt may succeed.
    ///
    /// Caller errors such as [`Error::SessionUnavailable`] are not transient.
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConnectFailed { .. }
                | Self::ConnectionTimeout { .. }
                | Self::SendDropped { .. }
                | Self::CaptureFailed { .. }
                | Self::Timeout { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
