//! Control events sent to the downstream consumer.
//!
//! Control events travel as UTF-8 JSON text frames on the same channel as
//! binary frames. The set of kinds is closed:
//!
//! | Kind | `type` on the wire |
//! |------|--------------------|
//! | [`ControlEvent::SessionCreated`] | `SESSION_CREATED` |
//! | [`ControlEvent::SessionClosed`] | `SESSION_CLOSED` |
//! | [`ControlEvent::InitialSessionData`] | `initialSessionData` |
//!
//! Every encoding carries the `type` discriminator, a session id and an
//! RFC 3339 UTC `timestamp`.

// ============================================================================
// Imports
// ============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::{Error, Result};
use crate::identifiers::SessionId;

use super::PageMetadata;

// ============================================================================
// ControlEvent
// ============================================================================

/// A session lifecycle or metadata event.
///
/// # Format
///
/// ```json
/// {
///   "type": "SESSION_CREATED",
///   "sessionId": "550e8400-e29b-41d4-a716-446655440000",
///   "timestamp": "2024-05-01T12:00:00Z"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ControlEvent {
    /// A browser session was created.
    #[serde(rename = "SESSION_CREATED", rename_all = "camelCase")]
    SessionCreated {
        /// The new session.
        session_id: SessionId,
        /// When the event was produced.
        timestamp: DateTime<Utc>,
    },

    /// A browser session was closed.
    #[serde(rename = "SESSION_CLOSED", rename_all = "camelCase")]
    SessionClosed {
        /// The closed session.
        session_id: SessionId,
        /// When the event was produced.
        timestamp: DateTime<Utc>,
    },

    /// First snapshot of a freshly launched page.
    #[serde(rename = "initialSessionData")]
    InitialSessionData(InitialSessionData),
}

impl ControlEvent {
    /// Creates a `SESSION_CREATED` event stamped now.
    #[inline]
    #[must_use]
    pub fn session_created(session_id: SessionId) -> Self {
        Self::SessionCreated {
            session_id,
            timestamp: Utc::now(),
        }
    }

    /// Creates a `SESSION_CLOSED` event stamped now.
    #[inline]
    #[must_use]
    pub fn session_closed(session_id: SessionId) -> Self {
        Self::SessionClosed {
            session_id,
            timestamp: Utc::now(),
        }
    }

    /// Returns the wire discriminator.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionCreated { .. } => "SESSION_CREATED",
            Self::SessionClosed { .. } => "SESSION_CLOSED",
            Self::InitialSessionData(_) => "initialSessionData",
        }
    }

    /// Returns the session the event refers to.
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        match self {
            Self::SessionCreated { session_id, .. } | Self::SessionClosed { session_id, .. } => {
                *session_id
            }
            Self::InitialSessionData(data) => data.browser_run_id,
        }
    }

    /// Returns when the event was produced.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::SessionCreated { timestamp, .. } | Self::SessionClosed { timestamp, .. } => {
                *timestamp
            }
            Self::InitialSessionData(data) => data.timestamp,
        }
    }

    /// Encodes the event as JSON text.
    ///
    /// # Errors
    ///
    /// [`Error::Json`] only if a caller-supplied JSON value cannot be
    /// serialized, which does not happen for values parsed from JSON.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes an event from JSON text.
    ///
    /// # Errors
    ///
    /// [`Error::DecodeFailed`] if the text is not a known control event.
    pub fn decode(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::decode_failed(e.to_string()))
    }
}

// ============================================================================
// InitialSessionData
// ============================================================================

/// Payload of the `initialSessionData` event.
///
/// `browserRunId` is the relay's own session id. The remaining ids are
/// opaque correlation values echoed from the launch request; they are
/// always present on the wire and `null` when the caller omitted them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitialSessionData {
    /// The relay session id.
    pub browser_run_id: SessionId,
    /// Caller's session id.
    pub session_id: Option<Value>,
    /// Caller's portal id.
    pub portal_id: Option<Value>,
    /// Caller's model id.
    pub llm_id: Option<Value>,
    /// Caller's browser session id.
    pub browser_session_id: Option<Value>,
    /// URL the session was launched with.
    pub launched_url: String,
    /// When the snapshot was taken.
    pub timestamp: DateTime<Utc>,
    /// Page metadata, `null` if extraction failed.
    pub metadata: Option<PageMetadata>,
}

impl InitialSessionData {
    /// Creates the payload for a session, stamped now.
    #[must_use]
    pub fn new(browser_run_id: SessionId, launched_url: impl Into<String>) -> Self {
        Self {
            browser_run_id,
            session_id: None,
            portal_id: None,
            llm_id: None,
            browser_session_id: None,
            launched_url: launched_url.into(),
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    /// Attaches page metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Option<PageMetadata>) -> Self {
        self.metadata = metadata;
        self
    }
}

impl From<InitialSessionData> for ControlEvent {
    fn from(data: InitialSessionData) -> Self {
        Self::InitialSessionData(data)
    }
}

// ============================================================================
// Inbound Decoding
// ============================================================================

/// Parses an inbound text message as JSON.
///
/// Messages that are not valid JSON are logged and ignored.
#[must_use]
pub fn decode_inbound(text: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(text) {
        Ok(value) => Some(value),
        Err(e) => {
            let err = Error::decode_failed(e.to_string());
            warn!(error = %err, message = %text, "Ignoring inbound message");
            None
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
