//! Chrome DevTools Protocol message envelopes.
//!
//! Commands are correlated by an integer `id`. Commands addressed to a page
//! carry the flattened `sessionId` returned by `Target.attachToTarget`.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::CommandId;

// ============================================================================
// CdpRequest
// ============================================================================

/// A command from the relay to the browser.
///
/// # Format
///
/// ```json
/// {
///   "id": 7,
///   "method": "Page.navigate",
///   "params": { "url": "https://example.com" },
///   "sessionId": "8A6C..."
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct CdpRequest {
    /// Correlation id.
    pub id: CommandId,

    /// Method in `Domain.method` format.
    pub method: String,

    /// Method parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,

    /// Target session, absent for browser-level commands.
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl CdpRequest {
    /// Creates a browser-level command with a fresh id.
    #[inline]
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            id: CommandId::next(),
            method: method.into(),
            params,
            session_id: None,
        }
    }

    /// Addresses the command to a target session.
    #[inline]
    #[must_use]
    pub fn with_session(mut self, session_id: Option<&str>) -> Self {
        self.session_id = session_id.map(str::to_string);
        self
    }
}

// ============================================================================
// CdpMessage
// ============================================================================

/// Any message from the browser: a response (has `id`) or an event (has
/// `method`).
#[derive(Debug, Clone, Deserialize)]
pub struct CdpMessage {
    /// Correlation id of the command being answered.
    #[serde(default)]
    pub id: Option<CommandId>,

    /// Result data (if success).
    #[serde(default)]
    pub result: Option<Value>,

    /// Error details (if error).
    #[serde(default)]
    pub error: Option<CdpErrorBody>,

    /// Event name (if event).
    #[serde(default)]
    pub method: Option<String>,

    /// Event data (if event).
    #[serde(default)]
    pub params: Option<Value>,

    /// Target session the message belongs to.
    #[serde(default, rename = "sessionId")]
    pub session_id: Option<String>,
}

/// Error object of a failed command.
#[derive(Debug, Clone, Deserialize)]
pub struct CdpErrorBody {
    /// Numeric error code.
    pub code: i64,
    /// Error message.
    pub message: String,
}

impl CdpMessage {
    /// Returns `true` if this message answers a command.
    #[inline]
    #[must_use]
    pub fn is_response(&self) -> bool {
        self.id.is_some()
    }

    /// Extracts the result value, returning error if the command failed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the response carries an error.
    pub fn into_result(self) -> Result<Value> {
        match self.error {
            Some(error) => Err(Error::protocol(format!(
                "{} (code {})",
                error.message, error.code
            ))),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }

    /// Converts an event message into a [`CdpEvent`].
    ///
    /// Returns `None` for responses.
    #[must_use]
    pub fn into_event(self) -> Option<CdpEvent> {
        if self.id.is_some() {
            return None;
        }

        Some(CdpEvent {
            method: self.method?,
            params: self.params.unwrap_or(Value::Null),
            session_id: self.session_id,
        })
    }
}

// ============================================================================
// CdpEvent
// ============================================================================

/// A browser event.
#[derive(Debug, Clone, PartialEq)]
pub struct CdpEvent {
    /// Event name in `Domain.event` format.
    pub method: String,
    /// Event data.
    pub params: Value,
    /// Target session the event belongs to.
    pub session_id: Option<String>,
}

impl CdpEvent {
    /// Returns `true` if the event has the given name and session.
    #[inline]
    #[must_use]
    pub fn matches(&self, method: &str, session_id: Option<&str>) -> bool {
        self.method == method && self.session_id.as_deref() == session_id
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_request_serialization() {
        let request = CdpRequest::new("Page.navigate", Some(json!({"url": "https://example.com"})))
            .with_session(Some("S1"));
        let json: Value = serde_json::to_value(&request).expect("serialize");

        assert_eq!(json["method"], "Page.navigate");
        assert_eq!(json["sessionId"], "S1");
        assert_eq!(json["id"], request.id.as_u64());
    }

    #[test]
    fn test_browser_level_request_omits_session() {
        let request = CdpRequest::new("Browser.close", None);
        let json = serde_json::to_string(&request).expect("serialize");

        assert!(!json.contains("sessionId"));
        assert!(!json.contains("params"));
    }

    #[test]
    fn test_success_response() {
        let message: CdpMessage =
            serde_json::from_str(r#"{"id": 3, "result": {"frameId": "F"}}"#).expect("parse");

        assert!(message.is_response());
        let result = message.into_result().expect("should succeed");
        assert_eq!(result["frameId"], "F");
    }

    #[test]
    fn test_error_response() {
        let message: CdpMessage = serde_json::from_str(
            r#"{"id": 4, "error": {"code": -32000, "message": "No target with given id"}}"#,
        )
        .expect("parse");

        let err = message.into_result().expect_err("should fail");
        assert!(err.to_string().contains("No target with given id"));
    }

    #[test]
    fn test_event_message() {
        let message: CdpMessage = serde_json::from_str(
            r#"{"method": "Page.loadEventFired", "params": {"timestamp": 1.5}, "sessionId": "S1"}"#,
        )
        .expect("parse");

        assert!(!message.is_response());
        let event = message.into_event().expect("event");
        assert!(event.matches("Page.loadEventFired", Some("S1")));
        assert!(!event.matches("Page.loadEventFired", None));
    }

    #[test]
    fn test_response_is_not_event() {
        let message: CdpMessage = serde_json::from_str(r#"{"id": 1, "result": {}}"#).expect("parse");
        assert!(message.into_event().is_none());
    }
}
