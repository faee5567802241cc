//! Browser launch/close orchestration.
//!
//! Ties the [`SessionRegistry`] to the upstream [`ConnectionManager`]:
//!
//! 1. Launch a surface and register the session
//! 2. Emit `SESSION_CREATED`
//! 3. Extract metadata and emit `initialSessionData` (only while connected)
//! 4. Stream frames into the upstream channel
//!
//! Closing emits `SESSION_CLOSED` for every session that went away.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::SessionId;
use crate::protocol::{ControlEvent, InitialSessionData};
use crate::session::SessionRegistry;
use crate::stream::{DEFAULT_FRAME_INTERVAL, FrameSink};
use crate::upstream::ConnectionManager;

// ============================================================================
// Request / Response Types
// ============================================================================

/// Body of `POST /browser/launch`.
///
/// Only `url` is required. The other fields are opaque correlation values
/// echoed in `initialSessionData`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchRequest {
    /// Page to open.
    pub url: Option<String>,
    /// Caller's session id.
    pub session_id: Option<Value>,
    /// Caller's portal id.
    pub portal_id: Option<Value>,
    /// Caller's model id.
    pub llm_id: Option<Value>,
    /// Caller's browser session id.
    pub browser_session_id: Option<Value>,
}

/// Result of a successful launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchResponse {
    /// Human-readable status.
    pub message: String,
    /// The new session.
    pub session_id: SessionId,
    /// Stream status.
    pub stream: StreamStarted,
}

/// Stream status inside [`LaunchResponse`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamStarted {
    /// Human-readable status.
    pub message: String,
}

/// Body of `POST /browser/close`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseRequest {
    /// Session to close; all sessions when absent.
    pub session_id: Option<SessionId>,
}

/// Result of a close.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CloseResponse {
    /// Human-readable status.
    pub message: String,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    /// Always `"ok"` while the process serves requests.
    pub status: &'static str,
    /// Whether the upstream channel is open.
    pub upstream_connected: bool,
    /// Number of live sessions.
    pub sessions: usize,
}

// ============================================================================
// BrowserController
// ============================================================================

/// Launch/close orchestration shared by all HTTP handlers.
pub struct BrowserController {
    registry: Arc<SessionRegistry>,
    upstream: ConnectionManager,
    frame_interval: Duration,
    metadata_screenshot: bool,
}

impl BrowserController {
    /// Creates a controller streaming every 100ms with metadata screenshots.
    #[must_use]
    pub fn new(registry: Arc<SessionRegistry>, upstream: ConnectionManager) -> Self {
        Self {
            registry,
            upstream,
            frame_interval: DEFAULT_FRAME_INTERVAL,
            metadata_screenshot: true,
        }
    }

    /// Sets the wait between frame captures.
    #[inline]
    #[must_use]
    pub fn with_frame_interval(mut self, frame_interval: Duration) -> Self {
        self.frame_interval = frame_interval;
        self
    }

    /// Enables or disables the screenshot in `initialSessionData`.
    #[inline]
    #[must_use]
    pub fn with_metadata_screenshot(mut self, enabled: bool) -> Self {
        self.metadata_screenshot = enabled;
        self
    }

    /// Returns the session registry.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Returns the upstream manager.
    #[inline]
    #[must_use]
    pub fn upstream(&self) -> &ConnectionManager {
        &self.upstream
    }

    /// Launches a browser session and starts streaming it.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `url` is missing or malformed
    /// - Launch errors from the surface launcher
    pub async fn launch(&self, request: LaunchRequest) -> Result<LaunchResponse> {
        let url = request
            .url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| Error::invalid_argument("URL is required"))?;
        Url::parse(url).map_err(|e| Error::invalid_argument(format!("invalid URL '{url}': {e}")))?;

        let session = self
            .registry
            .create_session(url)
            .await
            .inspect_err(|e| error!(url, error = %e, "Failed to launch browser"))?;
        let session_id = session.id();

        self.upstream
            .send_event(&ControlEvent::session_created(session_id));

        let metadata = session.surface().metadata(self.metadata_screenshot).await;
        if self.upstream.is_connected() {
            let data = InitialSessionData {
                session_id: request.session_id,
                portal_id: request.portal_id,
                llm_id: request.llm_id,
                browser_session_id: request.browser_session_id,
                ..InitialSessionData::new(session_id, url).with_metadata(metadata)
            };
            self.upstream.send_event(&data.into());
            info!(%session_id, "Sent initial session data");
        } else {
            warn!(%session_id, "Upstream not connected, initial session data not sent");
        }

        let stream = self.start_stream(session_id)?;

        Ok(LaunchResponse {
            message: "Browser launched successfully".to_string(),
            session_id,
            stream,
        })
    }

    /// Streams frames of `session_id` into the upstream channel.
    ///
    /// # Errors
    ///
    /// [`Error::SessionUnavailable`] or [`Error::AlreadyStreaming`].
    pub fn start_stream(&self, session_id: SessionId) -> Result<StreamStarted> {
        let upstream = self.upstream.clone();
        let sink: FrameSink = Arc::new(move |frame| upstream.send(frame));

        self.registry
            .start_streaming(session_id, self.frame_interval, sink)
            .inspect_err(|e| error!(%session_id, error = %e, "Failed to start streaming"))?;

        Ok(StreamStarted {
            message: format!("Streaming started for session: {session_id}"),
        })
    }

    /// Closes one session, or all sessions when `session_id` is `None`.
    ///
    /// # Errors
    ///
    /// - [`Error::SessionUnavailable`] if the given session does not exist
    /// - The surface's close error (the session is removed regardless)
    pub async fn close(&self, session_id: Option<SessionId>) -> Result<CloseResponse> {
        match session_id {
            Some(id) => {
                let result = self.registry.close_session(id).await;
                if !matches!(result, Err(Error::SessionUnavailable { .. })) {
                    self.upstream.send_event(&ControlEvent::session_closed(id));
                }
                result.inspect_err(|e| error!(session_id = %id, error = %e, "Failed to close browser"))?;
            }

            None => {
                for id in self.registry.close_all().await {
                    self.upstream.send_event(&ControlEvent::session_closed(id));
                }
            }
        }

        Ok(CloseResponse {
            message: "Browser closed successfully".to_string(),
        })
    }

    /// Returns liveness information.
    #[must_use]
    pub fn health(&self) -> HealthReport {
        HealthReport {
            status: "ok",
            upstream_connected: self.upstream.is_connected(),
            sessions: self.registry.len(),
        }
    }
}

impl std::fmt::Debug for BrowserController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserController")
            .field("registry", &self.registry)
            .field("upstream", &self.upstream)
            .field("frame_interval", &self.frame_interval)
            .field("metadata_screenshot", &self.metadata_screenshot)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
