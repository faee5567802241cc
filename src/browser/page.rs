//! Chromium page surface.
//!
//! Each [`ChromiumSurface`] owns:
//! - One browser process (killed on close or drop)
//! - One DevTools connection
//! - One page target with a flattened session
//! - One temporary profile directory

// ============================================================================
// Imports
// ============================================================================

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as Base64Standard;
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::protocol::{CdpRequest, PageMetadata};
use crate::session::Surface;
use crate::stream::FrameSource;

use super::cdp::{CdpConnection, DEFAULT_COMMAND_TIMEOUT};
use super::process::{BrowserProcess, ProcessGuard};

// ============================================================================
// Constants
// ============================================================================

/// Upper bound for a navigation to reach its load event.
const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound for a single frame capture.
const CAPTURE_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound for each close step.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// CaptureFormat
// ============================================================================

/// Image format of captured frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureFormat {
    /// Lossless PNG.
    Png,
    /// JPEG with quality (0-100).
    Jpeg(u8),
}

impl Default for CaptureFormat {
    fn default() -> Self {
        Self::Jpeg(80)
    }
}

impl CaptureFormat {
    /// Creates JPEG format with quality clamped to 100.
    #[inline]
    #[must_use]
    pub fn jpeg(quality: u8) -> Self {
        Self::Jpeg(quality.min(100))
    }

    /// Returns the MIME type.
    #[must_use]
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg(_) => "image/jpeg",
        }
    }

    /// Returns `Page.captureScreenshot` parameters.
    pub(crate) fn to_params(self) -> Value {
        match self {
            Self::Png => json!({ "format": "png" }),
            Self::Jpeg(quality) => json!({ "format": "jpeg", "quality": quality }),
        }
    }
}

// ============================================================================
// ChromiumSurface
// ============================================================================

/// A page in a dedicated Chromium process.
pub struct ChromiumSurface {
    url: String,
    connection: CdpConnection,
    target_id: String,
    session_id: String,
    format: CaptureFormat,
    closed: AtomicBool,
    process: Mutex<Option<ProcessGuard>>,
    /// Deleted when dropped.
    _profile: Option<TempDir>,
}

impl ChromiumSurface {
    /// Opens a page in a started browser and navigates it to `url`.
    ///
    /// # Errors
    ///
    /// DevTools connection, target setup or navigation errors. The browser
    /// process is killed on failure.
    pub(crate) async fn open(
        process: BrowserProcess,
        url: &str,
        viewport: (u32, u32),
        format: CaptureFormat,
    ) -> Result<Self> {
        let BrowserProcess {
            guard,
            devtools_url,
            profile,
        } = process;

        let connection = CdpConnection::connect(&devtools_url).await?;
        let mut surface = Self::attach(connection, url, format).await?;
        *surface.process.get_mut() = Some(guard);
        surface._profile = Some(profile);

        surface.prepare(viewport).await?;
        surface.navigate(url).await?;

        info!(target_id = %surface.target_id, url, "Page opened");
        Ok(surface)
    }

    /// Creates a page target and attaches a flattened session to it.
    pub(crate) async fn attach(connection: CdpConnection, url: &str, format: CaptureFormat) -> Result<Self> {
        let target = connection
            .call("Target.createTarget", Some(json!({ "url": "about:blank" })), None)
            .await?;
        let target_id = string_field(&target, "targetId")?;

        let attached = connection
            .call(
                "Target.attachToTarget",
                Some(json!({ "targetId": target_id, "flatten": true })),
                None,
            )
            .await?;
        let session_id = string_field(&attached, "sessionId")?;

        debug!(%target_id, %session_id, "Attached to page target");

        Ok(Self {
            url: url.to_string(),
            connection,
            target_id,
            session_id,
            format,
            closed: AtomicBool::new(false),
            process: Mutex::new(None),
            _profile: None,
        })
    }

    /// Enables page events and sets the viewport.
    async fn prepare(&self, (width, height): (u32, u32)) -> Result<()> {
        self.call("Page.enable", None).await?;
        self.call(
            "Emulation.setDeviceMetricsOverride",
            Some(json!({
                "width": width,
                "height": height,
                "deviceScaleFactor": 1,
                "mobile": false
            })),
        )
        .await?;
        Ok(())
    }

    /// Navigates and waits for the load event.
    ///
    /// # Errors
    ///
    /// - [`Error::Protocol`] if the navigation is rejected
    /// - [`Error::Timeout`] if the page does not load in time
    pub async fn navigate(&self, url: &str) -> Result<()> {
        let mut events = self.connection.subscribe();

        let result = self.call("Page.navigate", Some(json!({ "url": url }))).await?;
        if let Some(error_text) = result.get("errorText").and_then(Value::as_str) {
            return Err(Error::protocol(format!("navigation to {url} failed: {error_text}")));
        }

        let session_id = self.session_id.as_str();
        timeout(NAVIGATION_TIMEOUT, async {
            loop {
                match events.recv().await {
                    Ok(event) if event.matches("Page.loadEventFired", Some(session_id)) => {
                        return Ok(());
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Navigation listener lagged");
                    }
                    Err(RecvError::Closed) => return Err(Error::ConnectionClosed),
                }
            }
        })
        .await
        .map_err(|_| Error::timeout("Page.loadEventFired", NAVIGATION_TIMEOUT.as_millis() as u64))??;

        debug!(url, "Page loaded");
        Ok(())
    }

    /// Returns the DevTools target id.
    #[inline]
    #[must_use]
    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    /// Returns `true` once closed.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Calls a page-scoped method with the default timeout.
    pub(crate) async fn call(&self, method: &str, params: Option<Value>) -> Result<Value> {
        self.call_with_timeout(method, params, DEFAULT_COMMAND_TIMEOUT).await
    }

    /// Calls a page-scoped method.
    pub(crate) async fn call_with_timeout(
        &self,
        method: &str,
        params: Option<Value>,
        command_timeout: Duration,
    ) -> Result<Value> {
        let request = CdpRequest::new(method, params).with_session(Some(&self.session_id));
        self.connection.call_with_timeout(request, command_timeout).await
    }

    /// Captures the viewport in `format` and returns the encoded image.
    pub(crate) async fn screenshot(&self, format: CaptureFormat, command_timeout: Duration) -> Result<String> {
        let result = self
            .call_with_timeout("Page.captureScreenshot", Some(format.to_params()), command_timeout)
            .await?;

        result
            .get("data")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::protocol("screenshot response without data"))
    }
}

#[async_trait]
impl FrameSource for ChromiumSurface {
    async fn capture(&self) -> Result<Bytes> {
        if self.is_closed() {
            return Err(Error::capture_failed("surface closed"));
        }

        let data = self
            .screenshot(self.format, CAPTURE_TIMEOUT)
            .await
            .map_err(|e| Error::capture_failed(e.to_string()))?;

        Base64Standard
            .decode(data)
            .map(Bytes::from)
            .map_err(|e| Error::capture_failed(format!("invalid screenshot data: {e}")))
    }
}

#[async_trait]
impl Surface for ChromiumSurface {
    fn url(&self) -> &str {
        &self.url
    }

    async fn metadata(&self, include_screenshot: bool) -> Option<PageMetadata> {
        self.extract_metadata(include_screenshot).await
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let close_target = CdpRequest::new("Target.closeTarget", Some(json!({ "targetId": self.target_id })));
        if let Err(e) = self.connection.call_with_timeout(close_target, CLOSE_TIMEOUT).await {
            debug!(error = %e, "Target.closeTarget failed");
        }

        let guard = self.process.lock().take();
        if let Some(guard) = guard {
            if let Err(e) = self
                .connection
                .call_with_timeout(CdpRequest::new("Browser.close", None), CLOSE_TIMEOUT)
                .await
            {
                debug!(error = %e, "Browser.close failed");
            }
            guard.kill().await;
        }

        self.connection.shutdown();
        info!(target_id = %self.target_id, "Page closed");
        Ok(())
    }
}

impl Drop for ChromiumSurface {
    fn drop(&mut self) {
        self.connection.shutdown();
    }
}

impl std::fmt::Debug for ChromiumSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChromiumSurface")
            .field("url", &self.url)
            .field("target_id", &self.target_id)
            .field("format", &self.format)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Reads a required string field from a DevTools result.
fn string_field(result: &Value, field: &str) -> Result<String> {
    result
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::protocol(format!("missing '{field}' in DevTools response")))
}

// ============================================================================
// Tests
// ============================================================================
