//! Surface abstraction.
//!
//! The registry and the frame producer only see these traits. The Chromium
//! backend in [`crate::browser`] is the production implementation.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::protocol::PageMetadata;
use crate::stream::FrameSource;

// ============================================================================
// Surface
// ============================================================================

/// A renderable page owned by one session.
///
/// Capturing a closed surface fails with
/// [`Error::CaptureFailed`](crate::error::Error::CaptureFailed).
#[async_trait]
pub trait Surface: FrameSource {
    /// Returns the URL the surface was opened with.
    fn url(&self) -> &str;

    /// Extracts page metadata, optionally with a viewport screenshot.
    ///
    /// Returns `None` if extraction failed; failures are logged.
    async fn metadata(&self, include_screenshot: bool) -> Option<PageMetadata>;

    /// Releases the surface and everything backing it.
    ///
    /// # Errors
    ///
    /// Backend specific. The surface is unusable afterwards either way.
    async fn close(&self) -> Result<()>;
}

// ============================================================================
// SurfaceLauncher
// ============================================================================

/// Opens new surfaces.
#[async_trait]
pub trait SurfaceLauncher: Send + Sync {
    /// Opens a surface showing `url`.
    ///
    /// # Errors
    ///
    /// [`Error::BrowserLaunch`](crate::error::Error::BrowserLaunch) or a
    /// backend error if the page could not be opened.
    async fn launch(&self, url: &str) -> Result<Arc<dyn Surface>>;
}
