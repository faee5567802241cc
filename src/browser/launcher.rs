//! Chromium surface launcher.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use tracing::error;

use crate::error::Result;
use crate::session::{Surface, SurfaceLauncher};

use super::page::{CaptureFormat, ChromiumSurface};
use super::{ChromiumOptions, process};

// ============================================================================
// ChromiumLauncher
// ============================================================================

/// Starts one Chromium process per surface.
#[derive(Debug, Clone, Default)]
pub struct ChromiumLauncher {
    options: ChromiumOptions,
    format: CaptureFormat,
}

impl ChromiumLauncher {
    /// Creates a launcher capturing JPEG frames at quality 80.
    #[must_use]
    pub fn new(options: ChromiumOptions) -> Self {
        Self {
            options,
            format: CaptureFormat::default(),
        }
    }

    /// Sets the frame format.
    #[inline]
    #[must_use]
    pub fn with_capture_format(mut self, format: CaptureFormat) -> Self {
        self.format = format;
        self
    }

    /// Returns the process options.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &ChromiumOptions {
        &self.options
    }

    /// Returns the frame format.
    #[inline]
    #[must_use]
    pub fn capture_format(&self) -> CaptureFormat {
        self.format
    }
}

#[async_trait]
impl SurfaceLauncher for ChromiumLauncher {
    async fn launch(&self, url: &str) -> Result<Arc<dyn Surface>> {
        let process = process::spawn(&self.options)
            .await
            .inspect_err(|e| error!(error = %e, binary = %self.options.binary.display(), "Failed to launch browser"))?;

        let surface = ChromiumSurface::open(process, url, self.options.window_size, self.format)
            .await
            .inspect_err(|e| error!(error = %e, url, "Failed to open page"))?;

        Ok(Arc::new(surface))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use crate::error::Error;

    #[test]
    fn test_builder() {
        let launcher = ChromiumLauncher::new(ChromiumOptions::new().with_window_size(640, 480))
            .with_capture_format(CaptureFormat::Png);

        assert_eq!(launcher.options().window_size, (640, 480));
        assert_eq!(launcher.capture_format(), CaptureFormat::Png);
        assert_eq!(ChromiumLauncher::default().capture_format(), CaptureFormat::Jpeg(80));
    }

    #[tokio::test]
    async fn test_launch_with_missing_binary_fails() {
        let launcher = ChromiumLauncher::new(
            ChromiumOptions::new()
                .with_binary("/nonexistent/browser-relay-test-binary")
                .with_launch_timeout(Duration::from_secs(2)),
        );

        let result = launcher.launch("https://example.com").await;
        assert!(matches!(result, Err(Error::BrowserLaunch { .. })));
    }
}
