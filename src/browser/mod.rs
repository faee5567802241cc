//! Chromium backend.
//!
//! Implements [`Surface`](crate::session::Surface) and
//! [`SurfaceLauncher`](crate::session::SurfaceLauncher) on top of a
//! Chromium process driven over the DevTools protocol:
//!
//! | Type | Description |
//! |------|-------------|
//! | [`ChromiumLauncher`] | Starts a browser per surface |
//! | [`ChromiumSurface`] | One page (owns process + DevTools socket) |
//! | [`CdpConnection`] | Command/response correlation and event fan-out |
//! | [`ChromiumOptions`] | Process command-line options |
//!
//! # Example
//!
//! ```ignore
//! use browser_relay::browser::{ChromiumLauncher, ChromiumOptions};
//! use browser_relay::session::SurfaceLauncher;
//!
//! let launcher = ChromiumLauncher::new(ChromiumOptions::new());
//! let surface = launcher.launch("https://example.com").await?;
//! let frame = surface.capture().await?;
//! surface.close().await?;
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// DevTools connection.
pub mod cdp;

/// Surface launcher.
pub mod launcher;

/// Metadata extraction.
mod metadata;

/// Process command-line options.
pub mod options;

/// Page surface.
pub mod page;

/// Process lifecycle.
mod process;

// ============================================================================
// Re-exports
// ============================================================================

pub use cdp::CdpConnection;
pub use launcher::ChromiumLauncher;
pub use options::ChromiumOptions;
pub use page::{CaptureFormat, ChromiumSurface};
