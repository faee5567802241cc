//! Chromium command-line options.
//!
//! # Example
//!
//! ```ignore
//! use browser_relay::browser::ChromiumOptions;
//!
//! let options = ChromiumOptions::new()
//!     .with_binary("/usr/bin/chromium")
//!     .with_window_size(1280, 720)
//!     .with_arg("--disable-gpu");
//!
//! let args = options.to_args(profile.path());
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default browser executable, resolved through `PATH`.
pub const DEFAULT_BINARY: &str = "chromium";

/// Default viewport width in pixels.
pub const DEFAULT_WIDTH: u32 = 1500;

/// Default viewport height in pixels.
pub const DEFAULT_HEIGHT: u32 = 768;

/// Default time allowed for the browser to announce its DevTools endpoint.
pub const DEFAULT_LAUNCH_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// ChromiumOptions
// ============================================================================

/// Chromium process configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChromiumOptions {
    /// Browser executable.
    pub binary: PathBuf,

    /// Run without a visible window.
    pub headless: bool,

    /// Window and viewport size in pixels (width, height).
    pub window_size: (u32, u32),

    /// Upper bound for process start until the DevTools endpoint is known.
    pub launch_timeout: Duration,

    /// Additional command-line arguments.
    pub extra_args: Vec<String>,
}

impl Default for ChromiumOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl ChromiumOptions {
    /// Creates headless options with the default viewport.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from(DEFAULT_BINARY),
            headless: true,
            window_size: (DEFAULT_WIDTH, DEFAULT_HEIGHT),
            launch_timeout: DEFAULT_LAUNCH_TIMEOUT,
            extra_args: Vec::new(),
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ChromiumOptions {
    /// Sets the browser executable.
    #[inline]
    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Enables or disables headless mode.
    #[inline]
    #[must_use]
    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Sets window and viewport size in pixels.
    #[inline]
    #[must_use]
    pub fn with_window_size(mut self, width: u32, height: u32) -> Self {
        self.window_size = (width, height);
        self
    }

    /// Sets the launch timeout.
    #[inline]
    #[must_use]
    pub fn with_launch_timeout(mut self, launch_timeout: Duration) -> Self {
        self.launch_timeout = launch_timeout;
        self
    }

    /// Adds a custom command-line argument.
    #[inline]
    #[must_use]
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    /// Adds multiple custom command-line arguments.
    #[inline]
    #[must_use]
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }
}

// ============================================================================
// Conversion Methods
// ============================================================================

impl ChromiumOptions {
    /// Converts options to command-line arguments for a profile directory.
    ///
    /// The DevTools port is always `0` so the browser picks a free one and
    /// prints it to stderr.
    #[must_use]
    pub fn to_args(&self, profile_dir: &Path) -> Vec<String> {
        let (width, height) = self.window_size;
        let mut args = Vec::with_capacity(8 + self.extra_args.len());

        if self.headless {
            args.push("--headless=new".to_string());
        }

        args.push(format!("--window-size={width},{height}"));
        args.push("--remote-debugging-port=0".to_string());
        args.push(format!("--user-data-dir={}", profile_dir.display()));
        args.push("--no-first-run".to_string());
        args.push("--no-default-browser-check".to_string());
        args.extend(self.extra_args.iter().cloned());
        args.push("about:blank".to_string());

        args
    }

    /// Validates the options.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] for an empty binary path, a zero dimension or a
    /// zero launch timeout.
    pub fn validate(&self) -> Result<()> {
        if self.binary.as_os_str().is_empty() {
            return Err(Error::config("browser binary must not be empty"));
        }

        let (width, height) = self.window_size;
        if width == 0 || height == 0 {
            return Err(Error::config("window dimensions must be greater than zero"));
        }

        if self.launch_timeout.is_zero() {
            return Err(Error::config("launch timeout must be greater than zero"));
        }

        Ok(())
    }

    /// Returns `true` if headless mode is enabled.
    #[inline]
    #[must_use]
    pub const fn is_headless(&self) -> bool {
        self.headless
    }
}

// ============================================================================
// Tests
// ============================================================================
