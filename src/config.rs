//! Process configuration.
//!
//! Every setting is a command-line flag with an environment fallback.
//! Defaults apply when neither is given.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `HOST` / `PORT` | `0.0.0.0` / `3000` |
//! | `UPSTREAM_URL` | `ws://127.0.0.1:8080` |
//! | `RETRY_MAX_ATTEMPTS` | `10000` |
//! | `RETRY_INITIAL_DELAY_MS` | `1000` |
//! | `RETRY_MULTIPLIER` | `1.5` |
//! | `RETRY_MAX_DELAY_MS` | none (unbounded) |
//! | `CONNECT_TIMEOUT_MS` | `30000` |
//! | `OUTBOUND_BUFFER` | `64` |
//! | `FRAME_INTERVAL_MS` | `100` |
//! | `FRAME_QUALITY` | `80` |
//! | `CHROME_BINARY` | `chromium` |
//! | `HEADLESS` | `true` |
//! | `VIEWPORT_WIDTH` / `VIEWPORT_HEIGHT` | `1500` / `768` |
//! | `METADATA_SCREENSHOT` | `true` |
//! | `LOG_JSON` | `false` |

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};

use crate::browser::{CaptureFormat, ChromiumOptions};
use crate::error::{Error, Result};
use crate::upstream::{ManagerConfig, RetryPolicy};

// ============================================================================
// Config
// ============================================================================

/// Relay configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "browser-relay", version, about = "Streams headless browser frames to an upstream WebSocket")]
pub struct Config {
    /// Address the HTTP server binds to.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Port the HTTP server binds to.
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Upstream WebSocket endpoint.
    #[arg(long, env = "UPSTREAM_URL", default_value = "ws://127.0.0.1:8080")]
    pub upstream_url: String,

    /// Connection attempts before giving up.
    #[arg(long, env = "RETRY_MAX_ATTEMPTS", default_value_t = 10_000)]
    pub retry_max_attempts: u32,

    /// Delay after the first failed attempt.
    #[arg(long, env = "RETRY_INITIAL_DELAY_MS", default_value_t = 1000)]
    pub retry_initial_delay_ms: u64,

    /// Growth factor between consecutive delays.
    #[arg(long, env = "RETRY_MULTIPLIER", default_value_t = 1.5)]
    pub retry_multiplier: f64,

    /// Upper bound for a single delay.
    #[arg(long, env = "RETRY_MAX_DELAY_MS")]
    pub retry_max_delay_ms: Option<u64>,

    /// WebSocket handshake timeout.
    #[arg(long, env = "CONNECT_TIMEOUT_MS", default_value_t = 30_000)]
    pub connect_timeout_ms: u64,

    /// Outbound messages buffered before sends are dropped.
    #[arg(long, env = "OUTBOUND_BUFFER", default_value_t = 64)]
    pub outbound_buffer: usize,

    /// Wait between frame captures.
    #[arg(long, env = "FRAME_INTERVAL_MS", default_value_t = 100)]
    pub frame_interval_ms: u64,

    /// JPEG quality of streamed frames (1-100).
    #[arg(long, env = "FRAME_QUALITY", default_value_t = 80)]
    pub frame_quality: u8,

    /// Chromium executable.
    #[arg(long, env = "CHROME_BINARY", default_value = "chromium")]
    pub chrome_binary: PathBuf,

    /// Run Chromium without a window.
    #[arg(long, env = "HEADLESS", default_value_t = true, action = ArgAction::Set)]
    pub headless: bool,

    /// Page viewport width.
    #[arg(long, env = "VIEWPORT_WIDTH", default_value_t = 1500)]
    pub viewport_width: u32,

    /// Page viewport height.
    #[arg(long, env = "VIEWPORT_HEIGHT", default_value_t = 768)]
    pub viewport_height: u32,

    /// Include a screenshot in `initialSessionData`.
    #[arg(long, env = "METADATA_SCREENSHOT", default_value_t = true, action = ArgAction::Set)]
    pub metadata_screenshot: bool,

    /// Emit JSON log lines.
    #[arg(long, env = "LOG_JSON", default_value_t = false, action = ArgAction::Set)]
    pub log_json: bool,
}

impl Config {
    /// Checks cross-field constraints clap cannot express.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] describing the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.upstream_url)
            .ok()
            .filter(|url| url.scheme() == "ws")
            .ok_or_else(|| Error::config(format!("UPSTREAM_URL must be a ws:// URL, got '{}'", self.upstream_url)))?;

        if self.connect_timeout_ms == 0 {
            return Err(Error::config("CONNECT_TIMEOUT_MS must be positive"));
        }
        if self.outbound_buffer == 0 {
            return Err(Error::config("OUTBOUND_BUFFER must be positive"));
        }
        if self.frame_interval_ms == 0 {
            return Err(Error::config("FRAME_INTERVAL_MS must be positive"));
        }
        if !(1..=100).contains(&self.frame_quality) {
            return Err(Error::config("FRAME_QUALITY must be between 1 and 100"));
        }

        self.retry_policy().validate()?;
        self.chromium_options().validate()
    }

    /// Returns the HTTP listen address.
    #[inline]
    #[must_use]
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Returns the upstream reconnection policy.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        let policy = RetryPolicy::new(
            self.retry_max_attempts,
            Duration::from_millis(self.retry_initial_delay_ms),
            self.retry_multiplier,
        );
        match self.retry_max_delay_ms {
            Some(ms) => policy.with_max_delay(Duration::from_millis(ms)),
            None => policy,
        }
    }

    /// Returns the upstream manager configuration.
    #[must_use]
    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig::new(self.upstream_url.clone())
            .with_retry(self.retry_policy())
            .with_outbound_capacity(self.outbound_buffer)
    }

    /// Returns the WebSocket handshake timeout.
    #[inline]
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Returns the wait between frame captures.
    #[inline]
    #[must_use]
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    /// Returns the streamed frame format.
    #[inline]
    #[must_use]
    pub fn capture_format(&self) -> CaptureFormat {
        CaptureFormat::jpeg(self.frame_quality)
    }

    /// Returns the Chromium process options.
    #[must_use]
    pub fn chromium_options(&self) -> ChromiumOptions {
        ChromiumOptions::new()
            .with_binary(self.chrome_binary.clone())
            .with_headless(self.headless)
            .with_window_size(self.viewport_width, self.viewport_height)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Config::try_parse_from(std::iter::once("browser-relay").chain(args.iter().copied()))
            .expect("parse")
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]);

        assert_eq!(config.listen_addr(), SocketAddr::new(config.host, config.port));
        assert_eq!(config.upstream_url, "ws://127.0.0.1:8080");
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert_eq!(config.connect_timeout(), Duration::from_secs(30));
        assert_eq!(config.frame_interval(), Duration::from_millis(100));
        assert_eq!(config.capture_format(), CaptureFormat::Jpeg(80));
        assert!(config.headless);
        assert!(config.metadata_screenshot);
        assert!(!config.log_json);
        config.validate().expect("defaults are valid");
    }

    #[test]
    fn test_flags_override_defaults() {
        let config = parse(&[
            "--port",
            "8081",
            "--upstream-url",
            "ws://relay.example:9000/ingest",
            "--retry-max-attempts",
            "5",
            "--retry-max-delay-ms",
            "8000",
            "--headless",
            "false",
            "--viewport-width",
            "1280",
            "--outbound-buffer",
            "16",
        ]);

        assert_eq!(config.port, 8081);
        assert!(!config.headless);

        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.max_delay, Some(Duration::from_secs(8)));

        let manager = config.manager_config();
        assert_eq!(manager.url, "ws://relay.example:9000/ingest");
        assert_eq!(manager.outbound_capacity, 16);

        let options = config.chromium_options();
        assert_eq!(options.window_size, (1280, 768));
        assert!(!options.is_headless());
        config.validate().expect("valid");
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(
            Config::try_parse_from(["browser-relay", "--port", "not-a-port"]).is_err()
        );

        for url in ["http://example.com", "wss://example.com", "not a url"] {
            let bad_scheme = parse(&["--upstream-url", url]);
            assert!(matches!(bad_scheme.validate(), Err(Error::Config { .. })));
        }

        let bad_quality = parse(&["--frame-quality", "0"]);
        assert!(matches!(bad_quality.validate(), Err(Error::Config { .. })));

        let bad_multiplier = parse(&["--retry-multiplier", "0.5"]);
        assert!(matches!(bad_multiplier.validate(), Err(Error::Config { .. })));

        let zero_interval = parse(&["--frame-interval-ms", "0"]);
        assert!(matches!(zero_interval.validate(), Err(Error::Config { .. })));
    }
}
