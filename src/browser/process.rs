//! Browser process lifecycle.
//!
//! The browser is started with `--remote-debugging-port=0` and announces
//! its DevTools endpoint on stderr:
//!
//! ```text
//! DevTools listening on ws://127.0.0.1:40411/devtools/browser/3f0b...
//! ```
//!
//! stderr keeps being drained after discovery so the browser never blocks
//! on a full pipe.

// ============================================================================
// Imports
// ============================================================================

use std::process::Stdio;

use regex::Regex;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, Command};
use tokio::time::timeout;
use tracing::{debug, info, trace};

use crate::error::{Error, Result};

use super::ChromiumOptions;

// ============================================================================
// Constants
// ============================================================================

/// Line printed by the browser once DevTools is ready.
const DEVTOOLS_PATTERN: &str = r"DevTools listening on (ws://\S+)";

// ============================================================================
// ProcessGuard
// ============================================================================

/// Guards a child process and ensures it is killed when dropped.
pub(crate) struct ProcessGuard {
    child: Option<Child>,
    pid: u32,
}

impl ProcessGuard {
    fn new(child: Child) -> Self {
        let pid = child.id().unwrap_or(0);
        debug!(pid, "Process guard created");
        Self {
            child: Some(child),
            pid,
        }
    }

    /// Returns the process ID, `0` if unknown.
    #[inline]
    pub(crate) fn pid(&self) -> u32 {
        self.pid
    }

    /// Kills the process and waits for it to exit.
    pub(crate) async fn kill(mut self) {
        if let Some(mut child) = self.child.take() {
            debug!(pid = self.pid, "Killing browser process");
            if let Err(e) = child.kill().await {
                debug!(pid = self.pid, error = %e, "Failed to kill process");
            }
            info!(pid = self.pid, "Browser process terminated");
        }
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take()
            && let Err(e) = child.start_kill()
        {
            debug!(pid = self.pid, error = %e, "Failed to send kill signal in Drop");
        }
    }
}

// ============================================================================
// BrowserProcess
// ============================================================================

/// A running browser with its DevTools endpoint and temporary profile.
pub(crate) struct BrowserProcess {
    pub(crate) guard: ProcessGuard,
    pub(crate) devtools_url: String,
    /// Deleted when dropped.
    pub(crate) profile: TempDir,
}

/// Starts the browser and waits for its DevTools endpoint.
///
/// # Errors
///
/// - [`Error::Config`] if the options are invalid
/// - [`Error::BrowserLaunch`] if the process cannot be started or exits
///   before announcing its endpoint
/// - [`Error::Timeout`] if no endpoint is announced within the launch timeout
pub(crate) async fn spawn(options: &ChromiumOptions) -> Result<BrowserProcess> {
    options.validate()?;

    let pattern = Regex::new(DEVTOOLS_PATTERN)
        .map_err(|e| Error::browser_launch(format!("invalid DevTools pattern: {e}")))?;
    let profile = TempDir::with_prefix("browser-relay-")?;

    let mut child = Command::new(&options.binary)
        .args(options.to_args(profile.path()))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            Error::browser_launch(format!("failed to start {}: {e}", options.binary.display()))
        })?;

    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| Error::browser_launch("browser stderr not captured"))?;
    let guard = ProcessGuard::new(child);
    let mut lines = BufReader::new(stderr).lines();

    let devtools_url = timeout(
        options.launch_timeout,
        find_devtools_url(&mut lines, &pattern),
    )
    .await
    .map_err(|_| Error::timeout("browser launch", options.launch_timeout.as_millis() as u64))??;

    info!(pid = guard.pid(), %devtools_url, "Browser started");

    tokio::spawn(drain_stderr(lines, guard.pid()));

    Ok(BrowserProcess {
        guard,
        devtools_url,
        profile,
    })
}

async fn find_devtools_url(
    lines: &mut Lines<BufReader<ChildStderr>>,
    pattern: &Regex,
) -> Result<String> {
    while let Some(line) = lines.next_line().await? {
        trace!(%line, "Browser stderr");
        if let Some(url) = parse_devtools_url(pattern, &line) {
            return Ok(url);
        }
    }

    Err(Error::browser_launch(
        "browser exited before announcing its DevTools endpoint",
    ))
}

async fn drain_stderr(mut lines: Lines<BufReader<ChildStderr>>, pid: u32) {
    while let Ok(Some(line)) = lines.next_line().await {
        trace!(pid, %line, "Browser stderr");
    }
    debug!(pid, "Browser stderr closed");
}

/// Extracts the DevTools WebSocket URL from one stderr line.
fn parse_devtools_url(pattern: &Regex, line: &str) -> Option<String> {
    pattern
        .captures(line)
        .and_then(|captures| captures.get(1))
        .map(|url| url.as_str().to_string())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    fn pattern() -> Regex {
        Regex::new(DEVTOOLS_PATTERN).expect("valid pattern")
    }

    #[test]
    fn test_parse_devtools_url() {
        let line = "\nDevTools listening on ws://127.0.0.1:40411/devtools/browser/3f0b-11aa";
        assert_eq!(
            parse_devtools_url(&pattern(), line),
            Some("ws://127.0.0.1:40411/devtools/browser/3f0b-11aa".to_string())
        );
    }

    #[test]
    fn test_parse_ignores_other_lines() {
        let line = "[0501/120000.000:ERROR:gpu_init.cc(523)] Passthrough is not supported";
        assert_eq!(parse_devtools_url(&pattern(), line), None);
    }

    #[tokio::test]
    async fn test_spawn_missing_binary_fails() {
        let options = ChromiumOptions::new()
            .with_binary("/nonexistent/browser-relay-test-binary")
            .with_launch_timeout(Duration::from_secs(2));

        let result = spawn(&options).await;
        assert!(matches!(result, Err(Error::BrowserLaunch { .. })));
    }

    #[tokio::test]
    async fn test_spawn_invalid_options_fails() {
        let options = ChromiumOptions::new().with_window_size(0, 0);
        let result = spawn(&options).await;
        assert!(matches!(result, Err(Error::Config { .. })));
    }
}
