//! Reconnect loop.
//!
//! Attempts are made one at a time. After failed attempt `n` the loop
//! sleeps for [`RetryPolicy::delay_for`]`(n)`, including after the last
//! attempt, then gives up once `max_attempts` attempts have failed.

// ============================================================================
// Imports
// ============================================================================

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::transport::Connector;

use super::{ConnectionManager, RetryPolicy};

// ============================================================================
// ConnectOutcome
// ============================================================================

/// Result of a retry run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// Connected on attempt `attempts`.
    Connected {
        /// Attempts made, including the successful one.
        attempts: u32,
    },
    /// Every attempt failed.
    Exhausted {
        /// Attempts made.
        attempts: u32,
    },
}

impl ConnectOutcome {
    /// Returns `true` if the run ended connected.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }
}

// ============================================================================
// ConnectionManager - Reconnect
// ============================================================================

impl<C: Connector> ConnectionManager<C> {
    /// Connects with the configured retry policy.
    pub async fn connect_with_retry(&self) -> ConnectOutcome {
        let policy = self.config().retry;
        self.connect_with_policy(&policy).await
    }

    /// Connects, retrying failed attempts with exponential backoff.
    ///
    /// The retry count is reset to zero by a successful attempt and equals
    /// `max_attempts` after an exhausted run.
    pub async fn connect_with_policy(&self, policy: &RetryPolicy) -> ConnectOutcome {
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt: u32 = 1;

        loop {
            match self.connect().await {
                Ok(()) => {
                    if attempt > 1 {
                        info!(attempts = attempt, "Upstream reconnected");
                    }
                    return ConnectOutcome::Connected { attempts: attempt };
                }

                Err(e) => {
                    self.set_retry_count(attempt);
                    let delay = policy.delay_for(attempt);
                    warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Upstream connect attempt failed"
                    );

                    sleep(delay).await;

                    if attempt >= max_attempts {
                        error!(
                            attempts = attempt,
                            target = %self.target(),
                            "Giving up on upstream connection"
                        );
                        return ConnectOutcome::Exhausted { attempts: attempt };
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// Starts a background retry run unless one is already running.
    ///
    /// Returns `None` if a run was already in progress.
    pub fn spawn_reconnect(&self) -> Option<JoinHandle<ConnectOutcome>> {
        if self.shared.reconnecting.swap(true, Ordering::AcqRel) {
            debug!("Reconnect already in progress");
            return None;
        }

        let manager = self.clone();
        Some(tokio::spawn(async move {
            let _running = RunningFlag(&manager.shared.reconnecting);
            manager.connect_with_retry().await
        }))
    }

    /// Returns `true` while a background retry run is in progress.
    #[must_use]
    pub fn is_reconnecting(&self) -> bool {
        self.shared.reconnecting.load(Ordering::Acquire)
    }
}

/// Clears the reconnecting flag when the run ends or is aborted.
struct RunningFlag<'a>(&'a AtomicBool);

impl Drop for RunningFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// ============================================================================
// Tests
// ============================================================================
