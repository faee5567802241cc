//! Capture loop.
//!
//! One cycle is: capture, deliver, wait `interval`. Cancellation is checked
//! before each capture, raced against the capture itself and raced against
//! the wait. A frame whose capture finishes after cancellation is dropped,
//! so once [`StreamHandle::stop`] returns the sink is never called again.
//!
//! Capture errors skip the cycle; the loop keeps going.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::Result;
use crate::identifiers::SessionId;

// ============================================================================
// Constants
// ============================================================================

/// Default wait between the end of one cycle and the next capture.
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(100);

// ============================================================================
// Types
// ============================================================================

/// Something that can be captured into a frame.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Captures one frame.
    ///
    /// # Errors
    ///
    /// Typically [`Error::CaptureFailed`](crate::error::Error::CaptureFailed)
    /// when the source is gone or the capture did not complete.
    async fn capture(&self) -> Result<Bytes>;
}

/// Receiver of captured frames. Must not block.
pub type FrameSink = Arc<dyn Fn(Bytes) + Send + Sync>;

// ============================================================================
// FrameProducer
// ============================================================================

/// Capture loop bound to one session.
pub struct FrameProducer {
    session_id: SessionId,
    interval: Duration,
    source: Arc<dyn FrameSource>,
    sink: FrameSink,
}

impl FrameProducer {
    /// Creates a producer with the default interval.
    #[must_use]
    pub fn new(session_id: SessionId, source: Arc<dyn FrameSource>, sink: FrameSink) -> Self {
        Self {
            session_id,
            interval: DEFAULT_FRAME_INTERVAL,
            source,
            sink,
        }
    }

    /// Sets the wait between cycles.
    #[inline]
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Returns the session the producer streams.
    #[inline]
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Starts the loop on a new task.
    #[must_use = "dropping the handle stops the stream"]
    pub fn spawn(self) -> StreamHandle {
        let token = CancellationToken::new();
        let session_id = self.session_id;
        let task = tokio::spawn(self.run(token.clone()));

        StreamHandle {
            session_id,
            token,
            task: Some(task),
        }
    }

    async fn run(self, token: CancellationToken) {
        let session_id = self.session_id;
        let mut delivered: u64 = 0;
        let mut consecutive_failures: u32 = 0;

        info!(%session_id, interval_ms = self.interval.as_millis() as u64, "Frame streaming started");

        loop {
            if token.is_cancelled() {
                break;
            }

            let captured = tokio::select! {
                biased;
                () = token.cancelled() => break,
                captured = self.source.capture() => captured,
            };

            if token.is_cancelled() {
                trace!(%session_id, "Discarding frame captured after cancellation");
                break;
            }

            match captured {
                Ok(frame) => {
                    if consecutive_failures > 0 {
                        debug!(%session_id, consecutive_failures, "Frame capture recovered");
                        consecutive_failures = 0;
                    }
                    trace!(%session_id, size = frame.len(), "Frame captured");
                    delivered += 1;
                    (self.sink)(frame);
                }

                Err(e) => {
                    consecutive_failures = consecutive_failures.saturating_add(1);
                    warn!(%session_id, consecutive_failures, error = %e, "Frame capture failed, skipping");
                }
            }

            tokio::select! {
                biased;
                () = token.cancelled() => break,
                () = sleep(self.interval) => {}
            }
        }

        info!(%session_id, delivered, "Frame streaming stopped");
    }
}

impl std::fmt::Debug for FrameProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameProducer")
            .field("session_id", &self.session_id)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// StreamHandle
// ============================================================================

/// Handle to a running capture loop.
///
/// Dropping the handle cancels the loop without waiting for it.
#[derive(Debug)]
pub struct StreamHandle {
    session_id: SessionId,
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl StreamHandle {
    /// Returns the session being streamed.
    #[inline]
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Requests cancellation without waiting.
    #[inline]
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns `true` once cancellation was requested.
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Returns `true` once the loop task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Cancels the loop and waits for it to exit.
    pub async fn stop(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            warn!(session_id = %self.session_id, error = %e, "Frame streaming task failed");
        }
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use parking_lot::Mutex;
    use tokio::time::Instant;

    use crate::testing::ScriptedSurface;
    use crate::upstream::{ConnectionManager, ManagerConfig};

    type Received = Arc<Mutex<Vec<(Instant, Bytes)>>>;

    fn recording_sink() -> (FrameSink, Received) {
        let received: Received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        (
            Arc::new(move |frame| sink.lock().push((Instant::now(), frame))),
            received,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_trailing_interval() {
        let surface = Arc::new(ScriptedSurface::new("about:blank").with_capture_delay(Duration::from_millis(30)));
        let (sink, received) = recording_sink();

        let handle = FrameProducer::new(SessionId::generate(), surface, sink)
            .with_interval(Duration::from_millis(100))
            .spawn();

        sleep(Duration::from_millis(1000)).await;
        handle.stop().await;

        let received = received.lock();
        assert!(received.len() >= 5, "only {} frames", received.len());
        for pair in received.windows(2) {
            assert!(pair[1].0 - pair[0].0 >= Duration::from_millis(130));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_frames_delivered_in_order_unmodified() {
        let surface = Arc::new(ScriptedSurface::new("about:blank"));
        let (sink, received) = recording_sink();

        let handle = FrameProducer::new(SessionId::generate(), surface, sink).spawn();
        sleep(Duration::from_millis(250)).await;
        handle.stop().await;

        let frames: Vec<_> = received.lock().iter().map(|(_, f)| f.clone()).collect();
        assert_eq!(frames[..3], [Bytes::from("F1"), Bytes::from("F2"), Bytes::from("F3")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_mid_capture_discards_frame() {
        let surface = Arc::new(ScriptedSurface::new("about:blank").with_capture_delay(Duration::from_millis(50)));
        let (sink, received) = recording_sink();

        let handle = FrameProducer::new(SessionId::generate(), Arc::clone(&surface) as Arc<dyn FrameSource>, sink)
            .with_interval(Duration::from_millis(100))
            .spawn();

        // F1 is delivered at 50ms; the second capture starts at 150ms.
        sleep(Duration::from_millis(170)).await;
        assert_eq!(surface.captures(), 2);
        handle.stop().await;

        sleep(Duration::from_millis(1000)).await;
        let received = received.lock();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].1, Bytes::from("F1"));
        assert_eq!(surface.captures(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_errors_do_not_stop_loop() {
        let surface = Arc::new(ScriptedSurface::new("about:blank"));
        surface.set_failing(true);
        let (sink, received) = recording_sink();

        let handle = FrameProducer::new(SessionId::generate(), Arc::clone(&surface) as Arc<dyn FrameSource>, sink)
            .with_interval(Duration::from_millis(100))
            .spawn();

        // Captures at 0, 100 and 200ms fail.
        sleep(Duration::from_millis(250)).await;
        assert!(received.lock().is_empty());
        assert!(!handle.is_finished());

        surface.set_failing(false);
        sleep(Duration::from_millis(200)).await;
        handle.stop().await;

        let received = received.lock();
        assert!(!received.is_empty());
        assert_eq!(received[0].1, Bytes::from("F4"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_before_first_cycle() {
        let surface = Arc::new(ScriptedSurface::new("about:blank"));
        let (sink, received) = recording_sink();

        let handle = FrameProducer::new(SessionId::generate(), Arc::clone(&surface) as Arc<dyn FrameSource>, sink).spawn();
        assert!(!handle.is_cancelled());
        handle.stop().await;

        assert_eq!(surface.captures(), 0);
        assert!(received.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_cancels() {
        let surface = Arc::new(ScriptedSurface::new("about:blank"));
        let (sink, received) = recording_sink();

        let handle = FrameProducer::new(SessionId::generate(), surface, sink).spawn();
        sleep(Duration::from_millis(150)).await;
        drop(handle);

        let count = received.lock().len();
        sleep(Duration::from_millis(1000)).await;
        assert_eq!(received.lock().len(), count);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_backpressure_from_disconnected_upstream() {
        let manager = ConnectionManager::new(ManagerConfig::new("ws://127.0.0.1:9"));
        let surface = Arc::new(ScriptedSurface::new("about:blank"));
        let upstream = manager.clone();
        let sink: FrameSink = Arc::new(move |frame| upstream.send(frame));

        let handle = FrameProducer::new(SessionId::generate(), surface, sink)
            .with_interval(Duration::from_millis(100))
            .spawn();
        sleep(Duration::from_millis(450)).await;
        handle.stop().await;

        let stats = manager.stats();
        assert_eq!(stats.sent, 0);
        assert_eq!(stats.dropped, 5);
    }
}
