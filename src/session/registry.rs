//! Session bookkeeping.
//!
//! The registry owns every live [`Session`]. Streams are started and
//! stopped through it so that a session never runs two capture loops and a
//! closing session always stops its loop before its surface goes away.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::identifiers::SessionId;
use crate::stream::{FrameProducer, FrameSink, FrameSource, StreamHandle};

use super::{Surface, SurfaceLauncher};

// ============================================================================
// Session
// ============================================================================

/// A launched surface and its optional frame stream.
pub struct Session {
    id: SessionId,
    url: String,
    created_at: DateTime<Utc>,
    surface: Arc<dyn Surface>,
    stream: Mutex<Option<StreamHandle>>,
    closed: AtomicBool,
}

impl Session {
    /// Returns the session id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Returns the URL the session was launched with.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns when the session was created.
    #[inline]
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the surface.
    #[inline]
    #[must_use]
    pub fn surface(&self) -> &Arc<dyn Surface> {
        &self.surface
    }

    /// Returns `true` while a capture loop is running.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.stream
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stops the stream, then closes the surface.
    async fn shutdown(&self) -> Result<()> {
        let handle = {
            let mut stream = self.stream.lock();
            self.closed.store(true, Ordering::Release);
            stream.take()
        };

        if let Some(handle) = handle {
            handle.stop().await;
        }

        self.surface.close().await
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("created_at", &self.created_at)
            .field("streaming", &self.is_streaming())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// SessionRegistry
// ============================================================================

/// Map of live sessions.
pub struct SessionRegistry {
    launcher: Arc<dyn SurfaceLauncher>,
    sessions: RwLock<FxHashMap<SessionId, Arc<Session>>>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(launcher: Arc<dyn SurfaceLauncher>) -> Self {
        Self {
            launcher,
            sessions: RwLock::new(FxHashMap::default()),
        }
    }

    /// Launches a surface for `url` and registers it under a fresh id.
    ///
    /// # Errors
    ///
    /// Whatever the launcher returns. Nothing is registered on failure.
    pub async fn create_session(&self, url: &str) -> Result<Arc<Session>> {
        let surface = self.launcher.launch(url).await?;

        let session = Arc::new(Session {
            id: SessionId::generate(),
            url: url.to_string(),
            created_at: Utc::now(),
            surface,
            stream: Mutex::new(None),
            closed: AtomicBool::new(false),
        });

        self.sessions
            .write()
            .insert(session.id, Arc::clone(&session));

        info!(session_id = %session.id, url, "Session created");
        Ok(session)
    }

    /// Returns a session by id.
    #[must_use]
    pub fn get(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions.read().get(&id).cloned()
    }

    /// Returns the ids of all live sessions.
    #[must_use]
    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.read().keys().copied().collect()
    }

    /// Returns the number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Returns `true` if there are no sessions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Starts streaming frames of session `id` into `on_frame`.
    ///
    /// # Errors
    ///
    /// - [`Error::SessionUnavailable`] if the session does not exist or is
    ///   closing; no loop is started
    /// - [`Error::AlreadyStreaming`] if a loop is already running
    pub fn start_streaming(&self, id: SessionId, interval: Duration, on_frame: FrameSink) -> Result<()> {
        let session = self.get(id).ok_or_else(|| Error::session_unavailable(id))?;
        let mut stream = session.stream.lock();

        if session.closed.load(Ordering::Acquire) {
            return Err(Error::session_unavailable(id));
        }
        if stream.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Err(Error::already_streaming(id));
        }

        let source: Arc<dyn FrameSource> = session.surface.clone();
        *stream = Some(
            FrameProducer::new(id, source, on_frame)
                .with_interval(interval)
                .spawn(),
        );

        debug!(session_id = %id, "Stream attached to session");
        Ok(())
    }

    /// Stops the stream of session `id`.
    ///
    /// Returns `false` if no stream was running.
    ///
    /// # Errors
    ///
    /// [`Error::SessionUnavailable`] if the session does not exist.
    pub async fn stop_streaming(&self, id: SessionId) -> Result<bool> {
        let session = self.get(id).ok_or_else(|| Error::session_unavailable(id))?;
        let handle = session.stream.lock().take();

        match handle {
            Some(handle) => {
                handle.stop().await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Removes session `id`, stops its stream and closes its surface.
    ///
    /// # Errors
    ///
    /// - [`Error::SessionUnavailable`] if the session does not exist
    /// - The surface's close error; the session is removed regardless
    pub async fn close_session(&self, id: SessionId) -> Result<()> {
        let session = self
            .sessions
            .write()
            .remove(&id)
            .ok_or_else(|| Error::session_unavailable(id))?;

        session.shutdown().await?;
        info!(session_id = %id, "Session closed");
        Ok(())
    }

    /// Closes every session.
    ///
    /// Close errors are logged and do not stop the sweep. Returns the ids
    /// of all removed sessions.
    pub async fn close_all(&self) -> Vec<SessionId> {
        let sessions: Vec<_> = self.sessions.write().drain().map(|(_, s)| s).collect();
        let mut closed = Vec::with_capacity(sessions.len());

        for session in sessions {
            if let Err(e) = session.shutdown().await {
                warn!(session_id = %session.id, error = %e, "Session close failed");
            }
            info!(session_id = %session.id, "Session closed");
            closed.push(session.id);
        }

        closed
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use bytes::Bytes;
    use tokio::time::sleep;

    use crate::testing::ScriptedLauncher;

    fn registry() -> (SessionRegistry, Arc<ScriptedLauncher>) {
        let launcher = Arc::new(ScriptedLauncher::default());
        (SessionRegistry::new(Arc::clone(&launcher) as Arc<dyn SurfaceLauncher>), launcher)
    }

    fn counting_sink() -> (FrameSink, Arc<Mutex<Vec<Bytes>>>) {
        let frames = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&frames);
        (Arc::new(move |frame| sink.lock().push(frame)), frames)
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let (registry, _) = registry();
        let session = registry.create_session("https://example.com").await.expect("create");

        assert_eq!(registry.len(), 1);
        assert_eq!(session.url(), "https://example.com");
        assert_eq!(session.surface().url(), "https://example.com");
        assert!(!session.is_streaming());
        assert_eq!(registry.get(session.id()).map(|s| s.id()), Some(session.id()));
        assert_eq!(registry.ids(), vec![session.id()]);
    }

    #[tokio::test]
    async fn test_launch_failure_registers_nothing() {
        let (registry, launcher) = registry();
        launcher.set_fail_launch(true);

        let result = registry.create_session("https://example.com").await;
        assert!(matches!(result, Err(Error::BrowserLaunch { .. })));
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_streaming_unknown_session() {
        let (registry, _) = registry();
        let (sink, frames) = counting_sink();
        let id = SessionId::generate();

        let result = registry.start_streaming(id, Duration::from_millis(100), sink);
        assert!(matches!(result, Err(Error::SessionUnavailable { session_id }) if session_id == id));

        sleep(Duration::from_millis(500)).await;
        assert!(frames.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_stream_is_rejected() {
        let (registry, _) = registry();
        let session = registry.create_session("https://example.com").await.expect("create");
        let (sink, _) = counting_sink();

        registry
            .start_streaming(session.id(), Duration::from_millis(100), Arc::clone(&sink))
            .expect("first stream");
        let second = registry.start_streaming(session.id(), Duration::from_millis(100), sink);

        assert!(matches!(second, Err(Error::AlreadyStreaming { .. })));
        assert!(session.is_streaming());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_then_restart() {
        let (registry, _) = registry();
        let session = registry.create_session("https://example.com").await.expect("create");
        let (sink, frames) = counting_sink();

        registry
            .start_streaming(session.id(), Duration::from_millis(100), Arc::clone(&sink))
            .expect("start");
        sleep(Duration::from_millis(250)).await;

        assert!(registry.stop_streaming(session.id()).await.expect("stop"));
        assert!(!registry.stop_streaming(session.id()).await.expect("second stop"));
        let count = frames.lock().len();
        sleep(Duration::from_millis(500)).await;
        assert_eq!(frames.lock().len(), count);

        registry
            .start_streaming(session.id(), Duration::from_millis(100), sink)
            .expect("restart");
        sleep(Duration::from_millis(50)).await;
        assert!(frames.lock().len() > count);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_session_stops_stream_then_closes_surface() {
        let (registry, launcher) = registry();
        let session = registry.create_session("https://example.com").await.expect("create");
        let (sink, frames) = counting_sink();

        registry
            .start_streaming(session.id(), Duration::from_millis(100), sink)
            .expect("start");
        sleep(Duration::from_millis(250)).await;

        registry.close_session(session.id()).await.expect("close");
        let count = frames.lock().len();

        assert!(registry.is_empty());
        assert!(launcher.launched()[0].is_closed());
        assert!(!session.is_streaming());

        sleep(Duration::from_millis(500)).await;
        assert_eq!(frames.lock().len(), count);

        let (sink, _) = counting_sink();
        let restart = registry.start_streaming(session.id(), Duration::from_millis(100), sink);
        assert!(matches!(restart, Err(Error::SessionUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_close_unknown_session() {
        let (registry, _) = registry();
        let result = registry.close_session(SessionId::generate()).await;
        assert!(matches!(result, Err(Error::SessionUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_close_all() {
        let (registry, launcher) = registry();
        let a = registry.create_session("https://a.example").await.expect("create a");
        let b = registry.create_session("https://b.example").await.expect("create b");

        let mut closed = registry.close_all().await;
        closed.sort_by_key(|id| id.to_string());
        let mut expected = vec![a.id(), b.id()];
        expected.sort_by_key(|id| id.to_string());

        assert_eq!(closed, expected);
        assert!(registry.is_empty());
        assert!(launcher.launched().iter().all(|s| s.is_closed()));
        assert!(registry.close_all().await.is_empty());
    }
}
