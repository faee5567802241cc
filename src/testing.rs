//! Test fixtures.
//!
//! - [`LoopbackServer`]: a local WebSocket endpoint standing in for the
//!   downstream consumer
//! - [`ScriptedSurface`] / [`ScriptedLauncher`]: in-memory browser surfaces

// ============================================================================
// Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::protocol::PageMetadata;
use crate::session::{Surface, SurfaceLauncher};
use crate::stream::FrameSource;

// ============================================================================
// Constants
// ============================================================================

/// Upper bound for any single wait on the loopback server.
const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// LoopbackServer
// ============================================================================

/// What the loopback server observed from a connected peer.
#[derive(Debug)]
pub enum PeerEvent {
    /// Peer `n` completed the handshake.
    Opened(usize),
    /// Peer `n` sent a text or binary message.
    Message(usize, Message),
    /// Peer `n` disconnected.
    Closed(usize),
}

enum PeerCommand {
    Send(Message),
    Close,
}

/// WebSocket server on `127.0.0.1:0` recording every peer event in order.
///
/// Peers are numbered in accept order. Dropping the server drops every
/// peer socket without a close frame.
pub struct LoopbackServer {
    addr: SocketAddr,
    events: mpsc::UnboundedReceiver<PeerEvent>,
    peers: Arc<Mutex<Vec<mpsc::UnboundedSender<PeerCommand>>>>,
    shutdown: CancellationToken,
}

impl LoopbackServer {
    /// Binds to a random local port and starts accepting.
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind should succeed");
        let addr = listener.local_addr().expect("local addr");

        let (events_tx, events) = mpsc::unbounded_channel();
        let peers = Arc::new(Mutex::new(Vec::new()));
        let shutdown = CancellationToken::new();

        tokio::spawn(Self::accept_loop(
            listener,
            events_tx,
            Arc::clone(&peers),
            shutdown.clone(),
        ));

        Self {
            addr,
            events,
            peers,
            shutdown,
        }
    }

    /// Returns `ws://127.0.0.1:{port}`.
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Waits for the next event, panicking after five seconds.
    pub async fn next_event(&mut self) -> PeerEvent {
        timeout(EVENT_TIMEOUT, self.events.recv())
            .await
            .expect("peer event in time")
            .expect("server running")
    }

    /// Waits up to `wait` for the next event.
    pub async fn try_next_event(&mut self, wait: Duration) -> Option<PeerEvent> {
        timeout(wait, self.events.recv()).await.ok().flatten()
    }

    /// Waits for the next message from any peer, skipping lifecycle events.
    pub async fn next_message(&mut self) -> Message {
        loop {
            if let PeerEvent::Message(_, message) = self.next_event().await {
                return message;
            }
        }
    }

    /// Sends a message to peer `index`.
    pub fn send_to(&self, index: usize, message: Message) {
        if let Some(peer) = self.peers.lock().get(index) {
            let _ = peer.send(PeerCommand::Send(message));
        }
    }

    /// Sends a close frame to peer `index`.
    pub fn close(&self, index: usize) {
        if let Some(peer) = self.peers.lock().get(index) {
            let _ = peer.send(PeerCommand::Close);
        }
    }

    /// Returns the number of peers accepted so far.
    pub fn peer_count(&self) -> usize {
        self.peers.lock().len()
    }

    async fn accept_loop(
        listener: TcpListener,
        events: mpsc::UnboundedSender<PeerEvent>,
        peers: Arc<Mutex<Vec<mpsc::UnboundedSender<PeerCommand>>>>,
        shutdown: CancellationToken,
    ) {
        loop {
            let stream = tokio::select! {
                () = shutdown.cancelled() => return,
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => stream,
                    Err(_) => return,
                },
            };

            let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                continue;
            };

            let (command_tx, command_rx) = mpsc::unbounded_channel();
            let index = {
                let mut peers = peers.lock();
                peers.push(command_tx);
                peers.len() - 1
            };

            let _ = events.send(PeerEvent::Opened(index));
            tokio::spawn(Self::peer_loop(
                ws,
                index,
                command_rx,
                events.clone(),
                shutdown.clone(),
            ));
        }
    }

    async fn peer_loop(
        ws: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
        index: usize,
        mut commands: mpsc::UnboundedReceiver<PeerCommand>,
        events: mpsc::UnboundedSender<PeerEvent>,
        shutdown: CancellationToken,
    ) {
        let (mut write, mut read) = ws.split();

        loop {
            tokio::select! {
                () = shutdown.cancelled() => return,

                command = commands.recv() => match command {
                    Some(PeerCommand::Send(message)) => {
                        let _ = write.send(message).await;
                    }
                    Some(PeerCommand::Close) => {
                        let _ = write.close().await;
                    }
                    None => return,
                },

                message = read.next() => match message {
                    Some(Ok(message @ (Message::Text(_) | Message::Binary(_)))) => {
                        let _ = events.send(PeerEvent::Message(index, message));
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                        let _ = events.send(PeerEvent::Closed(index));
                        return;
                    }
                    Some(Ok(_)) => {}
                },
            }
        }
    }
}

impl Drop for LoopbackServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

// ============================================================================
// ScriptedSurface
// ============================================================================

/// In-memory surface producing frames `F1`, `F2`, ...
pub struct ScriptedSurface {
    url: String,
    captures: AtomicUsize,
    capture_delay: Duration,
    failing: AtomicBool,
    closed: AtomicBool,
    metadata: Option<PageMetadata>,
}

impl ScriptedSurface {
    /// Creates a surface that captures instantly.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            captures: AtomicUsize::new(0),
            capture_delay: Duration::ZERO,
            failing: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            metadata: Some(PageMetadata::default()),
        }
    }

    /// Makes every capture take `delay`.
    pub fn with_capture_delay(mut self, delay: Duration) -> Self {
        self.capture_delay = delay;
        self
    }

    /// Makes metadata extraction fail.
    pub fn without_metadata(mut self) -> Self {
        self.metadata = None;
        self
    }

    /// Switches capture failures on or off.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Returns the number of capture calls so far.
    pub fn captures(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }

    /// Returns `true` once [`Surface::close`] was called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FrameSource for ScriptedSurface {
    async fn capture(&self) -> Result<Bytes> {
        let n = self.captures.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.capture_delay.is_zero() {
            tokio::time::sleep(self.capture_delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::capture_failed(format!("scripted failure {n}")));
        }
        Ok(Bytes::from(format!("F{n}")))
    }
}

#[async_trait]
impl Surface for ScriptedSurface {
    fn url(&self) -> &str {
        &self.url
    }

    async fn metadata(&self, include_screenshot: bool) -> Option<PageMetadata> {
        self.metadata.clone().map(|mut metadata| {
            if include_screenshot {
                metadata.screenshot_base64 = Some("data:image/jpeg;base64,AA==".to_string());
            }
            metadata
        })
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// ScriptedLauncher
// ============================================================================

/// Launcher handing out [`ScriptedSurface`]s and remembering them.
#[derive(Default)]
pub struct ScriptedLauncher {
    launched: Mutex<Vec<Arc<ScriptedSurface>>>,
    fail_launch: AtomicBool,
    without_metadata: bool,
}

impl ScriptedLauncher {
    /// Creates a launcher whose surfaces have no metadata.
    pub fn without_metadata() -> Self {
        Self {
            without_metadata: true,
            ..Self::default()
        }
    }

    /// Makes subsequent launches fail.
    pub fn set_fail_launch(&self, fail: bool) {
        self.fail_launch.store(fail, Ordering::SeqCst);
    }

    /// Returns every surface launched so far.
    pub fn launched(&self) -> Vec<Arc<ScriptedSurface>> {
        self.launched.lock().clone()
    }
}

#[async_trait]
impl SurfaceLauncher for ScriptedLauncher {
    async fn launch(&self, url: &str) -> Result<Arc<dyn Surface>> {
        if self.fail_launch.load(Ordering::SeqCst) {
            return Err(Error::browser_launch("scripted launch failure"));
        }

        let mut surface = ScriptedSurface::new(url);
        if self.without_metadata {
            surface = surface.without_metadata();
        }
        let surface = Arc::new(surface);
        self.launched.lock().push(Arc::clone(&surface));
        Ok(surface)
    }
}
