//! Browser Relay - headless browser frames over a self-healing WebSocket.
//!
//! The relay launches Chromium pages on request, captures each page on a
//! fixed cadence and pushes the frames, together with session lifecycle
//! events, over one persistent upstream WebSocket.
//!
//! # Architecture
//!
//! - **Upstream**: a single [`ConnectionManager`](upstream::ConnectionManager)
//!   owns the outbound channel and reconnects with exponential backoff
//! - **Sessions**: each session owns one surface and at most one frame stream
//! - **Streaming**: a [`FrameProducer`](stream::FrameProducer) task per
//!   session captures, forwards, then waits (trailing interval)
//! - **Control surface**: an axum router for launch, close and health
//!
//! Sending never fails the caller. Frames and events produced while the
//! upstream is down or saturated are dropped and counted.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use browser_relay::browser::{ChromiumLauncher, ChromiumOptions};
//! use browser_relay::controller::{BrowserController, LaunchRequest};
//! use browser_relay::session::SessionRegistry;
//! use browser_relay::upstream::{ConnectionManager, ManagerConfig};
//!
//! # async fn run() -> browser_relay::Result<()> {
//! let upstream = ConnectionManager::new(ManagerConfig::new("ws://127.0.0.1:8080"));
//! upstream.connect_with_retry().await;
//!
//! let launcher = Arc::new(ChromiumLauncher::new(ChromiumOptions::new()));
//! let registry = Arc::new(SessionRegistry::new(launcher));
//! let controller = BrowserController::new(registry, upstream);
//!
//! let launched = controller
//!     .launch(LaunchRequest {
//!         url: Some("https://example.com".to_string()),
//!         ..LaunchRequest::default()
//!     })
//!     .await?;
//! controller.close(Some(launched.session_id)).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`upstream`] | Connection manager, retry policy, reconnect loop |
//! | [`stream`] | Periodic frame producer |
//! | [`session`] | Session registry and surface traits |
//! | [`browser`] | Chromium backend over the DevTools protocol |
//! | [`controller`] | Launch/close orchestration |
//! | [`server`] | HTTP routes |
//! | [`protocol`] | Control events, CDP messages, page metadata |
//! | [`transport`] | WebSocket channel and connector |
//! | [`config`] | Command-line and environment configuration |
//! | [`error`] | Error types and [`Result`] alias |

// ============================================================================
// Modules
// ============================================================================

/// Chromium backend.
pub mod browser;

/// Command-line and environment configuration.
pub mod config;

/// Launch/close orchestration.
pub mod controller;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// Wire message types.
pub mod protocol;

/// HTTP control surface.
pub mod server;

/// Session registry.
pub mod session;

/// Frame streaming.
pub mod stream;

/// WebSocket transport layer.
pub mod transport;

/// Upstream connection management.
pub mod upstream;

#[cfg(test)]
mod testing;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};
pub use identifiers::SessionId;
