//! HTTP control surface.
//!
//! | Method | Path | Handler |
//! |--------|------|---------|
//! | `POST` | `/browser/launch` | [`BrowserController::launch`] |
//! | `POST` | `/browser/close` | [`BrowserController::close`] |
//! | `GET` | `/health` | [`BrowserController::health`] |
//!
//! Every failure is answered with `500` and
//! `{"error": "Something went wrong", "message": "..."}`.

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tracing::info;

use crate::controller::BrowserController;
use crate::error::Result;

// ============================================================================
// Submodules
// ============================================================================

/// Route handlers and error mapping.
pub mod routes;

pub use routes::ApiError;

// ============================================================================
// Router
// ============================================================================

/// Builds the application router.
pub fn router(controller: Arc<BrowserController>) -> Router {
    Router::new()
        .route("/browser/launch", post(routes::launch))
        .route("/browser/close", post(routes::close))
        .route("/health", get(routes::health))
        .with_state(controller)
}

/// Serves the router on `listener` until `shutdown` resolves.
///
/// # Errors
///
/// [`Error::Io`](crate::error::Error::Io) if the listener fails.
pub async fn serve(
    listener: TcpListener,
    controller: Arc<BrowserController>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let addr: SocketAddr = listener.local_addr()?;
    info!(%addr, "HTTP server listening");

    axum::serve(listener, router(controller))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("HTTP server stopped");
    Ok(())
}
