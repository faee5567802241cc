//! `browser-relay` binary.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use browser_relay::browser::ChromiumLauncher;
use browser_relay::config::Config;
use browser_relay::controller::BrowserController;
use browser_relay::session::SessionRegistry;
use browser_relay::transport::WsConnector;
use browser_relay::upstream::ConnectionManager;

// ============================================================================
// Functions
// ============================================================================

/// Installs the global subscriber. `RUST_LOG` overrides the `info` default.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();
    init_tracing(config.log_json);

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return ExitCode::FAILURE;
    }

    let upstream = ConnectionManager::with_connector(
        config.manager_config(),
        WsConnector::new().with_handshake_timeout(config.connect_timeout()),
    );

    let reconnector = upstream.clone();
    upstream.on_disconnect(move || {
        warn!("Upstream connection lost, reconnecting");
        if reconnector.spawn_reconnect().is_none() {
            debug!("Reconnect loop already running");
        }
    });

    let initial = upstream.clone();
    tokio::spawn(async move {
        let outcome = initial.connect_with_retry().await;
        info!(?outcome, "Initial upstream connect finished");
    });

    let launcher = ChromiumLauncher::new(config.chromium_options())
        .with_capture_format(config.capture_format());
    let registry = Arc::new(SessionRegistry::new(Arc::new(launcher)));
    let controller = Arc::new(
        BrowserController::new(Arc::clone(&registry), upstream.clone())
            .with_frame_interval(config.frame_interval())
            .with_metadata_screenshot(config.metadata_screenshot),
    );

    let addr = config.listen_addr();
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(%addr, error = %e, "Failed to bind HTTP listener");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        info!("Shutdown requested");
    };

    let served = browser_relay::server::serve(listener, controller, shutdown).await;

    let closed = registry.close_all().await;
    info!(sessions = closed.len(), "Closed remaining sessions");
    upstream.disconnect();

    match served {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "HTTP server failed");
            ExitCode::FAILURE
        }
    }
}
