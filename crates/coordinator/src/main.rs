//! Arcadia Coordinator binary.

#![warn(clippy::pedantic)]

use coordinator::config::Config;
use coordinator::{Coordinator, RandomSelector};
use std::net::SocketAddr;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "coordinator=debug,tower_http=debug,relay_protocol=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Arcadia Coordinator");

    let config = Config::from_env();
    info!(
        bind_address = %config.bind_address,
        request_timeout_ms = config.request_timeout_ms,
        "Configuration loaded"
    );

    let coordinator = Coordinator::new(Box::new(RandomSelector::new()));
    let app = coordinator::server::router(coordinator, config.request_timeout());

    let addr: SocketAddr = config.bind_address.parse().map_err(|err| {
        error!(error = %err, addr = %config.bind_address, "Invalid bind address");
        anyhow::anyhow!("invalid bind address {}: {err}", config.bind_address)
    })?;

    // Bind before serving to fail fast on bind errors.
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|err| {
        error!(error = %err, addr = %addr, "Failed to bind");
        anyhow::anyhow!("failed to bind {addr}: {err}")
    })?;
    info!(addr = %addr, "Coordinator listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Coordinator shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed; without them the service
/// could never shut down cleanly.
async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
