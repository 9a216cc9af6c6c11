//! Faultline gRPC server
//!
//! Hosts the controller service next to the demo echo service. An optional
//! first argument names the configuration file; otherwise `faultline.toml` in
//! the working directory is used when present.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use infrastructure::{AppConfig, init_tracing};
use presentation_grpc::create_router;
use tokio::signal;
use tokio::sync::oneshot;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => AppConfig::load_from(&path)
            .with_context(|| format!("Failed to load configuration from {path}"))?,
        None => AppConfig::load().context("Failed to load configuration")?,
    };

    init_tracing(&config.telemetry)?;

    let interceptor = config.build_interceptor()?;
    let addr: SocketAddr = config
        .server
        .listen_addr
        .parse()
        .with_context(|| format!("Invalid listen address {}", config.server.listen_addr))?;

    info!(
        %addr,
        reply_timeout_ms = config.interceptor.reply_timeout_ms,
        preloaded_methods = config.faults.len(),
        "Configuration loaded"
    );

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let mut server = tokio::spawn(create_router(&interceptor).serve_with_shutdown(addr, async {
        let _ = shutdown_rx.await;
    }));

    info!("Server listening on {}", addr);

    tokio::select! {
        result = &mut server => {
            result.context("Server task panicked")??;
            return Ok(());
        }
        () = shutdown_signal() => {}
    }

    let _ = shutdown_tx.send(());
    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout_secs);
    info!("Waiting up to {:?} for connections to close...", shutdown_timeout);

    match tokio::time::timeout(shutdown_timeout, server).await {
        Ok(result) => result.context("Server task panicked")??,
        Err(_) => warn!("Connections still open after shutdown timeout"),
    }

    info!(stats = ?interceptor.stats(), "Server shutdown complete");
    Ok(())
}

/// Wait for SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
