//! HTTP server lifecycle and graceful shutdown.
//!
//! When a shutdown signal is received (Ctrl+C or SIGTERM):
//! 1. The HTTP server stops accepting new connections
//! 2. In-flight requests get `SHUTDOWN_TIMEOUT` seconds to finish
//! 3. Background tasks get the remaining time to drain

use axum::Router;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Serve `app` on `listener` until a shutdown signal arrives.
///
/// # Errors
///
/// Returns error if the server fails before a shutdown signal is received.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    shutdown_timeout: Duration,
    background: Vec<JoinHandle<()>>,
) -> anyhow::Result<()> {
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    tokio::select! {
        result = &mut server => {
            result??;
            warn!("HTTP server stopped without a shutdown signal");
            return Ok(());
        }
        () = shutdown_signal() => {}
    }

    info!("HTTP server stopping, initiating graceful shutdown...");
    let _ = shutdown_tx.send(());

    let deadline = tokio::time::Instant::now() + shutdown_timeout;
    match tokio::time::timeout_at(deadline, server).await {
        Ok(Ok(Ok(()))) => info!("HTTP server stopped"),
        Ok(Ok(Err(e))) => warn!(error = %e, "HTTP server failed during shutdown"),
        Ok(Err(e)) => warn!(error = %e, "HTTP server task failed"),
        Err(_) => warn!(
            timeout_secs = shutdown_timeout.as_secs(),
            "Graceful shutdown timed out, dropping open connections"
        ),
    }

    // The event logger exits once the router, and with it the last event sender, is dropped.
    for (idx, handle) in background.into_iter().enumerate() {
        match tokio::time::timeout_at(deadline, handle).await {
            Ok(Ok(())) => info!(task = idx, "Background task stopped"),
            Ok(Err(e)) => warn!(task = idx, error = %e, "Background task failed"),
            Err(_) => warn!(task = idx, "Background task shutdown timed out"),
        }
    }

    info!("Graceful shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            },
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        () = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
