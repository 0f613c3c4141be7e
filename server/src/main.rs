//! Change request workflow service.

use anyhow::Context;
use crflow_server::{Config, Resources, lifecycle, telemetry};
use crflow_web::{AppState, change_request_router};
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    let _ = dotenvy::dotenv();

    telemetry::init_tracing()?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting change request service...");

    let config = Config::from_env()?;
    tracing::info!(
        storage = %config.storage.backend,
        events = %config.events.profile,
        address = %config.bind_address(),
        "Configuration loaded"
    );

    telemetry::init_metrics(&config)?;

    let resources = Resources::from_config(&config).await?;
    let app = change_request_router(AppState::new(resources.workflow));

    let listener = tokio::net::TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_address()))?;
    tracing::info!(address = %config.bind_address(), "HTTP server listening for requests");

    lifecycle::serve(
        listener,
        app,
        Duration::from_secs(config.server.shutdown_timeout),
        resources.background,
    )
    .await
}
