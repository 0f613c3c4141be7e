//! Resource setup for the change request service.
//!
//! Turns a [`Config`] into the workflow's ports:
//!
//! 1. Storage: `PostgreSQL` (pool + migrations) or in-memory
//! 2. Events: local log fan-out or Redpanda with publish retries
//! 3. Workflow: [`ChangeRequestWorkflow`] over both
//!
//! # Example
//!
//! ```rust,ignore
//! let config = Config::from_env()?;
//! let resources = Resources::from_config(&config).await?;
//! let app = change_request_router(AppState::new(resources.workflow.clone()));
//! ```

use crate::config::{Config, EventsConfig, EventsProfile, StorageBackend, StorageConfig};
use anyhow::Context;
use crflow_core::ChangeRequestWorkflow;
use crflow_core::events::{BusEvents, ChangeRequestEvents, LocalEvents, spawn_event_logger};
use crflow_core::repository::ChangeRequestRepository;
use crflow_core::retry::RetryPolicy;
use crflow_postgres::PostgresChangeRequestRepository;
use crflow_redpanda::RedpandaEventBus;
use crflow_testing::InMemoryChangeRequestRepository;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Everything the HTTP server needs, plus background tasks to wind down on exit.
#[derive(Debug)]
pub struct Resources {
    /// The workflow engine, wired to the configured ports
    pub workflow: ChangeRequestWorkflow,
    /// Background tasks (the local event logger, when enabled)
    pub background: Vec<JoinHandle<()>>,
}

impl Resources {
    /// Initialize storage and events from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Database connection fails
    /// - Database migrations fail
    /// - The Redpanda producer cannot be created
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let repository = build_repository(&config.storage).await?;
        let (events, background) = build_events(&config.events)?;

        Ok(Self {
            workflow: ChangeRequestWorkflow::new(repository, events),
            background,
        })
    }
}

/// Build the configured change request repository.
///
/// # Errors
///
/// Returns error if the database is unreachable or a migration fails.
pub async fn build_repository(
    config: &StorageConfig,
) -> anyhow::Result<Arc<dyn ChangeRequestRepository>> {
    match config.backend {
        StorageBackend::Memory => {
            warn!("Using in-memory storage; change requests are lost on restart");
            Ok(Arc::new(InMemoryChangeRequestRepository::new()))
        },
        StorageBackend::Postgres => {
            let postgres = &config.postgres;
            info!(
                max_connections = postgres.max_connections,
                min_connections = postgres.min_connections,
                "Connecting to change request database..."
            );
            let pool = PgPoolOptions::new()
                .max_connections(postgres.max_connections)
                .min_connections(postgres.min_connections)
                .acquire_timeout(Duration::from_secs(postgres.connect_timeout))
                .connect(&postgres.url)
                .await
                .context("Failed to connect to change request database")?;
            let repository = PostgresChangeRequestRepository::new(pool);

            if postgres.run_migrations {
                info!("Running change request migrations...");
                repository.migrate().await?;
                info!("Change request migrations complete");
            }

            Ok(Arc::new(repository))
        },
    }
}

/// Build the configured event sink.
///
/// The local profile also returns the task that writes events to the log.
///
/// # Errors
///
/// Returns error if the Redpanda producer cannot be created.
pub fn build_events(
    config: &EventsConfig,
) -> anyhow::Result<(Arc<dyn ChangeRequestEvents>, Vec<JoinHandle<()>>)> {
    match config.profile {
        EventsProfile::Local => {
            let events = LocalEvents::new();
            let logger = spawn_event_logger(events.subscribe());
            info!("Lifecycle events are written to the local log");
            Ok((Arc::new(events), vec![logger]))
        },
        EventsProfile::Redpanda => {
            let redpanda = &config.redpanda;
            info!(brokers = %redpanda.brokers, topic = %redpanda.topic, "Connecting to Redpanda event bus...");
            let bus = RedpandaEventBus::builder()
                .brokers(&redpanda.brokers)
                .producer_acks(&redpanda.acks)
                .compression(&redpanda.compression)
                .build()
                .context("Failed to create Redpanda event bus")?;
            let retry = RetryPolicy::builder()
                .max_retries(config.publish_max_retries)
                .build();

            let events = BusEvents::new(Arc::new(bus), &redpanda.topic).with_retry_policy(retry);
            Ok((Arc::new(events), Vec::new()))
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crflow_testing::fixtures;

    fn memory_config() -> Config {
        Config::from_lookup(|key| match key {
            "STORAGE_BACKEND" => Some("memory".to_string()),
            _ => None,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn memory_backend_with_local_events_serves_the_workflow() {
        let resources = Resources::from_config(&memory_config()).await.unwrap();
        assert_eq!(resources.background.len(), 1);

        let cr = resources
            .workflow
            .create_draft(fixtures::supplier_address_draft(), true, "acme")
            .await
            .unwrap();
        assert_eq!(resources.workflow.get(cr.id).await.unwrap(), cr);
    }

    #[tokio::test]
    async fn local_logger_stops_when_events_are_dropped() {
        let (events, background) = build_events(&memory_config().events).unwrap();
        drop(events);

        for handle in background {
            tokio::time::timeout(Duration::from_secs(1), handle)
                .await
                .expect("logger should stop")
                .unwrap();
        }
    }
}
