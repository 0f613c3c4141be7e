//! Tracing and metrics setup.

use crate::config::Config;
use anyhow::Context;
use metrics::describe_counter;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str = "info,crflow=debug,sqlx=warn";

/// Install the global tracing subscriber.
///
/// Filtering follows `RUST_LOG`, falling back to [`DEFAULT_LOG_FILTER`].
///
/// # Errors
///
/// Returns error if a global subscriber is already installed.
pub fn init_tracing() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .context("Failed to install tracing subscriber")
}

/// Start the Prometheus exporter on the metrics address, if enabled.
///
/// # Errors
///
/// Returns error if the address is invalid or the exporter cannot be installed.
pub fn init_metrics(config: &Config) -> anyhow::Result<()> {
    if !config.server.metrics_enabled {
        tracing::info!("Metrics exporter disabled");
        return Ok(());
    }

    let addr: SocketAddr = config
        .metrics_address()
        .parse()
        .context("Invalid metrics address")?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;

    register_metrics();
    tracing::info!(%addr, "Prometheus metrics available at http://{addr}/metrics");
    Ok(())
}

/// Register all metric descriptions.
fn register_metrics() {
    describe_counter!("change_request.created", "Change requests created, by status");
    describe_counter!("change_request.approved", "Change requests approved");
    describe_counter!("change_request.applied", "Change requests applied");
    describe_counter!(
        "change_request.apply_replayed",
        "Apply calls answered as idempotent replays"
    );
    describe_counter!(
        "change_request.rejected",
        "Operations rejected by a lifecycle guard, by operation"
    );
    describe_counter!(
        "change_request.read_back.failed",
        "Successful writes whose read back failed"
    );
    describe_counter!(
        "change_request.events.published",
        "Lifecycle events published to the bus, by type"
    );
    describe_counter!(
        "change_request.events.failed",
        "Lifecycle events the sink failed to deliver, by type"
    );
    describe_counter!(
        "change_request.repository.duplicate",
        "Inserts rejected because the id already existed"
    );
    describe_counter!("change_request.http.errors", "HTTP error responses, by code");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn config(vars: &[(&'static str, &'static str)]) -> Config {
        let vars = vars.to_vec();
        Config::from_lookup(move |key| {
            vars.iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| (*value).to_string())
        })
        .unwrap()
    }

    #[test]
    fn disabled_metrics_install_nothing() {
        let config = config(&[("METRICS_ENABLED", "false"), ("METRICS_HOST", "not a host")]);

        assert!(init_metrics(&config).is_ok());
    }

    #[test]
    fn metrics_exporter_binds_the_configured_address() {
        let config = config(&[("METRICS_HOST", "not a host"), ("METRICS_PORT", "9100")]);

        let err = init_metrics(&config).unwrap_err();

        assert_eq!(config.metrics_address(), "not a host:9100");
        assert!(err.to_string().contains("Invalid metrics address"));
    }
}
