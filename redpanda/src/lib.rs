//! Redpanda event bus for change request events.
//!
//! Implements the [`EventBus`] trait from `crflow-core` on an rdkafka
//! [`FutureProducer`], so it works with any Kafka-compatible broker (Redpanda, Apache
//! Kafka, AWS MSK).
//!
//! # Message Layout
//!
//! | Part | Content |
//! |---|---|
//! | key | change request id (one change request, one partition, in order) |
//! | payload | the JSON event, e.g. `{"type":"CR_APPROVED","id":"…"}` |
//! | header `event_type` | `CR_CREATED`, `CR_APPROVED` or `CR_APPLIED` |
//! | header `metadata` | JSON metadata, when the event carries any |
//!
//! # Delivery Semantics
//!
//! **At-least-once**: a publish that times out may still have reached the broker, and
//! the caller retries it. Consumers must tolerate duplicates.
//!
//! # Example
//!
//! ```no_run
//! use crflow_redpanda::RedpandaEventBus;
//! use crflow_core::event_bus::EventBus;
//! use crflow_core::event::SerializedEvent;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let event_bus = RedpandaEventBus::new("localhost:9092")?;
//!
//! let event = SerializedEvent::new(
//!     "CR_APPROVED".to_string(),
//!     "0b6d2c6e-3f4c-4a9e-8f0e-2f7f8f5a1c11".to_string(),
//!     br#"{"type":"CR_APPROVED","id":"0b6d2c6e-3f4c-4a9e-8f0e-2f7f8f5a1c11"}"#.to_vec(),
//!     None,
//! );
//! event_bus.publish("change-request-events", &event).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use crflow_core::event::SerializedEvent;
use crflow_core::event_bus::{EventBus, EventBusError};
use rdkafka::config::ClientConfig;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Header carrying the event type.
pub const EVENT_TYPE_HEADER: &str = "event_type";

/// Header carrying JSON metadata.
pub const METADATA_HEADER: &str = "metadata";

/// Redpanda event bus implementation.
///
/// # Configuration
///
/// - **Broker addresses**: bootstrap servers (required)
/// - **Acks**: `"0"`, `"1"` or `"all"` (default `"all"`)
/// - **Compression**: `"none"`, `"gzip"`, `"snappy"`, `"lz4"`, `"zstd"` (default `"none"`)
/// - **Timeout**: how long a send may wait for delivery (default 5 seconds)
///
/// # Example
///
/// ```no_run
/// use crflow_redpanda::RedpandaEventBus;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let event_bus = RedpandaEventBus::builder()
///     .brokers("localhost:9092,localhost:9093")
///     .producer_acks("all")
///     .compression("lz4")
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct RedpandaEventBus {
    /// Kafka producer for publishing events
    producer: FutureProducer,
    /// Broker addresses
    brokers: String,
    /// Producer timeout
    timeout: Duration,
}

impl RedpandaEventBus {
    /// Create a new Redpanda event bus with default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if the producer cannot be created.
    pub fn new(brokers: &str) -> Result<Self, EventBusError> {
        Self::builder().brokers(brokers).build()
    }

    /// Create a new builder for configuring the event bus.
    #[must_use]
    pub fn builder() -> RedpandaEventBusBuilder {
        RedpandaEventBusBuilder::default()
    }

    /// Get a reference to the brokers string.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }
}

impl std::fmt::Debug for RedpandaEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedpandaEventBus")
            .field("brokers", &self.brokers)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Builder for configuring a [`RedpandaEventBus`].
#[derive(Default, Debug)]
pub struct RedpandaEventBusBuilder {
    brokers: Option<String>,
    producer_acks: Option<String>,
    compression: Option<String>,
    timeout: Option<Duration>,
}

impl RedpandaEventBusBuilder {
    /// Set the broker addresses (comma-separated, e.g. `"localhost:9092"`).
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Set the producer acknowledgment mode: `"0"`, `"1"` or `"all"`.
    ///
    /// Default: `"all"`
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Set the compression codec: `"none"`, `"gzip"`, `"snappy"`, `"lz4"`, `"zstd"`.
    ///
    /// Default: `"none"`
    #[must_use]
    pub fn compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    /// Set the producer send timeout.
    ///
    /// Default: 5 seconds
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the [`RedpandaEventBus`].
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if brokers are not set or the
    /// producer configuration is invalid.
    pub fn build(self) -> Result<RedpandaEventBus, EventBusError> {
        let brokers = self
            .brokers
            .filter(|b| !b.trim().is_empty())
            .ok_or_else(|| EventBusError::ConnectionFailed("Brokers not configured".to_string()))?;
        let timeout = self.timeout.unwrap_or(Duration::from_secs(5));
        let acks = self.producer_acks.as_deref().unwrap_or("all");
        let compression = self.compression.as_deref().unwrap_or("none");

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", timeout.as_millis().to_string())
            .set("acks", acks)
            .set("compression.type", compression)
            .create()
            .map_err(|e| EventBusError::ConnectionFailed(format!("Failed to create producer: {e}")))?;

        tracing::info!(
            brokers = %brokers,
            acks,
            compression,
            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            "RedpandaEventBus created successfully"
        );

        Ok(RedpandaEventBus {
            producer,
            brokers,
            timeout,
        })
    }
}

/// Headers attached to every message.
fn message_headers(event: &SerializedEvent) -> OwnedHeaders {
    let headers = OwnedHeaders::new().insert(Header {
        key: EVENT_TYPE_HEADER,
        value: Some(event.event_type.as_str()),
    });

    match event.metadata.as_ref().map(serde_json::Value::to_string) {
        Some(metadata) => headers.insert(Header {
            key: METADATA_HEADER,
            value: Some(metadata.as_str()),
        }),
        None => headers,
    }
}

impl EventBus for RedpandaEventBus {
    fn publish(
        &self,
        topic: &str,
        event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        // Clone data before moving into async block
        let topic = topic.to_string();
        let event = event.clone();
        let timeout = self.timeout;

        Box::pin(async move {
            let record = FutureRecord::to(&topic)
                .payload(&event.data)
                .key(event.aggregate_id.as_bytes())
                .headers(message_headers(&event));

            match self.producer.send(record, Timeout::After(timeout)).await {
                Ok((partition, offset)) => {
                    tracing::debug!(
                        topic = %topic,
                        partition,
                        offset,
                        event_type = %event.event_type,
                        key = %event.aggregate_id,
                        "Event published successfully"
                    );
                    Ok(())
                },
                Err((kafka_error, _)) => {
                    tracing::warn!(
                        topic = %topic,
                        error = %kafka_error,
                        event_type = %event.event_type,
                        "Failed to publish event"
                    );
                    Err(EventBusError::PublishFailed {
                        topic,
                        reason: kafka_error.to_string(),
                    })
                },
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdkafka::message::Headers;

    #[test]
    fn redpanda_event_bus_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<RedpandaEventBus>();
        assert_sync::<RedpandaEventBus>();
    }

    #[test]
    fn build_without_brokers_fails() {
        let result = RedpandaEventBus::builder().build();
        assert!(matches!(result, Err(EventBusError::ConnectionFailed(_))));

        let result = RedpandaEventBus::builder().brokers("  ").build();
        assert!(matches!(result, Err(EventBusError::ConnectionFailed(_))));
    }

    #[test]
    fn headers_carry_event_type_and_metadata() {
        let event = SerializedEvent::new(
            "CR_APPLIED".to_string(),
            "id-1".to_string(),
            b"{}".to_vec(),
            Some(serde_json::json!({"correlation_id": "c-1"})),
        );

        let headers = message_headers(&event);

        assert_eq!(headers.count(), 2);
        let first = headers.get(0);
        assert_eq!(first.key, EVENT_TYPE_HEADER);
        assert_eq!(first.value, Some(b"CR_APPLIED".as_slice()));
        let second = headers.get(1);
        assert_eq!(second.key, METADATA_HEADER);
        assert_eq!(second.value, Some(br#"{"correlation_id":"c-1"}"#.as_slice()));
    }

    #[test]
    fn headers_omit_missing_metadata() {
        let event = SerializedEvent::new("CR_APPROVED".to_string(), "id-1".to_string(), Vec::new(), None);
        assert_eq!(message_headers(&event).count(), 1);
    }
}
