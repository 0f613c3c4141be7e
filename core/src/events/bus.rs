//! Broker-backed event sink.

use super::{ChangeRequestEvents, SinkFuture};
use crate::change_request::{ChangeRequestId, ChangeRequestStatus};
use crate::correlation;
use crate::event::{ChangeRequestEvent, SerializedEvent};
use crate::event_bus::{EventBus, EventBusError};
use crate::retry::{RetryPolicy, retry_with_backoff};
use std::sync::Arc;

/// Sink that publishes events to a message broker topic.
///
/// Each event is encoded with [`SerializedEvent::from_event`] and keyed by the change
/// request id, so events of one change request land on one partition in order.
/// Transient publish failures are retried according to the [`RetryPolicy`]. Inside a
/// [`correlation::scope`] the id is sent as `{"correlation_id": …}` metadata.
#[derive(Clone)]
pub struct BusEvents {
    bus: Arc<dyn EventBus>,
    topic: String,
    retry: RetryPolicy,
}

impl BusEvents {
    /// Create a sink publishing to `topic` with the default retry policy.
    #[must_use]
    pub fn new(bus: Arc<dyn EventBus>, topic: impl Into<String>) -> Self {
        Self {
            bus,
            topic: topic.into(),
            retry: RetryPolicy::default(),
        }
    }

    /// Replace the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Topic events are published to.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    fn publish(&self, event: ChangeRequestEvent) -> SinkFuture<'_> {
        Box::pin(async move {
            let serialized = SerializedEvent::from_event(&event, correlation::metadata())
                .map_err(|e| EventBusError::SerializationFailed(e.to_string()))?;

            retry_with_backoff(&self.retry, || self.bus.publish(&self.topic, &serialized)).await?;

            metrics::counter!("change_request.events.published", "type" => serialized.event_type.clone())
                .increment(1);
            tracing::debug!(topic = %self.topic, %serialized, "Published change request event");
            Ok(())
        })
    }
}

impl std::fmt::Debug for BusEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusEvents")
            .field("topic", &self.topic)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl ChangeRequestEvents for BusEvents {
    fn created(&self, id: ChangeRequestId, status: ChangeRequestStatus) -> SinkFuture<'_> {
        self.publish(ChangeRequestEvent::Created { id, status })
    }

    fn approved(&self, id: ChangeRequestId) -> SinkFuture<'_> {
        self.publish(ChangeRequestEvent::Approved { id })
    }

    fn applied(&self, id: ChangeRequestId, idempotency_key: Option<String>) -> SinkFuture<'_> {
        self.publish(ChangeRequestEvent::Applied { id, idempotency_key })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::event::Event;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Fails the first `failures` publishes, then records.
    #[derive(Default)]
    struct FlakyBus {
        failures: usize,
        attempts: AtomicUsize,
        published: Mutex<Vec<(String, SerializedEvent)>>,
    }

    impl EventBus for FlakyBus {
        fn publish(
            &self,
            topic: &str,
            event: &SerializedEvent,
        ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
            let topic = topic.to_string();
            let event = event.clone();
            Box::pin(async move {
                if self.attempts.fetch_add(1, Ordering::SeqCst) < self.failures {
                    return Err(EventBusError::PublishFailed {
                        topic,
                        reason: "broker unavailable".to_string(),
                    });
                }
                self.published.lock().expect("lock").push((topic, event));
                Ok(())
            })
        }
    }

    fn fast_retries(max_retries: usize) -> RetryPolicy {
        RetryPolicy::builder()
            .max_retries(max_retries)
            .initial_delay(Duration::from_millis(1))
            .build()
    }

    #[tokio::test]
    async fn publishes_keyed_json_to_topic() {
        let bus = Arc::new(FlakyBus::default());
        let events = BusEvents::new(bus.clone(), "change-request-events");
        let id = ChangeRequestId::new();

        events.applied(id, Some("k1".to_string())).await.unwrap();

        let published = bus.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        let (topic, event) = &published[0];
        assert_eq!(topic, "change-request-events");
        assert_eq!(event.event_type, "CR_APPLIED");
        assert_eq!(event.aggregate_id, id.to_string());
        assert_eq!(
            ChangeRequestEvent::from_bytes(&event.data).unwrap(),
            ChangeRequestEvent::Applied {
                id,
                idempotency_key: Some("k1".to_string())
            }
        );
    }

    #[tokio::test]
    async fn correlation_id_travels_as_metadata() {
        let bus = Arc::new(FlakyBus::default());
        let events = BusEvents::new(bus.clone(), "t");
        let correlation_id = uuid::Uuid::new_v4();

        correlation::scope(correlation_id, events.approved(ChangeRequestId::new()))
            .await
            .unwrap();
        events.approved(ChangeRequestId::new()).await.unwrap();

        let published = bus.published.lock().unwrap();
        assert_eq!(
            published[0].1.metadata,
            Some(serde_json::json!({ "correlation_id": correlation_id.to_string() }))
        );
        assert_eq!(published[1].1.metadata, None);
    }

    #[tokio::test]
    async fn retries_transient_failures() {
        let bus = Arc::new(FlakyBus {
            failures: 2,
            ..FlakyBus::default()
        });
        let events = BusEvents::new(bus.clone(), "t").with_retry_policy(fast_retries(3));

        events.approved(ChangeRequestId::new()).await.unwrap();

        assert_eq!(bus.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(bus.published.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn surfaces_error_after_retries_exhausted() {
        let bus = Arc::new(FlakyBus {
            failures: usize::MAX,
            ..FlakyBus::default()
        });
        let events = BusEvents::new(bus.clone(), "t").with_retry_policy(fast_retries(1));

        let err = events
            .created(ChangeRequestId::new(), ChangeRequestStatus::Created)
            .await
            .unwrap_err();

        assert!(matches!(err, EventBusError::PublishFailed { .. }));
        assert_eq!(bus.attempts.load(Ordering::SeqCst), 2);
    }
}
