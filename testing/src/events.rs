//! Capturing event sink and event bus.

use crflow_core::change_request::{ChangeRequestId, ChangeRequestStatus};
use crflow_core::event::{ChangeRequestEvent, SerializedEvent};
use crflow_core::event_bus::{EventBus, EventBusError};
use crflow_core::events::{ChangeRequestEvents, SinkFuture};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Event sink that records every event it accepts.
///
/// While [`set_failing`](Self::set_failing) is on, calls return
/// [`EventBusError::PublishFailed`] and nothing is recorded.
#[derive(Clone, Debug, Default)]
pub struct RecordingEvents {
    events: Arc<Mutex<Vec<ChangeRequestEvent>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingEvents {
    /// Create an empty, healthy sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle failure mode
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// All recorded events, oldest first
    #[must_use]
    pub fn events(&self) -> Vec<ChangeRequestEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Recorded events for one change request
    #[must_use]
    pub fn events_for(&self, id: ChangeRequestId) -> Vec<ChangeRequestEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.id() == id)
            .collect()
    }

    /// Number of recorded events
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    /// Check if nothing was recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().unwrap().is_empty()
    }

    fn record(&self, event: ChangeRequestEvent) -> SinkFuture<'_> {
        let result = if self.failing.load(Ordering::SeqCst) {
            Err(EventBusError::PublishFailed {
                topic: "recording".to_string(),
                reason: "sink is failing".to_string(),
            })
        } else {
            self.events.lock().unwrap().push(event);
            Ok(())
        };
        Box::pin(async move { result })
    }
}

impl ChangeRequestEvents for RecordingEvents {
    fn created(&self, id: ChangeRequestId, status: ChangeRequestStatus) -> SinkFuture<'_> {
        self.record(ChangeRequestEvent::Created { id, status })
    }

    fn approved(&self, id: ChangeRequestId) -> SinkFuture<'_> {
        self.record(ChangeRequestEvent::Approved { id })
    }

    fn applied(&self, id: ChangeRequestId, idempotency_key: Option<String>) -> SinkFuture<'_> {
        self.record(ChangeRequestEvent::Applied { id, idempotency_key })
    }
}

/// Event bus that keeps published messages in memory.
#[derive(Clone, Debug, Default)]
pub struct InMemoryEventBus {
    published: Arc<Mutex<Vec<(String, SerializedEvent)>>>,
}

impl InMemoryEventBus {
    /// Create an empty bus
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `(topic, event)` pair published so far
    #[must_use]
    pub fn published(&self) -> Vec<(String, SerializedEvent)> {
        self.published.lock().unwrap().clone()
    }

    /// Events published to `topic`
    #[must_use]
    pub fn published_to(&self, topic: &str) -> Vec<SerializedEvent> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, event)| event.clone())
            .collect()
    }
}

impl EventBus for InMemoryEventBus {
    fn publish(
        &self,
        topic: &str,
        event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), event.clone()));
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn failing_sink_records_nothing() {
        let events = RecordingEvents::new();
        events.set_failing(true);

        assert!(events.approved(ChangeRequestId::new()).await.is_err());
        assert!(events.is_empty());

        events.set_failing(false);
        events.approved(ChangeRequestId::new()).await.unwrap();
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn bus_filters_by_topic() {
        let bus = InMemoryEventBus::new();
        let event = SerializedEvent::new("CR_APPROVED".into(), "id".into(), b"{}".to_vec(), None);

        bus.publish("a", &event).await.unwrap();
        bus.publish("b", &event).await.unwrap();

        assert_eq!(bus.published().len(), 2);
        assert_eq!(bus.published_to("a"), vec![event]);
    }
}
