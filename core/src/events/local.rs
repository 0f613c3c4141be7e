//! In-process event sink for local development.

use super::{ChangeRequestEvents, SinkFuture};
use crate::change_request::{ChangeRequestId, ChangeRequestStatus};
use crate::event::ChangeRequestEvent;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Default capacity of the in-process event channel.
const DEFAULT_CAPACITY: usize = 256;

/// Sink for local development: no network, events go to `tracing` and to in-process
/// subscribers.
///
/// Sending never fails. With no subscribers the event is only logged.
///
/// # Example
///
/// ```
/// use crflow_core::events::{ChangeRequestEvents, LocalEvents};
/// use crflow_core::change_request::ChangeRequestId;
///
/// # tokio_test::block_on(async {
/// let events = LocalEvents::new();
/// let mut rx = events.subscribe();
///
/// let id = ChangeRequestId::new();
/// events.approved(id).await.unwrap();
/// assert_eq!(rx.recv().await.unwrap().id(), id);
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct LocalEvents {
    sender: broadcast::Sender<ChangeRequestEvent>,
}

impl LocalEvents {
    /// Create a sink with the default channel capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a sink whose channel buffers up to `capacity` events per subscriber.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to every event emitted after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeRequestEvent> {
        self.sender.subscribe()
    }

    fn emit(&self, event: ChangeRequestEvent) {
        tracing::info!(event_type = event_type(&event), cr_id = %event.id(), "[LOCAL] {event}");

        if self.sender.send(event).is_err() {
            tracing::trace!("No local event subscribers");
        }
    }
}

impl Default for LocalEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeRequestEvents for LocalEvents {
    fn created(&self, id: ChangeRequestId, status: ChangeRequestStatus) -> SinkFuture<'_> {
        self.emit(ChangeRequestEvent::Created { id, status });
        Box::pin(async { Ok(()) })
    }

    fn approved(&self, id: ChangeRequestId) -> SinkFuture<'_> {
        self.emit(ChangeRequestEvent::Approved { id });
        Box::pin(async { Ok(()) })
    }

    fn applied(&self, id: ChangeRequestId, idempotency_key: Option<String>) -> SinkFuture<'_> {
        self.emit(ChangeRequestEvent::Applied { id, idempotency_key });
        Box::pin(async { Ok(()) })
    }
}

/// Spawn the listener that logs every event received on `receiver`.
///
/// The task ends when every sender is dropped.
#[must_use = "dropping the handle detaches the listener"]
pub fn spawn_event_logger(mut receiver: broadcast::Receiver<ChangeRequestEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    tracing::info!(
                        event_type = event_type(&event),
                        cr_id = %event.id(),
                        "Change request event received"
                    );
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event logger lagged, {} events skipped", skipped);
                },
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::debug!("Event channel closed, stopping event logger");
                    break;
                },
            }
        }
    })
}

fn event_type(event: &ChangeRequestEvent) -> &'static str {
    use crate::event::Event;
    event.event_type()
}
