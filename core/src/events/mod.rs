//! Event sink port: lifecycle notifications for downstream consumers.
//!
//! The workflow calls one method per state change after the record is written. A sink
//! may fail; the workflow logs and counts the failure but never rolls back, so consumers
//! must treat delivery as at-least-once and best-effort.
//!
//! # Implementations
//!
//! - [`LocalEvents`]: logs each event and fans it out over an in-process broadcast channel
//! - [`BusEvents`]: serializes each event and publishes it to an [`EventBus`](crate::event_bus::EventBus)
//! - `RecordingEvents` (in `crflow-testing`): captures events for assertions
//!
//! The implementation is chosen once at startup; the workflow never branches on it.

mod bus;
mod local;

pub use bus::BusEvents;
pub use local::{LocalEvents, spawn_event_logger};

use crate::change_request::{ChangeRequestId, ChangeRequestStatus};
use crate::event_bus::EventBusError;
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by sink methods.
pub type SinkFuture<'a> = Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + 'a>>;

/// Receives one notification per change request state change.
pub trait ChangeRequestEvents: Send + Sync {
    /// A change request was created with `status`.
    fn created(&self, id: ChangeRequestId, status: ChangeRequestStatus) -> SinkFuture<'_>;

    /// A change request was approved.
    fn approved(&self, id: ChangeRequestId) -> SinkFuture<'_>;

    /// A change request was applied with the supplied idempotency key.
    fn applied(&self, id: ChangeRequestId, idempotency_key: Option<String>) -> SinkFuture<'_>;
}
