//! Event bus abstraction for delivering lifecycle events to downstream consumers.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │    Workflow     │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │  1. Write row   │
//! │   to Postgres   │◄─── Source of truth
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ 2. Publish to   │
//! │    Event Bus    │◄─── At-least-once, best effort
//! └────────┬────────┘
//!          │
//!     ┌────┴────┐
//!     ▼         ▼
//! ┌───────┐ ┌───────┐
//! │ Audit │ │ Apply │
//! │       │ │ jobs  │
//! └───────┘ └───────┘
//! ```
//!
//! # Key Principles
//!
//! - **Postgres first**: the record is written before the event is published
//! - **At-least-once delivery**: events may be delivered multiple times
//! - **Idempotency**: consumers must handle duplicates
//! - **Ordered per change request**: events are keyed by change request id
//!
//! # Implementations
//!
//! - `RedpandaEventBus` (in `crflow-redpanda`): Kafka-compatible production bus
//! - `InMemoryEventBus` (in `crflow-testing`): captures published events for tests

use crate::event::SerializedEvent;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during event bus operations.
#[derive(Error, Debug, Clone)]
pub enum EventBusError {
    /// Failed to connect to the event bus
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish an event to a topic
    #[error("Publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to serialize an event
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),
}

/// Trait for event bus implementations.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; one bus is shared by every request.
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
/// to enable trait object usage (`Arc<dyn EventBus>`), so the transport can be picked
/// by configuration at startup.
pub trait EventBus: Send + Sync {
    /// Publish an event to a topic.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] if the broker rejects or times out the
    /// message.
    fn publish(
        &self,
        topic: &str,
        event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>>;
}
