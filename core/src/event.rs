//! Lifecycle events and their wire format.
//!
//! Every state change of a change request produces one [`ChangeRequestEvent`]. Events are
//! notifications for downstream consumers, not commit participants: the record in the
//! repository is the source of truth and an event may be delivered more than once.
//!
//! # Wire Format
//!
//! Events serialize to flat JSON objects tagged by `type`:
//!
//! ```text
//! {"type":"CR_CREATED","id":"…","status":"PENDING_APPROVAL"}
//! {"type":"CR_APPROVED","id":"…"}
//! {"type":"CR_APPLIED","id":"…","idempotency_key":"k1"}
//! ```
//!
//! JSON rather than a binary codec keeps the messages readable by consumers written in
//! any language.
//!
//! # Example
//!
//! ```
//! use crflow_core::event::{ChangeRequestEvent, Event, SerializedEvent};
//! use crflow_core::change_request::ChangeRequestId;
//!
//! let event = ChangeRequestEvent::Approved { id: ChangeRequestId::new() };
//! let serialized = SerializedEvent::from_event(&event, None).unwrap();
//! assert_eq!(serialized.event_type, "CR_APPROVED");
//! ```

use crate::change_request::{ChangeRequestId, ChangeRequestStatus};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::fmt;
use thiserror::Error;

/// Error types for event operations.
#[derive(Error, Debug)]
pub enum EventError {
    /// Failed to serialize event to bytes.
    #[error("Failed to serialize event: {0}")]
    SerializationError(String),

    /// Failed to deserialize event from bytes.
    #[error("Failed to deserialize event: {0}")]
    DeserializationError(String),
}

/// An event that can be published to an event bus.
///
/// The default codec is JSON via `serde_json`.
pub trait Event: Send + Sync + 'static {
    /// Stable identifier of the event type (e.g. `"CR_APPLIED"`).
    fn event_type(&self) -> &'static str;

    /// Identifier of the entity the event belongs to. Used as the partition key so
    /// events of one entity stay ordered.
    fn aggregate_id(&self) -> String;

    /// Serialize this event to JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns `EventError::SerializationError` if the event cannot be serialized.
    fn to_bytes(&self) -> Result<Vec<u8>, EventError>
    where
        Self: Serialize,
    {
        serde_json::to_vec(self).map_err(|e| EventError::SerializationError(e.to_string()))
    }

    /// Deserialize an event from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns `EventError::DeserializationError` if the bytes are not a valid event of
    /// this type.
    fn from_bytes(bytes: &[u8]) -> Result<Self, EventError>
    where
        Self: DeserializeOwned + Sized,
    {
        serde_json::from_slice(bytes).map_err(|e| EventError::DeserializationError(e.to_string()))
    }
}

/// Lifecycle notification for a change request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChangeRequestEvent {
    /// A change request was created.
    #[serde(rename = "CR_CREATED")]
    Created {
        /// The new change request
        id: ChangeRequestId,
        /// Its initial status
        status: ChangeRequestStatus,
    },

    /// A change request was approved.
    #[serde(rename = "CR_APPROVED")]
    Approved {
        /// The approved change request
        id: ChangeRequestId,
    },

    /// A change request was applied.
    #[serde(rename = "CR_APPLIED")]
    Applied {
        /// The applied change request
        id: ChangeRequestId,
        /// Key supplied with the apply request (`null` when absent)
        idempotency_key: Option<String>,
    },
}

impl ChangeRequestEvent {
    /// The change request this event is about.
    #[must_use]
    pub const fn id(&self) -> ChangeRequestId {
        match self {
            Self::Created { id, .. } | Self::Approved { id } | Self::Applied { id, .. } => *id,
        }
    }
}

impl Event for ChangeRequestEvent {
    fn event_type(&self) -> &'static str {
        match self {
            Self::Created { .. } => "CR_CREATED",
            Self::Approved { .. } => "CR_APPROVED",
            Self::Applied { .. } => "CR_APPLIED",
        }
    }

    fn aggregate_id(&self) -> String {
        self.id().to_string()
    }
}

impl fmt::Display for ChangeRequestEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created { id, status } => write!(f, "CR_CREATED {{ id: {id}, status: {status} }}"),
            Self::Approved { id } => write!(f, "CR_APPROVED {{ id: {id} }}"),
            Self::Applied {
                id,
                idempotency_key,
            } => write!(
                f,
                "CR_APPLIED {{ id: {id}, idempotency_key: {} }}",
                idempotency_key.as_deref().unwrap_or("null")
            ),
        }
    }
}

/// A serialized event ready for publishing.
///
/// This is the wire-level envelope between the sinks and an
/// [`EventBus`](crate::event_bus::EventBus).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SerializedEvent {
    /// The event type identifier (e.g., `"CR_CREATED"`).
    pub event_type: String,

    /// Partition key (the change request id).
    pub aggregate_id: String,

    /// The JSON-encoded event.
    pub data: Vec<u8>,

    /// Optional metadata (e.g. `correlation_id`), carried as message headers.
    pub metadata: Option<serde_json::Value>,
}

impl SerializedEvent {
    /// Create a new serialized event.
    #[must_use]
    pub const fn new(
        event_type: String,
        aggregate_id: String,
        data: Vec<u8>,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        Self {
            event_type,
            aggregate_id,
            data,
            metadata,
        }
    }

    /// Create a serialized event from an [`Event`].
    ///
    /// # Errors
    ///
    /// Returns `EventError::SerializationError` if the event cannot be serialized.
    pub fn from_event<E: Event + Serialize>(
        event: &E,
        metadata: Option<serde_json::Value>,
    ) -> Result<Self, EventError> {
        Ok(Self {
            event_type: event.event_type().to_string(),
            aggregate_id: event.aggregate_id(),
            data: event.to_bytes()?,
            metadata,
        })
    }
}

impl fmt::Display for SerializedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SerializedEvent {{ type: {}, key: {}, size: {} bytes }}",
            self.event_type,
            self.aggregate_id,
            self.data.len()
        )
    }
}
