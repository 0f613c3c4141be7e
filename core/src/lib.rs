//! # Change Request Workflow Core
//!
//! Domain types, ports and the workflow engine for tracking change requests (CRs)
//! against a master-data store.
//!
//! A change request moves through a four-stage approval workflow:
//!
//! ```text
//!   create(dry_run=false)      create(dry_run=true)
//!          │                          │
//!          ▼                          ▼
//!     ┌─────────┐              ┌──────────────────┐
//!     │ CREATED │              │ PENDING_APPROVAL │
//!     └────┬────┘              └────────┬─────────┘
//!          │        approve             │
//!          └──────────────┬─────────────┘
//!                         ▼
//!                   ┌──────────┐
//!                   │ APPROVED │
//!                   └────┬─────┘
//!                        │ apply(key)
//!                        ▼
//!                   ┌──────────┐
//!                   │ APPLIED  │ ◄── apply(same key) is a no-op replay
//!                   └──────────┘
//! ```
//!
//! ## Architecture
//!
//! - **Functional core**: [`state_machine`] decides every transition without I/O.
//! - **Imperative shell**: [`workflow::ChangeRequestWorkflow`] reads and writes through the
//!   [`repository::ChangeRequestRepository`] port and notifies through the
//!   [`events::ChangeRequestEvents`] port.
//! - **Ports**: storage and notification are traits; concrete adapters live in the
//!   `crflow-postgres`, `crflow-redpanda` and `crflow-testing` crates.
//!
//! ## Example
//!
//! ```ignore
//! use crflow_core::workflow::ChangeRequestWorkflow;
//! use crflow_core::change_request::NewChangeRequest;
//!
//! let workflow = ChangeRequestWorkflow::new(repository, events);
//! let draft = NewChangeRequest::from_json(body)?;
//! let cr = workflow.create_draft(draft, true, "customer-1").await?;
//! let cr = workflow.approve(cr.id).await?;
//! let cr = workflow.apply(cr.id, Some("k1".to_string())).await?;
//! ```

pub mod assessment;
pub mod change_request;
pub mod correlation;
pub mod error;
pub mod event;
pub mod event_bus;
pub mod events;
pub mod repository;
pub mod retry;
pub mod state_machine;
pub mod workflow;

// Re-export commonly used types
pub use change_request::{ChangeRequest, ChangeRequestId, ChangeRequestStatus, NewChangeRequest};
pub use chrono::{DateTime, Utc};
pub use error::WorkflowError;
pub use workflow::ChangeRequestWorkflow;

/// Environment module - Dependency injection traits
///
/// External time sources are abstracted behind [`Clock`](environment::Clock) so that
/// timestamps written by the workflow are deterministic in tests.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use crflow_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let earlier = clock.now();
    /// assert!(clock.now() >= earlier);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
