//! # Change Request Workflow Testing
//!
//! Testing utilities for the change request workflow.
//!
//! This crate provides:
//! - In-memory implementations of the repository, event sink and event bus ports
//! - Deterministic clocks
//! - Request fixtures
//!
//! ## Example
//!
//! ```
//! use crflow_testing::{InMemoryChangeRequestRepository, RecordingEvents, fixtures, test_clock};
//! use crflow_core::ChangeRequestWorkflow;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let repository = Arc::new(InMemoryChangeRequestRepository::new());
//! let events = Arc::new(RecordingEvents::new());
//! let workflow = ChangeRequestWorkflow::new(repository.clone(), events.clone())
//!     .with_clock(Arc::new(test_clock()));
//!
//! let cr = workflow
//!     .create_draft(fixtures::supplier_address_draft(), true, "acme")
//!     .await
//!     .unwrap();
//! assert_eq!(events.len(), 1);
//! assert_eq!(repository.len(), 1);
//! # let _ = cr;
//! # });
//! ```

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on poisoned locks

use chrono::{DateTime, Utc};
use crflow_core::environment::Clock;

mod events;
mod repository;

pub use events::{InMemoryEventBus, RecordingEvents};
pub use repository::InMemoryChangeRequestRepository;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::{Arc, Mutex};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use crflow_testing::mocks::FixedClock;
    /// use crflow_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when told to.
    ///
    /// Clones share the same time, so a test can keep one handle and give another to
    /// the workflow.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Create a clock starting at `time`
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(Mutex::new(time)),
            }
        }

        /// Move the clock forward (or backward, with a negative delta)
        pub fn advance(&self, delta: chrono::TimeDelta) {
            let mut time = self.time.lock().unwrap();
            *time += delta;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap()
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Request bodies and payloads used across test suites.
pub mod fixtures {
    use crflow_core::change_request::NewChangeRequest;
    use serde_json::{Value, json};

    /// JSON body of a supplier address update, as a client would POST it.
    #[must_use]
    pub fn supplier_address_update() -> Value {
        json!({
            "domain": "supplier",
            "table": "supplier_address",
            "operation": "update",
            "filter": {"id": 7},
            "proposed_changes": {"city": "Berlin"},
            "customer_id": "acme",
        })
    }

    /// [`supplier_address_update`] as a creation payload.
    #[must_use]
    pub fn supplier_address_draft() -> NewChangeRequest {
        NewChangeRequest {
            domain: "supplier".to_string(),
            table: "supplier_address".to_string(),
            operation: "update".to_string(),
            filter: json!({"id": 7}),
            proposed_changes: json!({"city": "Berlin"}),
        }
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, ManualClock, test_clock};
