//! Errors surfaced by the change request workflow.
//!
//! | Variant | Meaning | HTTP |
//! |---|---|---|
//! | [`WorkflowError::NotFound`] | no record for the id | 404 |
//! | [`WorkflowError::InvalidTransition`] | guard violated or idempotency key mismatch | 409 |
//! | [`WorkflowError::Storage`] | the repository failed | 500 |
//! | [`WorkflowError::Serialization`] | malformed payload, rejected before any write | 400 |
//!
//! Event sink failures never appear here: notification is best-effort.

use crate::change_request::{ChangeRequestId, ChangeRequestStatus};
use crate::repository::RepositoryError;
use thiserror::Error;

/// Workflow operation that was attempted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    /// `approve(id)`
    Approve,
    /// `apply(id, key)`
    Apply,
}

impl Operation {
    /// Lowercase name, used in logs and metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Apply => "apply",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by [`ChangeRequestWorkflow`](crate::workflow::ChangeRequestWorkflow).
#[derive(Error, Debug)]
pub enum WorkflowError {
    /// No change request exists for the id.
    #[error("Change request not found: {0}")]
    NotFound(ChangeRequestId),

    /// The operation is not allowed from the record's current state.
    ///
    /// Also returned when an applied record is replayed with a different
    /// idempotency key. Never retried automatically.
    #[error("Cannot {operation} change request {id} in status {from}: {reason}")]
    InvalidTransition {
        /// The change request
        id: ChangeRequestId,
        /// Status observed when the operation was rejected
        from: ChangeRequestStatus,
        /// The rejected operation
        operation: Operation,
        /// Human-readable explanation
        reason: String,
    },

    /// The repository failed; the operation had no visible effect.
    #[error("Storage failure: {0}")]
    Storage(#[from] RepositoryError),

    /// The request payload is malformed.
    #[error("Malformed change request payload: {0}")]
    Serialization(String),
}

impl WorkflowError {
    /// Whether the caller is at fault (maps to a 4xx response).
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        !matches!(self, Self::Storage(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_transition_display_names_state_and_operation() {
        let id = ChangeRequestId::new();
        let err = WorkflowError::InvalidTransition {
            id,
            from: ChangeRequestStatus::PendingApproval,
            operation: Operation::Apply,
            reason: "change request has not been approved".to_string(),
        };

        let display = err.to_string();
        assert!(display.contains("Cannot apply"));
        assert!(display.contains("PENDING_APPROVAL"));
        assert!(display.contains(&id.to_string()));
    }

    #[test]
    fn storage_failures_are_server_errors() {
        let err = WorkflowError::from(RepositoryError::Database("connection reset".to_string()));
        assert!(!err.is_client_error());
        assert!(WorkflowError::NotFound(ChangeRequestId::new()).is_client_error());
    }
}
