//! Transition rules of the change request workflow.
//!
//! Pure functions: they inspect a record and decide, without I/O, whether an operation
//! may proceed. The workflow engine performs the writes and emissions afterwards.
//!
//! | From | Operation | Outcome |
//! |---|---|---|
//! | `CREATED`, `PENDING_APPROVAL`, `APPROVED` | approve | `APPROVED` |
//! | `APPLIED` | approve | rejected (terminal) |
//! | `APPROVED` | apply(key) | `APPLIED`, key stored |
//! | `APPLIED` | apply(same key) | replay, no change |
//! | `APPLIED` | apply(other key) | rejected |
//! | `CREATED`, `PENDING_APPROVAL` | apply | rejected (not approved) |

use crate::change_request::{ChangeRequest, ChangeRequestStatus};
use crate::error::{Operation, WorkflowError};

/// States from which `approve` may move a record to `APPROVED`.
///
/// `APPROVED` itself is included: re-approval is accepted and refreshes the record.
pub const APPROVE_ALLOWED_FROM: [ChangeRequestStatus; 3] = [
    ChangeRequestStatus::Created,
    ChangeRequestStatus::PendingApproval,
    ChangeRequestStatus::Approved,
];

/// What `apply` should do with a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyDecision {
    /// Transition `APPROVED → APPLIED` and emit an event.
    Apply,
    /// Already applied with the same key: return the record unchanged, emit nothing.
    Replay,
}

/// Decide whether `record` may be approved.
///
/// # Errors
///
/// Returns [`WorkflowError::InvalidTransition`] if the record is terminal.
pub fn decide_approve(record: &ChangeRequest) -> Result<(), WorkflowError> {
    if APPROVE_ALLOWED_FROM.contains(&record.status) {
        Ok(())
    } else {
        Err(rejected(
            record,
            Operation::Approve,
            "change request has already been applied",
        ))
    }
}

/// Decide what `apply` with `idempotency_key` does to `record`.
///
/// Keys compare exactly; two absent keys are equal.
///
/// # Errors
///
/// Returns [`WorkflowError::InvalidTransition`] if the record has not been approved, or
/// was applied with a different key.
pub fn decide_apply(
    record: &ChangeRequest,
    idempotency_key: Option<&str>,
) -> Result<ApplyDecision, WorkflowError> {
    match record.status {
        ChangeRequestStatus::Approved => Ok(ApplyDecision::Apply),
        ChangeRequestStatus::Applied if record.idempotency_key.as_deref() == idempotency_key => {
            Ok(ApplyDecision::Replay)
        },
        ChangeRequestStatus::Applied => Err(rejected(
            record,
            Operation::Apply,
            "already applied with a different idempotency key",
        )),
        ChangeRequestStatus::Created | ChangeRequestStatus::PendingApproval => Err(rejected(
            record,
            Operation::Apply,
            "change request has not been approved",
        )),
    }
}

fn rejected(record: &ChangeRequest, operation: Operation, reason: &str) -> WorkflowError {
    WorkflowError::InvalidTransition {
        id: record.id,
        from: record.status,
        operation,
        reason: reason.to_string(),
    }
}
