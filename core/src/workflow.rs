//! The change request workflow engine.
//!
//! [`ChangeRequestWorkflow`] is the imperative shell around [`state_machine`]: for each
//! operation it loads the record, asks the state machine for a decision, performs the
//! conditional write, and only then notifies the event sink.
//!
//! # Ordering
//!
//! ```text
//! load ─► decide ─► conditional write ─► emit event ─► re-read
//!            │              │                  │             │
//!            ▼              ▼                  ▼             ▼
//!    InvalidTransition   Storage error   failure logged,  failure logged,
//!    (nothing written)   (nothing emitted) op succeeds    written record returned
//! ```
//!
//! Once the conditional write succeeds the operation succeeds. The event goes out
//! before the read back, and a failed read back returns the record as written.
//!
//! # Concurrency
//!
//! The engine holds no mutable state; it is shared behind an `Arc` by every request.
//! Racing writers are serialized by the repository's conditional updates. A caller
//! whose write affected no row re-reads the record and resolves its outcome against
//! the winner.

use crate::assessment::{ChangeAssessor, PlaceholderAssessor};
use crate::change_request::{ChangeRequest, ChangeRequestId, ChangeRequestStatus, NewChangeRequest};
use crate::environment::{Clock, SystemClock};
use crate::error::{Operation, WorkflowError};
use crate::events::{ChangeRequestEvents, SinkFuture};
use crate::repository::ChangeRequestRepository;
use crate::state_machine::{self, APPROVE_ALLOWED_FROM, ApplyDecision};
use std::sync::Arc;

/// Orchestrates the change request lifecycle over a repository and an event sink.
#[derive(Clone)]
pub struct ChangeRequestWorkflow {
    repository: Arc<dyn ChangeRequestRepository>,
    events: Arc<dyn ChangeRequestEvents>,
    assessor: Arc<dyn ChangeAssessor>,
    clock: Arc<dyn Clock>,
}

impl ChangeRequestWorkflow {
    /// Create a workflow with the placeholder assessor and the system clock.
    #[must_use]
    pub fn new(
        repository: Arc<dyn ChangeRequestRepository>,
        events: Arc<dyn ChangeRequestEvents>,
    ) -> Self {
        Self {
            repository,
            events,
            assessor: Arc::new(PlaceholderAssessor),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the assessor that computes diff previews and risk scores.
    #[must_use]
    pub fn with_assessor(mut self, assessor: Arc<dyn ChangeAssessor>) -> Self {
        self.assessor = assessor;
        self
    }

    /// Replace the clock used for timestamps.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Create and persist a new change request.
    ///
    /// The initial status is `PENDING_APPROVAL` for a dry run and `CREATED` otherwise.
    /// A `CR_CREATED` event is emitted after the record is stored.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Storage`] if the record cannot be persisted.
    #[tracing::instrument(skip_all, name = "cr_create", fields(dry_run = dry_run, domain = %draft.domain, table = %draft.table))]
    pub async fn create_draft(
        &self,
        draft: NewChangeRequest,
        dry_run: bool,
        customer_id: impl Into<String>,
    ) -> Result<ChangeRequest, WorkflowError> {
        let assessment = self.assessor.assess(&draft);
        let now = self.clock.now();

        let record = ChangeRequest {
            id: ChangeRequestId::new(),
            customer_id: customer_id.into(),
            domain: draft.domain,
            table_name: draft.table,
            operation: draft.operation,
            filter: draft.filter,
            proposed_changes: draft.proposed_changes,
            diff_preview: assessment.diff_preview,
            risk_score: assessment.risk_score,
            status: ChangeRequestStatus::initial(dry_run),
            idempotency_key: None,
            created_at: now,
            updated_at: now,
        };

        self.repository.insert(&record).await?;

        let id = record.id;
        let status = record.status;

        metrics::counter!("change_request.created", "status" => status.as_str()).increment(1);
        tracing::info!(cr_id = %id, %status, "Change request created");

        self.notify(id, "CR_CREATED", self.events.created(id, status))
            .await;

        Ok(self.reloaded(record).await)
    }

    /// Load a change request.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::NotFound`]: no record for `id`
    /// - [`WorkflowError::Storage`]: the repository failed
    pub async fn get(&self, id: ChangeRequestId) -> Result<ChangeRequest, WorkflowError> {
        self.repository
            .find_by_id(id)
            .await?
            .ok_or(WorkflowError::NotFound(id))
    }

    /// Move a change request to `APPROVED`.
    ///
    /// Re-approving an approved record succeeds, refreshes `updated_at` and emits the
    /// event again.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::NotFound`]: no record for `id`
    /// - [`WorkflowError::InvalidTransition`]: the record is already applied
    /// - [`WorkflowError::Storage`]: the repository failed
    #[tracing::instrument(skip(self), name = "cr_approve", fields(cr_id = %id))]
    pub async fn approve(&self, id: ChangeRequestId) -> Result<ChangeRequest, WorkflowError> {
        let record = self.get(id).await?;
        self.checked(state_machine::decide_approve(&record))?;

        let now = self.clock.now();
        let affected = self
            .repository
            .update_status(id, ChangeRequestStatus::Approved, &APPROVE_ALLOWED_FROM, now)
            .await?;

        if affected == 0 {
            let current = self.get(id).await?;
            self.checked(state_machine::decide_approve(&current))?;
            return Err(self.conflict(&current, Operation::Approve));
        }

        metrics::counter!("change_request.approved").increment(1);
        tracing::info!(from = %record.status, "Change request approved");

        self.notify(id, "CR_APPROVED", self.events.approved(id)).await;

        let updated_at = now.max(record.created_at);
        let written = ChangeRequest {
            status: ChangeRequestStatus::Approved,
            updated_at,
            ..record
        };
        Ok(self.reloaded(written).await)
    }

    /// Move an approved change request to `APPLIED`, recording `idempotency_key`.
    ///
    /// Applying an already applied record with the same key (both absent counts as the
    /// same) returns the stored record unchanged and emits nothing.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::NotFound`]: no record for `id`
    /// - [`WorkflowError::InvalidTransition`]: the record is not approved, or was applied
    ///   with a different key
    /// - [`WorkflowError::Storage`]: the repository failed
    #[tracing::instrument(skip(self), name = "cr_apply", fields(cr_id = %id))]
    pub async fn apply(
        &self,
        id: ChangeRequestId,
        idempotency_key: Option<String>,
    ) -> Result<ChangeRequest, WorkflowError> {
        let key = idempotency_key.as_deref();
        let record = self.get(id).await?;

        if self.checked(state_machine::decide_apply(&record, key))? == ApplyDecision::Replay {
            return Ok(self.replayed(record));
        }

        let now = self.clock.now();
        let affected = self.repository.update_applied(id, key, now).await?;

        if affected == 0 {
            let current = self.get(id).await?;
            return match self.checked(state_machine::decide_apply(&current, key))? {
                ApplyDecision::Replay => Ok(self.replayed(current)),
                ApplyDecision::Apply => Err(self.conflict(&current, Operation::Apply)),
            };
        }

        metrics::counter!("change_request.applied").increment(1);
        tracing::info!(idempotency_key = ?key, "Change request applied");

        let updated_at = now.max(record.created_at);
        let written = ChangeRequest {
            status: ChangeRequestStatus::Applied,
            idempotency_key: idempotency_key.clone(),
            updated_at,
            ..record
        };

        self.notify(id, "CR_APPLIED", self.events.applied(id, idempotency_key))
            .await;

        Ok(self.reloaded(written).await)
    }

    /// Read a record back after its write succeeded.
    ///
    /// Falls back to `written` when the read fails, so a persisted change is never
    /// reported as a failure.
    async fn reloaded(&self, written: ChangeRequest) -> ChangeRequest {
        match self.repository.find_by_id(written.id).await {
            Ok(Some(stored)) => stored,
            Ok(None) => {
                tracing::warn!(cr_id = %written.id, "Change request missing on read back");
                written
            },
            Err(error) => {
                metrics::counter!("change_request.read_back.failed").increment(1);
                tracing::warn!(
                    cr_id = %written.id,
                    %error,
                    "Failed to read back change request, returning the written record"
                );
                written
            },
        }
    }

    fn replayed(&self, record: ChangeRequest) -> ChangeRequest {
        metrics::counter!("change_request.apply_replayed").increment(1);
        tracing::debug!(
            cr_id = %record.id,
            idempotency_key = ?record.idempotency_key,
            "Apply replayed with matching idempotency key"
        );
        record
    }

    /// Count and log a rejected decision on its way out.
    fn checked<T>(&self, decision: Result<T, WorkflowError>) -> Result<T, WorkflowError> {
        decision.map_err(|error| self.rejected(error))
    }

    fn rejected(&self, error: WorkflowError) -> WorkflowError {
        if let WorkflowError::InvalidTransition {
            id,
            from,
            operation,
            reason,
        } = &error
        {
            metrics::counter!("change_request.rejected", "operation" => operation.as_str()).increment(1);
            tracing::warn!(cr_id = %id, %from, %operation, %reason, "Change request transition rejected");
        }
        error
    }

    /// The conditional write matched no row although the re-read record still allows the
    /// transition: another writer changed the row in between.
    fn conflict(&self, record: &ChangeRequest, operation: Operation) -> WorkflowError {
        self.rejected(WorkflowError::InvalidTransition {
            id: record.id,
            from: record.status,
            operation,
            reason: "concurrent update of the change request".to_string(),
        })
    }

    async fn notify(&self, id: ChangeRequestId, event_type: &'static str, emission: SinkFuture<'_>) {
        if let Err(error) = emission.await {
            metrics::counter!("change_request.events.failed", "type" => event_type).increment(1);
            tracing::error!(
                cr_id = %id,
                event_type,
                %error,
                "Failed to emit change request event, state change is persisted"
            );
        }
    }
}

impl std::fmt::Debug for ChangeRequestWorkflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeRequestWorkflow").finish_non_exhaustive()
    }
}
