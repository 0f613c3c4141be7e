//! Repository port for change request persistence.
//!
//! The repository is a pure side-effect port: it stores and loads records and performs
//! conditional status writes. It does NOT decide which transitions are legal; the
//! workflow engine reads the current state first and owns every guard. The
//! conditional writes only make the final compare-and-set atomic, so that two
//! concurrent callers can never both win the same transition.
//!
//! # Implementations
//!
//! - `PostgresChangeRequestRepository` (in `crflow-postgres`): production storage
//! - `InMemoryChangeRequestRepository` (in `crflow-testing`): fast, deterministic tests
//!
//! # Dyn Compatibility
//!
//! Methods return `Pin<Box<dyn Future>>` instead of using `async fn` so the workflow can
//! hold an `Arc<dyn ChangeRequestRepository>` chosen at startup.

use crate::change_request::{ChangeRequest, ChangeRequestId, ChangeRequestStatus};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by repository methods.
pub type RepositoryFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RepositoryError>> + Send + 'a>>;

/// Errors that can occur during repository operations.
#[derive(Error, Debug, Clone)]
pub enum RepositoryError {
    /// Database connection or query failed.
    #[error("Database error: {0}")]
    Database(String),

    /// A stored row could not be mapped back to a [`ChangeRequest`].
    #[error("Row mapping error: {0}")]
    RowMapping(String),

    /// A record with the same id already exists.
    #[error("Duplicate change request id: {0}")]
    Duplicate(ChangeRequestId),
}

/// Storage for change request records.
///
/// # Affected Counts
///
/// The two update methods return the number of rows they changed. `0` means either the
/// id does not exist or the row was not in a state the write was conditioned on; the
/// caller distinguishes the two by reading the record again.
///
/// # Timestamps
///
/// Updates receive the caller's `now` and must store `max(now, created_at)` as
/// `updated_at`, so `updated_at >= created_at` holds even across clock skew.
pub trait ChangeRequestRepository: Send + Sync {
    /// Persist a new record.
    ///
    /// # Errors
    ///
    /// - `Duplicate`: a record with this id exists
    /// - `Database`: the write failed
    fn insert(&self, record: &ChangeRequest) -> RepositoryFuture<'_, ()>;

    /// Load a record by id. Returns `Ok(None)` when it does not exist.
    ///
    /// # Errors
    ///
    /// - `Database`: the read failed
    /// - `RowMapping`: the stored row is corrupt
    fn find_by_id(&self, id: ChangeRequestId) -> RepositoryFuture<'_, Option<ChangeRequest>>;

    /// Set `status` on the record if its current status is one of `allowed_from`.
    ///
    /// # Errors
    ///
    /// - `Database`: the write failed
    fn update_status(
        &self,
        id: ChangeRequestId,
        status: ChangeRequestStatus,
        allowed_from: &[ChangeRequestStatus],
        now: DateTime<Utc>,
    ) -> RepositoryFuture<'_, u64>;

    /// Mark the record `APPLIED` with `idempotency_key`, only if it is currently
    /// `APPROVED`.
    ///
    /// # Errors
    ///
    /// - `Database`: the write failed
    fn update_applied(
        &self,
        id: ChangeRequestId,
        idempotency_key: Option<&str>,
        now: DateTime<Utc>,
    ) -> RepositoryFuture<'_, u64>;
}
