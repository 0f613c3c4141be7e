//! In-memory change request repository.

use chrono::{DateTime, Utc};
use crflow_core::change_request::{ChangeRequest, ChangeRequestId, ChangeRequestStatus};
use crflow_core::repository::{ChangeRequestRepository, RepositoryError, RepositoryFuture};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// `HashMap`-backed repository for fast, deterministic tests.
///
/// Every method runs under one lock, so conditional updates are atomic exactly like
/// the `UPDATE … WHERE status = …` statements of the Postgres adapter.
///
/// Failures can be injected with [`fail_with`](Self::fail_with).
#[derive(Clone, Debug, Default)]
pub struct InMemoryChangeRequestRepository {
    records: Arc<Mutex<HashMap<ChangeRequestId, ChangeRequest>>>,
    failure: Arc<Mutex<Option<RepositoryError>>>,
}

impl InMemoryChangeRequestRepository {
    /// Create an empty repository
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `error` until [`recover`](Self::recover).
    pub fn fail_with(&self, error: RepositoryError) {
        *self.failure.lock().unwrap() = Some(error);
    }

    /// Stop injecting failures
    pub fn recover(&self) {
        *self.failure.lock().unwrap() = None;
    }

    /// Number of stored records
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    /// Check if the repository is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().unwrap().is_empty()
    }

    /// Snapshot of a stored record, bypassing failure injection
    #[must_use]
    pub fn snapshot(&self, id: ChangeRequestId) -> Option<ChangeRequest> {
        self.records.lock().unwrap().get(&id).cloned()
    }

    /// Store `record` as-is, replacing any record with the same id.
    ///
    /// Lets tests seed states the workflow would not produce on its own.
    pub fn seed(&self, record: ChangeRequest) {
        self.records.lock().unwrap().insert(record.id, record);
    }

    fn check(&self) -> Result<(), RepositoryError> {
        match self.failure.lock().unwrap().as_ref() {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn update_where<F>(
        &self,
        id: ChangeRequestId,
        now: DateTime<Utc>,
        allowed: impl Fn(ChangeRequestStatus) -> bool,
        mutate: F,
    ) -> Result<u64, RepositoryError>
    where
        F: FnOnce(&mut ChangeRequest),
    {
        self.check()?;
        let mut records = self.records.lock().unwrap();
        match records.get_mut(&id) {
            Some(record) if allowed(record.status) => {
                mutate(record);
                record.updated_at = now.max(record.created_at);
                Ok(1)
            },
            _ => Ok(0),
        }
    }
}

impl ChangeRequestRepository for InMemoryChangeRequestRepository {
    fn insert(&self, record: &ChangeRequest) -> RepositoryFuture<'_, ()> {
        let result = self.check().and_then(|()| {
            let mut records = self.records.lock().unwrap();
            if records.contains_key(&record.id) {
                return Err(RepositoryError::Duplicate(record.id));
            }
            records.insert(record.id, record.clone());
            Ok(())
        });
        Box::pin(async move { result })
    }

    fn find_by_id(&self, id: ChangeRequestId) -> RepositoryFuture<'_, Option<ChangeRequest>> {
        let result = self.check().map(|()| self.snapshot(id));
        Box::pin(async move { result })
    }

    fn update_status(
        &self,
        id: ChangeRequestId,
        status: ChangeRequestStatus,
        allowed_from: &[ChangeRequestStatus],
        now: DateTime<Utc>,
    ) -> RepositoryFuture<'_, u64> {
        let result = self.update_where(
            id,
            now,
            |current| allowed_from.contains(&current),
            |record| record.status = status,
        );
        Box::pin(async move { result })
    }

    fn update_applied(
        &self,
        id: ChangeRequestId,
        idempotency_key: Option<&str>,
        now: DateTime<Utc>,
    ) -> RepositoryFuture<'_, u64> {
        let key = idempotency_key.map(str::to_string);
        let result = self.update_where(
            id,
            now,
            |current| current == ChangeRequestStatus::Approved,
            |record| {
                record.status = ChangeRequestStatus::Applied;
                record.idempotency_key = key;
            },
        );
        Box::pin(async move { result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_clock;
    use crflow_core::environment::Clock;
    use serde_json::json;

    fn record(status: ChangeRequestStatus) -> ChangeRequest {
        let now = test_clock().now();
        ChangeRequest {
            id: ChangeRequestId::new(),
            customer_id: "acme".to_string(),
            domain: "supplier".to_string(),
            table_name: "supplier_address".to_string(),
            operation: "update".to_string(),
            filter: json!({"id": 7}),
            proposed_changes: json!({"city": "Berlin"}),
            diff_preview: json!({"rows": 1}),
            risk_score: Some(10),
            status,
            idempotency_key: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_id() {
        let repo = InMemoryChangeRequestRepository::new();
        let cr = record(ChangeRequestStatus::Created);

        repo.insert(&cr).await.unwrap();
        let err = repo.insert(&cr).await.unwrap_err();

        assert!(matches!(err, RepositoryError::Duplicate(id) if id == cr.id));
    }

    #[tokio::test]
    async fn update_applied_only_matches_approved() {
        let repo = InMemoryChangeRequestRepository::new();
        let pending = record(ChangeRequestStatus::PendingApproval);
        let approved = record(ChangeRequestStatus::Approved);
        repo.seed(pending.clone());
        repo.seed(approved.clone());
        let now = test_clock().now();

        assert_eq!(repo.update_applied(pending.id, Some("k1"), now).await.unwrap(), 0);
        assert_eq!(repo.update_applied(approved.id, Some("k1"), now).await.unwrap(), 1);
        assert_eq!(repo.update_applied(approved.id, Some("k2"), now).await.unwrap(), 0);

        let stored = repo.snapshot(approved.id).unwrap();
        assert_eq!(stored.status, ChangeRequestStatus::Applied);
        assert_eq!(stored.idempotency_key.as_deref(), Some("k1"));
    }

    #[tokio::test]
    async fn updated_at_never_precedes_created_at() {
        let repo = InMemoryChangeRequestRepository::new();
        let cr = record(ChangeRequestStatus::Created);
        repo.seed(cr.clone());

        let skewed = cr.created_at - chrono::TimeDelta::hours(1);
        repo.update_status(
            cr.id,
            ChangeRequestStatus::Approved,
            &[ChangeRequestStatus::Created],
            skewed,
        )
        .await
        .unwrap();

        assert_eq!(repo.snapshot(cr.id).unwrap().updated_at, cr.created_at);
    }

    #[tokio::test]
    async fn injected_failure_applies_until_recovered() {
        let repo = InMemoryChangeRequestRepository::new();
        repo.fail_with(RepositoryError::Database("connection reset".to_string()));

        assert!(repo.find_by_id(ChangeRequestId::new()).await.is_err());

        repo.recover();
        assert_eq!(repo.find_by_id(ChangeRequestId::new()).await.unwrap(), None);
    }
}
