//! `PostgreSQL` change request repository.
//!
//! Implements [`ChangeRequestRepository`] on a `sqlx` connection pool. Records live in
//! the `change_request` table; the structured payloads are `JSONB` columns.
//!
//! Queries are checked at runtime (`sqlx::query` with binds), so building this crate
//! needs no database.
//!
//! # Conditional Writes
//!
//! Both update methods are single `UPDATE … WHERE id = $1 AND status …` statements.
//! Postgres row locking makes them atomic, so of two racing transitions exactly one
//! reports an affected row.
//!
//! # Example
//!
//! ```ignore
//! use crflow_postgres::PostgresChangeRequestRepository;
//!
//! let repository = PostgresChangeRequestRepository::connect("postgres://localhost/mdm").await?;
//! repository.migrate().await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use chrono::{DateTime, Utc};
use crflow_core::change_request::{ChangeRequest, ChangeRequestId, ChangeRequestStatus};
use crflow_core::repository::{ChangeRequestRepository, RepositoryError, RepositoryFuture};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use uuid::Uuid;

const SELECT_COLUMNS: &str = r"
    SELECT
        id, customer_id, domain, table_name, operation,
        filter_json, proposed_changes_json, diff_preview_json,
        risk_score, status, idempotency_key, created_at, updated_at
    FROM change_request
";

/// `PostgreSQL`-backed change request repository.
#[derive(Clone, Debug)]
pub struct PostgresChangeRequestRepository {
    pool: PgPool,
}

impl PostgresChangeRequestRepository {
    /// Create a repository on an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect with a default pool of 10 connections.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Database`] if the connection fails.
    pub async fn connect(database_url: &str) -> Result<Self, RepositoryError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| RepositoryError::Database(format!("Failed to connect: {e}")))?;

        Ok(Self::new(pool))
    }

    /// Run the embedded migrations (creates `change_request` if missing).
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Database`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), RepositoryError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn insert_record(&self, record: &ChangeRequest) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO change_request (
                id, customer_id, domain, table_name, operation,
                filter_json, proposed_changes_json, diff_preview_json,
                risk_score, status, idempotency_key, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ",
        )
        .bind(record.id.as_uuid())
        .bind(&record.customer_id)
        .bind(&record.domain)
        .bind(&record.table_name)
        .bind(&record.operation)
        .bind(&record.filter)
        .bind(&record.proposed_changes)
        .bind(&record.diff_preview)
        .bind(record.risk_score)
        .bind(record.status.as_str())
        .bind(record.idempotency_key.as_deref())
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| insert_error(record.id, e))?;

        tracing::debug!(cr_id = %record.id, status = %record.status, "Inserted change request");
        Ok(())
    }

    async fn select_by_id(&self, id: ChangeRequestId) -> Result<Option<ChangeRequest>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        row.as_ref().map(change_request_from_row).transpose()
    }

    async fn set_status(
        &self,
        id: ChangeRequestId,
        status: ChangeRequestStatus,
        allowed_from: Vec<&'static str>,
        now: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE change_request
            SET status = $2, updated_at = GREATEST($4, created_at)
            WHERE id = $1 AND status = ANY($3)
            ",
        )
        .bind(id.as_uuid())
        .bind(status.as_str())
        .bind(allowed_from)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        tracing::debug!(cr_id = %id, %status, affected = result.rows_affected(), "Updated change request status");
        Ok(result.rows_affected())
    }

    async fn set_applied(
        &self,
        id: ChangeRequestId,
        idempotency_key: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE change_request
            SET status = 'APPLIED', idempotency_key = $2, updated_at = GREATEST($3, created_at)
            WHERE id = $1 AND status = 'APPROVED'
            ",
        )
        .bind(id.as_uuid())
        .bind(idempotency_key)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        tracing::debug!(cr_id = %id, affected = result.rows_affected(), "Marked change request applied");
        Ok(result.rows_affected())
    }
}

impl ChangeRequestRepository for PostgresChangeRequestRepository {
    fn insert(&self, record: &ChangeRequest) -> RepositoryFuture<'_, ()> {
        let record = record.clone();
        Box::pin(async move { self.insert_record(&record).await })
    }

    fn find_by_id(&self, id: ChangeRequestId) -> RepositoryFuture<'_, Option<ChangeRequest>> {
        Box::pin(self.select_by_id(id))
    }

    fn update_status(
        &self,
        id: ChangeRequestId,
        status: ChangeRequestStatus,
        allowed_from: &[ChangeRequestStatus],
        now: DateTime<Utc>,
    ) -> RepositoryFuture<'_, u64> {
        let allowed_from = allowed_from.iter().map(ChangeRequestStatus::as_str).collect();
        Box::pin(self.set_status(id, status, allowed_from, now))
    }

    fn update_applied(
        &self,
        id: ChangeRequestId,
        idempotency_key: Option<&str>,
        now: DateTime<Utc>,
    ) -> RepositoryFuture<'_, u64> {
        Box::pin(self.set_applied(id, idempotency_key.map(str::to_string), now))
    }
}

/// Map a `change_request` row to a [`ChangeRequest`].
///
/// `risk_score` and `idempotency_key` are nullable; `NULL` payload columns become `{}`.
///
/// # Errors
///
/// Returns [`RepositoryError::RowMapping`] if a column is missing, has an unexpected
/// type, or `status` holds an unknown value.
pub fn change_request_from_row(row: &PgRow) -> Result<ChangeRequest, RepositoryError> {
    let status: String = column(row, "status")?;
    let status = ChangeRequestStatus::parse(&status)
        .map_err(|e| RepositoryError::RowMapping(e.to_string()))?;
    let id: Uuid = column(row, "id")?;

    Ok(ChangeRequest {
        id: ChangeRequestId::from_uuid(id),
        customer_id: column(row, "customer_id")?,
        domain: column(row, "domain")?,
        table_name: column(row, "table_name")?,
        operation: column(row, "operation")?,
        filter: json_column(row, "filter_json")?,
        proposed_changes: json_column(row, "proposed_changes_json")?,
        diff_preview: json_column(row, "diff_preview_json")?,
        risk_score: column(row, "risk_score")?,
        status,
        idempotency_key: column(row, "idempotency_key")?,
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
    })
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, RepositoryError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(name)
        .map_err(|e| RepositoryError::RowMapping(format!("column `{name}`: {e}")))
}

fn json_column(row: &PgRow, name: &str) -> Result<serde_json::Value, RepositoryError> {
    let value: Option<serde_json::Value> = column(row, name)?;
    Ok(value.unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new())))
}

fn insert_error(id: ChangeRequestId, error: sqlx::Error) -> RepositoryError {
    match &error {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            metrics::counter!("change_request.repository.duplicate").increment(1);
            RepositoryError::Duplicate(id)
        },
        _ => RepositoryError::Database(error.to_string()),
    }
}
