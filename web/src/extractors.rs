//! Custom Axum extractors.
//!
//! - `ChangeRequestIdParam`: a change request id from the path, `400` when malformed
//! - `OptionalIdempotencyKey`: the `Idempotency-Key` header, validated
//!
//! # Examples
//!
//! ```ignore
//! async fn apply(
//!     State(state): State<AppState>,
//!     ChangeRequestIdParam(id): ChangeRequestIdParam,
//!     OptionalIdempotencyKey(key): OptionalIdempotencyKey,
//! ) -> Result<Json<ChangeRequest>, AppError> {
//!     Ok(Json(state.workflow.apply(id, key).await?))
//! }
//! ```

use crate::error::AppError;
use axum::{
    async_trait,
    extract::{FromRequestParts, Path},
    http::request::Parts,
};
use crflow_core::ChangeRequestId;

/// Header carrying the client's idempotency key for `apply`.
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// Longest accepted idempotency key, in characters.
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;

/// Change request id taken from the `:id` path segment.
///
/// Rejects with `400 BAD_REQUEST` when the segment is not a UUID.
#[derive(Debug, Clone, Copy)]
pub struct ChangeRequestIdParam(pub ChangeRequestId);

#[async_trait]
impl<S> FromRequestParts<S> for ChangeRequestIdParam
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| AppError::bad_request(rejection.body_text()))?;

        raw.parse::<ChangeRequestId>()
            .map(Self)
            .map_err(|_| AppError::bad_request(format!("Invalid change request id: {raw}")))
    }
}

/// Optional `Idempotency-Key` header.
///
/// A missing header yields `None`. A key that is not valid UTF-8, is blank, or is
/// longer than [`MAX_IDEMPOTENCY_KEY_LEN`] characters is rejected with `400`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionalIdempotencyKey(pub Option<String>);

#[async_trait]
impl<S> FromRequestParts<S> for OptionalIdempotencyKey
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get(IDEMPOTENCY_KEY_HEADER) else {
            return Ok(Self(None));
        };

        let key = value
            .to_str()
            .map_err(|_| AppError::bad_request("Idempotency-Key must be valid UTF-8"))?;

        if key.trim().is_empty() {
            return Err(AppError::bad_request("Idempotency-Key must not be empty"));
        }
        if key.chars().count() > MAX_IDEMPOTENCY_KEY_LEN {
            return Err(AppError::bad_request(format!(
                "Idempotency-Key must be at most {MAX_IDEMPOTENCY_KEY_LEN} characters"
            )));
        }

        Ok(Self(Some(key.to_string())))
    }
}
