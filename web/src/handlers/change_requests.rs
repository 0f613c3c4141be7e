//! Change request endpoints.
//!
//! | Method | Path | Workflow call | Success |
//! |---|---|---|---|
//! | `POST` | `/cr?dryRun=` | `create_draft` | `201` + `Location` |
//! | `GET` | `/cr/:id` | `get` | `200` |
//! | `POST` | `/cr/:id/approve` | `approve` | `200` |
//! | `POST` | `/cr/:id/apply` | `apply` (`Idempotency-Key` header) | `200` |
//!
//! Every success body is the full change request record.

use crate::WebResult;
use crate::error::AppError;
use crate::extractors::{ChangeRequestIdParam, OptionalIdempotencyKey};
use crate::state::AppState;
use axum::{
    Json,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{StatusCode, header},
};
use crflow_core::change_request::{NewChangeRequest, customer_id_from_json};
use crflow_core::ChangeRequest;
use serde::Deserialize;
use serde_json::Value;

/// Query parameters of `POST /cr`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CreateParams {
    /// Whether the change request needs approval before apply (default `true`).
    #[serde(rename = "dryRun", default = "default_dry_run")]
    pub dry_run: bool,
}

const fn default_dry_run() -> bool {
    true
}

/// Create a change request.
///
/// The body is `{domain, table, operation, filter, proposed_changes, customer_id}`;
/// every field is optional.
///
/// # Errors
///
/// `400` for a malformed query, body, or field type; `500` on storage failure.
pub async fn create_change_request(
    State(state): State<AppState>,
    params: Result<Query<CreateParams>, QueryRejection>,
    body: Result<Json<Value>, JsonRejection>,
) -> WebResult<(StatusCode, [(header::HeaderName, String); 1], Json<ChangeRequest>)> {
    let Query(params) = params.map_err(|rejection| AppError::bad_request(rejection.body_text()))?;
    let Json(body) = body.map_err(|rejection| AppError::bad_request(rejection.body_text()))?;

    let draft = NewChangeRequest::from_json(&body)?;
    let customer_id = customer_id_from_json(&body)?;

    let cr = state
        .workflow
        .create_draft(draft, params.dry_run, customer_id)
        .await?;

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, format!("/cr/{}", cr.id))],
        Json(cr),
    ))
}

/// Fetch a change request.
///
/// # Errors
///
/// `400` for a malformed id, `404` if unknown.
pub async fn get_change_request(
    State(state): State<AppState>,
    ChangeRequestIdParam(id): ChangeRequestIdParam,
) -> WebResult<Json<ChangeRequest>> {
    Ok(Json(state.workflow.get(id).await?))
}

/// Approve a change request.
///
/// # Errors
///
/// `404` if unknown, `409` if already applied.
pub async fn approve_change_request(
    State(state): State<AppState>,
    ChangeRequestIdParam(id): ChangeRequestIdParam,
) -> WebResult<Json<ChangeRequest>> {
    Ok(Json(state.workflow.approve(id).await?))
}

/// Apply an approved change request.
///
/// Repeating the call with the same `Idempotency-Key` returns the applied record
/// unchanged.
///
/// # Errors
///
/// `400` for an invalid key, `404` if unknown, `409` if not approved or applied
/// under a different key.
pub async fn apply_change_request(
    State(state): State<AppState>,
    ChangeRequestIdParam(id): ChangeRequestIdParam,
    OptionalIdempotencyKey(key): OptionalIdempotencyKey,
) -> WebResult<Json<ChangeRequest>> {
    Ok(Json(state.workflow.apply(id, key).await?))
}
