//! Axum HTTP API for the change request workflow.
//!
//! The web layer is the imperative shell around
//! [`ChangeRequestWorkflow`](crflow_core::ChangeRequestWorkflow): it parses requests,
//! calls the workflow, and maps results to HTTP.
//!
//! # Request Flow
//!
//! 1. **Correlation** ID is read or generated, a tracing span opened, and the id
//!    scoped so published events carry it
//! 2. **Extract** path id, query, body and `Idempotency-Key`
//! 3. **Call** the workflow operation
//! 4. **Map** the record to `200`/`201`, or the [`WorkflowError`](crflow_core::WorkflowError)
//!    to a `{"code","message"}` error body
//!
//! # Example
//!
//! ```ignore
//! use crflow_web::{AppState, change_request_router};
//!
//! let app = change_request_router(AppState::new(workflow));
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod state;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

// Re-export key types for convenience
pub use error::AppError;
pub use extractors::{
    ChangeRequestIdParam, IDEMPOTENCY_KEY_HEADER, MAX_IDEMPOTENCY_KEY_LEN, OptionalIdempotencyKey,
};
pub use middleware::{CORRELATION_ID_HEADER, correlate};
pub use state::AppState;

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;

/// Build the service router.
///
/// ```text
/// POST /cr?dryRun=         create
/// GET  /cr/:id             fetch
/// POST /cr/:id/approve     approve
/// POST /cr/:id/apply       apply (Idempotency-Key header)
/// GET  /health             liveness
/// ```
pub fn change_request_router(state: AppState) -> Router {
    Router::new()
        .route("/cr", post(handlers::create_change_request))
        .route("/cr/:id", get(handlers::get_change_request))
        .route("/cr/:id/approve", post(handlers::approve_change_request))
        .route("/cr/:id/apply", post(handlers::apply_change_request))
        .route("/health", get(handlers::health_check))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(correlate))
        .with_state(state)
}
