//! Correlation id middleware.
//!
//! Each request gets the UUID from its `X-Correlation-ID` header, or a fresh one when
//! the header is missing or malformed. The handler then runs inside
//!
//! - an `http_request` tracing span with a `correlation_id` field
//! - a [`crflow_core::correlation`] scope, so published lifecycle events carry the id
//!   in their metadata
//!
//! and the id is echoed on the response.
//!
//! ```ignore
//! let app = Router::new()
//!     .route("/cr/:id", get(get_change_request))
//!     .layer(axum::middleware::from_fn(correlate));
//! ```

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use crflow_core::correlation;
use tracing::Instrument;
use uuid::Uuid;

/// Header name for correlation ID.
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";

/// Run the rest of the stack under the request's correlation id.
pub async fn correlate(request: Request, next: Next) -> Response {
    let correlation_id = request
        .headers()
        .get(CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4);

    let span = tracing::info_span!(
        "http_request",
        correlation_id = %correlation_id,
        method = %request.method(),
        uri = %request.uri(),
    );

    let mut response = correlation::scope(correlation_id, next.run(request))
        .instrument(span)
        .await;

    if let Ok(value) = HeaderValue::from_str(&correlation_id.to_string()) {
        response.headers_mut().insert(CORRELATION_ID_HEADER, value);
    }
    response
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use axum::{Router, body::Body, routing::get};
    use tower::ServiceExt;

    /// Echoes the correlation id the handler observes.
    fn app() -> Router {
        Router::new()
            .route(
                "/test",
                get(|| async { correlation::current().map_or_else(|| "missing".to_string(), |id| id.to_string()) }),
            )
            .layer(axum::middleware::from_fn(correlate))
    }

    async fn send(header: Option<&str>) -> (String, String) {
        let mut request = Request::builder().uri("/test");
        if let Some(value) = header {
            request = request.header(CORRELATION_ID_HEADER, value);
        }

        let response = app()
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap();

        let echoed = response
            .headers()
            .get(CORRELATION_ID_HEADER)
            .expect("Correlation ID header should be present")
            .to_str()
            .unwrap()
            .to_string();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (echoed, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn generated_when_missing() {
        let (echoed, seen) = send(None).await;

        assert!(Uuid::parse_str(&echoed).is_ok());
        assert_eq!(seen, echoed);
    }

    #[tokio::test]
    async fn request_id_reaches_the_handler_and_the_response() {
        let request_id = Uuid::new_v4().to_string();

        let (echoed, seen) = send(Some(&request_id)).await;

        assert_eq!(echoed, request_id);
        assert_eq!(seen, request_id);
    }

    #[tokio::test]
    async fn malformed_id_is_replaced() {
        let (echoed, seen) = send(Some("not-a-uuid")).await;

        assert_ne!(echoed, "not-a-uuid");
        assert!(Uuid::parse_str(&echoed).is_ok());
        assert_eq!(seen, echoed);
    }
}
