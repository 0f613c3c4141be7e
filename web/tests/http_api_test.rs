//! HTTP tests for the change request API.
//!
//! The router runs in-process over the in-memory repository and a recording event
//! sink, so status codes, bodies and side effects are all observable.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

use axum::http::{HeaderName, HeaderValue, StatusCode, header};
use axum_test::{TestResponse, TestServer};
use crflow_core::ChangeRequestWorkflow;
use crflow_core::event::ChangeRequestEvent;
use crflow_core::events::BusEvents;
use crflow_core::repository::RepositoryError;
use crflow_testing::{
    InMemoryChangeRequestRepository, InMemoryEventBus, RecordingEvents, fixtures, test_clock,
};
use crflow_web::{AppState, CORRELATION_ID_HEADER, change_request_router};
use serde_json::{Value, json};
use std::sync::Arc;
use uuid::Uuid;

// ============================================================================
// Test Fixtures
// ============================================================================

struct Api {
    server: TestServer,
    repository: InMemoryChangeRequestRepository,
    events: RecordingEvents,
}

fn api() -> Api {
    let repository = InMemoryChangeRequestRepository::new();
    let events = RecordingEvents::new();
    let workflow = ChangeRequestWorkflow::new(Arc::new(repository.clone()), Arc::new(events.clone()))
        .with_clock(Arc::new(test_clock()));
    let server = TestServer::new(change_request_router(AppState::new(workflow)))
        .expect("Failed to start test server");

    Api {
        server,
        repository,
        events,
    }
}

fn idempotency_key(value: &'static str) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("idempotency-key"),
        HeaderValue::from_static(value),
    )
}

impl Api {
    async fn create(&self, dry_run: bool) -> Value {
        let response = self
            .server
            .post("/cr")
            .add_query_param("dryRun", dry_run)
            .json(&fixtures::supplier_address_update())
            .await;
        response.assert_status(StatusCode::CREATED);
        response.json::<Value>()
    }

    async fn approve(&self, id: &str) -> TestResponse {
        self.server.post(&format!("/cr/{id}/approve")).await
    }

    async fn apply(&self, id: &str, key: Option<&'static str>) -> TestResponse {
        let request = self.server.post(&format!("/cr/{id}/apply"));
        match key.map(idempotency_key) {
            Some((name, value)) => request.add_header(name, value).await,
            None => request.await,
        }
    }
}

fn id_of(record: &Value) -> String {
    record["id"].as_str().expect("id should be a string").to_string()
}

fn assert_error(response: &TestResponse, status: StatusCode, code: &str) {
    response.assert_status(status);
    let body = response.json::<Value>();
    assert_eq!(body["code"], code);
    assert!(body["message"].is_string());
}

// ============================================================================
// Create
// ============================================================================

#[tokio::test]
async fn create_defaults_to_dry_run() {
    let api = api();

    let response = api
        .server
        .post("/cr")
        .json(&fixtures::supplier_address_update())
        .await;

    response.assert_status(StatusCode::CREATED);
    let body = response.json::<Value>();
    assert_eq!(body["status"], "PENDING_APPROVAL");
    assert_eq!(body["customer_id"], "acme");
    assert_eq!(body["table_name"], "supplier_address");
    assert_eq!(body["filter"], json!({"id": 7}));
    assert_eq!(body["proposed_changes"], json!({"city": "Berlin"}));
    assert_eq!(body["idempotency_key"], Value::Null);

    let location = response
        .headers()
        .get(header::LOCATION)
        .expect("Location header should be present");
    assert_eq!(location.to_str().unwrap(), format!("/cr/{}", id_of(&body)));
}

#[tokio::test]
async fn create_without_dry_run_is_created() {
    let api = api();

    let body = api.create(false).await;

    assert_eq!(body["status"], "CREATED");
}

#[tokio::test]
async fn create_rejects_malformed_bodies_before_writing() {
    let api = api();

    let not_object = api.server.post("/cr").json(&json!(["a", "b"])).await;
    assert_error(&not_object, StatusCode::BAD_REQUEST, "BAD_REQUEST");

    let bad_field = api.server.post("/cr").json(&json!({"domain": 42})).await;
    assert_error(&bad_field, StatusCode::BAD_REQUEST, "BAD_REQUEST");

    let nul = api
        .server
        .post("/cr")
        .json(&json!({"table": "supplier_address", "proposed_changes": {"city": "Ber\u{0}lin"}}))
        .await;
    assert_error(&nul, StatusCode::BAD_REQUEST, "BAD_REQUEST");

    let not_json = api.server.post("/cr").text("{not json").await;
    assert_error(&not_json, StatusCode::BAD_REQUEST, "BAD_REQUEST");

    let bad_flag = api
        .server
        .post("/cr")
        .add_query_param("dryRun", "maybe")
        .json(&fixtures::supplier_address_update())
        .await;
    assert_error(&bad_flag, StatusCode::BAD_REQUEST, "BAD_REQUEST");

    assert!(api.repository.is_empty());
    assert!(api.events.is_empty());
}

// ============================================================================
// Get
// ============================================================================

#[tokio::test]
async fn get_returns_the_created_record() {
    let api = api();
    let created = api.create(true).await;

    let response = api.server.get(&format!("/cr/{}", id_of(&created))).await;

    response.assert_status_ok();
    response.assert_json(&created);
}

#[tokio::test]
async fn unknown_ids_are_not_found() {
    let api = api();
    let id = Uuid::new_v4().to_string();

    assert_error(&api.server.get(&format!("/cr/{id}")).await, StatusCode::NOT_FOUND, "NOT_FOUND");
    assert_error(&api.approve(&id).await, StatusCode::NOT_FOUND, "NOT_FOUND");
    assert_error(&api.apply(&id, Some("k1")).await, StatusCode::NOT_FOUND, "NOT_FOUND");
}

#[tokio::test]
async fn malformed_ids_are_bad_requests() {
    let api = api();

    assert_error(&api.server.get("/cr/not-a-uuid").await, StatusCode::BAD_REQUEST, "BAD_REQUEST");
    assert_error(&api.approve("not-a-uuid").await, StatusCode::BAD_REQUEST, "BAD_REQUEST");
    assert_error(&api.apply("not-a-uuid", None).await, StatusCode::BAD_REQUEST, "BAD_REQUEST");
}

// ============================================================================
// Approve / Apply
// ============================================================================

#[tokio::test]
async fn full_lifecycle_over_http() {
    let api = api();
    let created = api.create(true).await;
    let id = id_of(&created);

    let approved = api.approve(&id).await;
    approved.assert_status_ok();
    assert_eq!(approved.json::<Value>()["status"], "APPROVED");

    let applied = api.apply(&id, Some("k1")).await;
    applied.assert_status_ok();
    let applied = applied.json::<Value>();
    assert_eq!(applied["status"], "APPLIED");
    assert_eq!(applied["idempotency_key"], "k1");

    let replayed = api.apply(&id, Some("k1")).await;
    replayed.assert_status_ok();
    replayed.assert_json(&applied);

    let mismatch = api.apply(&id, Some("k2")).await;
    assert_error(&mismatch, StatusCode::CONFLICT, "CONFLICT");

    let stored = api.server.get(&format!("/cr/{id}")).await.json::<Value>();
    assert_eq!(stored["idempotency_key"], "k1");

    let applied_events = api
        .events
        .events()
        .into_iter()
        .filter(|event| matches!(event, ChangeRequestEvent::Applied { .. }))
        .count();
    assert_eq!(applied_events, 1);
}

#[tokio::test]
async fn apply_before_approval_conflicts() {
    let api = api();
    let created = api.create(false).await;

    let response = api.apply(&id_of(&created), Some("k1")).await;

    assert_error(&response, StatusCode::CONFLICT, "CONFLICT");
}

#[tokio::test]
async fn approve_after_apply_conflicts() {
    let api = api();
    let id = id_of(&api.create(true).await);
    api.approve(&id).await.assert_status_ok();
    api.apply(&id, None).await.assert_status_ok();

    assert_error(&api.approve(&id).await, StatusCode::CONFLICT, "CONFLICT");
}

#[tokio::test]
async fn invalid_idempotency_key_is_rejected() {
    let api = api();
    let id = id_of(&api.create(true).await);
    api.approve(&id).await.assert_status_ok();

    let too_long = "k".repeat(256);
    let response = api
        .server
        .post(&format!("/cr/{id}/apply"))
        .add_header(
            HeaderName::from_static("idempotency-key"),
            HeaderValue::from_str(&too_long).unwrap(),
        )
        .await;

    assert_error(&response, StatusCode::BAD_REQUEST, "BAD_REQUEST");
    let stored = api.server.get(&format!("/cr/{id}")).await.json::<Value>();
    assert_eq!(stored["status"], "APPROVED");
}

// ============================================================================
// Failures and cross-cutting behavior
// ============================================================================

#[tokio::test]
async fn storage_failures_are_internal_errors_without_details() {
    let api = api();
    api.repository
        .fail_with(RepositoryError::Database("connection refused".to_string()));

    let response = api
        .server
        .post("/cr")
        .json(&fixtures::supplier_address_update())
        .await;

    assert_error(&response, StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_SERVER_ERROR");
    assert!(!response.text().contains("connection refused"));
}

#[tokio::test]
async fn failing_event_sink_does_not_fail_requests() {
    let api = api();
    api.events.set_failing(true);

    let id = id_of(&api.create(true).await);
    api.approve(&id).await.assert_status_ok();
    api.apply(&id, Some("k1")).await.assert_status_ok();

    let stored = api.server.get(&format!("/cr/{id}")).await.json::<Value>();
    assert_eq!(stored["status"], "APPLIED");
}

#[tokio::test]
async fn correlation_id_is_echoed() {
    let api = api();
    let correlation_id = Uuid::new_v4().to_string();

    let response = api
        .server
        .get("/health")
        .add_header(
            HeaderName::from_static("x-correlation-id"),
            HeaderValue::from_str(&correlation_id).unwrap(),
        )
        .await;

    response.assert_status_ok();
    let echoed = response
        .headers()
        .get(CORRELATION_ID_HEADER)
        .expect("correlation header should be present");
    assert_eq!(echoed.to_str().unwrap(), correlation_id);
}

#[tokio::test]
async fn correlation_id_reaches_published_event_metadata() {
    let bus = InMemoryEventBus::new();
    let workflow = ChangeRequestWorkflow::new(
        Arc::new(InMemoryChangeRequestRepository::new()),
        Arc::new(BusEvents::new(Arc::new(bus.clone()), "change-request-events")),
    );
    let server = TestServer::new(change_request_router(AppState::new(workflow))).unwrap();
    let correlation_id = Uuid::new_v4().to_string();

    server
        .post("/cr")
        .add_header(
            HeaderName::from_static("x-correlation-id"),
            HeaderValue::from_str(&correlation_id).unwrap(),
        )
        .json(&fixtures::supplier_address_update())
        .await
        .assert_status(StatusCode::CREATED);

    let published = bus.published_to("change-request-events");
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].event_type, "CR_CREATED");
    assert_eq!(
        published[0].metadata,
        Some(json!({ "correlation_id": correlation_id }))
    );
}

#[tokio::test]
async fn health_reports_version() {
    let api = api();

    let response = api.server.get("/health").await;

    response.assert_status_ok();
    response.assert_json(&json!({"status": "ok", "version": env!("CARGO_PKG_VERSION")}));
}
