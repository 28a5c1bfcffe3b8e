//! Integration tests for the markflow HTTP API.
//!
//! Uses axum-test to test the API handlers without starting a real server.

// Allow unwrap and panic in tests - these are standard for test code
// Allow holding MutexGuard across await in auth tests - tests are serialized
// intentionally to avoid env var conflicts
#![allow(clippy::unwrap_used, clippy::panic, clippy::await_holding_lock)]

use axum_test::TestServer;
use markflow::api::{
    AppState, AuditResponse, BulkSubmitResponse, CoAttainmentResponse, GpaResponse,
    HealthResponse, QueryResponse, RecordResponse, SmartTotalResponse, SnapshotResponse,
    StatusResponse, TransitionResponse, create_router,
};
use markflow::config::AcademicConfig;
use markflow_core::Session;
use serde_json::json;
use std::sync::Mutex;

/// Mutex to serialize tests since the router reads env vars.
static ENV_TEST_MUTEX: Mutex<()> = Mutex::new(());

/// Academic configuration used by the smart/attainment endpoints.
const ACADEMIC_TOML: &str = r#"
version = 1

[[subject]]
assignment = 10
subject = 5
semester = 3
credits = 4
internal_ceiling = 40
external_max = 60

[[co]]
id = 1
subject = 5
code = "CO1"
description = "Apply query optimization techniques"
level = "apply"

[[po]]
id = 1
department = 2
code = "PO1"
description = "Engineering knowledge"

[[target]]
co = 1
target_bp = 6000
l1_bp = 5000
l2_bp = 6500
l3_bp = 8000

[[mapping]]
co = 1
po = 1
strength = 3

[[question_weight]]
question = 100
co = 1
weight = 1
"#;

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Guard wrapper that holds the mutex and ensures cleanup on drop.
struct TestGuard {
    _guard: std::sync::MutexGuard<'static, ()>,
}

impl Drop for TestGuard {
    fn drop(&mut self) {
        // SAFETY: Tests run sequentially under ENV_TEST_MUTEX, so no concurrent env access.
        unsafe { std::env::remove_var("MARKFLOW_API_KEY") };
    }
}

/// Create a test server with a fresh in-memory session and the sample
/// academic configuration. Returns a guard that must be kept alive.
fn create_test_server() -> (TestServer, TestGuard) {
    let guard = ENV_TEST_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    // SAFETY: Tests run sequentially under ENV_TEST_MUTEX, so no concurrent env access.
    unsafe { std::env::remove_var("MARKFLOW_API_KEY") };
    let academic = AcademicConfig::parse(ACADEMIC_TOML).unwrap();
    let state = AppState::new(Session::new(), academic);
    let router = create_router(state);
    (
        TestServer::new(router).unwrap(),
        TestGuard { _guard: guard },
    )
}

fn owner() -> serde_json::Value {
    json!({"actor_id": 7, "role": "teacher"})
}

fn hod() -> serde_json::Value {
    json!({"actor_id": 20, "role": "department_approver"})
}

fn coe() -> serde_json::Value {
    json!({"actor_id": 30, "role": "institution_approver"})
}

/// Create a Draft record via the API; returns its id.
async fn create_record(
    server: &TestServer,
    student: u64,
    component: &str,
    marks: u32,
    max: u32,
) -> u64 {
    let response = server
        .post("/records")
        .json(&json!({
            "student": student,
            "assignment": 10,
            "component": component,
            "marks": marks,
            "max_marks": max,
            "actor": owner(),
        }))
        .await;
    response.assert_status_ok();
    let body: RecordResponse = response.json();
    body.record.unwrap().record_id
}

/// Drive a record through submit -> approve -> freeze.
async fn finalize(server: &TestServer, record_id: u64) {
    for (path, actor) in [
        ("/workflow/submit", owner()),
        ("/workflow/approve", hod()),
        ("/workflow/freeze", coe()),
    ] {
        let response = server
            .post(path)
            .json(&json!({"record_id": record_id, "actor": actor}))
            .await;
        response.assert_status_ok();
    }
}

// =============================================================================
// HEALTH & STATUS
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let (server, _guard) = create_test_server();

    let response = server.get("/health").await;

    response.assert_status_ok();
    let health: HealthResponse = response.json();
    assert_eq!(health.status, "ok");
    assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_status_empty_store() {
    let (server, _guard) = create_test_server();

    let response = server.get("/status").await;

    response.assert_status_ok();
    let status: StatusResponse = response.json();
    assert_eq!(status.record_count, 0);
    assert_eq!(status.audit_count, 0);
    assert!(!status.persistent);
}

// =============================================================================
// RECORD ENTRY & WORKFLOW
// =============================================================================

#[tokio::test]
async fn test_full_lifecycle_via_api() {
    let (server, _guard) = create_test_server();

    let id = create_record(&server, 1, "internal1", 38, 40).await;
    finalize(&server, id).await;

    let response = server
        .post("/workflow/publish")
        .json(&json!({"record_id": id, "actor": coe()}))
        .await;
    response.assert_status_ok();
    let body: TransitionResponse = response.json();
    assert_eq!(body.state.unwrap().name(), "published");

    // Four transitions, four audit entries.
    let audit = server.get(&format!("/audit/{id}")).await;
    audit.assert_status_ok();
    let trail: AuditResponse = audit.json();
    assert_eq!(trail.entries.len(), 4);
}

#[tokio::test]
async fn test_out_of_range_marks_rejected() {
    let (server, _guard) = create_test_server();

    let response = server
        .post("/records")
        .json(&json!({
            "student": 1,
            "assignment": 10,
            "component": "internal1",
            "marks": 45,
            "max_marks": 40,
            "actor": owner(),
        }))
        .await;
    response.assert_status(axum::http::StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_owner_cannot_approve_own_marks() {
    let (server, _guard) = create_test_server();

    let id = create_record(&server, 1, "internal1", 30, 40).await;
    server
        .post("/workflow/submit")
        .json(&json!({"record_id": id, "actor": owner()}))
        .await
        .assert_status_ok();

    let response = server
        .post("/workflow/approve")
        .json(&json!({"record_id": id, "actor": owner()}))
        .await;
    response.assert_status(axum::http::StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_illegal_edge_is_unprocessable() {
    let (server, _guard) = create_test_server();

    let id = create_record(&server, 1, "internal1", 30, 40).await;
    // Draft -> Frozen is not in the transition table.
    let response = server
        .post("/workflow/freeze")
        .json(&json!({"record_id": id, "actor": coe()}))
        .await;
    response.assert_status(axum::http::StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_reject_requires_note() {
    let (server, _guard) = create_test_server();

    let id = create_record(&server, 1, "internal1", 30, 40).await;
    server
        .post("/workflow/submit")
        .json(&json!({"record_id": id, "actor": owner()}))
        .await
        .assert_status_ok();

    let missing = server
        .post("/workflow/reject")
        .json(&json!({"record_id": id, "actor": hod()}))
        .await;
    missing.assert_status(axum::http::StatusCode::UNPROCESSABLE_ENTITY);

    let with_note = server
        .post("/workflow/reject")
        .json(&json!({
            "record_id": id,
            "actor": hod(),
            "note": "IA2 totals missing",
        }))
        .await;
    with_note.assert_status_ok();
}

#[tokio::test]
async fn test_stale_version_conflicts() {
    let (server, _guard) = create_test_server();

    let id = create_record(&server, 1, "internal1", 30, 40).await;
    server
        .post("/records/value")
        .json(&json!({"record_id": id, "marks": 32, "expected_version": 1}))
        .await
        .assert_status_ok();

    let stale = server
        .post("/records/value")
        .json(&json!({"record_id": id, "marks": 28, "expected_version": 1}))
        .await;
    stale.assert_status(axum::http::StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_bulk_submit_reports_per_item() {
    let (server, _guard) = create_test_server();

    let good = create_record(&server, 1, "internal1", 30, 40).await;
    let missing = 9999u64;

    let response = server
        .post("/workflow/bulk-submit")
        .json(&json!({"record_ids": [good, missing], "actor": owner()}))
        .await;
    response.assert_status_ok();

    let body: BulkSubmitResponse = response.json();
    assert_eq!(body.submitted, 1);
    assert_eq!(body.failed, 1);
    assert_eq!(body.results.len(), 2);
    assert!(body.results[0].error.is_none());
    assert!(body.results[1].error.is_some());
}

#[tokio::test]
async fn test_query_finalized_only() {
    let (server, _guard) = create_test_server();

    let frozen = create_record(&server, 1, "internal1", 30, 40).await;
    finalize(&server, frozen).await;
    create_record(&server, 2, "internal1", 22, 40).await;

    let response = server
        .post("/records/query")
        .json(&json!({"assignment": 10, "finalized_only": true}))
        .await;
    response.assert_status_ok();
    let body: QueryResponse = response.json();
    assert_eq!(body.records.len(), 1);
    assert_eq!(body.records[0].record_id, frozen);
}

// =============================================================================
// SMART MARKS
// =============================================================================

#[tokio::test]
async fn test_smart_total_best_of_two() {
    let (server, _guard) = create_test_server();

    for (component, marks, max) in [("internal1", 38, 40), ("internal2", 32, 40), ("external", 45, 60)]
    {
        let id = create_record(&server, 1, component, marks, max).await;
        finalize(&server, id).await;
    }

    let response = server
        .post("/smart/total")
        .json(&json!({"student": 1, "assignment": 10}))
        .await;
    response.assert_status_ok();
    let body: SmartTotalResponse = response.json();
    assert_eq!(body.internal, Some(38));
    assert_eq!(body.total, Some(83));
    assert_eq!(body.letter.as_deref(), Some("A+"));
}

#[tokio::test]
async fn test_smart_total_unknown_assignment() {
    let (server, _guard) = create_test_server();

    let response = server
        .post("/smart/total")
        .json(&json!({"student": 1, "assignment": 999}))
        .await;
    response.assert_status(axum::http::StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_sgpa_over_finalized_subjects() {
    let (server, _guard) = create_test_server();

    for (component, marks, max) in [("internal1", 36, 40), ("external", 54, 60)] {
        let id = create_record(&server, 1, component, marks, max).await;
        finalize(&server, id).await;
    }

    let response = server
        .post("/smart/sgpa")
        .json(&json!({"student": 1, "semester": 3}))
        .await;
    response.assert_status_ok();
    let body: GpaResponse = response.json();
    // 90/100 -> grade O -> 10.00
    assert_eq!(body.value_centi, Some(1000));
    assert_eq!(body.display.as_deref(), Some("10.00"));
}

// =============================================================================
// ATTAINMENT
// =============================================================================

#[tokio::test]
async fn test_co_attainment_reports_levels() {
    let (server, _guard) = create_test_server();

    let id = create_record(&server, 1, "internal1", 30, 40).await;
    finalize(&server, id).await;

    let response = server
        .post("/attainment/co")
        .json(&json!({
            "subject": 5,
            "scores": [
                {"student": 1, "question": 100, "earned": 18, "max": 25}
            ],
        }))
        .await;
    response.assert_status_ok();
    let body: CoAttainmentResponse = response.json();
    assert_eq!(body.reports.len(), 1);

    let report = &body.reports[0];
    assert_eq!(report.code, "CO1");
    assert!(report.outcome.computable);
    // The single assessed student is at 72% >= 60% target.
    assert_eq!(report.outcome.percent_bp, Some(10_000));
    assert_eq!(report.students[0].percent_bp, 7200);
    assert_eq!(report.students[0].level.as_deref(), Some("L2"));
}

#[tokio::test]
async fn test_attainment_snapshot_round_trip() {
    let (server, _guard) = create_test_server();

    let id = create_record(&server, 1, "internal1", 30, 40).await;
    finalize(&server, id).await;

    let response = server
        .post("/attainment/snapshot")
        .json(&json!({
            "subject": 5,
            "department": 2,
            "scores": [
                {"student": 1, "question": 100, "earned": 18, "max": 25}
            ],
        }))
        .await;
    response.assert_status_ok();
    let body: SnapshotResponse = response.json();
    assert!(body.success);

    // The returned bytes decode and verify against the checksum.
    let data = base64::Engine::decode(
        &base64::engine::general_purpose::STANDARD,
        body.data.unwrap(),
    )
    .unwrap();
    let snapshot = markflow_core::verify_snapshot(&data, body.checksum.unwrap()).unwrap();
    assert_eq!(snapshot.co_rows.len(), 1);
    assert_eq!(snapshot.po_rows.len(), 1);
}

// =============================================================================
// API KEY GATE
// =============================================================================

#[tokio::test]
async fn test_api_key_gate() {
    let guard = ENV_TEST_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    // SAFETY: Tests run sequentially under ENV_TEST_MUTEX, so no concurrent env access.
    unsafe { std::env::set_var("MARKFLOW_API_KEY", "secret-key") };
    let _guard = TestGuard { _guard: guard };

    let academic = AcademicConfig::parse(ACADEMIC_TOML).unwrap();
    let state = AppState::new(Session::new(), academic);
    let server = TestServer::new(create_router(state)).unwrap();

    // Health stays open for load balancers.
    server.get("/health").await.assert_status_ok();

    // Everything else requires the key.
    let denied = server.get("/status").await;
    denied.assert_status(axum::http::StatusCode::UNAUTHORIZED);

    let allowed = server
        .get("/status")
        .add_header(
            axum::http::header::AUTHORIZATION,
            axum::http::HeaderValue::from_static("Bearer secret-key"),
        )
        .await;
    allowed.assert_status_ok();
}
