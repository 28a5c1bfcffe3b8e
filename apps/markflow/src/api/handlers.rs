//! # API Endpoint Handlers
//!
//! This module implements the actual HTTP endpoint handlers.
//!
//! The CORE never reads a clock, so every mutating handler stamps its
//! request with the server's wall time before handing it down.

use super::{
    AppState,
    types::{
        AuditEntryJson, AuditResponse, BulkSubmitRequest, BulkSubmitResponse, CgpaRequest,
        CoAttainmentRequest, CoAttainmentResponse, CoReportJson, CreateRecordRequest, GpaResponse,
        HealthResponse, PoAttainmentRequest, PoAttainmentResponse, PoReportJson, QueryRequest,
        QueryResponse, RecordResponse, SgpaRequest, SmartTotalRequest, SmartTotalResponse,
        SnapshotRequest, SnapshotResponse, StatusResponse, TransitionRequest, TransitionResponse,
        UpdateValueRequest, cohort_set, convert_scores, error_status,
    },
};
use axum::{Json, extract::Path, extract::State, http::StatusCode, response::IntoResponse};
use markflow_core::{
    DepartmentId, LifecycleState, MarkRecord, MarkflowError, Marks, RecordId, RecordKey,
    SemesterId, Session, StudentId, SubjectAssignmentId, SubjectId, Timestamp, snapshot_checksum,
    snapshot_to_bytes,
};

/// Current wall time as a CORE timestamp.
fn now() -> Timestamp {
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    Timestamp(secs)
}

// =============================================================================
// HEALTH & STATUS
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

/// Get store status.
pub async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let session = state.session.read().await;

    let response = StatusResponse {
        record_count: session.record_count(),
        audit_count: session.audit_count(),
        data_version: session.data_version(),
        cache_entries: session.cache_len(),
        persistent: session.is_persistent(),
    };

    (StatusCode::OK, Json(response))
}

// =============================================================================
// RECORD ENTRY
// =============================================================================

/// Create a mark record (or overwrite an existing Draft).
pub async fn create_record_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateRecordRequest>,
) -> impl IntoResponse {
    let actor = request.actor.to_actor();
    let key = RecordKey::new(
        StudentId(request.student),
        SubjectAssignmentId(request.assignment),
        request.component,
    );

    let mut session = state.session.write().await;
    let result = session
        .create_record(
            key,
            actor.id,
            Marks(request.marks),
            Marks(request.max_marks),
            now(),
        )
        .and_then(|id| fetch(&session, id));

    match result {
        Ok(record) => (StatusCode::OK, Json(RecordResponse::success(&record))),
        Err(e) => (error_status(&e), Json(RecordResponse::error(e.to_string()))),
    }
}

/// Update the marks value of an editable record.
pub async fn update_value_handler(
    State(state): State<AppState>,
    Json(request): Json<UpdateValueRequest>,
) -> impl IntoResponse {
    let id = RecordId(request.record_id);

    let mut session = state.session.write().await;
    let result = session
        .update_value(id, Marks(request.marks), request.expected_version)
        .and_then(|_| fetch(&session, id));

    match result {
        Ok(record) => (StatusCode::OK, Json(RecordResponse::success(&record))),
        Err(e) => (error_status(&e), Json(RecordResponse::error(e.to_string()))),
    }
}

/// Fetch a record that is known to exist.
fn fetch(session: &Session, id: RecordId) -> Result<MarkRecord, MarkflowError> {
    session.get(id)?.ok_or(MarkflowError::RecordNotFound(id))
}

/// Lookup one record by id.
pub async fn get_record_handler(
    State(state): State<AppState>,
    Path(record_id): Path<u64>,
) -> impl IntoResponse {
    let session = state.session.read().await;
    match session.get(RecordId(record_id)) {
        Ok(Some(record)) => (StatusCode::OK, Json(RecordResponse::success(&record))),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(RecordResponse::error("record not found")),
        ),
        Err(e) => (error_status(&e), Json(RecordResponse::error(e.to_string()))),
    }
}

/// Query records by filter.
pub async fn query_handler(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> impl IntoResponse {
    let session = state.session.read().await;
    match session.query(&request.to_filter()) {
        Ok(records) => (StatusCode::OK, Json(QueryResponse::from_records(&records))),
        Err(e) => (error_status(&e), Json(QueryResponse::error(e.to_string()))),
    }
}

/// The audit trail of one record.
pub async fn audit_handler(
    State(state): State<AppState>,
    Path(record_id): Path<u64>,
) -> impl IntoResponse {
    let session = state.session.read().await;
    match session.audit_trail(RecordId(record_id)) {
        Ok(entries) => (
            StatusCode::OK,
            Json(AuditResponse {
                success: true,
                entries: entries.iter().map(AuditEntryJson::from_entry).collect(),
                error: None,
            }),
        ),
        Err(e) => (
            error_status(&e),
            Json(AuditResponse {
                success: false,
                entries: Vec::new(),
                error: Some(e.to_string()),
            }),
        ),
    }
}

// =============================================================================
// WORKFLOW
// =============================================================================

/// Shared driver for the single-record workflow endpoints.
async fn transition(
    state: &AppState,
    request: TransitionRequest,
    to: LifecycleState,
) -> (StatusCode, Json<TransitionResponse>) {
    let id = RecordId(request.record_id);
    let actor = request.actor.to_actor();

    let mut session = state.session.write().await;
    let result = match to {
        LifecycleState::Submitted => session.submit(id, &actor, now()),
        LifecycleState::Approved => session.approve(id, &actor, now()),
        LifecycleState::Rejected => match request.note {
            Some(reason) => session.reject(id, &actor, now(), reason),
            None => Err(MarkflowError::MissingReason),
        },
        LifecycleState::Draft => session.redraft(id, &actor, now()),
        LifecycleState::Frozen => session.freeze(id, &actor, now()),
        LifecycleState::Published => session.publish(id, &actor, now()),
    };

    match result {
        Ok(record) => (StatusCode::OK, Json(TransitionResponse::success(&record))),
        Err(e) => (
            error_status(&e),
            Json(TransitionResponse::error(request.record_id, e.to_string())),
        ),
    }
}

/// Draft -> Submitted.
pub async fn submit_handler(
    State(state): State<AppState>,
    Json(request): Json<TransitionRequest>,
) -> impl IntoResponse {
    transition(&state, request, LifecycleState::Submitted).await
}

/// Submitted -> Approved.
pub async fn approve_handler(
    State(state): State<AppState>,
    Json(request): Json<TransitionRequest>,
) -> impl IntoResponse {
    transition(&state, request, LifecycleState::Approved).await
}

/// Submitted -> Rejected (note mandatory).
pub async fn reject_handler(
    State(state): State<AppState>,
    Json(request): Json<TransitionRequest>,
) -> impl IntoResponse {
    transition(&state, request, LifecycleState::Rejected).await
}

/// Rejected -> Draft.
pub async fn redraft_handler(
    State(state): State<AppState>,
    Json(request): Json<TransitionRequest>,
) -> impl IntoResponse {
    transition(&state, request, LifecycleState::Draft).await
}

/// Approved -> Frozen.
pub async fn freeze_handler(
    State(state): State<AppState>,
    Json(request): Json<TransitionRequest>,
) -> impl IntoResponse {
    transition(&state, request, LifecycleState::Frozen).await
}

/// Frozen -> Published.
pub async fn publish_handler(
    State(state): State<AppState>,
    Json(request): Json<TransitionRequest>,
) -> impl IntoResponse {
    transition(&state, request, LifecycleState::Published).await
}

/// Administrative override: Frozen -> Draft, admin only, note mandatory.
pub async fn reopen_handler(
    State(state): State<AppState>,
    Json(request): Json<TransitionRequest>,
) -> impl IntoResponse {
    let id = RecordId(request.record_id);
    let actor = request.actor.to_actor();

    let mut session = state.session.write().await;
    let result = match request.note {
        Some(reason) => session.administrative_reopen(id, &actor, now(), reason),
        None => Err(MarkflowError::MissingReason),
    };

    match result {
        Ok(record) => (StatusCode::OK, Json(TransitionResponse::success(&record))),
        Err(e) => (
            error_status(&e),
            Json(TransitionResponse::error(request.record_id, e.to_string())),
        ),
    }
}

/// Submit a batch of records; partial failure is the contract.
pub async fn bulk_submit_handler(
    State(state): State<AppState>,
    Json(request): Json<BulkSubmitRequest>,
) -> impl IntoResponse {
    let ids: Vec<RecordId> = request.record_ids.iter().map(|&id| RecordId(id)).collect();
    let actor = request.actor.to_actor();

    let mut session = state.session.write().await;
    match session.bulk_submit(&ids, &actor, now()) {
        Ok(outcomes) => (
            StatusCode::OK,
            Json(BulkSubmitResponse::from_outcomes(&outcomes)),
        ),
        Err(e) => (
            error_status(&e),
            Json(BulkSubmitResponse::error(e.to_string())),
        ),
    }
}

// =============================================================================
// SMART MARKS
// =============================================================================

/// Best-of-two total and grade for one (student, assignment).
pub async fn smart_total_handler(
    State(state): State<AppState>,
    Json(request): Json<SmartTotalRequest>,
) -> impl IntoResponse {
    let Some(scheme) = state
        .academic
        .scheme_for(SubjectAssignmentId(request.assignment))
    else {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(SmartTotalResponse::error(format!(
                "no scheme configured for assignment {}",
                request.assignment
            ))),
        );
    };

    let session = state.session.read().await;
    match session.smart_total(StudentId(request.student), scheme, &state.academic.scale) {
        Ok(total) => (StatusCode::OK, Json(SmartTotalResponse::success(&total))),
        Err(e) => (
            error_status(&e),
            Json(SmartTotalResponse::error(e.to_string())),
        ),
    }
}

/// SGPA for one student over one semester.
pub async fn sgpa_handler(
    State(state): State<AppState>,
    Json(request): Json<SgpaRequest>,
) -> impl IntoResponse {
    let session = state.session.read().await;
    match session.sgpa(
        StudentId(request.student),
        SemesterId(request.semester),
        &state.academic.schemes,
        &state.academic.scale,
    ) {
        Ok(gpa) => (StatusCode::OK, Json(GpaResponse::from_gpa(gpa))),
        Err(e) => (error_status(&e), Json(GpaResponse::error(e.to_string()))),
    }
}

/// CGPA for one student across all configured semesters.
pub async fn cgpa_handler(
    State(state): State<AppState>,
    Json(request): Json<CgpaRequest>,
) -> impl IntoResponse {
    let session = state.session.read().await;
    match session.cgpa(
        StudentId(request.student),
        &state.academic.schemes,
        &state.academic.scale,
    ) {
        Ok(gpa) => (StatusCode::OK, Json(GpaResponse::from_gpa(gpa))),
        Err(e) => (error_status(&e), Json(GpaResponse::error(e.to_string()))),
    }
}

// =============================================================================
// ATTAINMENT
// =============================================================================

/// CO attainment for one subject.
pub async fn co_attainment_handler(
    State(state): State<AppState>,
    Json(request): Json<CoAttainmentRequest>,
) -> impl IntoResponse {
    let scores = match convert_scores(&request.scores) {
        Ok(scores) => scores,
        Err(e) => {
            return (
                error_status(&e),
                Json(CoAttainmentResponse::error(e.to_string())),
            );
        }
    };
    let cohort = cohort_set(&request.cohort);

    let mut session = state.session.write().await;
    match session.co_attainment(
        &state.academic.outcome,
        SubjectId(request.subject),
        &state.academic.schemes,
        &scores,
        cohort.as_ref(),
    ) {
        Ok(reports) => (
            StatusCode::OK,
            Json(CoAttainmentResponse {
                success: true,
                reports: reports.iter().map(CoReportJson::from_report).collect(),
                error: None,
            }),
        ),
        Err(e) => (
            error_status(&e),
            Json(CoAttainmentResponse::error(e.to_string())),
        ),
    }
}

/// PO attainment for one department.
pub async fn po_attainment_handler(
    State(state): State<AppState>,
    Json(request): Json<PoAttainmentRequest>,
) -> impl IntoResponse {
    let scores = match convert_scores(&request.scores) {
        Ok(scores) => scores,
        Err(e) => {
            return (
                error_status(&e),
                Json(PoAttainmentResponse::error(e.to_string())),
            );
        }
    };
    let cohort = cohort_set(&request.cohort);

    let mut session = state.session.write().await;
    match session.po_attainment(
        &state.academic.outcome,
        DepartmentId(request.department),
        &state.academic.schemes,
        &scores,
        cohort.as_ref(),
    ) {
        Ok(reports) => (
            StatusCode::OK,
            Json(PoAttainmentResponse {
                success: true,
                reports: reports.iter().map(PoReportJson::from_report).collect(),
                error: None,
            }),
        ),
        Err(e) => (
            error_status(&e),
            Json(PoAttainmentResponse::error(e.to_string())),
        ),
    }
}

/// Capture an attainment snapshot for audit.
pub async fn snapshot_handler(
    State(state): State<AppState>,
    Json(request): Json<SnapshotRequest>,
) -> impl IntoResponse {
    let scores = match convert_scores(&request.scores) {
        Ok(scores) => scores,
        Err(e) => {
            return (
                error_status(&e),
                Json(SnapshotResponse::error(e.to_string())),
            );
        }
    };
    let cohort = cohort_set(&request.cohort);

    let mut session = state.session.write().await;
    let co_reports = match session.co_attainment(
        &state.academic.outcome,
        SubjectId(request.subject),
        &state.academic.schemes,
        &scores,
        cohort.as_ref(),
    ) {
        Ok(reports) => reports,
        Err(e) => {
            return (
                error_status(&e),
                Json(SnapshotResponse::error(e.to_string())),
            );
        }
    };
    let po_reports = match session.po_attainment(
        &state.academic.outcome,
        DepartmentId(request.department),
        &state.academic.schemes,
        &scores,
        cohort.as_ref(),
    ) {
        Ok(reports) => reports,
        Err(e) => {
            return (
                error_status(&e),
                Json(SnapshotResponse::error(e.to_string())),
            );
        }
    };

    let snapshot = session.take_snapshot(&state.academic.outcome, &co_reports, &po_reports, now());
    match (snapshot_to_bytes(&snapshot), snapshot_checksum(&snapshot)) {
        (Ok(bytes), Ok(checksum)) => {
            (StatusCode::OK, Json(SnapshotResponse::success(bytes, checksum)))
        }
        (Err(e), _) | (_, Err(e)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(SnapshotResponse::error(e.to_string())),
        ),
    }
}
