//! # API Request/Response Types
//!
//! This module defines the JSON structures for the HTTP API.
//!
//! Actor identity and role arrive in request bodies pre-validated by the
//! upstream auth gateway; this layer only converts shapes and enforces
//! size limits before anything reaches the CORE.

use markflow_core::{
    Actor, ActorId, AttainmentOutcome, AuditEntry, BulkItemOutcome, CoAttainmentReport,
    ComponentType, LifecycleState, MarkRecord, MarkflowError, Marks, PoAttainmentReport,
    QuestionId, QuestionScore, RecordFilter, Role, StudentId, SubjectAssignmentId,
    primitives::MAX_SCORE_ROWS,
};
use serde::{Deserialize, Serialize};

// =============================================================================
// HEALTH & STATUS
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Store status response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub record_count: usize,
    pub audit_count: usize,
    pub data_version: u64,
    pub cache_entries: usize,
    pub persistent: bool,
}

// =============================================================================
// ACTORS
// =============================================================================

/// Actor identity as carried in request bodies.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ActorJson {
    pub actor_id: u64,
    pub role: Role,
}

impl ActorJson {
    /// Convert to the CORE actor type.
    #[must_use]
    pub fn to_actor(self) -> Actor {
        Actor::new(ActorId(self.actor_id), self.role)
    }
}

// =============================================================================
// RECORD ENTRY
// =============================================================================

/// Mark entry request (create or overwrite a Draft).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRecordRequest {
    pub student: u64,
    pub assignment: u64,
    pub component: ComponentType,
    pub marks: u32,
    pub max_marks: u32,
    pub actor: ActorJson,
}

/// Value update request, carrying the version the editor read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateValueRequest {
    pub record_id: u64,
    pub marks: u32,
    pub expected_version: u64,
}

/// One record as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordJson {
    pub record_id: u64,
    pub student: u64,
    pub assignment: u64,
    pub component: ComponentType,
    pub marks: u32,
    pub max_marks: u32,
    pub state: LifecycleState,
    pub version: u64,
    pub owner: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub rejection_reason: Option<String>,
}

impl RecordJson {
    #[must_use]
    pub fn from_record(record: &MarkRecord) -> Self {
        Self {
            record_id: record.id.0,
            student: record.key.student.0,
            assignment: record.key.assignment.0,
            component: record.key.component,
            marks: record.marks.value(),
            max_marks: record.max_marks.value(),
            state: record.state,
            version: record.version,
            owner: record.owner.0,
            rejection_reason: record.rejection_reason.clone(),
        }
    }
}

/// Response for record creation and value updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordResponse {
    pub success: bool,
    pub record: Option<RecordJson>,
    pub error: Option<String>,
}

impl RecordResponse {
    pub fn success(record: &MarkRecord) -> Self {
        Self {
            success: true,
            record: Some(RecordJson::from_record(record)),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            record: None,
            error: Some(msg.into()),
        }
    }
}

// =============================================================================
// WORKFLOW
// =============================================================================

/// Request for a single workflow transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub record_id: u64,
    pub actor: ActorJson,
    /// Mandatory for rejection and administrative reopen.
    #[serde(default)]
    pub note: Option<String>,
}

/// Response for a single workflow transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionResponse {
    pub success: bool,
    pub record_id: u64,
    pub state: Option<LifecycleState>,
    pub version: Option<u64>,
    pub error: Option<String>,
}

impl TransitionResponse {
    pub fn success(record: &MarkRecord) -> Self {
        Self {
            success: true,
            record_id: record.id.0,
            state: Some(record.state),
            version: Some(record.version),
            error: None,
        }
    }

    pub fn error(record_id: u64, msg: impl Into<String>) -> Self {
        Self {
            success: false,
            record_id,
            state: None,
            version: None,
            error: Some(msg.into()),
        }
    }
}

/// Bulk submission request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkSubmitRequest {
    pub record_ids: Vec<u64>,
    pub actor: ActorJson,
}

/// Per-record outcome in a bulk response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkItemJson {
    pub record_id: u64,
    pub state: Option<LifecycleState>,
    pub error: Option<String>,
}

impl BulkItemJson {
    #[must_use]
    pub fn from_outcome(outcome: &BulkItemOutcome) -> Self {
        match &outcome.outcome {
            Ok(state) => Self {
                record_id: outcome.record.0,
                state: Some(*state),
                error: None,
            },
            Err(e) => Self {
                record_id: outcome.record.0,
                state: None,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Bulk submission response: one outcome per id, in input order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkSubmitResponse {
    pub success: bool,
    pub submitted: usize,
    pub failed: usize,
    pub results: Vec<BulkItemJson>,
    pub error: Option<String>,
}

impl BulkSubmitResponse {
    #[must_use]
    pub fn from_outcomes(outcomes: &[BulkItemOutcome]) -> Self {
        let submitted = outcomes.iter().filter(|o| o.is_success()).count();
        Self {
            success: true,
            submitted,
            failed: outcomes.len() - submitted,
            results: outcomes.iter().map(BulkItemJson::from_outcome).collect(),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            submitted: 0,
            failed: 0,
            results: Vec::new(),
            error: Some(msg.into()),
        }
    }
}

// =============================================================================
// QUERY & AUDIT
// =============================================================================

/// Record query request, mirroring the CORE filter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub student: Option<u64>,
    #[serde(default)]
    pub assignment: Option<u64>,
    #[serde(default)]
    pub component: Option<ComponentType>,
    #[serde(default)]
    pub state: Option<LifecycleState>,
    #[serde(default)]
    pub finalized_only: bool,
}

impl QueryRequest {
    #[must_use]
    pub fn to_filter(&self) -> RecordFilter {
        RecordFilter {
            student: self.student.map(StudentId),
            assignment: self.assignment.map(SubjectAssignmentId),
            component: self.component,
            state: self.state,
            finalized_only: self.finalized_only,
        }
    }
}

/// Record query response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub success: bool,
    pub records: Vec<RecordJson>,
    pub error: Option<String>,
}

impl QueryResponse {
    #[must_use]
    pub fn from_records(records: &[MarkRecord]) -> Self {
        Self {
            success: true,
            records: records.iter().map(RecordJson::from_record).collect(),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            records: Vec::new(),
            error: Some(msg.into()),
        }
    }
}

/// One audit entry as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntryJson {
    pub seq: u64,
    pub record_id: u64,
    pub from: LifecycleState,
    pub to: LifecycleState,
    pub actor_id: u64,
    pub role: Role,
    pub at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub note: Option<String>,
}

impl AuditEntryJson {
    #[must_use]
    pub fn from_entry(entry: &AuditEntry) -> Self {
        Self {
            seq: entry.seq,
            record_id: entry.record.0,
            from: entry.from,
            to: entry.to,
            actor_id: entry.actor.0,
            role: entry.role,
            at: entry.at.value(),
            note: entry.note.clone(),
        }
    }
}

/// Audit trail response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditResponse {
    pub success: bool,
    pub entries: Vec<AuditEntryJson>,
    pub error: Option<String>,
}

// =============================================================================
// SMART MARKS
// =============================================================================

/// Smart total request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmartTotalRequest {
    pub student: u64,
    pub assignment: u64,
}

/// Smart total response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmartTotalResponse {
    pub success: bool,
    pub internal: Option<u32>,
    pub external: Option<u32>,
    pub total: Option<u32>,
    pub percent_bp: Option<u32>,
    pub letter: Option<String>,
    pub points: Option<u8>,
    pub error: Option<String>,
}

impl SmartTotalResponse {
    #[must_use]
    pub fn success(total: &markflow_core::SmartTotal) -> Self {
        Self {
            success: true,
            internal: Some(total.internal.value()),
            external: Some(total.external.value()),
            total: Some(total.total.value()),
            percent_bp: Some(total.percent.value()),
            letter: Some(total.letter.clone()),
            points: Some(total.points.value()),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            internal: None,
            external: None,
            total: None,
            percent_bp: None,
            letter: None,
            points: None,
            error: Some(msg.into()),
        }
    }
}

/// SGPA request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SgpaRequest {
    pub student: u64,
    pub semester: u64,
}

/// CGPA request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CgpaRequest {
    pub student: u64,
}

/// Grade-point-average response (SGPA or CGPA), centi-points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpaResponse {
    pub success: bool,
    /// Centi-points, e.g. 809 for 8.09. Absent when no subject contributes.
    pub value_centi: Option<u32>,
    pub display: Option<String>,
    pub error: Option<String>,
}

impl GpaResponse {
    #[must_use]
    pub fn from_gpa(gpa: Option<markflow_core::Gpa>) -> Self {
        Self {
            success: true,
            value_centi: gpa.map(|g| g.value()),
            display: gpa.map(|g| g.to_string()),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            value_centi: None,
            display: None,
            error: Some(msg.into()),
        }
    }
}

// =============================================================================
// ATTAINMENT
// =============================================================================

/// One question score row supplied by the assessment collaborator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoreJson {
    pub student: u64,
    pub question: u64,
    pub earned: u32,
    pub max: u32,
}

impl ScoreJson {
    #[must_use]
    pub fn to_score(self) -> QuestionScore {
        QuestionScore {
            student: StudentId(self.student),
            question: QuestionId(self.question),
            earned: Marks(self.earned),
            max: Marks(self.max),
        }
    }
}

/// Convert score rows, enforcing the batch size limit.
pub fn convert_scores(rows: &[ScoreJson]) -> Result<Vec<QuestionScore>, MarkflowError> {
    if rows.len() > MAX_SCORE_ROWS {
        return Err(MarkflowError::SerializationError(format!(
            "score rows {} exceed maximum {}",
            rows.len(),
            MAX_SCORE_ROWS
        )));
    }
    Ok(rows.iter().map(|r| r.to_score()).collect())
}

/// CO attainment request for one subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoAttainmentRequest {
    pub subject: u64,
    #[serde(default)]
    pub cohort: Option<Vec<u64>>,
    pub scores: Vec<ScoreJson>,
}

/// PO attainment request for one department.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoAttainmentRequest {
    pub department: u64,
    #[serde(default)]
    pub cohort: Option<Vec<u64>>,
    pub scores: Vec<ScoreJson>,
}

/// An attainment value or its explicit absence, as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeJson {
    pub computable: bool,
    pub percent_bp: Option<u32>,
    pub reason: Option<String>,
}

impl OutcomeJson {
    #[must_use]
    pub fn from_outcome(outcome: &AttainmentOutcome) -> Self {
        match outcome {
            AttainmentOutcome::Attained(bp) => Self {
                computable: true,
                percent_bp: Some(bp.value()),
                reason: None,
            },
            AttainmentOutcome::NotComputable(reason) => Self {
                computable: false,
                percent_bp: None,
                reason: Some(reason.to_string()),
            },
        }
    }
}

/// Per-student row of a CO report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentAttainmentJson {
    pub student: u64,
    pub percent_bp: u32,
    pub level: Option<String>,
    pub meets_target: bool,
}

/// One CO report as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoReportJson {
    pub co: u64,
    pub code: String,
    pub outcome: OutcomeJson,
    pub assessed: usize,
    pub meeting_target: usize,
    pub students: Vec<StudentAttainmentJson>,
}

impl CoReportJson {
    #[must_use]
    pub fn from_report(report: &CoAttainmentReport) -> Self {
        Self {
            co: report.co.0,
            code: report.code.clone(),
            outcome: OutcomeJson::from_outcome(&report.outcome),
            assessed: report.assessed,
            meeting_target: report.meeting_target,
            students: report
                .students
                .iter()
                .map(|s| StudentAttainmentJson {
                    student: s.student.0,
                    percent_bp: s.percent.value(),
                    level: s.level.map(|l| format!("{l:?}")),
                    meets_target: s.meets_target,
                })
                .collect(),
        }
    }
}

/// CO attainment response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoAttainmentResponse {
    pub success: bool,
    pub reports: Vec<CoReportJson>,
    pub error: Option<String>,
}

impl CoAttainmentResponse {
    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            reports: Vec::new(),
            error: Some(msg.into()),
        }
    }
}

/// One PO report as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoReportJson {
    pub po: u64,
    pub code: String,
    pub outcome: OutcomeJson,
    pub mapped: usize,
}

impl PoReportJson {
    #[must_use]
    pub fn from_report(report: &PoAttainmentReport) -> Self {
        Self {
            po: report.po.0,
            code: report.code.clone(),
            outcome: OutcomeJson::from_outcome(&report.outcome),
            mapped: report.mapped,
        }
    }
}

/// PO attainment response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoAttainmentResponse {
    pub success: bool,
    pub reports: Vec<PoReportJson>,
    pub error: Option<String>,
}

impl PoAttainmentResponse {
    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            reports: Vec::new(),
            error: Some(msg.into()),
        }
    }
}

// =============================================================================
// SNAPSHOTS
// =============================================================================

/// Attainment snapshot request: CO scope plus PO scope in one capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRequest {
    pub subject: u64,
    pub department: u64,
    #[serde(default)]
    pub cohort: Option<Vec<u64>>,
    pub scores: Vec<ScoreJson>,
}

/// Snapshot response: framed bytes (base64) plus integrity checksum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotResponse {
    pub success: bool,
    pub data: Option<String>, // Base64 encoded
    pub checksum: Option<u64>,
    pub error: Option<String>,
}

impl SnapshotResponse {
    pub fn success(data: Vec<u8>, checksum: u64) -> Self {
        Self {
            success: true,
            data: Some(base64::Engine::encode(
                &base64::engine::general_purpose::STANDARD,
                &data,
            )),
            checksum: Some(checksum),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            checksum: None,
            error: Some(msg.into()),
        }
    }
}

/// Convert an optional id list into a cohort set.
#[must_use]
pub fn cohort_set(cohort: &Option<Vec<u64>>) -> Option<std::collections::BTreeSet<StudentId>> {
    cohort
        .as_ref()
        .map(|ids| ids.iter().map(|&id| StudentId(id)).collect())
}

/// Map a core error to the HTTP status the caller should see.
#[must_use]
pub fn error_status(error: &MarkflowError) -> axum::http::StatusCode {
    use axum::http::StatusCode;
    match error {
        MarkflowError::Forbidden { .. } => StatusCode::FORBIDDEN,
        MarkflowError::RecordNotFound(_) => StatusCode::NOT_FOUND,
        MarkflowError::Conflict { .. } => StatusCode::CONFLICT,
        MarkflowError::InvalidTransition { .. }
        | MarkflowError::ImmutableRecord(_)
        | MarkflowError::DuplicateRecord(_)
        | MarkflowError::Validation { .. }
        | MarkflowError::NotFinalized(_)
        | MarkflowError::MissingComponent { .. }
        | MarkflowError::MissingReason
        | MarkflowError::InsufficientConfiguration(_) => StatusCode::UNPROCESSABLE_ENTITY,
        MarkflowError::SerializationError(_) | MarkflowError::DeserializationError(_) => {
            StatusCode::BAD_REQUEST
        }
        MarkflowError::IoError(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
