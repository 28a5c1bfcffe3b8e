//! # markflow-core
//!
//! The deterministic marks engine for markflow - THE LOGIC.
//!
//! This crate implements the computational core of an exam-marks
//! platform: the versioned mark record store, the role-gated workflow
//! state machine with atomic audit, the smart marks calculator
//! (best-of-two, grade banding, SGPA/CGPA) and the CO/PO outcome
//! attainment engine.
//!
//! ## Architectural Constraints
//!
//! The CORE:
//! - Is the ONLY place where mark lifecycle state exists (stateful)
//! - Is closed: no external logic may be injected; configuration is data
//! - Never reads a wall clock; timestamps arrive from the caller
//! - Has NO async, NO network dependencies, NO floating point (pure Rust)
//!
//! Every result is a value, a typed failure, or explicitly "not
//! computable" - an attainment of 0% and an attainment that cannot be
//! computed are different answers, and the types keep them apart.

// =============================================================================
// MODULES
// =============================================================================

pub mod audit;
pub mod cache;
pub mod outcome;
pub mod primitives;
pub mod query;
pub mod record;
pub mod session;
pub mod smart;
pub mod snapshot;
pub mod storage;
pub mod types;
pub mod workflow;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    Actor, ActorId, BasisPoints, CoId, ComponentType, Credits, DepartmentId, Gpa, GradePoint,
    LifecycleState, MarkflowError, Marks, PoId, QuestionId, RecordId, Role, SemesterId, StudentId,
    SubjectAssignmentId, SubjectId, Timestamp,
};

// =============================================================================
// RE-EXPORTS: Store & Workflow
// =============================================================================

pub use audit::AuditEntry;
pub use query::RecordFilter;
pub use record::{MarkRecord, MemoryStore, RecordKey, RecordStore, TransitionStamps};
pub use session::{Session, StorageBackend};
pub use storage::RedbStore;
pub use workflow::{
    rule_for, ActorClass, BulkItemOutcome, TransitionRule, WorkflowEngine, TRANSITIONS,
};

// =============================================================================
// RE-EXPORTS: Calculators
// =============================================================================

pub use outcome::{
    compute_co_attainment, compute_department_attainment, compute_po_attainment,
    compute_subject_attainment, AttainmentLevel, AttainmentOutcome, CoAttainmentReport,
    CoDefinition, CognitiveLevel, CoPoEntry, CoTarget, ConfigVersion, NotComputableReason,
    OutcomeConfig, PoAttainmentReport, PoDefinition, QuestionCoWeight, QuestionScore,
    StudentCoAttainment,
};
pub use smart::{
    compute_cgpa, compute_sgpa, compute_smart_total, normalize_to_ceiling, GradeBand, GradeScale,
    SmartTotal, SubjectScheme,
};

// =============================================================================
// RE-EXPORTS: Cache & Snapshots
// =============================================================================

pub use cache::{AttainmentCache, CacheKey, CacheScope};
pub use snapshot::{
    snapshot_checksum, snapshot_from_bytes, snapshot_to_bytes, verify_snapshot,
    AttainmentSnapshot, CoSnapshotRow, PoSnapshotRow, SnapshotHeader,
};

#[cfg(feature = "crypto-hash")]
pub use snapshot::snapshot_digest;
