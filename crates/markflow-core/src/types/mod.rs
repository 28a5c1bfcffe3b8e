//! # Core Type Definitions
//!
//! This module contains all core types for the markflow deterministic
//! marks engine:
//! - Entity identifiers (`RecordId`, `StudentId`, `ActorId`, ...)
//! - Fixed-point quantities (`Marks`, `BasisPoints`, `Gpa`)
//! - Actor identity and roles (`Actor`, `Role`)
//! - Mark lifecycle states (`LifecycleState`)
//! - Error types (`MarkflowError`)
//!
//! ## Determinism Guarantees
//!
//! All types in this module:
//! - Use integer arithmetic only (no floating-point)
//! - Implement `Ord` for deterministic ordering in `BTreeMap`/`BTreeSet`
//! - Use saturating arithmetic for counters to prevent overflow

use crate::primitives::{GPA_SCALE, PERCENT_SCALE};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// ENTITY IDENTIFIERS
// =============================================================================

/// Unique identifier for a mark record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(pub u64);

/// Unique identifier for a student.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StudentId(pub u64);

/// Unique identifier for a subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubjectId(pub u64);

/// Unique identifier for a subject assignment (one subject taught to one
/// cohort by one teacher in one term).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubjectAssignmentId(pub u64);

/// Unique identifier for a semester.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SemesterId(pub u64);

/// Unique identifier for a department.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DepartmentId(pub u64);

/// Unique identifier for an acting user (teacher, approver, admin).
///
/// Identity is established by an external authentication collaborator;
/// the CORE only ever sees pre-validated ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActorId(pub u64);

/// Unique identifier for a course outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CoId(pub u64);

/// Unique identifier for a program outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PoId(pub u64);

/// Unique identifier for an assessment question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QuestionId(pub u64);

// =============================================================================
// FIXED-POINT QUANTITIES
// =============================================================================

/// Whole marks on an assessment component or question.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Marks(pub u32);

impl Marks {
    /// Create a new marks value.
    #[must_use]
    pub const fn new(marks: u32) -> Self {
        Self(marks)
    }

    /// Get the raw marks value.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Add two marks values using saturating arithmetic.
    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }
}

/// A percentage in basis points: `10_000` = 100.00%.
///
/// Integer fixed-point keeps every computation in the CORE deterministic
/// and exactly reproducible; two decimal places are enough for attainment
/// reporting.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct BasisPoints(pub u32);

impl BasisPoints {
    /// 100.00% in basis points.
    pub const FULL: Self = Self(PERCENT_SCALE);

    /// Create from a raw basis-point value.
    #[must_use]
    pub const fn new(bp: u32) -> Self {
        Self(bp)
    }

    /// Compute `num / den` as basis points, rounded half-up.
    ///
    /// Returns `None` when the denominator is zero - callers must surface
    /// that as "not computable", never as 0%.
    #[must_use]
    pub fn from_ratio(num: u64, den: u64) -> Option<Self> {
        if den == 0 {
            return None;
        }
        let scaled =
            (u128::from(num) * u128::from(PERCENT_SCALE) + u128::from(den) / 2) / u128::from(den);
        Some(Self(u32::try_from(scaled).unwrap_or(u32::MAX)))
    }

    /// Get the raw basis-point value.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for BasisPoints {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
    }
}

/// Credits carried by a subject.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Credits(pub u8);

impl Credits {
    /// Get the raw credit count.
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }
}

/// Grade point on the ten-point scale (0..=10).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct GradePoint(pub u8);

impl GradePoint {
    /// Get the raw grade-point value.
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }
}

/// A grade-point average in centi-points: `791` = 7.91.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Gpa(pub u32);

impl Gpa {
    /// Compute a credit-weighted mean in centi-points, rounded half-up.
    ///
    /// `num` is the weighted sum already expressed in centi-points x credits;
    /// `den` is the total credits. Returns `None` when `den` is zero
    /// (no contributing subjects or semesters).
    #[must_use]
    pub fn from_weighted(num: u64, den: u64) -> Option<Self> {
        if den == 0 {
            return None;
        }
        let centi = (u128::from(num) + u128::from(den) / 2) / u128::from(den);
        Some(Self(u32::try_from(centi).unwrap_or(u32::MAX)))
    }

    /// Get the raw centi-point value.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for Gpa {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02}", self.0 / GPA_SCALE, self.0 % GPA_SCALE)
    }
}

/// A point in time, unix seconds.
///
/// The CORE never reads a wall clock; timestamps are supplied by the
/// caller at the edge. This keeps every operation deterministic and
/// replayable.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Create a timestamp from unix seconds.
    #[must_use]
    pub const fn new(secs: u64) -> Self {
        Self(secs)
    }

    /// Get the raw unix-seconds value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

// =============================================================================
// ACTORS & ROLES
// =============================================================================

/// Role of an acting user, as established by the external auth layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Originating teacher; owns the mark records they enter.
    Teacher,
    /// Department-level approver (HoD or delegate).
    DepartmentApprover,
    /// Institution-level approver (controller of examinations).
    InstitutionApprover,
    /// Administrative override role. Not part of the normal workflow table.
    Admin,
}

impl Role {
    /// Get the role name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Role::Teacher => "teacher",
            Role::DepartmentApprover => "department_approver",
            Role::InstitutionApprover => "institution_approver",
            Role::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A pre-validated actor: identity plus role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// The actor's identity.
    pub id: ActorId,
    /// The actor's role.
    pub role: Role,
}

impl Actor {
    /// Create a new actor.
    #[must_use]
    pub const fn new(id: ActorId, role: Role) -> Self {
        Self { id, role }
    }
}

// =============================================================================
// ASSESSMENT COMPONENTS
// =============================================================================

/// The assessment component a mark record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentType {
    /// First internal assessment.
    Internal1,
    /// Second internal assessment.
    Internal2,
    /// External (end-semester) examination.
    External,
}

impl ComponentType {
    /// Whether this component participates in best-of-two selection.
    #[must_use]
    pub const fn is_internal(self) -> bool {
        matches!(self, ComponentType::Internal1 | ComponentType::Internal2)
    }

    /// Get the component name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ComponentType::Internal1 => "internal1",
            ComponentType::Internal2 => "internal2",
            ComponentType::External => "external",
        }
    }
}

// =============================================================================
// LIFECYCLE STATES
// =============================================================================

/// Lifecycle state of a mark record.
///
/// `Published` is the normal terminal state. `Rejected` is a recoverable
/// terminal: the owner can take the record back to `Draft` and resubmit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Editable by the owning teacher.
    Draft,
    /// Awaiting department-level review.
    Submitted,
    /// Cleared by the department, awaiting institutional freeze.
    Approved,
    /// Sent back by the department with a reason.
    Rejected,
    /// Values immutable; awaiting publication.
    Frozen,
    /// Publicly visible. Terminal.
    Published,
}

impl LifecycleState {
    /// Whether values may still be edited in this state.
    #[must_use]
    pub const fn is_editable(self) -> bool {
        matches!(self, LifecycleState::Draft | LifecycleState::Rejected)
    }

    /// Whether the record is finalized (eligible for derived computation).
    #[must_use]
    pub const fn is_finalized(self) -> bool {
        matches!(self, LifecycleState::Frozen | LifecycleState::Published)
    }

    /// Whether this is the normal terminal state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, LifecycleState::Published)
    }

    /// Get the state name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleState::Draft => "draft",
            LifecycleState::Submitted => "submitted",
            LifecycleState::Approved => "approved",
            LifecycleState::Rejected => "rejected",
            LifecycleState::Frozen => "frozen",
            LifecycleState::Published => "published",
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the markflow system.
///
/// - No silent failures
/// - Use `Result<T, MarkflowError>` for fallible operations
/// - The CORE should never panic; all errors must be recoverable
#[derive(Debug, Error)]
pub enum MarkflowError {
    /// The attempted state edge is not in the transition table.
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition {
        /// State the record was in.
        from: LifecycleState,
        /// State the caller asked for.
        to: LifecycleState,
    },

    /// The actor's role is not authorized for this edge.
    #[error("role {role} is not authorized for transition {from} -> {to}")]
    Forbidden {
        /// Role that attempted the transition.
        role: Role,
        /// State the record was in.
        from: LifecycleState,
        /// State the caller asked for.
        to: LifecycleState,
    },

    /// Value edit attempted on a record past the editable states.
    #[error("record {0:?} is immutable in its current state")]
    ImmutableRecord(RecordId),

    /// A record for this (student, assignment, component) tuple already
    /// exists in a non-Draft state.
    #[error("duplicate record: {0:?} already exists for this tuple")]
    DuplicateRecord(RecordId),

    /// Optimistic-concurrency version mismatch. Retryable: re-read the
    /// record and reapply the edit.
    #[error("version conflict: expected {expected}, found {found}")]
    Conflict {
        /// Version the writer read.
        expected: u64,
        /// Version actually stored.
        found: u64,
    },

    /// A computation needs configuration that is missing.
    #[error("insufficient configuration: {0}")]
    InsufficientConfiguration(String),

    /// Marks outside the `[0, max_marks]` range, or max of zero.
    #[error("invalid marks: {obtained} out of {max}")]
    Validation {
        /// Marks the caller supplied.
        obtained: u32,
        /// Maximum marks for the component.
        max: u32,
    },

    /// The requested record was not found in the store.
    #[error("record not found: {0:?}")]
    RecordNotFound(RecordId),

    /// A calculator was handed a record that is not yet Frozen/Published.
    #[error("record {0:?} is not finalized")]
    NotFinalized(RecordId),

    /// A finalized component required by a calculation does not exist.
    #[error("no finalized {component} record for assignment {assignment:?}")]
    MissingComponent {
        /// The subject assignment being computed.
        assignment: SubjectAssignmentId,
        /// Name of the missing component.
        component: &'static str,
    },

    /// A transition that requires a reason was attempted without one.
    #[error("a reason is required for this transition")]
    MissingReason,

    /// A serialization error occurred.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// A deserialization error occurred.
    #[error("deserialization error: {0}")]
    DeserializationError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basis_points_round_half_up() {
        // 72/100 -> 72.00%
        assert_eq!(BasisPoints::from_ratio(72, 100), Some(BasisPoints(7200)));
        // 1/3 -> 33.33%
        assert_eq!(BasisPoints::from_ratio(1, 3), Some(BasisPoints(3333)));
        // 2/3 -> 66.67% (rounded up)
        assert_eq!(BasisPoints::from_ratio(2, 3), Some(BasisPoints(6667)));
    }

    #[test]
    fn basis_points_zero_denominator_is_none() {
        assert_eq!(BasisPoints::from_ratio(5, 0), None);
    }

    #[test]
    fn basis_points_display() {
        assert_eq!(BasisPoints(7200).to_string(), "72.00%");
        assert_eq!(BasisPoints(309).to_string(), "3.09%");
    }

    #[test]
    fn gpa_weighted_rounding() {
        // 89 gp-credits over 11 credits -> 8.09
        assert_eq!(Gpa::from_weighted(8900, 11), Some(Gpa(809)));
        assert_eq!(Gpa(809).to_string(), "8.09");
    }

    #[test]
    fn gpa_empty_is_none() {
        assert_eq!(Gpa::from_weighted(0, 0), None);
    }

    #[test]
    fn finalized_states() {
        assert!(LifecycleState::Frozen.is_finalized());
        assert!(LifecycleState::Published.is_finalized());
        assert!(!LifecycleState::Approved.is_finalized());
        assert!(LifecycleState::Draft.is_editable());
        assert!(LifecycleState::Rejected.is_editable());
        assert!(!LifecycleState::Frozen.is_editable());
    }

    #[test]
    fn component_internal_flag() {
        assert!(ComponentType::Internal1.is_internal());
        assert!(ComponentType::Internal2.is_internal());
        assert!(!ComponentType::External.is_internal());
    }
}
