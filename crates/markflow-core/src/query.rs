//! # Query Module
//!
//! Structured record filters for the mark record store.
//!
//! - Map caller questions to structured store scans
//! - Deterministic matching (no fuzzy semantics)
//! - Results are cloned snapshots; readers never observe later writes

use crate::record::MarkRecord;
use crate::types::{ComponentType, LifecycleState, StudentId, SubjectAssignmentId};
use serde::{Deserialize, Serialize};

/// A structured filter over mark records.
///
/// All criteria are conjunctive; `None` means "any".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFilter {
    /// Match a single student.
    pub student: Option<StudentId>,
    /// Match a single subject assignment.
    pub assignment: Option<SubjectAssignmentId>,
    /// Match a single assessment component.
    pub component: Option<ComponentType>,
    /// Match a single lifecycle state.
    pub state: Option<LifecycleState>,
    /// Only records in `Frozen` or `Published`.
    #[serde(default)]
    pub finalized_only: bool,
}

impl RecordFilter {
    /// A filter that matches every record.
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    /// Filter to one student.
    #[must_use]
    pub fn for_student(student: StudentId) -> Self {
        Self {
            student: Some(student),
            ..Self::default()
        }
    }

    /// Filter to one subject assignment.
    #[must_use]
    pub fn for_assignment(assignment: SubjectAssignmentId) -> Self {
        Self {
            assignment: Some(assignment),
            ..Self::default()
        }
    }

    /// Restrict to a single lifecycle state.
    #[must_use]
    pub fn with_state(mut self, state: LifecycleState) -> Self {
        self.state = Some(state);
        self
    }

    /// Restrict to one student.
    #[must_use]
    pub fn with_student(mut self, student: StudentId) -> Self {
        self.student = Some(student);
        self
    }

    /// Restrict to one assessment component.
    #[must_use]
    pub fn with_component(mut self, component: ComponentType) -> Self {
        self.component = Some(component);
        self
    }

    /// Restrict to finalized (`Frozen`/`Published`) records only.
    #[must_use]
    pub fn finalized(mut self) -> Self {
        self.finalized_only = true;
        self
    }

    /// Check whether a record matches this filter.
    #[must_use]
    pub fn matches(&self, record: &MarkRecord) -> bool {
        if self.student.is_some_and(|s| record.key.student != s) {
            return false;
        }
        if self.assignment.is_some_and(|a| record.key.assignment != a) {
            return false;
        }
        if self.component.is_some_and(|c| record.key.component != c) {
            return false;
        }
        if self.state.is_some_and(|s| record.state != s) {
            return false;
        }
        if self.finalized_only && !record.state.is_finalized() {
            return false;
        }
        true
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordKey;
    use crate::types::{ActorId, Marks, Timestamp};

    fn make_record(student: u64, assignment: u64, state: LifecycleState) -> MarkRecord {
        let mut record = MarkRecord::new(
            crate::types::RecordId(1),
            RecordKey::new(
                StudentId(student),
                SubjectAssignmentId(assignment),
                ComponentType::Internal1,
            ),
            ActorId(9),
            Marks(30),
            Marks(40),
            Timestamp(0),
        );
        record.state = state;
        record
    }

    #[test]
    fn any_matches_everything() {
        let record = make_record(1, 2, LifecycleState::Draft);
        assert!(RecordFilter::any().matches(&record));
    }

    #[test]
    fn student_filter() {
        let record = make_record(1, 2, LifecycleState::Draft);
        assert!(RecordFilter::for_student(StudentId(1)).matches(&record));
        assert!(!RecordFilter::for_student(StudentId(2)).matches(&record));
    }

    #[test]
    fn finalized_filter_excludes_draft() {
        let draft = make_record(1, 2, LifecycleState::Draft);
        let frozen = make_record(1, 2, LifecycleState::Frozen);
        let filter = RecordFilter::any().finalized();
        assert!(!filter.matches(&draft));
        assert!(filter.matches(&frozen));
    }

    #[test]
    fn conjunctive_criteria() {
        let record = make_record(1, 2, LifecycleState::Submitted);
        let filter = RecordFilter::for_student(StudentId(1))
            .with_state(LifecycleState::Submitted)
            .with_component(ComponentType::Internal1);
        assert!(filter.matches(&record));

        let wrong_component = RecordFilter::for_student(StudentId(1))
            .with_component(ComponentType::External);
        assert!(!wrong_component.matches(&record));
    }
}
