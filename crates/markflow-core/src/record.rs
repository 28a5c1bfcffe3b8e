//! # Mark Record Store
//!
//! The canonical, versioned store of assessment-component marks.
//!
//! This module implements the `RecordStore` trait.
//! All data structures use `BTreeMap` for deterministic ordering.
//!
//! ## Versioning
//!
//! Every record carries a version that advances on each mutation; writers
//! carry the version they read, and a stale version fails with
//! `Conflict` instead of silently overwriting a concurrent edit. The
//! store as a whole carries a data version used to invalidate derived
//! attainment caches.

use crate::audit::AuditEntry;
use crate::query::RecordFilter;
use crate::types::{
    ActorId, BasisPoints, ComponentType, LifecycleState, MarkflowError, Marks, RecordId,
    StudentId, SubjectAssignmentId, Timestamp,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// RECORD KEY
// =============================================================================

/// Identity of a mark record: one row per
/// (student, subject assignment, component).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    /// The student the marks belong to.
    pub student: StudentId,
    /// The subject assignment the marks were earned under.
    pub assignment: SubjectAssignmentId,
    /// The assessment component.
    pub component: ComponentType,
}

impl RecordKey {
    /// Create a new record key.
    #[must_use]
    pub const fn new(
        student: StudentId,
        assignment: SubjectAssignmentId,
        component: ComponentType,
    ) -> Self {
        Self {
            student,
            assignment,
            component,
        }
    }
}

// =============================================================================
// TRANSITION STAMPS
// =============================================================================

/// Actor and timestamp stamps collected as a record moves through the
/// workflow. Each stamp is written by exactly one transition edge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionStamps {
    /// Set on Draft -> Submitted.
    pub submitted: Option<(ActorId, Timestamp)>,
    /// Set on Submitted -> Approved.
    pub approved: Option<(ActorId, Timestamp)>,
    /// Set on Submitted -> Rejected.
    pub rejected: Option<(ActorId, Timestamp)>,
    /// Set on Approved -> Frozen.
    pub frozen: Option<(ActorId, Timestamp)>,
    /// Set on Frozen -> Published.
    pub published: Option<(ActorId, Timestamp)>,
}

impl TransitionStamps {
    /// Create an empty stamp set.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Clear approval-path stamps (Rejected -> Draft side effect).
    pub fn clear_approvals(&mut self) {
        self.submitted = None;
        self.approved = None;
        self.rejected = None;
    }
}

// =============================================================================
// MARK RECORD
// =============================================================================

/// One versioned mark record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkRecord {
    /// The record's identity in the store.
    pub id: RecordId,
    /// The (student, assignment, component) tuple.
    pub key: RecordKey,
    /// The originating teacher. Only the owner may submit or re-edit.
    pub owner: ActorId,
    /// Marks obtained. Invariant: `marks <= max_marks`.
    pub marks: Marks,
    /// Maximum marks for the component.
    pub max_marks: Marks,
    /// Current lifecycle state.
    pub state: LifecycleState,
    /// Mutation counter for optimistic concurrency.
    pub version: u64,
    /// Per-transition actor/timestamp stamps.
    pub stamps: TransitionStamps,
    /// Reason supplied on rejection, cleared when re-drafted.
    pub rejection_reason: Option<String>,
    /// When the record was first created.
    pub created_at: Timestamp,
}

impl MarkRecord {
    /// Create a fresh Draft record with version 1.
    #[must_use]
    pub fn new(
        id: RecordId,
        key: RecordKey,
        owner: ActorId,
        marks: Marks,
        max_marks: Marks,
        at: Timestamp,
    ) -> Self {
        Self {
            id,
            key,
            owner,
            marks,
            max_marks,
            state: LifecycleState::Draft,
            version: 1,
            stamps: TransitionStamps::empty(),
            rejection_reason: None,
            created_at: at,
        }
    }

    /// Whether the record is eligible for derived computation.
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.state.is_finalized()
    }

    /// Score as a percentage of the component maximum.
    ///
    /// `None` when `max_marks` is zero (a configuration defect, surfaced
    /// rather than coerced to 0%).
    #[must_use]
    pub fn percent(&self) -> Option<BasisPoints> {
        BasisPoints::from_ratio(u64::from(self.marks.value()), u64::from(self.max_marks.value()))
    }
}

/// Validate a (marks, max) pair against the range invariant.
pub(crate) fn validate_marks(marks: Marks, max: Marks) -> Result<(), MarkflowError> {
    if max.value() == 0 || marks.value() > max.value() {
        return Err(MarkflowError::Validation {
            obtained: marks.value(),
            max: max.value(),
        });
    }
    Ok(())
}

// =============================================================================
// RECORDSTORE TRAIT
// =============================================================================

/// The RecordStore trait defines the canonical mark-record operations.
///
/// All fallible operations return `Result<T, MarkflowError>` to support
/// both in-memory and persistent storage backends uniformly.
pub trait RecordStore {
    /// Create a record for the given key, or overwrite an existing Draft.
    ///
    /// Fails with `DuplicateRecord` if a record for the tuple exists in
    /// any state other than `Draft`, and with `Validation` if the marks
    /// are outside `[0, max]`.
    fn create(
        &mut self,
        key: RecordKey,
        owner: ActorId,
        marks: Marks,
        max_marks: Marks,
        at: Timestamp,
    ) -> Result<RecordId, MarkflowError>;

    /// Update the marks value of an editable record.
    ///
    /// `expected_version` is the version the writer read; a stale version
    /// fails with `Conflict`. Fails with `ImmutableRecord` unless the
    /// record is in `Draft` or `Rejected`. Returns the new version.
    fn update_value(
        &mut self,
        id: RecordId,
        marks: Marks,
        expected_version: u64,
    ) -> Result<u64, MarkflowError>;

    /// Lookup a record by id. Returns an owned clone.
    fn get(&self, id: RecordId) -> Result<Option<MarkRecord>, MarkflowError>;

    /// Lookup a record id by key. Infallible (uses in-memory index).
    fn get_by_key(&self, key: &RecordKey) -> Option<RecordId>;

    /// Return a cloned snapshot of every record matching the filter,
    /// ordered by record id.
    fn query(&self, filter: &RecordFilter) -> Result<Vec<MarkRecord>, MarkflowError>;

    /// Atomically replace a record and append its audit entry.
    ///
    /// Compare-and-swap on the (state, version) pair: if the stored record
    /// no longer matches `expected_state`/`expected_version`, fails with
    /// `Conflict` and nothing is written. The store seals the entry with
    /// its sequence number and bumps the record version; the state change
    /// and the audit append are one atomic unit.
    fn commit_transition(
        &mut self,
        id: RecordId,
        expected_state: LifecycleState,
        expected_version: u64,
        updated: MarkRecord,
        entry: AuditEntry,
    ) -> Result<MarkRecord, MarkflowError>;

    /// The audit trail for one record, in commit order.
    fn audit_trail(&self, id: RecordId) -> Result<Vec<AuditEntry>, MarkflowError>;

    /// The full audit log, in commit order.
    fn audit_log(&self) -> Result<Vec<AuditEntry>, MarkflowError>;

    /// Total number of audit entries in the store.
    fn audit_count(&self) -> Result<usize, MarkflowError>;

    /// Total number of records in the store.
    fn record_count(&self) -> Result<usize, MarkflowError>;

    /// Store-wide data version; advances on every mutation.
    fn data_version(&self) -> u64;
}

// =============================================================================
// IN-MEMORY IMPLEMENTATION
// =============================================================================

/// The in-memory mark record store.
///
/// Uses `BTreeMap` exclusively for deterministic ordering.
/// No `HashMap` allowed.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    /// Record storage: RecordId -> MarkRecord
    records: BTreeMap<RecordId, MarkRecord>,

    /// Reverse lookup: RecordKey -> RecordId
    key_index: BTreeMap<RecordKey, RecordId>,

    /// Append-only audit log, in commit order.
    audit: Vec<AuditEntry>,

    /// Next available RecordId
    next_record_id: u64,

    /// Store-wide mutation counter.
    data_version: u64,
}

impl MemoryStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Iterate all records in deterministic order.
    pub fn records(&self) -> impl Iterator<Item = &MarkRecord> {
        self.records.values()
    }

    /// Iterate the full audit log in commit order.
    pub fn audit_entries(&self) -> impl Iterator<Item = &AuditEntry> {
        self.audit.iter()
    }

    fn bump(&mut self) {
        self.data_version = self.data_version.saturating_add(1);
    }
}

impl RecordStore for MemoryStore {
    fn create(
        &mut self,
        key: RecordKey,
        owner: ActorId,
        marks: Marks,
        max_marks: Marks,
        at: Timestamp,
    ) -> Result<RecordId, MarkflowError> {
        validate_marks(marks, max_marks)?;

        if let Some(&existing_id) = self.key_index.get(&key) {
            // Re-entry for an existing tuple: only a Draft may be overwritten.
            let Some(existing) = self.records.get_mut(&existing_id) else {
                return Err(MarkflowError::RecordNotFound(existing_id));
            };
            if existing.state != LifecycleState::Draft {
                return Err(MarkflowError::DuplicateRecord(existing_id));
            }
            existing.marks = marks;
            existing.max_marks = max_marks;
            existing.version = existing.version.saturating_add(1);
            self.bump();
            return Ok(existing_id);
        }

        let id = RecordId(self.next_record_id);
        self.next_record_id = self.next_record_id.saturating_add(1);
        let record = MarkRecord::new(id, key, owner, marks, max_marks, at);
        self.records.insert(id, record);
        self.key_index.insert(key, id);
        self.bump();
        Ok(id)
    }

    fn update_value(
        &mut self,
        id: RecordId,
        marks: Marks,
        expected_version: u64,
    ) -> Result<u64, MarkflowError> {
        let Some(record) = self.records.get_mut(&id) else {
            return Err(MarkflowError::RecordNotFound(id));
        };
        if !record.state.is_editable() {
            return Err(MarkflowError::ImmutableRecord(id));
        }
        if record.version != expected_version {
            return Err(MarkflowError::Conflict {
                expected: expected_version,
                found: record.version,
            });
        }
        validate_marks(marks, record.max_marks)?;

        record.marks = marks;
        record.version = record.version.saturating_add(1);
        let new_version = record.version;
        self.bump();
        Ok(new_version)
    }

    fn get(&self, id: RecordId) -> Result<Option<MarkRecord>, MarkflowError> {
        Ok(self.records.get(&id).cloned())
    }

    fn get_by_key(&self, key: &RecordKey) -> Option<RecordId> {
        self.key_index.get(key).copied()
    }

    fn query(&self, filter: &RecordFilter) -> Result<Vec<MarkRecord>, MarkflowError> {
        Ok(self
            .records
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }

    fn commit_transition(
        &mut self,
        id: RecordId,
        expected_state: LifecycleState,
        expected_version: u64,
        mut updated: MarkRecord,
        mut entry: AuditEntry,
    ) -> Result<MarkRecord, MarkflowError> {
        let Some(current) = self.records.get(&id) else {
            return Err(MarkflowError::RecordNotFound(id));
        };
        // CAS on the (state, version) pair: a concurrent transition or
        // value edit invalidates this write.
        if current.state != expected_state || current.version != expected_version {
            return Err(MarkflowError::Conflict {
                expected: expected_version,
                found: current.version,
            });
        }

        updated.id = id;
        updated.version = expected_version.saturating_add(1);
        entry.seq = (self.audit.len() as u64).saturating_add(1);

        // Both writes happen here, or neither: every fallible check is done.
        self.records.insert(id, updated.clone());
        self.audit.push(entry);
        self.bump();
        Ok(updated)
    }

    fn audit_trail(&self, id: RecordId) -> Result<Vec<AuditEntry>, MarkflowError> {
        Ok(self
            .audit
            .iter()
            .filter(|e| e.record == id)
            .cloned()
            .collect())
    }

    fn audit_log(&self) -> Result<Vec<AuditEntry>, MarkflowError> {
        Ok(self.audit.clone())
    }

    fn audit_count(&self) -> Result<usize, MarkflowError> {
        Ok(self.audit.len())
    }

    fn record_count(&self) -> Result<usize, MarkflowError> {
        Ok(self.records.len())
    }

    fn data_version(&self) -> u64 {
        self.data_version
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    fn key(student: u64, assignment: u64, component: ComponentType) -> RecordKey {
        RecordKey::new(StudentId(student), SubjectAssignmentId(assignment), component)
    }

    fn seed(store: &mut MemoryStore) -> RecordId {
        store
            .create(
                key(1, 10, ComponentType::Internal1),
                ActorId(7),
                Marks(30),
                Marks(40),
                Timestamp(100),
            )
            .expect("create")
    }

    #[test]
    fn create_starts_in_draft_at_version_one() {
        let mut store = MemoryStore::new();
        let id = seed(&mut store);

        let record = store.get(id).expect("get").expect("exists");
        assert_eq!(record.state, LifecycleState::Draft);
        assert_eq!(record.version, 1);
        assert_eq!(record.owner, ActorId(7));
    }

    #[test]
    fn create_rejects_out_of_range_marks() {
        let mut store = MemoryStore::new();
        let result = store.create(
            key(1, 10, ComponentType::Internal1),
            ActorId(7),
            Marks(50),
            Marks(40),
            Timestamp(100),
        );
        assert!(matches!(
            result,
            Err(MarkflowError::Validation { obtained: 50, max: 40 })
        ));
    }

    #[test]
    fn re_entry_overwrites_draft_in_place() {
        let mut store = MemoryStore::new();
        let id = seed(&mut store);

        let again = store
            .create(
                key(1, 10, ComponentType::Internal1),
                ActorId(7),
                Marks(35),
                Marks(40),
                Timestamp(200),
            )
            .expect("overwrite");

        assert_eq!(again, id);
        let record = store.get(id).expect("get").expect("exists");
        assert_eq!(record.marks, Marks(35));
        assert_eq!(record.version, 2);
        assert_eq!(store.record_count().expect("count"), 1);
    }

    #[test]
    fn re_entry_after_submission_is_duplicate() {
        let mut store = MemoryStore::new();
        let id = seed(&mut store);

        let record = store.get(id).expect("get").expect("exists");
        let mut updated = record.clone();
        updated.state = LifecycleState::Submitted;
        let entry = AuditEntry::draft(
            id,
            LifecycleState::Draft,
            LifecycleState::Submitted,
            ActorId(7),
            Role::Teacher,
            Timestamp(150),
            None,
        );
        store
            .commit_transition(id, LifecycleState::Draft, record.version, updated, entry)
            .expect("transition");

        let result = store.create(
            key(1, 10, ComponentType::Internal1),
            ActorId(7),
            Marks(38),
            Marks(40),
            Timestamp(300),
        );
        assert!(matches!(result, Err(MarkflowError::DuplicateRecord(d)) if d == id));
    }

    #[test]
    fn stale_version_update_conflicts() {
        let mut store = MemoryStore::new();
        let id = seed(&mut store);

        // First writer succeeds with the version it read.
        let v2 = store.update_value(id, Marks(32), 1).expect("update");
        assert_eq!(v2, 2);

        // Second writer still carries version 1.
        let result = store.update_value(id, Marks(28), 1);
        assert!(matches!(
            result,
            Err(MarkflowError::Conflict { expected: 1, found: 2 })
        ));
        // The concurrent edit was not overwritten.
        let record = store.get(id).expect("get").expect("exists");
        assert_eq!(record.marks, Marks(32));
    }

    #[test]
    fn commit_transition_appends_exactly_one_audit_entry() {
        let mut store = MemoryStore::new();
        let id = seed(&mut store);

        let record = store.get(id).expect("get").expect("exists");
        let mut updated = record.clone();
        updated.state = LifecycleState::Submitted;
        updated.stamps.submitted = Some((ActorId(7), Timestamp(150)));
        let entry = AuditEntry::draft(
            id,
            LifecycleState::Draft,
            LifecycleState::Submitted,
            ActorId(7),
            Role::Teacher,
            Timestamp(150),
            None,
        );

        let stored = store
            .commit_transition(id, LifecycleState::Draft, 1, updated, entry)
            .expect("transition");

        assert_eq!(stored.version, 2);
        assert_eq!(store.audit_count().expect("count"), 1);
        let trail = store.audit_trail(id).expect("trail");
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].seq, 1);
        assert_eq!(trail[0].to, LifecycleState::Submitted);
    }

    #[test]
    fn commit_transition_cas_failure_writes_nothing() {
        let mut store = MemoryStore::new();
        let id = seed(&mut store);

        let record = store.get(id).expect("get").expect("exists");
        let mut updated = record.clone();
        updated.state = LifecycleState::Submitted;
        let entry = AuditEntry::draft(
            id,
            LifecycleState::Draft,
            LifecycleState::Submitted,
            ActorId(7),
            Role::Teacher,
            Timestamp(150),
            None,
        );

        // Wrong expected version: CAS must fail and leave no trace.
        let result = store.commit_transition(id, LifecycleState::Draft, 99, updated, entry);
        assert!(matches!(result, Err(MarkflowError::Conflict { .. })));
        assert_eq!(store.audit_count().expect("count"), 0);
        let unchanged = store.get(id).expect("get").expect("exists");
        assert_eq!(unchanged.state, LifecycleState::Draft);
    }

    #[test]
    fn data_version_advances_on_every_mutation() {
        let mut store = MemoryStore::new();
        assert_eq!(store.data_version(), 0);
        let id = seed(&mut store);
        assert_eq!(store.data_version(), 1);
        store.update_value(id, Marks(31), 1).expect("update");
        assert_eq!(store.data_version(), 2);
    }

    #[test]
    fn query_returns_cloned_snapshot() {
        let mut store = MemoryStore::new();
        let id = seed(&mut store);

        let snapshot = store.query(&RecordFilter::any()).expect("query");
        store.update_value(id, Marks(39), 1).expect("update");

        // The earlier snapshot does not observe the later write.
        assert_eq!(snapshot[0].marks, Marks(30));
    }
}
