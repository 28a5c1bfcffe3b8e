//! # Session Module
//!
//! The session is the single entry point collaborators drive.
//!
//! It owns a storage backend (in-memory or persistent), routes workflow
//! operations through the transition engine, derives calculator inputs
//! from finalized records, and memoizes attainment outcomes in a
//! version-keyed cache.
//!
//! ## Storage Backends
//!
//! - `InMemory`: uses `MemoryStore` (fast, volatile unless explicitly saved)
//! - `Persistent`: uses `RedbStore` for disk-backed ACID storage

use crate::audit::AuditEntry;
use crate::cache::{AttainmentCache, CacheKey};
use crate::outcome::{
    compute_co_attainment, compute_department_attainment, AttainmentOutcome, CoAttainmentReport,
    OutcomeConfig, PoAttainmentReport, QuestionScore,
};
use crate::query::RecordFilter;
use crate::record::{MarkRecord, MemoryStore, RecordKey, RecordStore};
use crate::smart::{
    compute_cgpa, compute_sgpa, compute_smart_total, GradeScale, SmartTotal, SubjectScheme,
};
use crate::snapshot::AttainmentSnapshot;
use crate::storage::RedbStore;
use crate::types::{
    Actor, ActorId, Credits, DepartmentId, Gpa, GradePoint, LifecycleState, MarkflowError, Marks,
    RecordId, SemesterId, StudentId, SubjectId, Timestamp,
};
use crate::workflow::{BulkItemOutcome, WorkflowEngine};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

// =============================================================================
// ERROR LOGGING HELPERS
// =============================================================================

/// Log a storage error and convert the Result to a default value.
///
/// Used only for infallible-by-contract metric getters; real operations
/// propagate their errors. Uses stderr logging for the CORE (no external
/// dependencies) - the app layer redirects stderr to tracing if needed.
#[inline]
fn log_and_default<T: Default>(result: Result<T, MarkflowError>, context: &str) -> T {
    match result {
        Ok(v) => v,
        Err(e) => {
            eprintln!(
                "{{\"level\":\"warn\",\"target\":\"markflow_core::session\",\"message\":\"storage error in {}: {}\"}}",
                context, e
            );
            T::default()
        }
    }
}

// =============================================================================
// STORAGE BACKEND
// =============================================================================

/// Storage backend for a Session.
#[derive(Debug)]
pub enum StorageBackend {
    /// In-memory store (fast, volatile).
    InMemory(MemoryStore),
    /// Disk-backed store using redb (ACID, persistent).
    Persistent(RedbStore),
}

impl Default for StorageBackend {
    fn default() -> Self {
        Self::InMemory(MemoryStore::new())
    }
}

// NOTE: StorageBackend does NOT implement Clone.
// RedbStore (database handle) cannot be safely cloned.

impl RecordStore for StorageBackend {
    fn create(
        &mut self,
        key: RecordKey,
        owner: ActorId,
        marks: Marks,
        max_marks: Marks,
        at: Timestamp,
    ) -> Result<RecordId, MarkflowError> {
        match self {
            Self::InMemory(s) => s.create(key, owner, marks, max_marks, at),
            Self::Persistent(s) => s.create(key, owner, marks, max_marks, at),
        }
    }

    fn update_value(
        &mut self,
        id: RecordId,
        marks: Marks,
        expected_version: u64,
    ) -> Result<u64, MarkflowError> {
        match self {
            Self::InMemory(s) => s.update_value(id, marks, expected_version),
            Self::Persistent(s) => s.update_value(id, marks, expected_version),
        }
    }

    fn get(&self, id: RecordId) -> Result<Option<MarkRecord>, MarkflowError> {
        match self {
            Self::InMemory(s) => s.get(id),
            Self::Persistent(s) => s.get(id),
        }
    }

    fn get_by_key(&self, key: &RecordKey) -> Option<RecordId> {
        match self {
            Self::InMemory(s) => s.get_by_key(key),
            Self::Persistent(s) => s.get_by_key(key),
        }
    }

    fn query(&self, filter: &RecordFilter) -> Result<Vec<MarkRecord>, MarkflowError> {
        match self {
            Self::InMemory(s) => s.query(filter),
            Self::Persistent(s) => s.query(filter),
        }
    }

    fn commit_transition(
        &mut self,
        id: RecordId,
        expected_state: LifecycleState,
        expected_version: u64,
        updated: MarkRecord,
        entry: AuditEntry,
    ) -> Result<MarkRecord, MarkflowError> {
        match self {
            Self::InMemory(s) => {
                s.commit_transition(id, expected_state, expected_version, updated, entry)
            }
            Self::Persistent(s) => {
                s.commit_transition(id, expected_state, expected_version, updated, entry)
            }
        }
    }

    fn audit_trail(&self, id: RecordId) -> Result<Vec<AuditEntry>, MarkflowError> {
        match self {
            Self::InMemory(s) => s.audit_trail(id),
            Self::Persistent(s) => s.audit_trail(id),
        }
    }

    fn audit_log(&self) -> Result<Vec<AuditEntry>, MarkflowError> {
        match self {
            Self::InMemory(s) => s.audit_log(),
            Self::Persistent(s) => s.audit_log(),
        }
    }

    fn audit_count(&self) -> Result<usize, MarkflowError> {
        match self {
            Self::InMemory(s) => s.audit_count(),
            Self::Persistent(s) => s.audit_count(),
        }
    }

    fn record_count(&self) -> Result<usize, MarkflowError> {
        match self {
            Self::InMemory(s) => s.record_count(),
            Self::Persistent(s) => s.record_count(),
        }
    }

    fn data_version(&self) -> u64 {
        match self {
            Self::InMemory(s) => s.data_version(),
            Self::Persistent(s) => s.data_version(),
        }
    }
}

// =============================================================================
// SESSION
// =============================================================================

/// A Session combines a record store with the workflow engine, the
/// calculators, and the attainment cache.
#[derive(Debug, Default)]
pub struct Session {
    /// The storage backend (in-memory or persistent).
    backend: StorageBackend,
    /// Version-keyed attainment cache.
    cache: AttainmentCache,
}

impl Session {
    /// Create a new empty session with in-memory storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session with an existing in-memory store.
    #[must_use]
    pub fn with_store(store: MemoryStore) -> Self {
        Self {
            backend: StorageBackend::InMemory(store),
            cache: AttainmentCache::new(),
        }
    }

    /// Create a session with persistent redb storage.
    ///
    /// Opens or creates a redb database at the given path.
    /// All changes are automatically persisted to disk.
    pub fn with_redb(path: impl AsRef<Path>) -> Result<Self, MarkflowError> {
        let store = RedbStore::open(path)?;
        Ok(Self {
            backend: StorageBackend::Persistent(store),
            cache: AttainmentCache::new(),
        })
    }

    /// Create a session with an existing RedbStore.
    #[must_use]
    pub fn with_redb_store(store: RedbStore) -> Self {
        Self {
            backend: StorageBackend::Persistent(store),
            cache: AttainmentCache::new(),
        }
    }

    /// Check if using persistent storage.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        matches!(self.backend, StorageBackend::Persistent(_))
    }

    /// Get a reference to the storage backend.
    #[must_use]
    pub fn backend(&self) -> &StorageBackend {
        &self.backend
    }

    // =========================================================================
    // RECORD OPERATIONS
    // =========================================================================

    /// Create a mark record, or overwrite an existing Draft for the tuple.
    pub fn create_record(
        &mut self,
        key: RecordKey,
        owner: ActorId,
        marks: Marks,
        max_marks: Marks,
        at: Timestamp,
    ) -> Result<RecordId, MarkflowError> {
        self.backend.create(key, owner, marks, max_marks, at)
    }

    /// Update the marks of an editable record (optimistic concurrency).
    pub fn update_value(
        &mut self,
        id: RecordId,
        marks: Marks,
        expected_version: u64,
    ) -> Result<u64, MarkflowError> {
        self.backend.update_value(id, marks, expected_version)
    }

    /// Lookup a record by id.
    pub fn get(&self, id: RecordId) -> Result<Option<MarkRecord>, MarkflowError> {
        self.backend.get(id)
    }

    /// Lookup a record id by its (student, assignment, component) tuple.
    #[must_use]
    pub fn find(&self, key: &RecordKey) -> Option<RecordId> {
        self.backend.get_by_key(key)
    }

    /// Query records matching a filter. Returns a cloned snapshot.
    pub fn query(&self, filter: &RecordFilter) -> Result<Vec<MarkRecord>, MarkflowError> {
        self.backend.query(filter)
    }

    // =========================================================================
    // WORKFLOW OPERATIONS
    // =========================================================================

    /// Draft -> Submitted, by the owning teacher.
    pub fn submit(
        &mut self,
        id: RecordId,
        actor: &Actor,
        at: Timestamp,
    ) -> Result<MarkRecord, MarkflowError> {
        WorkflowEngine::submit(&mut self.backend, id, actor, at)
    }

    /// Submitted -> Approved, by a department approver.
    pub fn approve(
        &mut self,
        id: RecordId,
        actor: &Actor,
        at: Timestamp,
    ) -> Result<MarkRecord, MarkflowError> {
        WorkflowEngine::approve(&mut self.backend, id, actor, at)
    }

    /// Submitted -> Rejected with a reason, by a department approver.
    pub fn reject(
        &mut self,
        id: RecordId,
        actor: &Actor,
        at: Timestamp,
        reason: impl Into<String>,
    ) -> Result<MarkRecord, MarkflowError> {
        WorkflowEngine::reject(&mut self.backend, id, actor, at, reason)
    }

    /// Rejected -> Draft, by the owning teacher.
    pub fn redraft(
        &mut self,
        id: RecordId,
        actor: &Actor,
        at: Timestamp,
    ) -> Result<MarkRecord, MarkflowError> {
        WorkflowEngine::redraft(&mut self.backend, id, actor, at)
    }

    /// Approved -> Frozen, by an institution approver.
    pub fn freeze(
        &mut self,
        id: RecordId,
        actor: &Actor,
        at: Timestamp,
    ) -> Result<MarkRecord, MarkflowError> {
        WorkflowEngine::freeze(&mut self.backend, id, actor, at)
    }

    /// Frozen -> Published, by an institution approver.
    pub fn publish(
        &mut self,
        id: RecordId,
        actor: &Actor,
        at: Timestamp,
    ) -> Result<MarkRecord, MarkflowError> {
        WorkflowEngine::publish(&mut self.backend, id, actor, at)
    }

    /// Submit a batch of records; every id reports its own outcome.
    pub fn bulk_submit(
        &mut self,
        ids: &[RecordId],
        actor: &Actor,
        at: Timestamp,
    ) -> Result<Vec<BulkItemOutcome>, MarkflowError> {
        WorkflowEngine::bulk_submit(&mut self.backend, ids, actor, at)
    }

    /// Administrative override: Frozen -> Draft, admin only, audited.
    pub fn administrative_reopen(
        &mut self,
        id: RecordId,
        actor: &Actor,
        at: Timestamp,
        reason: impl Into<String>,
    ) -> Result<MarkRecord, MarkflowError> {
        WorkflowEngine::administrative_reopen(&mut self.backend, id, actor, at, reason)
    }

    /// The audit trail of one record, in commit order.
    pub fn audit_trail(&self, id: RecordId) -> Result<Vec<AuditEntry>, MarkflowError> {
        self.backend.audit_trail(id)
    }

    // =========================================================================
    // METRICS
    // =========================================================================

    /// Number of records in the store.
    #[must_use]
    pub fn record_count(&self) -> usize {
        log_and_default(self.backend.record_count(), "record_count")
    }

    /// Number of audit entries in the store.
    #[must_use]
    pub fn audit_count(&self) -> usize {
        log_and_default(self.backend.audit_count(), "audit_count")
    }

    /// Store-wide data version.
    #[must_use]
    pub fn data_version(&self) -> u64 {
        self.backend.data_version()
    }

    /// Live attainment-cache entries.
    #[must_use]
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    // =========================================================================
    // SMART MARKS
    // =========================================================================

    /// Best-of-two total and grade for one student under one scheme.
    ///
    /// Reads only finalized records; a missing finalized component is a
    /// typed `MissingComponent` failure.
    pub fn smart_total(
        &self,
        student: StudentId,
        scheme: &SubjectScheme,
        scale: &GradeScale,
    ) -> Result<SmartTotal, MarkflowError> {
        let records = self.backend.query(
            &RecordFilter::for_assignment(scheme.assignment)
                .with_student(student)
                .finalized(),
        )?;
        compute_smart_total(student, &records, scheme, scale)
    }

    /// SGPA for one student over one semester's schemes.
    ///
    /// Subjects without a complete set of finalized components are
    /// excluded from both sums. Returns `Ok(None)` when nothing
    /// contributes.
    pub fn sgpa(
        &self,
        student: StudentId,
        semester: SemesterId,
        schemes: &[SubjectScheme],
        scale: &GradeScale,
    ) -> Result<Option<Gpa>, MarkflowError> {
        let entries = self.semester_entries(student, semester, schemes, scale)?;
        Ok(compute_sgpa(&entries))
    }

    /// CGPA for one student across all semesters present in `schemes`.
    ///
    /// Credit-weighted mean of per-semester SGPAs; semesters without any
    /// finalized subject are excluded.
    pub fn cgpa(
        &self,
        student: StudentId,
        schemes: &[SubjectScheme],
        scale: &GradeScale,
    ) -> Result<Option<Gpa>, MarkflowError> {
        let semesters: BTreeSet<SemesterId> = schemes.iter().map(|s| s.semester).collect();

        let mut weighted = Vec::new();
        for semester in semesters {
            let entries = self.semester_entries(student, semester, schemes, scale)?;
            let credits: u32 = entries.iter().map(|(_, c)| u32::from(c.value())).sum();
            if let Some(sgpa) = compute_sgpa(&entries) {
                weighted.push((sgpa, credits));
            }
        }
        Ok(compute_cgpa(&weighted))
    }

    /// Grade points and credits for the student's finalized subjects in
    /// one semester.
    fn semester_entries(
        &self,
        student: StudentId,
        semester: SemesterId,
        schemes: &[SubjectScheme],
        scale: &GradeScale,
    ) -> Result<Vec<(GradePoint, Credits)>, MarkflowError> {
        let mut entries = Vec::new();
        for scheme in schemes.iter().filter(|s| s.semester == semester) {
            match self.smart_total(student, scheme, scale) {
                Ok(total) => entries.push((total.points, scheme.credits)),
                // No finalized marks for the subject: excluded, not zero.
                Err(MarkflowError::MissingComponent { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(entries)
    }

    // =========================================================================
    // OUTCOME ATTAINMENT
    // =========================================================================

    /// Students holding at least one finalized record under a subject's
    /// assignments, optionally intersected with an explicit cohort.
    pub fn assessed_students(
        &self,
        subject: SubjectId,
        schemes: &[SubjectScheme],
        cohort: Option<&BTreeSet<StudentId>>,
    ) -> Result<BTreeSet<StudentId>, MarkflowError> {
        let mut eligible = BTreeSet::new();
        for scheme in schemes.iter().filter(|s| s.subject == subject) {
            let records = self
                .backend
                .query(&RecordFilter::for_assignment(scheme.assignment).finalized())?;
            eligible.extend(records.iter().map(|r| r.key.student));
        }
        if let Some(cohort) = cohort {
            eligible = eligible.intersection(cohort).copied().collect();
        }
        Ok(eligible)
    }

    /// CO attainment for every CO of a subject.
    ///
    /// Eligibility is derived from finalized records; the computation
    /// itself is the pure function in [`crate::outcome`]. Outcomes are
    /// recorded in the version-keyed cache for PO computations.
    pub fn co_attainment(
        &mut self,
        config: &OutcomeConfig,
        subject: SubjectId,
        schemes: &[SubjectScheme],
        scores: &[QuestionScore],
        cohort: Option<&BTreeSet<StudentId>>,
    ) -> Result<Vec<CoAttainmentReport>, MarkflowError> {
        let eligible = self.assessed_students(subject, schemes, cohort)?;
        let data_version = self.backend.data_version();
        self.cache.retain_current(config.version, data_version);

        let reports: Vec<CoAttainmentReport> = config
            .cos_for_subject(subject)
            .map(|co| compute_co_attainment(config, co.id, scores, &eligible))
            .collect();

        for report in &reports {
            self.cache.insert(
                CacheKey::co(report.co, config.version, data_version),
                report.outcome,
            );
        }
        Ok(reports)
    }

    /// PO attainment for every PO of a department.
    ///
    /// CO outcomes are taken from the cache when the configuration and
    /// data versions still match, and recomputed otherwise.
    pub fn po_attainment(
        &mut self,
        config: &OutcomeConfig,
        department: DepartmentId,
        schemes: &[SubjectScheme],
        scores: &[QuestionScore],
        cohort: Option<&BTreeSet<StudentId>>,
    ) -> Result<Vec<PoAttainmentReport>, MarkflowError> {
        let data_version = self.backend.data_version();
        self.cache.retain_current(config.version, data_version);

        let mut co_outcomes: BTreeMap<_, AttainmentOutcome> = BTreeMap::new();
        for co in config.cos.values() {
            let eligible = self.assessed_students(co.subject, schemes, cohort)?;
            let outcome = self.cache.get_or_insert_with(
                CacheKey::co(co.id, config.version, data_version),
                || compute_co_attainment(config, co.id, scores, &eligible).outcome,
            );
            co_outcomes.insert(co.id, outcome);
        }

        let reports = compute_department_attainment(config, department, &co_outcomes);
        for report in &reports {
            self.cache.insert(
                CacheKey::po(report.po, config.version, data_version),
                report.outcome,
            );
        }
        Ok(reports)
    }

    /// Capture an attainment snapshot for audit, stamped with the
    /// configuration and data versions it was computed under.
    #[must_use]
    pub fn take_snapshot(
        &self,
        config: &OutcomeConfig,
        co_reports: &[CoAttainmentReport],
        po_reports: &[PoAttainmentReport],
        at: Timestamp,
    ) -> AttainmentSnapshot {
        AttainmentSnapshot::build(
            config.version,
            self.backend.data_version(),
            at,
            co_reports,
            po_reports,
        )
    }
}

// =============================================================================
// TESTS
// =============================================================================
