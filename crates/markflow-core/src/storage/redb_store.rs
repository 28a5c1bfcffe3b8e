//! # redb-backed Record Storage
//!
//! A disk-backed mark record store using the redb embedded database.
//!
//! Replaces hand-rolled files/WAL with a battle-tested embedded
//! database, providing:
//! - ACID transactions
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)
//! - Zero configuration
//!
//! ## Audit atomicity
//!
//! Every workflow transition writes the updated record and its audit
//! entry inside one write transaction. If the transaction cannot commit,
//! neither the state change nor the entry persists - there is no path to
//! a state change without its audit trail.

use crate::audit::AuditEntry;
use crate::query::RecordFilter;
use crate::record::{validate_marks, MarkRecord, RecordKey, RecordStore};
use crate::types::{
    ActorId, ComponentType, LifecycleState, MarkflowError, Marks, RecordId, StudentId,
    SubjectAssignmentId, Timestamp,
};
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::collections::BTreeMap;
use std::path::Path;

/// Table for records: RecordId(u64) -> serialized MarkRecord bytes
const RECORDS: TableDefinition<u64, &[u8]> = TableDefinition::new("records");

/// Table for the key index: (student, assignment, component tag) -> record id
const KEY_INDEX: TableDefinition<(u64, u64, u8), u64> = TableDefinition::new("key_index");

/// Table for the audit log: seq -> serialized AuditEntry bytes
const AUDIT: TableDefinition<u64, &[u8]> = TableDefinition::new("audit");

/// Table for metadata: key string -> value u64
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

/// Stable storage tag for a component type.
const fn component_tag(component: ComponentType) -> u8 {
    match component {
        ComponentType::Internal1 => 0,
        ComponentType::Internal2 => 1,
        ComponentType::External => 2,
    }
}

/// Decode a storage tag back into a component type.
fn component_from_tag(tag: u8) -> Result<ComponentType, MarkflowError> {
    match tag {
        0 => Ok(ComponentType::Internal1),
        1 => Ok(ComponentType::Internal2),
        2 => Ok(ComponentType::External),
        other => Err(MarkflowError::DeserializationError(format!(
            "unknown component tag {other}"
        ))),
    }
}

fn key_tuple(key: &RecordKey) -> (u64, u64, u8) {
    (
        key.student.0,
        key.assignment.0,
        component_tag(key.component),
    )
}

/// A disk-backed mark record store using redb.
///
/// Maintains an in-memory key index for fast duplicate detection; all
/// durable state lives in the database.
pub struct RedbStore {
    /// The redb database handle.
    db: Database,
    /// In-memory cache of key -> record id for fast lookups.
    key_cache: BTreeMap<RecordKey, RecordId>,
    /// Next available record id.
    next_record_id: u64,
    /// Number of committed audit entries.
    audit_len: u64,
    /// Store-wide mutation counter.
    data_version: u64,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore")
            .field("key_cache_size", &self.key_cache.len())
            .field("next_record_id", &self.next_record_id)
            .field("audit_len", &self.audit_len)
            .field("data_version", &self.data_version)
            .finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create a record database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MarkflowError> {
        let db =
            Database::create(path.as_ref()).map_err(|e| MarkflowError::IoError(e.to_string()))?;

        // Initialize tables if they don't exist
        {
            let write_txn = db
                .begin_write()
                .map_err(|e| MarkflowError::IoError(e.to_string()))?;
            let _ = write_txn
                .open_table(RECORDS)
                .map_err(|e| MarkflowError::IoError(e.to_string()))?;
            let _ = write_txn
                .open_table(KEY_INDEX)
                .map_err(|e| MarkflowError::IoError(e.to_string()))?;
            let _ = write_txn
                .open_table(AUDIT)
                .map_err(|e| MarkflowError::IoError(e.to_string()))?;
            let _ = write_txn
                .open_table(METADATA)
                .map_err(|e| MarkflowError::IoError(e.to_string()))?;
            write_txn
                .commit()
                .map_err(|e| MarkflowError::IoError(e.to_string()))?;
        }

        // Load metadata
        let read_txn = db
            .begin_read()
            .map_err(|e| MarkflowError::IoError(e.to_string()))?;

        let read_meta = |key: &str| -> Result<u64, MarkflowError> {
            let table = read_txn
                .open_table(METADATA)
                .map_err(|e| MarkflowError::IoError(e.to_string()))?;
            Ok(table
                .get(key)
                .map_err(|e| MarkflowError::IoError(e.to_string()))?
                .map(|v| v.value())
                .unwrap_or(0))
        };

        let next_record_id = read_meta("next_record_id")?;
        let audit_len = read_meta("audit_len")?;
        let data_version = read_meta("data_version")?;

        // Load key cache
        let key_cache = {
            let table = read_txn
                .open_table(KEY_INDEX)
                .map_err(|e| MarkflowError::IoError(e.to_string()))?;
            let mut cache = BTreeMap::new();
            for entry in table
                .iter()
                .map_err(|e| MarkflowError::IoError(e.to_string()))?
            {
                let (key, value) = entry.map_err(|e| MarkflowError::IoError(e.to_string()))?;
                let (student, assignment, tag) = key.value();
                cache.insert(
                    RecordKey::new(
                        StudentId(student),
                        SubjectAssignmentId(assignment),
                        component_from_tag(tag)?,
                    ),
                    RecordId(value.value()),
                );
            }
            cache
        };

        Ok(Self {
            db,
            key_cache,
            next_record_id,
            audit_len,
            data_version,
        })
    }

    /// Compact the database (optional optimization).
    pub fn compact(&mut self) -> Result<(), MarkflowError> {
        self.db
            .compact()
            .map_err(|e| MarkflowError::IoError(e.to_string()))?;
        Ok(())
    }

    fn decode_record(bytes: &[u8]) -> Result<MarkRecord, MarkflowError> {
        postcard::from_bytes(bytes).map_err(|e| MarkflowError::DeserializationError(e.to_string()))
    }

    fn decode_entry(bytes: &[u8]) -> Result<AuditEntry, MarkflowError> {
        postcard::from_bytes(bytes).map_err(|e| MarkflowError::DeserializationError(e.to_string()))
    }

    fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, MarkflowError> {
        postcard::to_allocvec(value).map_err(|e| MarkflowError::SerializationError(e.to_string()))
    }

    /// Write a record (and bumped metadata) in one transaction.
    fn put_record(&mut self, record: &MarkRecord) -> Result<(), MarkflowError> {
        let bytes = Self::encode(record)?;
        let next_version = self.data_version.saturating_add(1);

        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| MarkflowError::IoError(e.to_string()))?;
        {
            let mut records_table = write_txn
                .open_table(RECORDS)
                .map_err(|e| MarkflowError::IoError(e.to_string()))?;
            let mut key_table = write_txn
                .open_table(KEY_INDEX)
                .map_err(|e| MarkflowError::IoError(e.to_string()))?;
            let mut meta_table = write_txn
                .open_table(METADATA)
                .map_err(|e| MarkflowError::IoError(e.to_string()))?;

            records_table
                .insert(record.id.0, bytes.as_slice())
                .map_err(|e| MarkflowError::IoError(e.to_string()))?;
            key_table
                .insert(key_tuple(&record.key), record.id.0)
                .map_err(|e| MarkflowError::IoError(e.to_string()))?;
            meta_table
                .insert(
                    "next_record_id",
                    self.next_record_id.max(record.id.0.saturating_add(1)),
                )
                .map_err(|e| MarkflowError::IoError(e.to_string()))?;
            meta_table
                .insert("data_version", next_version)
                .map_err(|e| MarkflowError::IoError(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| MarkflowError::IoError(e.to_string()))?;

        self.next_record_id = self.next_record_id.max(record.id.0.saturating_add(1));
        self.data_version = next_version;
        self.key_cache.insert(record.key, record.id);
        Ok(())
    }
}

impl RecordStore for RedbStore {
    fn create(
        &mut self,
        key: RecordKey,
        owner: ActorId,
        marks: Marks,
        max_marks: Marks,
        at: Timestamp,
    ) -> Result<RecordId, MarkflowError> {
        validate_marks(marks, max_marks)?;

        if let Some(&existing_id) = self.key_cache.get(&key) {
            let existing = self
                .get(existing_id)?
                .ok_or(MarkflowError::RecordNotFound(existing_id))?;
            if existing.state != LifecycleState::Draft {
                return Err(MarkflowError::DuplicateRecord(existing_id));
            }
            let mut updated = existing;
            updated.marks = marks;
            updated.max_marks = max_marks;
            updated.version = updated.version.saturating_add(1);
            self.put_record(&updated)?;
            return Ok(existing_id);
        }

        let id = RecordId(self.next_record_id);
        let record = MarkRecord::new(id, key, owner, marks, max_marks, at);
        self.put_record(&record)?;
        Ok(id)
    }

    fn update_value(
        &mut self,
        id: RecordId,
        marks: Marks,
        expected_version: u64,
    ) -> Result<u64, MarkflowError> {
        let record = self.get(id)?.ok_or(MarkflowError::RecordNotFound(id))?;
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

        let mut updated = record;
        updated.marks = marks;
        updated.version = updated.version.saturating_add(1);
        let new_version = updated.version;
        self.put_record(&updated)?;
        Ok(new_version)
    }

    fn get(&self, id: RecordId) -> Result<Option<MarkRecord>, MarkflowError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| MarkflowError::IoError(e.to_string()))?;
        let table = read_txn
            .open_table(RECORDS)
            .map_err(|e| MarkflowError::IoError(e.to_string()))?;
        match table
            .get(id.0)
            .map_err(|e| MarkflowError::IoError(e.to_string()))?
        {
            Some(bytes) => Ok(Some(Self::decode_record(bytes.value())?)),
            None => Ok(None),
        }
    }

    fn get_by_key(&self, key: &RecordKey) -> Option<RecordId> {
        self.key_cache.get(key).copied()
    }

    fn query(&self, filter: &RecordFilter) -> Result<Vec<MarkRecord>, MarkflowError> {
        // One read transaction = one MVCC snapshot; a concurrent freeze
        // cannot leak into the middle of this scan.
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| MarkflowError::IoError(e.to_string()))?;
        let table = read_txn
            .open_table(RECORDS)
            .map_err(|e| MarkflowError::IoError(e.to_string()))?;

        let mut out = Vec::new();
        for entry in table
            .iter()
            .map_err(|e| MarkflowError::IoError(e.to_string()))?
        {
            let (_, bytes) = entry.map_err(|e| MarkflowError::IoError(e.to_string()))?;
            let record = Self::decode_record(bytes.value())?;
            if filter.matches(&record) {
                out.push(record);
            }
        }
        Ok(out)
    }

    fn commit_transition(
        &mut self,
        id: RecordId,
        expected_state: LifecycleState,
        expected_version: u64,
        mut updated: MarkRecord,
        mut entry: AuditEntry,
    ) -> Result<MarkRecord, MarkflowError> {
        let next_seq = self.audit_len.saturating_add(1);
        let next_data_version = self.data_version.saturating_add(1);

        updated.id = id;
        updated.version = expected_version.saturating_add(1);
        entry.seq = next_seq;

        let record_bytes = Self::encode(&updated)?;
        let entry_bytes = Self::encode(&entry)?;

        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| MarkflowError::IoError(e.to_string()))?;
        {
            let mut records_table = write_txn
                .open_table(RECORDS)
                .map_err(|e| MarkflowError::IoError(e.to_string()))?;
            let mut audit_table = write_txn
                .open_table(AUDIT)
                .map_err(|e| MarkflowError::IoError(e.to_string()))?;
            let mut meta_table = write_txn
                .open_table(METADATA)
                .map_err(|e| MarkflowError::IoError(e.to_string()))?;

            // CAS inside the write transaction: nothing can slip between
            // the check and the write.
            let current = match records_table
                .get(id.0)
                .map_err(|e| MarkflowError::IoError(e.to_string()))?
            {
                Some(bytes) => Self::decode_record(bytes.value())?,
                None => return Err(MarkflowError::RecordNotFound(id)),
            };
            if current.state != expected_state || current.version != expected_version {
                return Err(MarkflowError::Conflict {
                    expected: expected_version,
                    found: current.version,
                });
            }

            records_table
                .insert(id.0, record_bytes.as_slice())
                .map_err(|e| MarkflowError::IoError(e.to_string()))?;
            audit_table
                .insert(next_seq, entry_bytes.as_slice())
                .map_err(|e| MarkflowError::IoError(e.to_string()))?;
            meta_table
                .insert("audit_len", next_seq)
                .map_err(|e| MarkflowError::IoError(e.to_string()))?;
            meta_table
                .insert("data_version", next_data_version)
                .map_err(|e| MarkflowError::IoError(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| MarkflowError::IoError(e.to_string()))?;

        self.audit_len = next_seq;
        self.data_version = next_data_version;
        Ok(updated)
    }

    fn audit_trail(&self, id: RecordId) -> Result<Vec<AuditEntry>, MarkflowError> {
        Ok(self
            .audit_log()?
            .into_iter()
            .filter(|e| e.record == id)
            .collect())
    }

    fn audit_log(&self) -> Result<Vec<AuditEntry>, MarkflowError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| MarkflowError::IoError(e.to_string()))?;
        let table = read_txn
            .open_table(AUDIT)
            .map_err(|e| MarkflowError::IoError(e.to_string()))?;

        let mut out = Vec::new();
        for entry in table
            .iter()
            .map_err(|e| MarkflowError::IoError(e.to_string()))?
        {
            let (_, bytes) = entry.map_err(|e| MarkflowError::IoError(e.to_string()))?;
            out.push(Self::decode_entry(bytes.value())?);
        }
        Ok(out)
    }

    fn audit_count(&self) -> Result<usize, MarkflowError> {
        Ok(self.audit_len as usize)
    }

    fn record_count(&self) -> Result<usize, MarkflowError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| MarkflowError::IoError(e.to_string()))?;
        let table = read_txn
            .open_table(RECORDS)
            .map_err(|e| MarkflowError::IoError(e.to_string()))?;
        Ok(table
            .len()
            .map_err(|e| MarkflowError::IoError(e.to_string()))? as usize)
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
    use crate::types::{Actor, Role};
    use crate::workflow::WorkflowEngine;

    fn temp_store() -> (RedbStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = RedbStore::open(dir.path().join("marks.redb")).expect("open");
        (store, dir)
    }

    fn seed(store: &mut RedbStore) -> RecordId {
        store
            .create(
                RecordKey::new(
                    StudentId(1),
                    SubjectAssignmentId(10),
                    ComponentType::Internal1,
                ),
                ActorId(7),
                Marks(30),
                Marks(40),
                Timestamp(100),
            )
            .expect("create")
    }

    #[test]
    fn create_and_get_round_trip() {
        let (mut store, _dir) = temp_store();
        let id = seed(&mut store);

        let record = store.get(id).expect("get").expect("exists");
        assert_eq!(record.marks, Marks(30));
        assert_eq!(record.state, LifecycleState::Draft);
        assert_eq!(record.version, 1);
    }

    #[test]
    fn state_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("marks.redb");
        let owner = Actor::new(ActorId(7), Role::Teacher);

        let id = {
            let mut store = RedbStore::open(&path).expect("open");
            let id = seed(&mut store);
            WorkflowEngine::submit(&mut store, id, &owner, Timestamp(200)).expect("submit");
            id
        };

        let store = RedbStore::open(&path).expect("reopen");
        let record = store.get(id).expect("get").expect("exists");
        assert_eq!(record.state, LifecycleState::Submitted);
        assert_eq!(store.audit_count().expect("count"), 1);
        assert_eq!(
            store.get_by_key(&RecordKey::new(
                StudentId(1),
                SubjectAssignmentId(10),
                ComponentType::Internal1,
            )),
            Some(id)
        );
        assert!(store.data_version() >= 2);
    }

    #[test]
    fn duplicate_detection_across_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("marks.redb");
        let owner = Actor::new(ActorId(7), Role::Teacher);

        {
            let mut store = RedbStore::open(&path).expect("open");
            let id = seed(&mut store);
            WorkflowEngine::submit(&mut store, id, &owner, Timestamp(200)).expect("submit");
        }

        let mut store = RedbStore::open(&path).expect("reopen");
        let result = store.create(
            RecordKey::new(
                StudentId(1),
                SubjectAssignmentId(10),
                ComponentType::Internal1,
            ),
            ActorId(7),
            Marks(38),
            Marks(40),
            Timestamp(300),
        );
        assert!(matches!(result, Err(MarkflowError::DuplicateRecord(_))));
    }

    #[test]
    fn transition_and_audit_commit_together() {
        let (mut store, _dir) = temp_store();
        let id = seed(&mut store);
        let owner = Actor::new(ActorId(7), Role::Teacher);

        WorkflowEngine::submit(&mut store, id, &owner, Timestamp(200)).expect("submit");

        let trail = store.audit_trail(id).expect("trail");
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].seq, 1);
        assert_eq!(trail[0].from, LifecycleState::Draft);
        assert_eq!(trail[0].to, LifecycleState::Submitted);
    }

    #[test]
    fn cas_failure_leaves_database_untouched() {
        let (mut store, _dir) = temp_store();
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
            Timestamp(200),
            None,
        );

        let result =
            store.commit_transition(id, LifecycleState::Draft, 42, updated, entry);
        assert!(matches!(result, Err(MarkflowError::Conflict { .. })));

        assert_eq!(store.audit_count().expect("count"), 0);
        let unchanged = store.get(id).expect("get").expect("exists");
        assert_eq!(unchanged.state, LifecycleState::Draft);
        assert_eq!(unchanged.version, 1);
    }

    #[test]
    fn stale_version_update_conflicts() {
        let (mut store, _dir) = temp_store();
        let id = seed(&mut store);

        store.update_value(id, Marks(32), 1).expect("update");
        let result = store.update_value(id, Marks(28), 1);
        assert!(matches!(result, Err(MarkflowError::Conflict { .. })));
    }

    #[test]
    fn query_filters_records() {
        let (mut store, _dir) = temp_store();
        seed(&mut store);
        store
            .create(
                RecordKey::new(
                    StudentId(2),
                    SubjectAssignmentId(10),
                    ComponentType::External,
                ),
                ActorId(7),
                Marks(50),
                Marks(60),
                Timestamp(100),
            )
            .expect("create");

        let all = store.query(&RecordFilter::any()).expect("query");
        assert_eq!(all.len(), 2);

        let externals = store
            .query(&RecordFilter::any().with_component(ComponentType::External))
            .expect("query");
        assert_eq!(externals.len(), 1);
        assert_eq!(externals[0].key.student, StudentId(2));
    }

    #[test]
    fn component_tags_round_trip() {
        for component in [
            ComponentType::Internal1,
            ComponentType::Internal2,
            ComponentType::External,
        ] {
            let tag = component_tag(component);
            assert_eq!(component_from_tag(tag).expect("tag"), component);
        }
        assert!(component_from_tag(9).is_err());
    }
}
