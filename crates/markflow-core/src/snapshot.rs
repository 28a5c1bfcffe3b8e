//! # Attainment Snapshots
//!
//! Reproducible, self-describing captures of an attainment run.
//!
//! Attainment is always computed fresh from current records and
//! configuration; a snapshot exists only when a caller explicitly asks
//! for one (compliance audits). The header records the configuration and
//! data versions the run used, so a historical report can be traced to
//! the exact mapping state it was computed under even after the matrix
//! is edited.
//!
//! ## Wire format
//!
//! `MAGIC_BYTES ("MKFS") + FORMAT_VERSION (u8) + postcard payload`

use crate::outcome::{
    AttainmentOutcome, CoAttainmentReport, ConfigVersion, PoAttainmentReport,
};
use crate::primitives::{FORMAT_VERSION, MAGIC_BYTES};
use crate::types::{CoId, MarkflowError, PoId, Timestamp};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

// =============================================================================
// SNAPSHOT STRUCTURES
// =============================================================================

/// Provenance header of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    /// Serialization format version.
    pub format_version: u8,
    /// Outcome configuration version the run used.
    pub config_version: ConfigVersion,
    /// Record-store data version the run used.
    pub data_version: u64,
    /// Caller-supplied capture time.
    pub taken_at: Timestamp,
}

/// One CO row of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoSnapshotRow {
    /// The CO.
    pub co: CoId,
    /// The CO's code at capture time.
    pub code: String,
    /// Attainment outcome at capture time.
    pub outcome: AttainmentOutcome,
    /// Students assessed.
    pub assessed: usize,
    /// Students meeting the target.
    pub meeting_target: usize,
}

/// One PO row of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoSnapshotRow {
    /// The PO.
    pub po: PoId,
    /// The PO's code at capture time.
    pub code: String,
    /// Attainment outcome at capture time.
    pub outcome: AttainmentOutcome,
    /// COs mapped at capture time.
    pub mapped: usize,
}

/// A complete attainment snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttainmentSnapshot {
    /// Provenance header.
    pub header: SnapshotHeader,
    /// CO rows, in CO-id order.
    pub co_rows: Vec<CoSnapshotRow>,
    /// PO rows, in PO-id order.
    pub po_rows: Vec<PoSnapshotRow>,
}

impl AttainmentSnapshot {
    /// Build a snapshot from computed reports.
    ///
    /// Per-student classifications are deliberately not captured: the
    /// snapshot is a compliance artifact, not a transcript store.
    #[must_use]
    pub fn build(
        config_version: ConfigVersion,
        data_version: u64,
        taken_at: Timestamp,
        co_reports: &[CoAttainmentReport],
        po_reports: &[PoAttainmentReport],
    ) -> Self {
        Self {
            header: SnapshotHeader {
                format_version: FORMAT_VERSION,
                config_version,
                data_version,
                taken_at,
            },
            co_rows: co_reports
                .iter()
                .map(|r| CoSnapshotRow {
                    co: r.co,
                    code: r.code.clone(),
                    outcome: r.outcome,
                    assessed: r.assessed,
                    meeting_target: r.meeting_target,
                })
                .collect(),
            po_rows: po_reports
                .iter()
                .map(|r| PoSnapshotRow {
                    po: r.po,
                    code: r.code.clone(),
                    outcome: r.outcome,
                    mapped: r.mapped,
                })
                .collect(),
        }
    }
}

// =============================================================================
// ENCODING
// =============================================================================

/// Serialize a snapshot with the framing header.
pub fn snapshot_to_bytes(snapshot: &AttainmentSnapshot) -> Result<Vec<u8>, MarkflowError> {
    let payload = postcard::to_allocvec(snapshot)
        .map_err(|e| MarkflowError::SerializationError(e.to_string()))?;

    let mut bytes = Vec::with_capacity(MAGIC_BYTES.len() + 1 + payload.len());
    bytes.extend_from_slice(MAGIC_BYTES);
    bytes.push(FORMAT_VERSION);
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

/// Decode a framed snapshot, checking magic and version.
pub fn snapshot_from_bytes(bytes: &[u8]) -> Result<AttainmentSnapshot, MarkflowError> {
    if bytes.len() < MAGIC_BYTES.len() + 1 {
        return Err(MarkflowError::DeserializationError(
            "snapshot too short for header".to_string(),
        ));
    }
    if &bytes[..MAGIC_BYTES.len()] != MAGIC_BYTES {
        return Err(MarkflowError::DeserializationError(
            "bad snapshot magic bytes".to_string(),
        ));
    }
    let version = bytes[MAGIC_BYTES.len()];
    if version != FORMAT_VERSION {
        return Err(MarkflowError::DeserializationError(format!(
            "unsupported snapshot format version {version}"
        )));
    }

    postcard::from_bytes(&bytes[MAGIC_BYTES.len() + 1..])
        .map_err(|e| MarkflowError::DeserializationError(e.to_string()))
}

/// Integrity checksum over the framed bytes.
///
/// Fast structural checksum for transport/storage checks. For a
/// cryptographic digest enable the `crypto-hash` feature and use
/// [`snapshot_digest`].
pub fn snapshot_checksum(snapshot: &AttainmentSnapshot) -> Result<u64, MarkflowError> {
    let bytes = snapshot_to_bytes(snapshot)?;
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    bytes.hash(&mut hasher);
    Ok(hasher.finish())
}

/// Decode and verify a snapshot against an expected checksum.
pub fn verify_snapshot(bytes: &[u8], expected: u64) -> Result<AttainmentSnapshot, MarkflowError> {
    let snapshot = snapshot_from_bytes(bytes)?;
    let actual = snapshot_checksum(&snapshot)?;
    if actual != expected {
        return Err(MarkflowError::DeserializationError(format!(
            "snapshot checksum mismatch: expected {expected}, computed {actual}"
        )));
    }
    Ok(snapshot)
}

/// BLAKE3 digest over the framed bytes.
#[cfg(feature = "crypto-hash")]
pub fn snapshot_digest(snapshot: &AttainmentSnapshot) -> Result<[u8; 32], MarkflowError> {
    let bytes = snapshot_to_bytes(snapshot)?;
    Ok(*blake3::hash(&bytes).as_bytes())
}

// =============================================================================
// TESTS
// =============================================================================
