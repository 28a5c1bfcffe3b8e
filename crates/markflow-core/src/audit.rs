//! # Audit Trail
//!
//! Immutable records of every workflow transition.
//!
//! Audit entries are created exclusively by the workflow engine and are
//! appended inside the same mutation unit as the state change they
//! describe. A state change that cannot write its audit entry does not
//! happen. Entries are never mutated or deleted.

use crate::types::{ActorId, LifecycleState, RecordId, Role, Timestamp};
use serde::{Deserialize, Serialize};

/// One immutable audit entry.
///
/// `seq` is assigned by the store at commit time and is strictly
/// increasing across the whole store, so the trail has a total order
/// independent of timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Store-wide sequence number, assigned at commit.
    pub seq: u64,
    /// The record this transition applied to.
    pub record: RecordId,
    /// State before the transition.
    pub from: LifecycleState,
    /// State after the transition.
    pub to: LifecycleState,
    /// Identity of the actor who performed the transition.
    pub actor: ActorId,
    /// Role the actor held at the time.
    pub role: Role,
    /// Caller-supplied timestamp of the transition.
    pub at: Timestamp,
    /// Optional note (mandatory for rejection and administrative reopen).
    pub note: Option<String>,
}

impl AuditEntry {
    /// Create an unsealed entry with `seq = 0`.
    ///
    /// The store assigns the real sequence number when it commits the
    /// entry together with the state change.
    #[must_use]
    pub fn draft(
        record: RecordId,
        from: LifecycleState,
        to: LifecycleState,
        actor: ActorId,
        role: Role,
        at: Timestamp,
        note: Option<String>,
    ) -> Self {
        Self {
            seq: 0,
            record,
            from,
            to,
            actor,
            role,
            at,
            note,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_has_no_sequence() {
        let entry = AuditEntry::draft(
            RecordId(1),
            LifecycleState::Draft,
            LifecycleState::Submitted,
            ActorId(7),
            Role::Teacher,
            Timestamp(1000),
            None,
        );
        assert_eq!(entry.seq, 0);
        assert_eq!(entry.from, LifecycleState::Draft);
        assert_eq!(entry.to, LifecycleState::Submitted);
    }
}
