//! # Workflow State Machine
//!
//! Consolidates every legal mark-record lifecycle transition.
//!
//! The machine is a table, not a branch tree: each edge is one
//! `TransitionRule` row (from-state, to-state, actor class, side
//! effects), and `transition` looks the row up. Adding an edge is a
//! table edit.
//!
//! All transitions are:
//! - Role-gated (the rule's actor class must match the caller)
//! - Audited (exactly one entry, atomic with the state change)
//! - Compare-and-swapped on the record's (state, version) pair

use crate::audit::AuditEntry;
use crate::primitives::{MAX_BULK_RECORDS, MAX_NOTE_LENGTH};
use crate::record::{MarkRecord, RecordStore};
use crate::types::{Actor, LifecycleState, MarkflowError, RecordId, Role, Timestamp};

// =============================================================================
// TRANSITION TABLE
// =============================================================================

/// Who may drive a transition edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorClass {
    /// The record's owning teacher.
    Owner,
    /// Any department-level approver.
    DepartmentApprover,
    /// Any institution-level approver.
    InstitutionApprover,
}

/// One row of the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRule {
    /// State the record must be in.
    pub from: LifecycleState,
    /// State the edge leads to.
    pub to: LifecycleState,
    /// Actor class authorized for the edge.
    pub actor: ActorClass,
    /// Whether a note is mandatory (rejection).
    pub requires_reason: bool,
}

/// The complete legal transition table.
///
/// Anything not in this table is an `InvalidTransition`, regardless of
/// who asks.
pub const TRANSITIONS: &[TransitionRule] = &[
    TransitionRule {
        from: LifecycleState::Draft,
        to: LifecycleState::Submitted,
        actor: ActorClass::Owner,
        requires_reason: false,
    },
    TransitionRule {
        from: LifecycleState::Submitted,
        to: LifecycleState::Approved,
        actor: ActorClass::DepartmentApprover,
        requires_reason: false,
    },
    TransitionRule {
        from: LifecycleState::Submitted,
        to: LifecycleState::Rejected,
        actor: ActorClass::DepartmentApprover,
        requires_reason: true,
    },
    TransitionRule {
        from: LifecycleState::Rejected,
        to: LifecycleState::Draft,
        actor: ActorClass::Owner,
        requires_reason: false,
    },
    TransitionRule {
        from: LifecycleState::Approved,
        to: LifecycleState::Frozen,
        actor: ActorClass::InstitutionApprover,
        requires_reason: false,
    },
    TransitionRule {
        from: LifecycleState::Frozen,
        to: LifecycleState::Published,
        actor: ActorClass::InstitutionApprover,
        requires_reason: false,
    },
];

/// Look up the rule for a (from, to) edge.
#[must_use]
pub fn rule_for(from: LifecycleState, to: LifecycleState) -> Option<&'static TransitionRule> {
    TRANSITIONS.iter().find(|r| r.from == from && r.to == to)
}

// =============================================================================
// BULK OUTCOMES
// =============================================================================

/// Per-record outcome of a bulk operation.
///
/// Bulk requests are not all-or-nothing: one invalid record never blocks
/// its siblings, and each id reports its own success or typed failure.
#[derive(Debug)]
pub struct BulkItemOutcome {
    /// The record this outcome belongs to.
    pub record: RecordId,
    /// New state on success, typed failure otherwise.
    pub outcome: Result<LifecycleState, MarkflowError>,
}

impl BulkItemOutcome {
    /// Whether the item succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

// =============================================================================
// WORKFLOW ENGINE
// =============================================================================

/// The WorkflowEngine consolidates all lifecycle transitions.
///
/// It holds no state of its own; every call reads the record, checks the
/// table, and commits the mutated record together with its audit entry
/// through the store's atomic compare-and-swap.
pub struct WorkflowEngine;

impl WorkflowEngine {
    /// Attempt the (current state -> `to`) transition on a record.
    ///
    /// Checks, in order: record existence, table membership
    /// (`InvalidTransition`), actor authorization (`Forbidden`), reason
    /// requirement (`MissingReason`), note length. Only then is the store
    /// asked to commit; a concurrent mutation surfaces as `Conflict`.
    pub fn transition<S: RecordStore>(
        store: &mut S,
        id: RecordId,
        to: LifecycleState,
        actor: &Actor,
        at: Timestamp,
        note: Option<String>,
    ) -> Result<MarkRecord, MarkflowError> {
        let record = store
            .get(id)?
            .ok_or(MarkflowError::RecordNotFound(id))?;
        let from = record.state;

        let rule = rule_for(from, to).ok_or(MarkflowError::InvalidTransition { from, to })?;
        authorize(rule, &record, actor)?;

        if rule.requires_reason && note.as_deref().is_none_or(|n| n.trim().is_empty()) {
            return Err(MarkflowError::MissingReason);
        }
        validate_note(&note)?;

        let mut updated = record.clone();
        apply_side_effects(&mut updated, rule, actor, at, &note);

        let entry = AuditEntry::draft(id, from, to, actor.id, actor.role, at, note);
        store.commit_transition(id, from, record.version, updated, entry)
    }

    /// Draft -> Submitted, by the owning teacher.
    pub fn submit<S: RecordStore>(
        store: &mut S,
        id: RecordId,
        actor: &Actor,
        at: Timestamp,
    ) -> Result<MarkRecord, MarkflowError> {
        Self::transition(store, id, LifecycleState::Submitted, actor, at, None)
    }

    /// Submitted -> Approved, by a department approver.
    pub fn approve<S: RecordStore>(
        store: &mut S,
        id: RecordId,
        actor: &Actor,
        at: Timestamp,
    ) -> Result<MarkRecord, MarkflowError> {
        Self::transition(store, id, LifecycleState::Approved, actor, at, None)
    }

    /// Submitted -> Rejected, by a department approver. Reason mandatory.
    pub fn reject<S: RecordStore>(
        store: &mut S,
        id: RecordId,
        actor: &Actor,
        at: Timestamp,
        reason: impl Into<String>,
    ) -> Result<MarkRecord, MarkflowError> {
        Self::transition(
            store,
            id,
            LifecycleState::Rejected,
            actor,
            at,
            Some(reason.into()),
        )
    }

    /// Rejected -> Draft, by the owning teacher. Clears approval stamps.
    pub fn redraft<S: RecordStore>(
        store: &mut S,
        id: RecordId,
        actor: &Actor,
        at: Timestamp,
    ) -> Result<MarkRecord, MarkflowError> {
        Self::transition(store, id, LifecycleState::Draft, actor, at, None)
    }

    /// Approved -> Frozen, by an institution approver.
    pub fn freeze<S: RecordStore>(
        store: &mut S,
        id: RecordId,
        actor: &Actor,
        at: Timestamp,
    ) -> Result<MarkRecord, MarkflowError> {
        Self::transition(store, id, LifecycleState::Frozen, actor, at, None)
    }

    /// Frozen -> Published, by an institution approver.
    pub fn publish<S: RecordStore>(
        store: &mut S,
        id: RecordId,
        actor: &Actor,
        at: Timestamp,
    ) -> Result<MarkRecord, MarkflowError> {
        Self::transition(store, id, LifecycleState::Published, actor, at, None)
    }

    /// Submit a batch of records, evaluating each independently.
    ///
    /// Returns one outcome per id, in input order. The only batch-level
    /// failure is a batch exceeding `MAX_BULK_RECORDS`.
    pub fn bulk_submit<S: RecordStore>(
        store: &mut S,
        ids: &[RecordId],
        actor: &Actor,
        at: Timestamp,
    ) -> Result<Vec<BulkItemOutcome>, MarkflowError> {
        if ids.len() > MAX_BULK_RECORDS {
            return Err(MarkflowError::SerializationError(format!(
                "bulk size {} exceeds maximum {}",
                ids.len(),
                MAX_BULK_RECORDS
            )));
        }

        Ok(ids
            .iter()
            .map(|&id| BulkItemOutcome {
                record: id,
                outcome: Self::submit(store, id, actor, at).map(|r| r.state),
            })
            .collect())
    }

    /// Administrative override: Frozen -> Draft.
    ///
    /// Not an edge of the transition table - normal workflow cannot reach
    /// it. Admin role only, note mandatory, audited like any transition.
    /// Clears approval and freeze stamps so the record re-enters the
    /// normal flow from Draft.
    pub fn administrative_reopen<S: RecordStore>(
        store: &mut S,
        id: RecordId,
        actor: &Actor,
        at: Timestamp,
        reason: impl Into<String>,
    ) -> Result<MarkRecord, MarkflowError> {
        let record = store
            .get(id)?
            .ok_or(MarkflowError::RecordNotFound(id))?;
        let from = record.state;

        if from != LifecycleState::Frozen {
            return Err(MarkflowError::InvalidTransition {
                from,
                to: LifecycleState::Draft,
            });
        }
        if actor.role != Role::Admin {
            return Err(MarkflowError::Forbidden {
                role: actor.role,
                from,
                to: LifecycleState::Draft,
            });
        }
        let reason = reason.into();
        if reason.trim().is_empty() {
            return Err(MarkflowError::MissingReason);
        }
        let note = Some(reason);
        validate_note(&note)?;

        let mut updated = record.clone();
        updated.state = LifecycleState::Draft;
        updated.stamps.clear_approvals();
        updated.stamps.frozen = None;
        updated.rejection_reason = None;

        let entry = AuditEntry::draft(
            id,
            from,
            LifecycleState::Draft,
            actor.id,
            actor.role,
            at,
            note,
        );
        store.commit_transition(id, from, record.version, updated, entry)
    }
}

// =============================================================================
// GUARDS & SIDE EFFECTS
// =============================================================================

/// Check the actor against the rule's actor class.
fn authorize(
    rule: &TransitionRule,
    record: &MarkRecord,
    actor: &Actor,
) -> Result<(), MarkflowError> {
    let authorized = match rule.actor {
        ActorClass::Owner => actor.role == Role::Teacher && actor.id == record.owner,
        ActorClass::DepartmentApprover => actor.role == Role::DepartmentApprover,
        ActorClass::InstitutionApprover => actor.role == Role::InstitutionApprover,
    };
    if authorized {
        Ok(())
    } else {
        Err(MarkflowError::Forbidden {
            role: actor.role,
            from: rule.from,
            to: rule.to,
        })
    }
}

/// Reject oversized notes before they reach storage.
fn validate_note(note: &Option<String>) -> Result<(), MarkflowError> {
    if let Some(n) = note {
        if n.len() > MAX_NOTE_LENGTH {
            return Err(MarkflowError::SerializationError(format!(
                "note length {} exceeds maximum {} bytes",
                n.len(),
                MAX_NOTE_LENGTH
            )));
        }
    }
    Ok(())
}

/// Apply the per-edge side effects: state, stamps, rejection reason.
fn apply_side_effects(
    record: &mut MarkRecord,
    rule: &TransitionRule,
    actor: &Actor,
    at: Timestamp,
    note: &Option<String>,
) {
    record.state = rule.to;
    match rule.to {
        LifecycleState::Submitted => record.stamps.submitted = Some((actor.id, at)),
        LifecycleState::Approved => record.stamps.approved = Some((actor.id, at)),
        LifecycleState::Rejected => {
            record.stamps.rejected = Some((actor.id, at));
            record.rejection_reason = note.clone();
        }
        LifecycleState::Draft => {
            // Rejected -> Draft: the approval path starts over.
            record.stamps.clear_approvals();
            record.rejection_reason = None;
        }
        LifecycleState::Frozen => record.stamps.frozen = Some((actor.id, at)),
        LifecycleState::Published => record.stamps.published = Some((actor.id, at)),
    }
}

// =============================================================================
// TESTS
// =============================================================================
