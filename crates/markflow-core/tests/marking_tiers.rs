//! # Validation Tier Tests (T0-T3)
//!
//! If ANY tier fails, the system is INVALID.
//!
//! ## Tiers
//! - T0: Record Integrity
//! - T1: Transition Legality & Audit
//! - T2: Smart Marks
//! - T3: Outcome Attainment

use markflow_core::{
    Actor, ActorId, AttainmentOutcome, BasisPoints, CoDefinition, CoId, CoPoEntry, CoTarget,
    CognitiveLevel, ComponentType, ConfigVersion, Credits, DepartmentId, Gpa, GradePoint,
    LifecycleState, MarkflowError, Marks, MemoryStore, NotComputableReason, OutcomeConfig,
    PoDefinition, PoId, QuestionCoWeight, QuestionId, QuestionScore, RecordKey, RecordStore,
    Role, SemesterId, Session, StudentId, SubjectAssignmentId, SubjectId, Timestamp,
    WorkflowEngine,
};
use std::collections::BTreeSet;

const OWNER: Actor = Actor::new(ActorId(7), Role::Teacher);
const HOD: Actor = Actor::new(ActorId(20), Role::DepartmentApprover);
const COE: Actor = Actor::new(ActorId(30), Role::InstitutionApprover);

fn key(student: u64, assignment: u64, component: ComponentType) -> RecordKey {
    RecordKey::new(StudentId(student), SubjectAssignmentId(assignment), component)
}

// =============================================================================
// TIER T0: RECORD INTEGRITY
// =============================================================================

mod t0_record_integrity {
    use super::*;

    /// T0.1: At most one record per (student, assignment, component) tuple.
    #[test]
    fn one_record_per_tuple() {
        let mut store = MemoryStore::new();
        let first = store
            .create(
                key(1, 10, ComponentType::Internal1),
                OWNER.id,
                Marks(30),
                Marks(40),
                Timestamp(100),
            )
            .expect("create");
        let second = store
            .create(
                key(1, 10, ComponentType::Internal1),
                OWNER.id,
                Marks(35),
                Marks(40),
                Timestamp(200),
            )
            .expect("re-entry");

        assert_eq!(first, second);
        assert_eq!(store.record_count().expect("count"), 1);
    }

    /// T0.2: Re-entry is only permitted pre-submission.
    #[test]
    fn re_entry_blocked_after_submission() {
        let mut store = MemoryStore::new();
        let id = store
            .create(
                key(1, 10, ComponentType::Internal1),
                OWNER.id,
                Marks(30),
                Marks(40),
                Timestamp(100),
            )
            .expect("create");
        WorkflowEngine::submit(&mut store, id, &OWNER, Timestamp(200)).expect("submit");

        let result = store.create(
            key(1, 10, ComponentType::Internal1),
            OWNER.id,
            Marks(38),
            Marks(40),
            Timestamp(300),
        );
        assert!(matches!(result, Err(MarkflowError::DuplicateRecord(d)) if d == id));
    }

    /// T0.3: The [0, max] range invariant holds at entry and update.
    #[test]
    fn range_invariant() {
        let mut store = MemoryStore::new();
        assert!(matches!(
            store.create(
                key(1, 10, ComponentType::External),
                OWNER.id,
                Marks(61),
                Marks(60),
                Timestamp(100),
            ),
            Err(MarkflowError::Validation { .. })
        ));

        let id = store
            .create(
                key(1, 10, ComponentType::External),
                OWNER.id,
                Marks(60),
                Marks(60),
                Timestamp(100),
            )
            .expect("boundary is legal");
        assert!(matches!(
            store.update_value(id, Marks(61), 1),
            Err(MarkflowError::Validation { .. })
        ));
    }

    /// T0.4: A stale writer receives Conflict, never a silent overwrite.
    #[test]
    fn concurrent_edit_detection() {
        let mut store = MemoryStore::new();
        let id = store
            .create(
                key(1, 10, ComponentType::Internal1),
                OWNER.id,
                Marks(30),
                Marks(40),
                Timestamp(100),
            )
            .expect("create");

        // Both writers read version 1; the second write is stale.
        store.update_value(id, Marks(32), 1).expect("first");
        let stale = store.update_value(id, Marks(28), 1);
        assert!(matches!(stale, Err(MarkflowError::Conflict { .. })));
        assert_eq!(
            store.get(id).expect("get").expect("exists").marks,
            Marks(32)
        );
    }
}

// =============================================================================
// TIER T1: TRANSITION LEGALITY & AUDIT
// =============================================================================

mod t1_transition_legality {
    use super::*;

    /// T1.1: Edges absent from the table fail for every role.
    #[test]
    fn absent_edges_always_invalid() {
        let mut store = MemoryStore::new();
        let id = store
            .create(
                key(1, 10, ComponentType::Internal1),
                OWNER.id,
                Marks(30),
                Marks(40),
                Timestamp(100),
            )
            .expect("create");

        // Draft -> Published is not an edge, whoever asks.
        for actor in [OWNER, HOD, COE, Actor::new(ActorId(40), Role::Admin)] {
            let result = WorkflowEngine::transition(
                &mut store,
                id,
                LifecycleState::Published,
                &actor,
                Timestamp(200),
                None,
            );
            assert!(matches!(
                result,
                Err(MarkflowError::InvalidTransition { .. })
            ));
        }
    }

    /// T1.2: Every successful transition leaves exactly one audit entry
    /// with matching from/to/actor/timestamp.
    #[test]
    fn audit_entry_per_transition() {
        let mut store = MemoryStore::new();
        let id = store
            .create(
                key(1, 10, ComponentType::Internal1),
                OWNER.id,
                Marks(30),
                Marks(40),
                Timestamp(100),
            )
            .expect("create");

        WorkflowEngine::submit(&mut store, id, &OWNER, Timestamp(210)).expect("submit");
        WorkflowEngine::approve(&mut store, id, &HOD, Timestamp(220)).expect("approve");

        let trail = store.audit_trail(id).expect("trail");
        assert_eq!(trail.len(), 2);

        assert_eq!(trail[0].from, LifecycleState::Draft);
        assert_eq!(trail[0].to, LifecycleState::Submitted);
        assert_eq!(trail[0].actor, OWNER.id);
        assert_eq!(trail[0].role, Role::Teacher);
        assert_eq!(trail[0].at, Timestamp(210));

        assert_eq!(trail[1].from, LifecycleState::Submitted);
        assert_eq!(trail[1].to, LifecycleState::Approved);
        assert_eq!(trail[1].actor, HOD.id);
        assert_eq!(trail[1].at, Timestamp(220));

        // Sequence numbers are strictly increasing store-wide.
        assert!(trail[0].seq < trail[1].seq);
    }

    /// T1.3: Round trip - reject, re-edit, resubmit; value edits occur
    /// only while the record is in Draft or Rejected.
    #[test]
    fn reject_resubmit_round_trip() {
        let mut store = MemoryStore::new();
        let id = store
            .create(
                key(1, 10, ComponentType::Internal1),
                OWNER.id,
                Marks(30),
                Marks(40),
                Timestamp(100),
            )
            .expect("create");

        // Draft: editable.
        store.update_value(id, Marks(31), 1).expect("edit in draft");

        WorkflowEngine::submit(&mut store, id, &OWNER, Timestamp(200)).expect("submit");
        // Submitted: not editable.
        let v = store.get(id).expect("get").expect("exists").version;
        assert!(matches!(
            store.update_value(id, Marks(33), v),
            Err(MarkflowError::ImmutableRecord(_))
        ));

        WorkflowEngine::reject(&mut store, id, &HOD, Timestamp(300), "IA2 column missing")
            .expect("reject");
        // Rejected: editable again.
        let v = store.get(id).expect("get").expect("exists").version;
        store
            .update_value(id, Marks(34), v)
            .expect("edit while rejected");

        WorkflowEngine::redraft(&mut store, id, &OWNER, Timestamp(400)).expect("redraft");
        WorkflowEngine::submit(&mut store, id, &OWNER, Timestamp(500)).expect("resubmit");

        let record = store.get(id).expect("get").expect("exists");
        assert_eq!(record.state, LifecycleState::Submitted);
        assert_eq!(record.marks, Marks(34));
        assert_eq!(record.rejection_reason, None);
    }

    /// T1.4: The audit log is globally ordered and append-only across
    /// records.
    #[test]
    fn audit_log_is_append_only() {
        let mut store = MemoryStore::new();
        let a = store
            .create(
                key(1, 10, ComponentType::Internal1),
                OWNER.id,
                Marks(30),
                Marks(40),
                Timestamp(100),
            )
            .expect("create");
        let b = store
            .create(
                key(2, 10, ComponentType::Internal1),
                OWNER.id,
                Marks(22),
                Marks(40),
                Timestamp(100),
            )
            .expect("create");

        WorkflowEngine::submit(&mut store, a, &OWNER, Timestamp(200)).expect("submit a");
        WorkflowEngine::submit(&mut store, b, &OWNER, Timestamp(201)).expect("submit b");
        WorkflowEngine::approve(&mut store, a, &HOD, Timestamp(202)).expect("approve a");

        let seqs: Vec<u64> = store.audit_entries().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
    }
}

// =============================================================================
// TIER T2: SMART MARKS
// =============================================================================

mod t2_smart_marks {
    use super::*;
    use markflow_core::{GradeScale, SubjectScheme};

    fn scheme(assignment: u64, subject: u64, semester: u64, credits: u8) -> SubjectScheme {
        SubjectScheme {
            assignment: SubjectAssignmentId(assignment),
            subject: SubjectId(subject),
            semester: SemesterId(semester),
            credits: Credits(credits),
            internal_ceiling: Marks(40),
            external_max: Marks(60),
        }
    }

    fn finalize(
        session: &mut Session,
        student: u64,
        assignment: u64,
        component: ComponentType,
        marks: u32,
        max: u32,
    ) {
        let id = session
            .create_record(
                key(student, assignment, component),
                OWNER.id,
                Marks(marks),
                Marks(max),
                Timestamp(100),
            )
            .expect("create");
        session.submit(id, &OWNER, Timestamp(200)).expect("submit");
        session.approve(id, &HOD, Timestamp(300)).expect("approve");
        session.freeze(id, &COE, Timestamp(400)).expect("freeze");
    }

    /// T2.1: Best-of-two selects 38 from IA1=38/40, IA2=32/40 - never an
    /// average.
    #[test]
    fn best_of_two_is_not_an_average() {
        let mut session = Session::new();
        finalize(&mut session, 1, 10, ComponentType::Internal1, 38, 40);
        finalize(&mut session, 1, 10, ComponentType::Internal2, 32, 40);
        finalize(&mut session, 1, 10, ComponentType::External, 40, 60);

        let total = session
            .smart_total(StudentId(1), &scheme(10, 5, 3, 4), &GradeScale::default())
            .expect("total");
        assert_eq!(total.internal, Marks(38));
    }

    /// T2.2: SGPA for credits {4,4,3} and grade points {9,8,7} is 8.09,
    /// from the credit-weighted formula.
    #[test]
    fn sgpa_formula() {
        use markflow_core::compute_sgpa;

        let entries = [
            (GradePoint(9), Credits(4)),
            (GradePoint(8), Credits(4)),
            (GradePoint(7), Credits(3)),
        ];
        assert_eq!(compute_sgpa(&entries), Some(Gpa(809)));
    }

    /// T2.3: A subject without finalized marks is excluded from both
    /// SGPA sums, not treated as zero.
    #[test]
    fn unfinalized_subject_excluded_from_sgpa() {
        let mut session = Session::new();
        finalize(&mut session, 1, 10, ComponentType::Internal1, 36, 40);
        finalize(&mut session, 1, 10, ComponentType::External, 54, 60);
        // Subject on assignment 11: marks exist but stay in Draft.
        session
            .create_record(
                key(1, 11, ComponentType::Internal1),
                OWNER.id,
                Marks(5),
                Marks(40),
                Timestamp(100),
            )
            .expect("create");

        let schemes = [scheme(10, 5, 3, 4), scheme(11, 6, 3, 3)];
        let sgpa = session
            .sgpa(StudentId(1), SemesterId(3), &schemes, &GradeScale::default())
            .expect("sgpa")
            .expect("some");

        // 90/100 -> 10 points on 4 credits; the draft subject contributes
        // nothing to either sum.
        assert_eq!(sgpa, Gpa(1000));
    }

    /// T2.4: CGPA weights semesters by credits.
    #[test]
    fn cgpa_credit_weighting() {
        use markflow_core::compute_cgpa;

        let semesters = [(Gpa(900), 20u32), (Gpa(600), 10u32)];
        // (900*20 + 600*10) / 30 = 800, not (900+600)/2 = 750.
        assert_eq!(compute_cgpa(&semesters), Some(Gpa(800)));
    }
}

// =============================================================================
// TIER T3: OUTCOME ATTAINMENT
// =============================================================================

mod t3_attainment {
    use super::*;
    use markflow_core::{compute_co_attainment, compute_po_attainment};
    use std::collections::BTreeMap;

    fn config() -> OutcomeConfig {
        let mut config = OutcomeConfig::new(ConfigVersion(1));
        config.cos.insert(
            CoId(1),
            CoDefinition {
                id: CoId(1),
                subject: SubjectId(5),
                code: "CO1".to_string(),
                description: "Apply query optimization techniques".to_string(),
                level: CognitiveLevel::Apply,
            },
        );
        config.targets.insert(
            CoId(1),
            CoTarget {
                co: CoId(1),
                target: BasisPoints(6000),
                l1: BasisPoints(5000),
                l2: BasisPoints(6500),
                l3: BasisPoints(8000),
            },
        );
        config.weights.push(QuestionCoWeight {
            question: QuestionId(100),
            co: CoId(1),
            weight: 1,
        });
        config.pos.insert(
            PoId(1),
            PoDefinition {
                id: PoId(1),
                department: DepartmentId(2),
                code: "PO1".to_string(),
                description: "Engineering knowledge".to_string(),
            },
        );
        config
    }

    /// T3.1: With target 60% and thresholds 50/65/80, a student at 72%
    /// attains level L2.
    #[test]
    fn level_classification() {
        use markflow_core::AttainmentLevel;

        let config = config();
        let cohort: BTreeSet<StudentId> = [StudentId(1)].into_iter().collect();
        let scores = [QuestionScore {
            student: StudentId(1),
            question: QuestionId(100),
            earned: Marks(18),
            max: Marks(25),
        }];

        let report = compute_co_attainment(&config, CoId(1), &scores, &cohort);
        assert_eq!(report.students[0].percent, BasisPoints(7200));
        assert_eq!(report.students[0].level, Some(AttainmentLevel::L2));
    }

    /// T3.2: PO mapped to CO-A (strength 3, 80%) and CO-B (strength 1,
    /// 40%) attains (80*3 + 40*1)/4 = 70%.
    #[test]
    fn po_strength_weighting() {
        let mut config = config();
        config.matrix.push(CoPoEntry {
            co: CoId(10),
            po: PoId(1),
            strength: 3,
        });
        config.matrix.push(CoPoEntry {
            co: CoId(11),
            po: PoId(1),
            strength: 1,
        });

        let mut co_outcomes = BTreeMap::new();
        co_outcomes.insert(CoId(10), AttainmentOutcome::Attained(BasisPoints(8000)));
        co_outcomes.insert(CoId(11), AttainmentOutcome::Attained(BasisPoints(4000)));

        let report = compute_po_attainment(&config, PoId(1), &co_outcomes);
        assert_eq!(
            report.outcome,
            AttainmentOutcome::Attained(BasisPoints(7000))
        );
    }

    /// T3.3: A PO with zero mapped COs is explicitly not computable,
    /// never 0%.
    #[test]
    fn unmapped_po_is_not_computable() {
        let report = compute_po_attainment(&config(), PoId(1), &BTreeMap::new());
        assert_eq!(
            report.outcome,
            AttainmentOutcome::NotComputable(NotComputableReason::NoMappedOutcomes)
        );
        assert_ne!(
            report.outcome,
            AttainmentOutcome::Attained(BasisPoints(0))
        );
    }

    /// T3.4: Configuration gaps surface as explicit insufficiency, and
    /// "0% attained" remains distinguishable from "cannot compute".
    #[test]
    fn zero_versus_not_computable() {
        let mut config = config();
        let cohort: BTreeSet<StudentId> = [StudentId(1)].into_iter().collect();
        // Student scores below the target: attainment is genuinely 0%.
        let scores = [QuestionScore {
            student: StudentId(1),
            question: QuestionId(100),
            earned: Marks(5),
            max: Marks(25),
        }];

        let zero = compute_co_attainment(&config, CoId(1), &scores, &cohort);
        assert_eq!(zero.outcome, AttainmentOutcome::Attained(BasisPoints(0)));

        // Remove the target: the same call now reports insufficiency.
        config.targets.clear();
        let missing = compute_co_attainment(&config, CoId(1), &scores, &cohort);
        assert_eq!(
            missing.outcome,
            AttainmentOutcome::NotComputable(NotComputableReason::MissingTarget(CoId(1)))
        );
    }

    /// T3.5: Attainment eligibility is derived from finalized records via
    /// the session, end to end.
    #[test]
    fn eligibility_from_finalized_records() {
        use markflow_core::SubjectScheme;

        let mut session = Session::new();
        let schemes = vec![SubjectScheme {
            assignment: SubjectAssignmentId(10),
            subject: SubjectId(5),
            semester: SemesterId(3),
            credits: Credits(4),
            internal_ceiling: Marks(40),
            external_max: Marks(60),
        }];

        // Student 1 frozen; student 2 still in Draft.
        let id = session
            .create_record(
                key(1, 10, ComponentType::Internal1),
                OWNER.id,
                Marks(30),
                Marks(40),
                Timestamp(100),
            )
            .expect("create");
        session.submit(id, &OWNER, Timestamp(200)).expect("submit");
        session.approve(id, &HOD, Timestamp(300)).expect("approve");
        session.freeze(id, &COE, Timestamp(400)).expect("freeze");
        session
            .create_record(
                key(2, 10, ComponentType::Internal1),
                OWNER.id,
                Marks(20),
                Marks(40),
                Timestamp(100),
            )
            .expect("create");

        let eligible = session
            .assessed_students(SubjectId(5), &schemes, None)
            .expect("eligible");
        assert!(eligible.contains(&StudentId(1)));
        assert!(!eligible.contains(&StudentId(2)));
    }
}
