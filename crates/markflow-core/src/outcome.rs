//! # Outcome Attainment Engine
//!
//! CO and PO attainment as pure functions of (scores, configuration).
//!
//! Nothing here touches storage or the network: callers hand in a
//! consistent snapshot of question scores plus the outcome configuration,
//! and get back reports whose type distinguishes "attainment is 0%" from
//! "attainment cannot be computed". Configuration gaps are never
//! defaulted to zero and never silently skipped.

use crate::primitives::{MAX_STRENGTH, MIN_STRENGTH};
use crate::types::{
    BasisPoints, CoId, DepartmentId, MarkflowError, Marks, PoId, QuestionId, StudentId, SubjectId,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// CONFIGURATION ENTITIES
// =============================================================================

/// Version of the outcome configuration, advanced by the administrative
/// layer on every edit. Used in cache keys and snapshots.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct ConfigVersion(pub u64);

/// Bloom-taxonomy tag on a course outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CognitiveLevel {
    Remember,
    Understand,
    Apply,
    Analyze,
    Evaluate,
    Create,
}

/// A course outcome, defined per subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoDefinition {
    /// The outcome's identity.
    pub id: CoId,
    /// The subject the outcome belongs to.
    pub subject: SubjectId,
    /// Short code, e.g. "CO2".
    pub code: String,
    /// Full outcome statement.
    pub description: String,
    /// Cognitive level addressed.
    pub level: CognitiveLevel,
}

/// A program outcome, defined per department.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoDefinition {
    /// The outcome's identity.
    pub id: PoId,
    /// The department the outcome belongs to.
    pub department: DepartmentId,
    /// Short code, e.g. "PO3".
    pub code: String,
    /// Full outcome statement.
    pub description: String,
}

/// Attainment target and level thresholds for one CO.
///
/// Thresholds are score percentages with `l1 <= l2 <= l3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoTarget {
    /// The CO this target applies to.
    pub co: CoId,
    /// Percentage a student must reach to count toward attainment.
    pub target: BasisPoints,
    /// Level 1 threshold.
    pub l1: BasisPoints,
    /// Level 2 threshold.
    pub l2: BasisPoints,
    /// Level 3 threshold.
    pub l3: BasisPoints,
}

impl CoTarget {
    /// Check the threshold ordering invariant.
    pub fn validate(&self) -> Result<(), MarkflowError> {
        if self.l1 > self.l2 || self.l2 > self.l3 {
            return Err(MarkflowError::InsufficientConfiguration(format!(
                "thresholds for {:?} are not ordered",
                self.co
            )));
        }
        Ok(())
    }

    /// Classify a student percentage against the thresholds.
    ///
    /// The highest threshold met wins; below L1 there is no level.
    #[must_use]
    pub fn classify(&self, percent: BasisPoints) -> Option<AttainmentLevel> {
        if percent >= self.l3 {
            Some(AttainmentLevel::L3)
        } else if percent >= self.l2 {
            Some(AttainmentLevel::L2)
        } else if percent >= self.l1 {
            Some(AttainmentLevel::L1)
        } else {
            None
        }
    }
}

/// One CO-PO matrix cell: a CO contributes to a PO with a strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoPoEntry {
    /// Contributing course outcome.
    pub co: CoId,
    /// Receiving program outcome.
    pub po: PoId,
    /// Contribution strength, conventionally 1-3.
    pub strength: u8,
}

impl CoPoEntry {
    /// Check the strength range invariant.
    pub fn validate(&self) -> Result<(), MarkflowError> {
        if self.strength < MIN_STRENGTH || self.strength > MAX_STRENGTH {
            return Err(MarkflowError::InsufficientConfiguration(format!(
                "mapping strength {} for {:?} -> {:?} is outside {}..={}",
                self.strength, self.co, self.po, MIN_STRENGTH, MAX_STRENGTH
            )));
        }
        Ok(())
    }
}

/// Attribution of one assessment question to one CO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionCoWeight {
    /// The question.
    pub question: QuestionId,
    /// The CO the question's marks count toward.
    pub co: CoId,
    /// Contribution weight; zero is rejected.
    pub weight: u32,
}

/// One student's earned marks on one question.
///
/// Supplied by the assessment collaborator from finalized mark data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionScore {
    /// The student.
    pub student: StudentId,
    /// The question answered.
    pub question: QuestionId,
    /// Marks earned.
    pub earned: Marks,
    /// Maximum marks for the question.
    pub max: Marks,
}

/// The full outcome configuration snapshot the engine reads.
///
/// Owned and edited by administrative collaborators; the CORE treats it
/// as immutable data with a version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutcomeConfig {
    /// Version of this configuration snapshot.
    pub version: ConfigVersion,
    /// Course outcomes by id.
    pub cos: BTreeMap<CoId, CoDefinition>,
    /// Program outcomes by id.
    pub pos: BTreeMap<PoId, PoDefinition>,
    /// Per-CO targets and thresholds.
    pub targets: BTreeMap<CoId, CoTarget>,
    /// CO-PO matrix.
    pub matrix: Vec<CoPoEntry>,
    /// Question-to-CO attributions.
    pub weights: Vec<QuestionCoWeight>,
}

impl OutcomeConfig {
    /// Create an empty configuration at a version.
    #[must_use]
    pub fn new(version: ConfigVersion) -> Self {
        Self {
            version,
            ..Self::default()
        }
    }

    /// Course outcomes of one subject, in id order.
    pub fn cos_for_subject(&self, subject: SubjectId) -> impl Iterator<Item = &CoDefinition> {
        self.cos.values().filter(move |co| co.subject == subject)
    }

    /// Program outcomes of one department, in id order.
    pub fn pos_for_department(
        &self,
        department: DepartmentId,
    ) -> impl Iterator<Item = &PoDefinition> {
        self.pos
            .values()
            .filter(move |po| po.department == department)
    }

    /// The target for one CO, if configured.
    #[must_use]
    pub fn target_for(&self, co: CoId) -> Option<&CoTarget> {
        self.targets.get(&co)
    }

    /// Question weights attributed to one CO.
    pub fn weights_for(&self, co: CoId) -> impl Iterator<Item = &QuestionCoWeight> {
        self.weights.iter().filter(move |w| w.co == co)
    }

    /// Matrix entries mapping onto one PO.
    pub fn mappings_for(&self, po: PoId) -> impl Iterator<Item = &CoPoEntry> {
        self.matrix.iter().filter(move |m| m.po == po)
    }

    /// Validate every invariant the configuration carries.
    pub fn validate(&self) -> Result<(), MarkflowError> {
        for target in self.targets.values() {
            target.validate()?;
        }
        for entry in &self.matrix {
            entry.validate()?;
        }
        for weight in &self.weights {
            if weight.weight == 0 {
                return Err(MarkflowError::InsufficientConfiguration(format!(
                    "question {:?} maps to {:?} with zero weight",
                    weight.question, weight.co
                )));
            }
        }
        Ok(())
    }
}

// =============================================================================
// ATTAINMENT RESULTS
// =============================================================================

/// Attainment level reached by a student on a CO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AttainmentLevel {
    /// Met the L1 threshold.
    L1,
    /// Met the L2 threshold.
    L2,
    /// Met the L3 threshold.
    L3,
}

/// Why an attainment value could not be computed.
///
/// Callers must be able to tell "attainment is 0%" apart from "the
/// question cannot be answered"; this enum is the second half of that
/// distinction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotComputableReason {
    /// The PO has no COs mapped to it.
    NoMappedOutcomes,
    /// No student in the cohort answered any mapped question.
    NoStudentsAssessed,
    /// The CO is not in the configuration.
    UnknownOutcome(CoId),
    /// The CO has no configured target.
    MissingTarget(CoId),
    /// The CO has no question attributions.
    MissingQuestionWeights(CoId),
    /// A mapped CO's attainment was not supplied to the PO computation.
    MissingAttainment(CoId),
}

impl std::fmt::Display for NotComputableReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotComputableReason::NoMappedOutcomes => write!(f, "no mapped course outcomes"),
            NotComputableReason::NoStudentsAssessed => write!(f, "no students assessed"),
            NotComputableReason::UnknownOutcome(co) => write!(f, "unknown outcome {co:?}"),
            NotComputableReason::MissingTarget(co) => write!(f, "missing target for {co:?}"),
            NotComputableReason::MissingQuestionWeights(co) => {
                write!(f, "missing question weights for {co:?}")
            }
            NotComputableReason::MissingAttainment(co) => {
                write!(f, "missing attainment for mapped {co:?}")
            }
        }
    }
}

/// An attainment value, or the explicit reason there is none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttainmentOutcome {
    /// Attainment percentage, basis points.
    Attained(BasisPoints),
    /// Explicitly not computable - never reported as 0%.
    NotComputable(NotComputableReason),
}

impl AttainmentOutcome {
    /// The attainment value, if computable.
    #[must_use]
    pub fn value(&self) -> Option<BasisPoints> {
        match self {
            AttainmentOutcome::Attained(bp) => Some(*bp),
            AttainmentOutcome::NotComputable(_) => None,
        }
    }

    /// Whether a value was computed.
    #[must_use]
    pub fn is_computable(&self) -> bool {
        matches!(self, AttainmentOutcome::Attained(_))
    }
}

/// One student's standing on one CO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentCoAttainment {
    /// The student.
    pub student: StudentId,
    /// CO-attributed percentage.
    pub percent: BasisPoints,
    /// Level reached, `None` below L1.
    pub level: Option<AttainmentLevel>,
    /// Whether the percentage meets the CO target.
    pub meets_target: bool,
}

/// Cohort attainment report for one CO.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoAttainmentReport {
    /// The CO.
    pub co: CoId,
    /// The CO's code, for rendering.
    pub code: String,
    /// Attainment percentage or the reason there is none.
    pub outcome: AttainmentOutcome,
    /// Students assessed (denominator).
    pub assessed: usize,
    /// Students meeting the target (numerator).
    pub meeting_target: usize,
    /// Per-student classification, in student order.
    pub students: Vec<StudentCoAttainment>,
}

/// Attainment report for one PO.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoAttainmentReport {
    /// The PO.
    pub po: PoId,
    /// The PO's code, for rendering.
    pub code: String,
    /// Strength-weighted attainment or the reason there is none.
    pub outcome: AttainmentOutcome,
    /// Number of COs mapped to this PO.
    pub mapped: usize,
}

// =============================================================================
// CO ATTAINMENT
// =============================================================================

/// One student's CO-attributed percentage.
///
/// Weighted earned over weighted maximum across the mapped questions the
/// student answered. `None` when the student answered none of them (not
/// assessed) or the weighted maximum is zero.
#[must_use]
pub fn student_co_percent(
    weights: &[&QuestionCoWeight],
    scores: &[&QuestionScore],
) -> Option<BasisPoints> {
    let mut earned: u64 = 0;
    let mut maximum: u64 = 0;
    for weight in weights {
        for score in scores {
            if score.question == weight.question {
                earned += u64::from(score.earned.value()) * u64::from(weight.weight);
                maximum += u64::from(score.max.value()) * u64::from(weight.weight);
            }
        }
    }
    BasisPoints::from_ratio(earned, maximum)
}

/// Compute cohort attainment for one CO.
///
/// `cohort` is the set of students eligible for assessment (derived from
/// finalized mark records by the caller); a student is *assessed* for the
/// CO when they have at least one score on a mapped question.
#[must_use]
pub fn compute_co_attainment(
    config: &OutcomeConfig,
    co: CoId,
    scores: &[QuestionScore],
    cohort: &BTreeSet<StudentId>,
) -> CoAttainmentReport {
    let code = config
        .cos
        .get(&co)
        .map(|c| c.code.clone())
        .unwrap_or_default();

    let not_computable = |reason| CoAttainmentReport {
        co,
        code: code.clone(),
        outcome: AttainmentOutcome::NotComputable(reason),
        assessed: 0,
        meeting_target: 0,
        students: Vec::new(),
    };

    if !config.cos.contains_key(&co) {
        return not_computable(NotComputableReason::UnknownOutcome(co));
    }
    let Some(target) = config.target_for(co) else {
        return not_computable(NotComputableReason::MissingTarget(co));
    };
    let weights: Vec<&QuestionCoWeight> = config.weights_for(co).collect();
    if weights.is_empty() {
        return not_computable(NotComputableReason::MissingQuestionWeights(co));
    }

    // Group scores per cohort student; BTreeMap keeps student order stable.
    let mut by_student: BTreeMap<StudentId, Vec<&QuestionScore>> = BTreeMap::new();
    for score in scores {
        if cohort.contains(&score.student) {
            by_student.entry(score.student).or_default().push(score);
        }
    }

    let mut students = Vec::new();
    let mut meeting_target = 0usize;
    for (student, student_scores) in &by_student {
        let Some(percent) = student_co_percent(&weights, student_scores) else {
            continue;
        };
        let meets = percent >= target.target;
        if meets {
            meeting_target += 1;
        }
        students.push(StudentCoAttainment {
            student: *student,
            percent,
            level: target.classify(percent),
            meets_target: meets,
        });
    }

    let assessed = students.len();
    let Some(attained) = BasisPoints::from_ratio(meeting_target as u64, assessed as u64) else {
        return not_computable(NotComputableReason::NoStudentsAssessed);
    };

    CoAttainmentReport {
        co,
        code,
        outcome: AttainmentOutcome::Attained(attained),
        assessed,
        meeting_target,
        students,
    }
}

/// Compute attainment for every CO of a subject, in CO-id order.
#[must_use]
pub fn compute_subject_attainment(
    config: &OutcomeConfig,
    subject: SubjectId,
    scores: &[QuestionScore],
    cohort: &BTreeSet<StudentId>,
) -> Vec<CoAttainmentReport> {
    config
        .cos_for_subject(subject)
        .map(|co| compute_co_attainment(config, co.id, scores, cohort))
        .collect()
}

// =============================================================================
// PO ATTAINMENT
// =============================================================================

/// Compute attainment for one PO from mapped CO attainments.
///
/// Strength-weighted average over every mapped CO. A PO with no mapped
/// COs is explicitly not computable, and a mapped CO whose own attainment
/// is missing or not computable propagates its reason - partial averages
/// would silently misstate compliance.
#[must_use]
pub fn compute_po_attainment(
    config: &OutcomeConfig,
    po: PoId,
    co_outcomes: &BTreeMap<CoId, AttainmentOutcome>,
) -> PoAttainmentReport {
    let code = config
        .pos
        .get(&po)
        .map(|p| p.code.clone())
        .unwrap_or_default();

    let mappings: Vec<&CoPoEntry> = config.mappings_for(po).collect();
    let mapped = mappings.len();

    let not_computable = |reason| PoAttainmentReport {
        po,
        code: code.clone(),
        outcome: AttainmentOutcome::NotComputable(reason),
        mapped,
    };

    if mappings.is_empty() {
        return not_computable(NotComputableReason::NoMappedOutcomes);
    }

    let mut weighted: u64 = 0;
    let mut total_strength: u64 = 0;
    for mapping in &mappings {
        match co_outcomes.get(&mapping.co) {
            Some(AttainmentOutcome::Attained(bp)) => {
                weighted += u64::from(bp.value()) * u64::from(mapping.strength);
                total_strength += u64::from(mapping.strength);
            }
            Some(AttainmentOutcome::NotComputable(reason)) => {
                return not_computable(*reason);
            }
            None => {
                return not_computable(NotComputableReason::MissingAttainment(mapping.co));
            }
        }
    }

    if total_strength == 0 {
        // Only reachable with zero-strength mappings that skipped validation.
        return not_computable(NotComputableReason::NoMappedOutcomes);
    }
    // Already in basis points, so a plain rounded division suffices.
    let value = (weighted + total_strength / 2) / total_strength;
    let outcome = AttainmentOutcome::Attained(BasisPoints(u32::try_from(value).unwrap_or(u32::MAX)));

    PoAttainmentReport {
        po,
        code,
        outcome,
        mapped,
    }
}

/// Compute attainment for every PO of a department, in PO-id order.
#[must_use]
pub fn compute_department_attainment(
    config: &OutcomeConfig,
    department: DepartmentId,
    co_outcomes: &BTreeMap<CoId, AttainmentOutcome>,
) -> Vec<PoAttainmentReport> {
    config
        .pos_for_department(department)
        .map(|po| compute_po_attainment(config, po.id, co_outcomes))
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================
