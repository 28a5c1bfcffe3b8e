//! # Smart Marks Calculator
//!
//! Derived totals over finalized mark records.
//!
//! - Best-of-two internal selection (normalized to the subject ceiling)
//! - Grade banding via a strict descending threshold scan
//! - SGPA/CGPA as credit-weighted means in centi-points
//!
//! The calculator operates only on `Frozen`/`Published` records; handing
//! it anything else is a correctness bug and fails with `NotFinalized`
//! instead of quietly contaminating an aggregate.

use crate::primitives::DEFAULT_GRADE_BANDS;
use crate::record::MarkRecord;
use crate::types::{
    BasisPoints, ComponentType, Credits, Gpa, GradePoint, MarkflowError, Marks, SemesterId,
    StudentId, SubjectAssignmentId, SubjectId,
};
use serde::{Deserialize, Serialize};

// =============================================================================
// SUBJECT SCHEME
// =============================================================================

/// Marks scheme for one subject assignment.
///
/// Configuration owned by administrative collaborators; the CORE only
/// reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectScheme {
    /// The assignment this scheme applies to.
    pub assignment: SubjectAssignmentId,
    /// The subject taught under the assignment.
    pub subject: SubjectId,
    /// The semester the subject belongs to.
    pub semester: SemesterId,
    /// Credits carried by the subject.
    pub credits: Credits,
    /// Ceiling both internal assessments are normalized to.
    pub internal_ceiling: Marks,
    /// Maximum marks of the external examination.
    pub external_max: Marks,
}

impl SubjectScheme {
    /// Maximum total after best-of-two normalization.
    #[must_use]
    pub fn max_total(&self) -> Marks {
        self.internal_ceiling.saturating_add(self.external_max)
    }
}

// =============================================================================
// GRADE SCALE
// =============================================================================

/// One percentage band of the grade scale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeBand {
    /// Lower bound of the band, inclusive.
    pub floor: BasisPoints,
    /// Letter grade for the band.
    pub letter: String,
    /// Grade point for the band.
    pub points: GradePoint,
}

/// An ordered percentage-to-grade table.
///
/// Bands are held sorted by descending floor so classification is a
/// single scan: the first band whose floor the percentage meets or
/// exceeds wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeScale {
    bands: Vec<GradeBand>,
}

impl GradeScale {
    /// Create a scale from bands, sorting them into scan order.
    #[must_use]
    pub fn new(mut bands: Vec<GradeBand>) -> Self {
        bands.sort_by(|a, b| b.floor.cmp(&a.floor));
        Self { bands }
    }

    /// The bands in descending scan order.
    #[must_use]
    pub fn bands(&self) -> &[GradeBand] {
        &self.bands
    }

    /// Classify a percentage into its band.
    ///
    /// Returns `None` only for an empty scale.
    #[must_use]
    pub fn classify(&self, percent: BasisPoints) -> Option<&GradeBand> {
        self.bands.iter().find(|band| percent >= band.floor)
    }
}

impl Default for GradeScale {
    fn default() -> Self {
        Self::new(
            DEFAULT_GRADE_BANDS
                .iter()
                .map(|&(floor, letter, points)| GradeBand {
                    floor: BasisPoints(floor),
                    letter: letter.to_string(),
                    points: GradePoint(points),
                })
                .collect(),
        )
    }
}

// =============================================================================
// SMART TOTAL
// =============================================================================

/// Derived totals for one (student, subject assignment).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmartTotal {
    /// Effective internal score: best-of-two, normalized to the ceiling.
    pub internal: Marks,
    /// External examination score.
    pub external: Marks,
    /// `internal + external`.
    pub total: Marks,
    /// Total as a percentage of the scheme maximum.
    pub percent: BasisPoints,
    /// Letter grade from the scale.
    pub letter: String,
    /// Grade point from the scale.
    pub points: GradePoint,
}

/// Scale `obtained / max` onto a ceiling, rounded half-up.
///
/// Returns `None` when `max` is zero.
#[must_use]
pub fn normalize_to_ceiling(obtained: Marks, max: Marks, ceiling: Marks) -> Option<Marks> {
    if max.value() == 0 {
        return None;
    }
    let num = u64::from(obtained.value()) * u64::from(ceiling.value());
    let den = u64::from(max.value());
    let scaled = (num + den / 2) / den;
    Some(Marks(u32::try_from(scaled).unwrap_or(u32::MAX)))
}

/// Compute the smart total for one student under one scheme.
///
/// `records` must be the student's finalized records for the scheme's
/// assignment; a record for a different student/assignment is ignored,
/// a non-finalized record for the right tuple is an error. With two
/// internal components the higher normalized score wins; with one, it is
/// used directly. A missing internal or external component fails with
/// `MissingComponent` so callers can distinguish "not yet finalized"
/// from a zero score.
pub fn compute_smart_total(
    student: StudentId,
    records: &[MarkRecord],
    scheme: &SubjectScheme,
    scale: &GradeScale,
) -> Result<SmartTotal, MarkflowError> {
    let max_total = scheme.max_total();
    if max_total.value() == 0 {
        return Err(MarkflowError::InsufficientConfiguration(format!(
            "scheme for assignment {:?} has a zero marks total",
            scheme.assignment
        )));
    }

    let mut internal_best: Option<Marks> = None;
    let mut external: Option<Marks> = None;

    for record in records {
        if record.key.student != student || record.key.assignment != scheme.assignment {
            continue;
        }
        if !record.is_finalized() {
            return Err(MarkflowError::NotFinalized(record.id));
        }

        if record.key.component.is_internal() {
            let normalized =
                normalize_to_ceiling(record.marks, record.max_marks, scheme.internal_ceiling)
                    .ok_or(MarkflowError::Validation {
                        obtained: record.marks.value(),
                        max: record.max_marks.value(),
                    })?;
            internal_best = Some(match internal_best {
                Some(best) => best.max(normalized),
                None => normalized,
            });
        } else {
            external = Some(record.marks);
        }
    }

    let internal = internal_best.ok_or(MarkflowError::MissingComponent {
        assignment: scheme.assignment,
        component: "internal",
    })?;
    let external = external.ok_or(MarkflowError::MissingComponent {
        assignment: scheme.assignment,
        component: "external",
    })?;

    let total = internal.saturating_add(external);
    let percent = BasisPoints::from_ratio(u64::from(total.value()), u64::from(max_total.value()))
        .ok_or(MarkflowError::InsufficientConfiguration(
            "zero marks total".to_string(),
        ))?;
    let band = scale
        .classify(percent)
        .ok_or_else(|| MarkflowError::InsufficientConfiguration("empty grade scale".to_string()))?;

    Ok(SmartTotal {
        internal,
        external,
        total,
        percent,
        letter: band.letter.clone(),
        points: band.points,
    })
}

// =============================================================================
// GPA AGGREGATION
// =============================================================================

/// SGPA over one semester's finalized subjects.
///
/// `entries` holds (grade point, credits) for each subject with a
/// finalized smart total; subjects without finalized marks must not be
/// passed in - they are excluded from both sums, not treated as zero.
/// Returns `None` when no subject contributes.
#[must_use]
pub fn compute_sgpa(entries: &[(GradePoint, Credits)]) -> Option<Gpa> {
    let total_credits: u64 = entries.iter().map(|(_, c)| u64::from(c.value())).sum();
    let weighted: u64 = entries
        .iter()
        .map(|(gp, c)| u64::from(gp.value()) * u64::from(c.value()) * u64::from(crate::primitives::GPA_SCALE))
        .sum();
    Gpa::from_weighted(weighted, total_credits)
}

/// CGPA across semesters: credit-weighted mean of SGPAs.
///
/// `semesters` holds (SGPA, contributing credits) per semester. The
/// weighting is by credits, not a plain mean, so heavier semesters count
/// proportionally more. Returns `None` when no semester contributes.
#[must_use]
pub fn compute_cgpa(semesters: &[(Gpa, u32)]) -> Option<Gpa> {
    let total_credits: u64 = semesters.iter().map(|&(_, c)| u64::from(c)).sum();
    let weighted: u64 = semesters
        .iter()
        .map(|&(sgpa, c)| u64::from(sgpa.value()) * u64::from(c))
        .sum();
    Gpa::from_weighted(weighted, total_credits)
}

// =============================================================================
// TESTS
// =============================================================================
