//! # Academic Configuration
//!
//! TOML loader for the configuration the CORE consumes: subject schemes,
//! the grade scale, and the CO/PO outcome entities. In production these
//! are maintained by the administrative CRUD layer; the file stands in
//! for that collaborator and is read once at startup.
//!
//! ## Example
//!
//! ```toml
//! version = 3
//!
//! [[subject]]
//! assignment = 10
//! subject = 5
//! semester = 3
//! credits = 4
//! internal_ceiling = 40
//! external_max = 60
//!
//! [[co]]
//! id = 1
//! subject = 5
//! code = "CO1"
//! description = "Apply query optimization techniques"
//! level = "apply"
//!
//! [[target]]
//! co = 1
//! target_bp = 6000
//! l1_bp = 5000
//! l2_bp = 6500
//! l3_bp = 8000
//! ```

use markflow_core::{
    BasisPoints, CoDefinition, CoId, CognitiveLevel, CoPoEntry, CoTarget, ConfigVersion, Credits,
    DepartmentId, GradeBand, GradePoint, GradeScale, MarkflowError, Marks, OutcomeConfig,
    PoDefinition, PoId, QuestionCoWeight, QuestionId, SemesterId, SubjectAssignmentId, SubjectId,
    SubjectScheme,
};
use serde::Deserialize;
use std::path::Path;

// =============================================================================
// RAW TOML SHAPES
// =============================================================================

#[derive(Debug, Deserialize)]
struct RawScheme {
    assignment: u64,
    subject: u64,
    semester: u64,
    credits: u8,
    internal_ceiling: u32,
    external_max: u32,
}

#[derive(Debug, Deserialize)]
struct RawBand {
    floor_bp: u32,
    letter: String,
    points: u8,
}

#[derive(Debug, Deserialize)]
struct RawCo {
    id: u64,
    subject: u64,
    code: String,
    description: String,
    level: CognitiveLevel,
}

#[derive(Debug, Deserialize)]
struct RawPo {
    id: u64,
    department: u64,
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct RawTarget {
    co: u64,
    target_bp: u32,
    l1_bp: u32,
    l2_bp: u32,
    l3_bp: u32,
}

#[derive(Debug, Deserialize)]
struct RawMapping {
    co: u64,
    po: u64,
    strength: u8,
}

#[derive(Debug, Deserialize)]
struct RawWeight {
    question: u64,
    co: u64,
    weight: u32,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    version: u64,
    #[serde(default)]
    subject: Vec<RawScheme>,
    #[serde(default)]
    grade_band: Vec<RawBand>,
    #[serde(default)]
    co: Vec<RawCo>,
    #[serde(default)]
    po: Vec<RawPo>,
    #[serde(default)]
    target: Vec<RawTarget>,
    #[serde(default)]
    mapping: Vec<RawMapping>,
    #[serde(default)]
    question_weight: Vec<RawWeight>,
}

// =============================================================================
// ACADEMIC CONFIG
// =============================================================================

/// Everything the CORE reads as configuration, validated and typed.
#[derive(Debug, Clone)]
pub struct AcademicConfig {
    /// CO/PO entities, targets, matrix and question weights.
    pub outcome: OutcomeConfig,
    /// Per-assignment subject schemes.
    pub schemes: Vec<SubjectScheme>,
    /// The grade scale; defaults to the compiled-in ten-point table.
    pub scale: GradeScale,
}

impl Default for AcademicConfig {
    fn default() -> Self {
        Self {
            outcome: OutcomeConfig::new(ConfigVersion(0)),
            schemes: Vec::new(),
            scale: GradeScale::default(),
        }
    }
}

impl AcademicConfig {
    /// Find the scheme for an assignment.
    #[must_use]
    pub fn scheme_for(&self, assignment: SubjectAssignmentId) -> Option<&SubjectScheme> {
        self.schemes.iter().find(|s| s.assignment == assignment)
    }

    /// Load and validate an academic configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MarkflowError> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| MarkflowError::IoError(e.to_string()))?;
        Self::parse(&text)
    }

    /// Parse and validate TOML text.
    pub fn parse(text: &str) -> Result<Self, MarkflowError> {
        let raw: RawConfig =
            toml::from_str(text).map_err(|e| MarkflowError::DeserializationError(e.to_string()))?;

        let mut outcome = OutcomeConfig::new(ConfigVersion(raw.version));
        for co in raw.co {
            outcome.cos.insert(
                CoId(co.id),
                CoDefinition {
                    id: CoId(co.id),
                    subject: SubjectId(co.subject),
                    code: co.code,
                    description: co.description,
                    level: co.level,
                },
            );
        }
        for po in raw.po {
            outcome.pos.insert(
                PoId(po.id),
                PoDefinition {
                    id: PoId(po.id),
                    department: DepartmentId(po.department),
                    code: po.code,
                    description: po.description,
                },
            );
        }
        for target in raw.target {
            outcome.targets.insert(
                CoId(target.co),
                CoTarget {
                    co: CoId(target.co),
                    target: BasisPoints(target.target_bp),
                    l1: BasisPoints(target.l1_bp),
                    l2: BasisPoints(target.l2_bp),
                    l3: BasisPoints(target.l3_bp),
                },
            );
        }
        for mapping in raw.mapping {
            outcome.matrix.push(CoPoEntry {
                co: CoId(mapping.co),
                po: PoId(mapping.po),
                strength: mapping.strength,
            });
        }
        for weight in raw.question_weight {
            outcome.weights.push(QuestionCoWeight {
                question: QuestionId(weight.question),
                co: CoId(weight.co),
                weight: weight.weight,
            });
        }
        outcome.validate()?;

        let schemes = raw
            .subject
            .into_iter()
            .map(|s| SubjectScheme {
                assignment: SubjectAssignmentId(s.assignment),
                subject: SubjectId(s.subject),
                semester: SemesterId(s.semester),
                credits: Credits(s.credits),
                internal_ceiling: Marks(s.internal_ceiling),
                external_max: Marks(s.external_max),
            })
            .collect();

        let scale = if raw.grade_band.is_empty() {
            GradeScale::default()
        } else {
            GradeScale::new(
                raw.grade_band
                    .into_iter()
                    .map(|b| GradeBand {
                        floor: BasisPoints(b.floor_bp),
                        letter: b.letter,
                        points: GradePoint(b.points),
                    })
                    .collect(),
            )
        };

        Ok(Self {
            outcome,
            schemes,
            scale,
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================
