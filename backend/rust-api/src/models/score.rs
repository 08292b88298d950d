use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

pub const EXAM_SCORE_MAX: f64 = 60.0;

/// One student's result in one subject for one term.
/// Stored in the "scores" collection, unique on (student_id, subject_id, term_id).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub student_id: String,
    pub subject_id: String,
    pub term_id: String,
    pub ca_score: f64,
    pub exam_score: f64,
    /// Always ca_score + exam_score as of the last save
    pub total: f64,
    pub grade: String,
    #[serde(default)]
    pub position: Option<u32>,
    #[serde(default)]
    pub teacher_id: Option<String>,
    #[serde(default)]
    pub source: ScoreSource,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScoreRecord {
    pub fn key(&self) -> ScoreKey {
        ScoreKey {
            student_id: self.student_id.clone(),
            subject_id: self.subject_id.clone(),
            term_id: self.term_id.clone(),
        }
    }

    pub fn cohort(&self) -> CohortKey {
        CohortKey {
            subject_id: self.subject_id.clone(),
            term_id: self.term_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScoreSource {
    #[default]
    Manual,
    Bulk,
    Cbt,
}

impl ScoreSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreSource::Manual => "manual",
            ScoreSource::Bulk => "bulk",
            ScoreSource::Cbt => "cbt",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScoreKey {
    pub student_id: String,
    pub subject_id: String,
    pub term_id: String,
}

/// The unit over which positions are computed
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct CohortKey {
    pub subject_id: String,
    pub term_id: String,
}

impl std::fmt::Display for CohortKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.subject_id, self.term_id)
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SaveScoreRequest {
    #[validate(length(min = 1, max = 64, message = "student_id is required"))]
    pub student_id: String,

    #[validate(length(min = 1, max = 64, message = "subject_id is required"))]
    pub subject_id: String,

    #[validate(length(min = 1, max = 64, message = "term_id is required"))]
    pub term_id: String,

    #[validate(range(min = 0.0, max = 40.0, message = "ca_score must be between 0 and 40"))]
    pub ca_score: f64,

    #[validate(range(min = 0.0, max = 60.0, message = "exam_score must be between 0 and 60"))]
    pub exam_score: f64,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateScoreRequest {
    #[validate(range(min = 0.0, max = 40.0, message = "ca_score must be between 0 and 40"))]
    pub ca_score: Option<f64>,

    #[validate(range(min = 0.0, max = 60.0, message = "exam_score must be between 0 and 60"))]
    pub exam_score: Option<f64>,
}

/// Batch entry for a whole cohort, replacing spreadsheet uploads
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BulkScoreRequest {
    #[validate(length(min = 1, max = 64))]
    pub subject_id: String,

    #[validate(length(min = 1, max = 64))]
    pub term_id: String,

    #[validate(
        length(min = 1, max = 500, message = "rows must contain 1 to 500 entries"),
        nested
    )]
    pub rows: Vec<BulkScoreRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BulkScoreRow {
    #[validate(length(min = 1, max = 64))]
    pub student_id: String,

    #[validate(range(min = 0.0, max = 40.0, message = "ca_score must be between 0 and 40"))]
    pub ca_score: f64,

    #[validate(range(min = 0.0, max = 60.0, message = "exam_score must be between 0 and 60"))]
    pub exam_score: f64,
}

#[derive(Debug, Deserialize)]
pub struct CohortQuery {
    pub subject_id: String,
    pub term_id: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScoreResponse {
    pub id: String,
    pub student_id: String,
    pub subject_id: String,
    pub term_id: String,
    pub ca_score: f64,
    pub exam_score: f64,
    pub total: f64,
    pub grade: String,
    pub position: Option<u32>,
    pub teacher_id: Option<String>,
    pub source: ScoreSource,
    pub updated_at: DateTime<Utc>,
}

impl From<ScoreRecord> for ScoreResponse {
    fn from(record: ScoreRecord) -> Self {
        ScoreResponse {
            id: record.id,
            student_id: record.student_id,
            subject_id: record.subject_id,
            term_id: record.term_id,
            ca_score: record.ca_score,
            exam_score: record.exam_score,
            total: record.total,
            grade: record.grade,
            position: record.position,
            teacher_id: record.teacher_id,
            source: record.source,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CohortResponse {
    pub subject_id: String,
    pub term_id: String,
    pub scores: Vec<ScoreResponse>,
}

#[derive(Debug, Serialize)]
pub struct BulkScoreResponse {
    pub created: usize,
    pub updated: usize,
    pub scores: Vec<ScoreResponse>,
}
