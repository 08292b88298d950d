use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// One student's timed run of a CBT exam ("attempts" collection)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssessmentAttempt {
    #[serde(rename = "_id")]
    pub id: String,
    pub student_id: String,
    pub exam_id: String,
    pub status: AttemptStatus,
    #[serde(default)]
    pub answers: Vec<SubmittedAnswer>,
    #[serde(default)]
    pub score: Option<f64>,
    pub max_score: f64,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sync: AttemptSync,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    Completed,
    Abandoned,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::InProgress => "in_progress",
            AttemptStatus::Completed => "completed",
            AttemptStatus::Abandoned => "abandoned",
        }
    }

    /// True only on the edge into `Completed`; staying completed is not an edge.
    pub fn is_completion_edge(previous: AttemptStatus, current: AttemptStatus) -> bool {
        previous != AttemptStatus::Completed && current == AttemptStatus::Completed
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubmittedAnswer {
    pub question_id: String,
    pub selected_option: String,
}

/// Outcome of propagating a completed attempt into the scores collection.
/// Kept on the attempt so failed propagations can be found and reconciled.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AttemptSync {
    pub status: SyncStatus,
    #[serde(default)]
    pub result_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub synced_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    #[default]
    Pending,
    Synced,
    Failed,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SubmitAnswersRequest {
    #[validate(length(min = 1, max = 200, message = "answers must contain 1 to 200 entries"))]
    pub answers: Vec<SubmittedAnswer>,
}

#[derive(Debug, Serialize)]
pub struct AttemptResponse {
    pub id: String,
    pub student_id: String,
    pub exam_id: String,
    pub status: AttemptStatus,
    pub answered: usize,
    pub score: Option<f64>,
    pub max_score: f64,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub sync: AttemptSync,
}

impl From<AssessmentAttempt> for AttemptResponse {
    fn from(attempt: AssessmentAttempt) -> Self {
        AttemptResponse {
            id: attempt.id,
            student_id: attempt.student_id,
            exam_id: attempt.exam_id,
            status: attempt.status,
            answered: attempt.answers.len(),
            score: attempt.score,
            max_score: attempt.max_score,
            started_at: attempt.started_at,
            expires_at: attempt.expires_at,
            completed_at: attempt.completed_at,
            sync: attempt.sync,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_edge_requires_a_real_transition() {
        assert!(AttemptStatus::is_completion_edge(
            AttemptStatus::InProgress,
            AttemptStatus::Completed
        ));
        assert!(AttemptStatus::is_completion_edge(
            AttemptStatus::Abandoned,
            AttemptStatus::Completed
        ));
        assert!(!AttemptStatus::is_completion_edge(
            AttemptStatus::Completed,
            AttemptStatus::Completed
        ));
        assert!(!AttemptStatus::is_completion_edge(
            AttemptStatus::InProgress,
            AttemptStatus::Abandoned
        ));
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&AttemptStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
    }
}
