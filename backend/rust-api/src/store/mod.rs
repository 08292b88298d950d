//! Persistence boundary for results, attempts, exams and notifications.
//!
//! Writes made through [`SchoolStore::set_position`] are raw field updates:
//! they never run total derivation or cohort ranking, which is what keeps a
//! re-rank from re-triggering itself.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{AssessmentAttempt, CohortKey, Exam, Notification, ScoreKey, ScoreRecord};

pub mod memory;
pub mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("duplicate key: {0}")]
    Duplicate(String),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait SchoolStore: Send + Sync {
    fn backend_tag(&self) -> &'static str;

    async fn ping(&self) -> StoreResult<()>;

    // Scores
    async fn find_score(&self, id: &str) -> StoreResult<Option<ScoreRecord>>;
    async fn find_score_by_key(&self, key: &ScoreKey) -> StoreResult<Option<ScoreRecord>>;
    /// Fails with [`StoreError::Duplicate`] when (student, subject, term) already exists
    async fn insert_score(&self, record: &ScoreRecord) -> StoreResult<()>;
    /// Returns false when no record with this id exists
    async fn replace_score(&self, record: &ScoreRecord) -> StoreResult<bool>;
    async fn delete_score(&self, id: &str) -> StoreResult<bool>;
    /// Whole cohort ordered by total descending, ties by student id
    async fn list_cohort(&self, cohort: &CohortKey) -> StoreResult<Vec<ScoreRecord>>;
    async fn set_position(&self, id: &str, position: u32) -> StoreResult<()>;

    // Attempts
    async fn insert_attempt(&self, attempt: &AssessmentAttempt) -> StoreResult<()>;
    async fn find_attempt(&self, id: &str) -> StoreResult<Option<AssessmentAttempt>>;
    async fn find_attempts_for(
        &self,
        student_id: &str,
        exam_id: &str,
    ) -> StoreResult<Vec<AssessmentAttempt>>;
    async fn replace_attempt(&self, attempt: &AssessmentAttempt) -> StoreResult<bool>;

    // Exams
    async fn insert_exam(&self, exam: &Exam) -> StoreResult<()>;
    async fn find_exam(&self, id: &str) -> StoreResult<Option<Exam>>;

    // Notifications
    async fn insert_notification(&self, notification: &Notification) -> StoreResult<()>;
    /// Newest first
    async fn list_notifications(
        &self,
        recipient_id: &str,
        limit: usize,
    ) -> StoreResult<Vec<Notification>>;
    async fn find_notification(&self, id: &str) -> StoreResult<Option<Notification>>;
    async fn mark_notification_read(&self, id: &str, at: DateTime<Utc>) -> StoreResult<bool>;
}

/// Ordering used by every backend for a cohort listing
pub(crate) fn cohort_order(a: &ScoreRecord, b: &ScoreRecord) -> std::cmp::Ordering {
    b.total
        .total_cmp(&a.total)
        .then_with(|| a.student_id.cmp(&b.student_id))
}
