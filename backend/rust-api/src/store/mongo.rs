use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::{self, doc};
use mongodb::options::{FindOptions, IndexOptions};
use mongodb::{Collection, Database, IndexModel};

use super::{SchoolStore, StoreError, StoreResult};
use crate::metrics::track_db_operation;
use crate::models::{AssessmentAttempt, CohortKey, Exam, Notification, ScoreKey, ScoreRecord};

const SCORES: &str = "scores";
const ATTEMPTS: &str = "attempts";
const EXAMS: &str = "exams";
const NOTIFICATIONS: &str = "notifications";

const DUPLICATE_KEY_CODE: i32 = 11000;

pub struct MongoStore {
    mongo: Database,
}

impl MongoStore {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    /// Creates the unique result key and the cohort ordering index.
    pub async fn ensure_indexes(&self) -> anyhow::Result<()> {
        let unique_key = IndexModel::builder()
            .keys(doc! { "student_id": 1, "subject_id": 1, "term_id": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        let cohort = IndexModel::builder()
            .keys(doc! { "subject_id": 1, "term_id": 1, "total": -1 })
            .build();
        self.scores()
            .create_indexes(vec![unique_key, cohort])
            .await
            .context("Failed to create score indexes")?;

        self.attempts()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "student_id": 1, "exam_id": 1 })
                    .build(),
            )
            .await
            .context("Failed to create attempt index")?;

        self.notifications()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "recipient_id": 1, "created_at": -1 })
                    .build(),
            )
            .await
            .context("Failed to create notification index")?;

        tracing::info!("MongoDB indexes ensured");
        Ok(())
    }

    fn scores(&self) -> Collection<ScoreRecord> {
        self.mongo.collection::<ScoreRecord>(SCORES)
    }

    fn attempts(&self) -> Collection<AssessmentAttempt> {
        self.mongo.collection::<AssessmentAttempt>(ATTEMPTS)
    }

    fn exams(&self) -> Collection<Exam> {
        self.mongo.collection::<Exam>(EXAMS)
    }

    fn notifications(&self) -> Collection<Notification> {
        self.mongo.collection::<Notification>(NOTIFICATIONS)
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        *err.kind,
        mongodb::error::ErrorKind::Write(mongodb::error::WriteFailure::WriteError(ref we))
            if we.code == DUPLICATE_KEY_CODE
    )
}

#[async_trait]
impl SchoolStore for MongoStore {
    fn backend_tag(&self) -> &'static str {
        "mongo"
    }

    async fn ping(&self) -> StoreResult<()> {
        self.mongo
            .run_command(doc! { "ping": 1 })
            .await
            .context("MongoDB ping failed")?;
        Ok(())
    }

    async fn find_score(&self, id: &str) -> StoreResult<Option<ScoreRecord>> {
        let record = track_db_operation("find_one", SCORES, async {
            self.scores()
                .find_one(doc! { "_id": id })
                .await
                .context("Failed to query score")
        })
        .await?;
        Ok(record)
    }

    async fn find_score_by_key(&self, key: &ScoreKey) -> StoreResult<Option<ScoreRecord>> {
        let record = track_db_operation("find_one", SCORES, async {
            self.scores()
                .find_one(doc! {
                    "student_id": &key.student_id,
                    "subject_id": &key.subject_id,
                    "term_id": &key.term_id,
                })
                .await
                .context("Failed to query score by key")
        })
        .await?;
        Ok(record)
    }

    async fn insert_score(&self, record: &ScoreRecord) -> StoreResult<()> {
        match self.scores().insert_one(record).await {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key(&e) => Err(StoreError::Duplicate(format!(
                "score for student {} in {}/{}",
                record.student_id, record.subject_id, record.term_id
            ))),
            Err(e) => Err(anyhow::Error::new(e)
                .context("Failed to insert score")
                .into()),
        }
    }

    async fn replace_score(&self, record: &ScoreRecord) -> StoreResult<bool> {
        let result = track_db_operation("replace_one", SCORES, async {
            self.scores()
                .replace_one(doc! { "_id": &record.id }, record)
                .await
                .context("Failed to replace score")
        })
        .await?;
        Ok(result.matched_count > 0)
    }

    async fn delete_score(&self, id: &str) -> StoreResult<bool> {
        let result = track_db_operation("delete_one", SCORES, async {
            self.scores()
                .delete_one(doc! { "_id": id })
                .await
                .context("Failed to delete score")
        })
        .await?;
        Ok(result.deleted_count > 0)
    }

    async fn list_cohort(&self, cohort: &CohortKey) -> StoreResult<Vec<ScoreRecord>> {
        let records = track_db_operation("find", SCORES, async {
            let cursor = self
                .scores()
                .find(doc! {
                    "subject_id": &cohort.subject_id,
                    "term_id": &cohort.term_id,
                })
                .with_options(
                    FindOptions::builder()
                        .sort(doc! { "total": -1, "student_id": 1 })
                        .build(),
                )
                .await
                .context("Failed to query cohort")?;
            cursor
                .try_collect::<Vec<_>>()
                .await
                .context("Failed to read cohort")
        })
        .await?;
        Ok(records)
    }

    async fn set_position(&self, id: &str, position: u32) -> StoreResult<()> {
        track_db_operation("update_one", SCORES, async {
            self.scores()
                .update_one(
                    doc! { "_id": id },
                    doc! { "$set": { "position": (position as i64) } },
                )
                .await
                .context("Failed to write position")
        })
        .await?;
        Ok(())
    }

    async fn insert_attempt(&self, attempt: &AssessmentAttempt) -> StoreResult<()> {
        match self.attempts().insert_one(attempt).await {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key(&e) => {
                Err(StoreError::Duplicate(format!("attempt {}", attempt.id)))
            }
            Err(e) => Err(anyhow::Error::new(e)
                .context("Failed to insert attempt")
                .into()),
        }
    }

    async fn find_attempt(&self, id: &str) -> StoreResult<Option<AssessmentAttempt>> {
        let attempt = self
            .attempts()
            .find_one(doc! { "_id": id })
            .await
            .context("Failed to query attempt")?;
        Ok(attempt)
    }

    async fn find_attempts_for(
        &self,
        student_id: &str,
        exam_id: &str,
    ) -> StoreResult<Vec<AssessmentAttempt>> {
        let cursor = self
            .attempts()
            .find(doc! { "student_id": student_id, "exam_id": exam_id })
            .with_options(FindOptions::builder().sort(doc! { "started_at": 1 }).build())
            .await
            .context("Failed to query attempts")?;
        let attempts = cursor
            .try_collect::<Vec<_>>()
            .await
            .context("Failed to read attempts")?;
        Ok(attempts)
    }

    async fn replace_attempt(&self, attempt: &AssessmentAttempt) -> StoreResult<bool> {
        let result = track_db_operation("replace_one", ATTEMPTS, async {
            self.attempts()
                .replace_one(doc! { "_id": &attempt.id }, attempt)
                .await
                .context("Failed to replace attempt")
        })
        .await?;
        Ok(result.matched_count > 0)
    }

    async fn insert_exam(&self, exam: &Exam) -> StoreResult<()> {
        match self.exams().insert_one(exam).await {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key(&e) => Err(StoreError::Duplicate(format!("exam {}", exam.id))),
            Err(e) => Err(anyhow::Error::new(e).context("Failed to insert exam").into()),
        }
    }

    async fn find_exam(&self, id: &str) -> StoreResult<Option<Exam>> {
        let exam = self
            .exams()
            .find_one(doc! { "_id": id })
            .await
            .context("Failed to query exam")?;
        Ok(exam)
    }

    async fn insert_notification(&self, notification: &Notification) -> StoreResult<()> {
        track_db_operation("insert_one", NOTIFICATIONS, async {
            self.notifications()
                .insert_one(notification)
                .await
                .context("Failed to insert notification")
        })
        .await?;
        Ok(())
    }

    async fn list_notifications(
        &self,
        recipient_id: &str,
        limit: usize,
    ) -> StoreResult<Vec<Notification>> {
        let cursor = self
            .notifications()
            .find(doc! { "recipient_id": recipient_id })
            .with_options(
                FindOptions::builder()
                    .sort(doc! { "created_at": -1 })
                    .limit(limit as i64)
                    .build(),
            )
            .await
            .context("Failed to query notifications")?;
        let rows = cursor
            .try_collect::<Vec<_>>()
            .await
            .context("Failed to read notifications")?;
        Ok(rows)
    }

    async fn find_notification(&self, id: &str) -> StoreResult<Option<Notification>> {
        let row = self
            .notifications()
            .find_one(doc! { "_id": id })
            .await
            .context("Failed to query notification")?;
        Ok(row)
    }

    async fn mark_notification_read(&self, id: &str, at: DateTime<Utc>) -> StoreResult<bool> {
        let read_at = bson::to_bson(&at).context("Failed to encode read_at")?;
        let result = self
            .notifications()
            .update_one(
                doc! { "_id": id },
                doc! { "$set": { "read_at": read_at } },
            )
            .await
            .context("Failed to mark notification read")?;
        Ok(result.matched_count > 0)
    }
}
