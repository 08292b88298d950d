use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::RwLock;

use super::{cohort_order, SchoolStore, StoreError, StoreResult};
use crate::models::{AssessmentAttempt, CohortKey, Exam, Notification, ScoreKey, ScoreRecord};

/// Process-local store for tests and `STORE_BACKEND=memory` runs.
pub struct MemoryStore {
    pub scores: RwLock<HashMap<String, ScoreRecord>>,
    pub attempts: RwLock<HashMap<String, AssessmentAttempt>>,
    pub exams: RwLock<HashMap<String, Exam>>,
    pub notifications: RwLock<Vec<Notification>>,
    /// Every score insert/replace fails while set
    pub fail_score_writes: AtomicBool,
    /// Every position write fails while set
    pub fail_position_writes: AtomicBool,
    pub position_writes: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            scores: RwLock::new(HashMap::new()),
            attempts: RwLock::new(HashMap::new()),
            exams: RwLock::new(HashMap::new()),
            notifications: RwLock::new(Vec::new()),
            fail_score_writes: AtomicBool::new(false),
            fail_position_writes: AtomicBool::new(false),
            position_writes: AtomicU64::new(0),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_score_writes(&self) -> StoreResult<()> {
        if self.fail_score_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend(anyhow!("score writes are disabled")));
        }
        Ok(())
    }
}

#[async_trait]
impl SchoolStore for MemoryStore {
    fn backend_tag(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn find_score(&self, id: &str) -> StoreResult<Option<ScoreRecord>> {
        Ok(self.scores.read().await.get(id).cloned())
    }

    async fn find_score_by_key(&self, key: &ScoreKey) -> StoreResult<Option<ScoreRecord>> {
        Ok(self
            .scores
            .read()
            .await
            .values()
            .find(|r| &r.key() == key)
            .cloned())
    }

    async fn insert_score(&self, record: &ScoreRecord) -> StoreResult<()> {
        self.check_score_writes()?;
        let mut scores = self.scores.write().await;
        let key = record.key();
        if scores.contains_key(&record.id) || scores.values().any(|r| r.key() == key) {
            return Err(StoreError::Duplicate(format!(
                "score for student {} in {}/{}",
                key.student_id, key.subject_id, key.term_id
            )));
        }
        scores.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn replace_score(&self, record: &ScoreRecord) -> StoreResult<bool> {
        self.check_score_writes()?;
        let mut scores = self.scores.write().await;
        match scores.get_mut(&record.id) {
            Some(existing) => {
                *existing = record.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_score(&self, id: &str) -> StoreResult<bool> {
        Ok(self.scores.write().await.remove(id).is_some())
    }

    async fn list_cohort(&self, cohort: &CohortKey) -> StoreResult<Vec<ScoreRecord>> {
        let mut records = self
            .scores
            .read()
            .await
            .values()
            .filter(|r| r.subject_id == cohort.subject_id && r.term_id == cohort.term_id)
            .cloned()
            .collect::<Vec<_>>();
        records.sort_by(cohort_order);
        Ok(records)
    }

    async fn set_position(&self, id: &str, position: u32) -> StoreResult<()> {
        if self.fail_position_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend(anyhow!("position writes are disabled")));
        }
        let mut scores = self.scores.write().await;
        let record = scores
            .get_mut(id)
            .ok_or_else(|| anyhow!("score {} vanished during re-rank", id))?;
        record.position = Some(position);
        self.position_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn insert_attempt(&self, attempt: &AssessmentAttempt) -> StoreResult<()> {
        let mut attempts = self.attempts.write().await;
        if attempts.contains_key(&attempt.id) {
            return Err(StoreError::Duplicate(format!("attempt {}", attempt.id)));
        }
        attempts.insert(attempt.id.clone(), attempt.clone());
        Ok(())
    }

    async fn find_attempt(&self, id: &str) -> StoreResult<Option<AssessmentAttempt>> {
        Ok(self.attempts.read().await.get(id).cloned())
    }

    async fn find_attempts_for(
        &self,
        student_id: &str,
        exam_id: &str,
    ) -> StoreResult<Vec<AssessmentAttempt>> {
        let mut attempts = self
            .attempts
            .read()
            .await
            .values()
            .filter(|a| a.student_id == student_id && a.exam_id == exam_id)
            .cloned()
            .collect::<Vec<_>>();
        attempts.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        Ok(attempts)
    }

    async fn replace_attempt(&self, attempt: &AssessmentAttempt) -> StoreResult<bool> {
        let mut attempts = self.attempts.write().await;
        match attempts.get_mut(&attempt.id) {
            Some(existing) => {
                *existing = attempt.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn insert_exam(&self, exam: &Exam) -> StoreResult<()> {
        let mut exams = self.exams.write().await;
        if exams.contains_key(&exam.id) {
            return Err(StoreError::Duplicate(format!("exam {}", exam.id)));
        }
        exams.insert(exam.id.clone(), exam.clone());
        Ok(())
    }

    async fn find_exam(&self, id: &str) -> StoreResult<Option<Exam>> {
        Ok(self.exams.read().await.get(id).cloned())
    }

    async fn insert_notification(&self, notification: &Notification) -> StoreResult<()> {
        self.notifications.write().await.push(notification.clone());
        Ok(())
    }

    async fn list_notifications(
        &self,
        recipient_id: &str,
        limit: usize,
    ) -> StoreResult<Vec<Notification>> {
        let mut rows = self
            .notifications
            .read()
            .await
            .iter()
            .rev()
            .filter(|n| n.recipient_id == recipient_id)
            .cloned()
            .collect::<Vec<_>>();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn find_notification(&self, id: &str) -> StoreResult<Option<Notification>> {
        Ok(self
            .notifications
            .read()
            .await
            .iter()
            .find(|n| n.id == id)
            .cloned())
    }

    async fn mark_notification_read(&self, id: &str, at: DateTime<Utc>) -> StoreResult<bool> {
        let mut notifications = self.notifications.write().await;
        match notifications.iter_mut().find(|n| n.id == id) {
            Some(n) => {
                if n.read_at.is_none() {
                    n.read_at = Some(at);
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
