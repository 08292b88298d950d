//! Propagation of completed CBT attempts into the scores collection.
//!
//! Sync is best-effort: failures are logged, counted and recorded on the
//! attempt, but never undo the completion and never reach the caller.

use chrono::Utc;
use std::sync::Arc;

use crate::config::CbtScoreMapping;
use crate::error::{ServiceError, ServiceResult};
use crate::metrics::ATTEMPT_SYNC_TOTAL;
use crate::models::score::EXAM_SCORE_MAX;
use crate::models::{
    Actor, AssessmentAttempt, AttemptStatus, AttemptSync, ScoreKey, ScoreRecord, ScoreSource,
    SyncStatus,
};
use crate::services::ranking::round_hundredths;
use crate::services::score_service::ScoreService;
use crate::services::AppState;
use crate::store::SchoolStore;

pub struct ResultSync {
    store: Arc<dyn SchoolStore>,
    scores: ScoreService,
    mapping: CbtScoreMapping,
}

impl ResultSync {
    pub fn new(store: Arc<dyn SchoolStore>, scores: ScoreService, mapping: CbtScoreMapping) -> Self {
        Self {
            store,
            scores,
            mapping,
        }
    }

    pub fn from_state(state: &AppState) -> Self {
        Self::new(
            state.store.clone(),
            ScoreService::from_state(state),
            state.config.cbt_score_mapping,
        )
    }

    /// Runs the sync only when `attempt` just moved into `Completed`.
    /// Returns whether a sync was attempted.
    pub async fn on_status_change(
        &self,
        actor: &Actor,
        previous: AttemptStatus,
        attempt: &mut AssessmentAttempt,
    ) -> bool {
        if !AttemptStatus::is_completion_edge(previous, attempt.status) {
            tracing::debug!(
                attempt_id = %attempt.id,
                "No completion edge ({} -> {}), skipping result sync",
                previous.as_str(),
                attempt.status.as_str()
            );
            return false;
        }
        self.sync(actor, attempt).await;
        true
    }

    /// Derives the result and records the outcome on the attempt. Never fails.
    pub async fn sync(&self, actor: &Actor, attempt: &mut AssessmentAttempt) {
        let now = Utc::now();
        attempt.sync = match self.derive(actor, attempt).await {
            Ok(record) => {
                ATTEMPT_SYNC_TOTAL.with_label_values(&["synced"]).inc();
                tracing::info!(
                    attempt_id = %attempt.id,
                    score_id = %record.id,
                    "Attempt synced to result (exam_score {}, total {})",
                    record.exam_score,
                    record.total
                );
                AttemptSync {
                    status: SyncStatus::Synced,
                    result_id: Some(record.id),
                    error: None,
                    synced_at: Some(now),
                }
            }
            Err(e) => {
                ATTEMPT_SYNC_TOTAL.with_label_values(&["failed"]).inc();
                tracing::error!(
                    attempt_id = %attempt.id,
                    student_id = %attempt.student_id,
                    "Failed to sync attempt to result: {}",
                    e
                );
                AttemptSync {
                    status: SyncStatus::Failed,
                    result_id: attempt.sync.result_id.clone(),
                    error: Some(e.to_string()),
                    synced_at: None,
                }
            }
        };

        if let Err(e) = self.store.replace_attempt(attempt).await {
            tracing::error!(
                attempt_id = %attempt.id,
                "Failed to record sync state on attempt: {}",
                e
            );
        }
    }

    /// Upserts the student's result for the exam's (subject, term). The CA
    /// component of an existing record is kept.
    pub async fn derive(
        &self,
        actor: &Actor,
        attempt: &AssessmentAttempt,
    ) -> ServiceResult<ScoreRecord> {
        let score = attempt
            .score
            .ok_or_else(|| ServiceError::validation("Attempt has no score"))?;

        let exam = self
            .store
            .find_exam(&attempt.exam_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("Exam {} not found", attempt.exam_id)))?;

        let key = ScoreKey {
            student_id: attempt.student_id.clone(),
            subject_id: exam.subject_id,
            term_id: exam.term_id,
        };
        let exam_score = map_exam_score(self.mapping, score, attempt.max_score);

        let (record, _) = self
            .scores
            .upsert_score(actor, key, None, Some(exam_score), ScoreSource::Cbt)
            .await?;
        Ok(record)
    }
}

/// Exam component for an attempt score
pub fn map_exam_score(mapping: CbtScoreMapping, score: f64, max_score: f64) -> f64 {
    match mapping {
        CbtScoreMapping::Raw => score,
        CbtScoreMapping::Scaled if max_score > 0.0 => {
            round_hundredths(score / max_score * EXAM_SCORE_MAX)
        }
        CbtScoreMapping::Scaled => 0.0,
    }
}
