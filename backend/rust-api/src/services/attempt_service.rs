use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};
use crate::metrics::ATTEMPTS_TOTAL;
use crate::models::attempt::SubmitAnswersRequest;
use crate::models::{
    Actor, AssessmentAttempt, AttemptStatus, AttemptSync, Exam, NotificationCategory,
    NotificationRequest,
};
use crate::services::grading::grade_attempt;
use crate::services::keyed_lock::AttemptLocks;
use crate::services::notification_service::{dispatch, Notifier};
use crate::services::result_sync::ResultSync;
use crate::services::AppState;
use crate::store::SchoolStore;

pub struct AttemptService {
    store: Arc<dyn SchoolStore>,
    notifier: Arc<dyn Notifier>,
    sync: ResultSync,
    locks: AttemptLocks,
}

impl AttemptService {
    pub fn new(
        store: Arc<dyn SchoolStore>,
        notifier: Arc<dyn Notifier>,
        sync: ResultSync,
        locks: AttemptLocks,
    ) -> Self {
        Self {
            store,
            notifier,
            sync,
            locks,
        }
    }

    pub fn from_state(state: &AppState) -> Self {
        Self::new(
            state.store.clone(),
            state.notifier.clone(),
            ResultSync::from_state(state),
            state.attempt_locks.clone(),
        )
    }

    /// Opens an attempt, or hands back the one already in progress
    pub async fn start_attempt(
        &self,
        actor: &Actor,
        exam_id: &str,
    ) -> ServiceResult<AssessmentAttempt> {
        if !actor.is_student() {
            return Err(ServiceError::forbidden("Only students can sit exams"));
        }

        let exam = self.load_exam(exam_id).await?;
        let existing = self.store.find_attempts_for(&actor.id, exam_id).await?;

        if existing
            .iter()
            .any(|a| a.status == AttemptStatus::Completed)
        {
            return Err(ServiceError::conflict("Exam already completed"));
        }
        if let Some(active) = existing
            .into_iter()
            .find(|a| a.status == AttemptStatus::InProgress)
        {
            tracing::debug!("Resuming attempt {} for student {}", active.id, actor.id);
            return Ok(active);
        }

        let now = Utc::now();
        let attempt = AssessmentAttempt {
            id: Uuid::new_v4().to_string(),
            student_id: actor.id.clone(),
            exam_id: exam.id.clone(),
            status: AttemptStatus::InProgress,
            answers: Vec::new(),
            score: None,
            max_score: exam.max_score(),
            started_at: now,
            expires_at: now + Duration::minutes(i64::from(exam.duration_minutes)),
            completed_at: None,
            sync: AttemptSync::default(),
        };
        self.store.insert_attempt(&attempt).await?;

        ATTEMPTS_TOTAL
            .with_label_values(&[AttemptStatus::InProgress.as_str()])
            .inc();
        tracing::info!(
            "Attempt {} started by student {} on exam {}",
            attempt.id,
            actor.id,
            exam.id
        );
        Ok(attempt)
    }

    pub async fn submit_answers(
        &self,
        actor: &Actor,
        attempt_id: &str,
        req: SubmitAnswersRequest,
    ) -> ServiceResult<AssessmentAttempt> {
        let _guard = self.locks.lock(&attempt_id.to_string()).await;
        let mut attempt = self.load_owned(actor, attempt_id).await?;

        if attempt.status != AttemptStatus::InProgress {
            return Err(ServiceError::conflict("Attempt is no longer in progress"));
        }
        if Utc::now() > attempt.expires_at {
            tracing::warn!("Late answers rejected for attempt {}", attempt.id);
            return Err(ServiceError::conflict("Attempt time has expired"));
        }

        attempt.answers.extend(req.answers);
        self.save(&attempt).await?;
        Ok(attempt)
    }

    /// Grades and completes the attempt, then propagates the result.
    ///
    /// Completing an attempt that is already completed returns it untouched:
    /// only the transition into `Completed` syncs and notifies.
    pub async fn complete_attempt(
        &self,
        actor: &Actor,
        attempt_id: &str,
    ) -> ServiceResult<AssessmentAttempt> {
        // Held until the edge is synced so a concurrent call sees `Completed`
        let _guard = self.locks.lock(&attempt_id.to_string()).await;
        let mut attempt = self.load_owned(actor, attempt_id).await?;
        let previous = attempt.status;

        match previous {
            AttemptStatus::Completed => {
                tracing::debug!("Attempt {} already completed", attempt.id);
                return Ok(attempt);
            }
            AttemptStatus::Abandoned => {
                return Err(ServiceError::conflict(
                    "Abandoned attempts cannot be completed",
                ))
            }
            AttemptStatus::InProgress => {}
        }

        let exam = self.load_exam(&attempt.exam_id).await?;
        let outcome = grade_attempt(&exam, &attempt.answers);

        attempt.status = AttemptStatus::Completed;
        attempt.score = Some(outcome.score);
        attempt.max_score = outcome.max_score;
        attempt.completed_at = Some(Utc::now());
        self.save(&attempt).await?;

        ATTEMPTS_TOTAL
            .with_label_values(&[AttemptStatus::Completed.as_str()])
            .inc();
        tracing::info!(
            attempt_id = %attempt.id,
            "Attempt completed by {} with {}/{}",
            actor.id,
            outcome.score,
            outcome.max_score
        );

        if self.sync.on_status_change(actor, previous, &mut attempt).await {
            dispatch(self.notifier.as_ref(), completion_notice(&exam, &attempt)).await;
        }
        Ok(attempt)
    }

    pub async fn abandon_attempt(
        &self,
        actor: &Actor,
        attempt_id: &str,
    ) -> ServiceResult<AssessmentAttempt> {
        let _guard = self.locks.lock(&attempt_id.to_string()).await;
        let mut attempt = self.load_owned(actor, attempt_id).await?;
        if attempt.status != AttemptStatus::InProgress {
            return Err(ServiceError::conflict("Attempt is no longer in progress"));
        }

        attempt.status = AttemptStatus::Abandoned;
        self.save(&attempt).await?;

        ATTEMPTS_TOTAL
            .with_label_values(&[AttemptStatus::Abandoned.as_str()])
            .inc();
        tracing::info!("Attempt {} abandoned by {}", attempt.id, actor.id);
        Ok(attempt)
    }

    pub async fn get_attempt(
        &self,
        actor: &Actor,
        attempt_id: &str,
    ) -> ServiceResult<AssessmentAttempt> {
        let attempt = self.load(attempt_id).await?;
        if actor.is_staff() || attempt.student_id == actor.id {
            Ok(attempt)
        } else {
            tracing::warn!("User {} denied access to attempt {}", actor.id, attempt_id);
            Err(ServiceError::forbidden("Not allowed to view this attempt"))
        }
    }

    /// Manual reconciliation: regrades a completed attempt against the current
    /// exam key and propagates it again.
    pub async fn resync_attempt(
        &self,
        actor: &Actor,
        attempt_id: &str,
    ) -> ServiceResult<AssessmentAttempt> {
        if !actor.is_staff() {
            return Err(ServiceError::forbidden("Teacher or admin role required"));
        }

        let _guard = self.locks.lock(&attempt_id.to_string()).await;
        let mut attempt = self.load(attempt_id).await?;
        if attempt.status != AttemptStatus::Completed {
            return Err(ServiceError::conflict("Only completed attempts can be synced"));
        }

        let exam = self.load_exam(&attempt.exam_id).await?;
        let outcome = grade_attempt(&exam, &attempt.answers);
        attempt.score = Some(outcome.score);
        attempt.max_score = outcome.max_score;

        tracing::info!(attempt_id = %attempt.id, "Manual resync requested by {}", actor.id);
        self.sync.sync(actor, &mut attempt).await;
        Ok(attempt)
    }

    async fn load(&self, attempt_id: &str) -> ServiceResult<AssessmentAttempt> {
        self.store
            .find_attempt(attempt_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Attempt not found"))
    }

    async fn load_owned(&self, actor: &Actor, attempt_id: &str) -> ServiceResult<AssessmentAttempt> {
        let attempt = self.load(attempt_id).await?;
        if attempt.student_id != actor.id {
            tracing::warn!("User {} tried to act on attempt {}", actor.id, attempt_id);
            return Err(ServiceError::forbidden("Attempt belongs to another student"));
        }
        Ok(attempt)
    }

    async fn load_exam(&self, exam_id: &str) -> ServiceResult<Exam> {
        self.store
            .find_exam(exam_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Exam not found"))
    }

    async fn save(&self, attempt: &AssessmentAttempt) -> ServiceResult<()> {
        if self.store.replace_attempt(attempt).await? {
            Ok(())
        } else {
            Err(ServiceError::not_found("Attempt not found"))
        }
    }
}

fn completion_notice(exam: &Exam, attempt: &AssessmentAttempt) -> NotificationRequest {
    NotificationRequest {
        recipient_id: exam.created_by.clone(),
        sender_id: Some(attempt.student_id.clone()),
        title: format!("{} completed", exam.title),
        body: format!(
            "Student {} scored {}/{}.",
            attempt.student_id,
            attempt.score.unwrap_or_default(),
            attempt.max_score
        ),
        category: NotificationCategory::ExamCompleted,
        related_id: Some(attempt.id.clone()),
    }
}
