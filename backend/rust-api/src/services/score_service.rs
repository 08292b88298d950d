use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};
use crate::metrics::{COHORT_RERANKS_TOTAL, SCORES_SAVED_TOTAL};
use crate::models::score::{
    BulkScoreRequest, BulkScoreResponse, SaveScoreRequest, ScoreResponse, UpdateScoreRequest,
};
use crate::models::{
    Actor, CohortKey, NotificationCategory, NotificationRequest, ScoreKey, ScoreRecord,
    ScoreSource,
};
use crate::services::keyed_lock::CohortLocks;
use crate::services::notification_service::{dispatch, Notifier};
use crate::services::ranking::{competition_positions, compute_total, grade_for};
use crate::services::AppState;
use crate::store::{SchoolStore, StoreError};

/// Result of a create-or-update write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated { changed: bool },
}

impl UpsertOutcome {
    fn notification(&self) -> Option<NotificationCategory> {
        match self {
            UpsertOutcome::Created => Some(NotificationCategory::ResultPublished),
            UpsertOutcome::Updated { changed: true } => Some(NotificationCategory::ResultUpdated),
            UpsertOutcome::Updated { changed: false } => None,
        }
    }
}

/// Every score write goes through here: derive total, persist, re-rank the
/// cohort, then notify the student.
pub struct ScoreService {
    store: Arc<dyn SchoolStore>,
    notifier: Arc<dyn Notifier>,
    locks: CohortLocks,
}

impl ScoreService {
    pub fn new(store: Arc<dyn SchoolStore>, notifier: Arc<dyn Notifier>, locks: CohortLocks) -> Self {
        Self {
            store,
            notifier,
            locks,
        }
    }

    pub fn from_state(state: &AppState) -> Self {
        Self::new(
            state.store.clone(),
            state.notifier.clone(),
            state.cohort_locks.clone(),
        )
    }

    pub async fn create_score(
        &self,
        actor: &Actor,
        req: SaveScoreRequest,
    ) -> ServiceResult<ScoreRecord> {
        require_staff(actor)?;

        let cohort = CohortKey {
            subject_id: req.subject_id.clone(),
            term_id: req.term_id.clone(),
        };

        let record = {
            let _guard = self.locks.lock(&cohort).await;
            let now = Utc::now();
            let mut record = ScoreRecord {
                id: Uuid::new_v4().to_string(),
                student_id: req.student_id,
                subject_id: req.subject_id,
                term_id: req.term_id,
                ca_score: 0.0,
                exam_score: 0.0,
                total: 0.0,
                grade: String::new(),
                position: None,
                teacher_id: Some(actor.id.clone()),
                source: ScoreSource::Manual,
                created_at: now,
                updated_at: now,
            };
            apply_scores(&mut record, req.ca_score, req.exam_score);

            self.store
                .insert_score(&record)
                .await
                .map_err(|e| match e {
                    StoreError::Duplicate(_) => ServiceError::conflict(
                        "A score for this student, subject and term already exists",
                    ),
                    other => other.into(),
                })?;

            let ranked = self.rerank(&cohort).await?;
            pick(ranked, record)
        };

        SCORES_SAVED_TOTAL
            .with_label_values(&[ScoreSource::Manual.as_str()])
            .inc();
        tracing::info!(
            "Score {} created for student {} in {} by {}",
            record.id,
            record.student_id,
            cohort,
            actor.id
        );

        self.notify(actor, &record, NotificationCategory::ResultPublished)
            .await;
        Ok(record)
    }

    pub async fn update_score(
        &self,
        actor: &Actor,
        id: &str,
        req: UpdateScoreRequest,
    ) -> ServiceResult<ScoreRecord> {
        require_staff(actor)?;

        let cohort = self.load(id).await?.cohort();

        let (record, changed) = {
            let _guard = self.locks.lock(&cohort).await;
            // Fresh read under the cohort lock
            let mut record = self.load(id).await?;
            let ca = req.ca_score.unwrap_or(record.ca_score);
            let exam = req.exam_score.unwrap_or(record.exam_score);
            let changed = apply_scores(&mut record, ca, exam);
            record.teacher_id = Some(actor.id.clone());
            record.source = ScoreSource::Manual;
            record.updated_at = Utc::now();

            if !self.store.replace_score(&record).await? {
                return Err(ServiceError::not_found("Score not found"));
            }

            let ranked = self.rerank(&cohort).await?;
            (pick(ranked, record), changed)
        };

        SCORES_SAVED_TOTAL
            .with_label_values(&[ScoreSource::Manual.as_str()])
            .inc();
        tracing::info!(
            score_id = %record.id,
            changed,
            "Score updated for student {} by {}",
            record.student_id,
            actor.id
        );

        if changed {
            self.notify(actor, &record, NotificationCategory::ResultUpdated)
                .await;
        }
        Ok(record)
    }

    /// Create-or-update by (student, subject, term). A missing component keeps
    /// the stored value on update and defaults to 0 on create.
    pub async fn upsert_score(
        &self,
        actor: &Actor,
        key: ScoreKey,
        ca_score: Option<f64>,
        exam_score: Option<f64>,
        source: ScoreSource,
    ) -> ServiceResult<(ScoreRecord, UpsertOutcome)> {
        let cohort = CohortKey {
            subject_id: key.subject_id.clone(),
            term_id: key.term_id.clone(),
        };

        let (record, outcome) = {
            let _guard = self.locks.lock(&cohort).await;
            let (record, outcome) = self
                .write_unlocked(actor, &key, ca_score, exam_score, source)
                .await?;
            let ranked = self.rerank(&cohort).await?;
            (pick(ranked, record), outcome)
        };

        SCORES_SAVED_TOTAL.with_label_values(&[source.as_str()]).inc();
        tracing::info!(
            "Score {} upserted ({:?}) for student {} in {} from {}",
            record.id,
            outcome,
            record.student_id,
            cohort,
            source.as_str()
        );

        if let Some(category) = outcome.notification() {
            self.notify(actor, &record, category).await;
        }
        Ok((record, outcome))
    }

    /// Writes a whole cohort batch and ranks once at the end
    pub async fn bulk_upsert(
        &self,
        actor: &Actor,
        req: BulkScoreRequest,
    ) -> ServiceResult<BulkScoreResponse> {
        require_staff(actor)?;

        let mut seen = HashSet::new();
        for row in &req.rows {
            if !seen.insert(row.student_id.as_str()) {
                return Err(ServiceError::validation(format!(
                    "student {} appears more than once",
                    row.student_id
                )));
            }
        }

        let cohort = CohortKey {
            subject_id: req.subject_id.clone(),
            term_id: req.term_id.clone(),
        };

        let mut written = Vec::with_capacity(req.rows.len());
        let ranked = {
            let _guard = self.locks.lock(&cohort).await;
            for row in req.rows {
                let key = ScoreKey {
                    student_id: row.student_id,
                    subject_id: req.subject_id.clone(),
                    term_id: req.term_id.clone(),
                };
                let (record, outcome) = self
                    .write_unlocked(
                        actor,
                        &key,
                        Some(row.ca_score),
                        Some(row.exam_score),
                        ScoreSource::Bulk,
                    )
                    .await?;
                written.push((record, outcome));
            }
            self.rerank(&cohort).await?
        };

        let mut created = 0;
        let mut updated = 0;
        let mut scores = Vec::with_capacity(written.len());
        for (record, outcome) in written {
            match outcome {
                UpsertOutcome::Created => created += 1,
                UpsertOutcome::Updated { .. } => updated += 1,
            }
            let record = pick_ref(&ranked, record);
            if let Some(category) = outcome.notification() {
                self.notify(actor, &record, category).await;
            }
            scores.push(ScoreResponse::from(record));
        }

        SCORES_SAVED_TOTAL
            .with_label_values(&[ScoreSource::Bulk.as_str()])
            .inc_by(scores.len() as u64);
        tracing::info!(
            "Bulk entry for {} by {}: {} created, {} updated",
            cohort,
            actor.id,
            created,
            updated
        );

        Ok(BulkScoreResponse {
            created,
            updated,
            scores,
        })
    }

    /// Removes a record and re-ranks what is left of its cohort
    pub async fn delete_score(&self, actor: &Actor, id: &str) -> ServiceResult<()> {
        require_staff(actor)?;

        let record = self.load(id).await?;
        let cohort = record.cohort();

        {
            let _guard = self.locks.lock(&cohort).await;
            if !self.store.delete_score(id).await? {
                return Err(ServiceError::not_found("Score not found"));
            }
            self.rerank(&cohort).await?;
        }

        tracing::info!(
            "Score {} deleted for student {} in {} by {}",
            id,
            record.student_id,
            cohort,
            actor.id
        );

        self.notify(actor, &record, NotificationCategory::ResultRemoved)
            .await;
        Ok(())
    }

    pub async fn get_score(&self, actor: &Actor, id: &str) -> ServiceResult<ScoreRecord> {
        let record = self.load(id).await?;
        if actor.is_staff() || actor.id == record.student_id {
            return Ok(record);
        }
        tracing::warn!("User {} denied access to score {}", actor.id, id);
        Err(ServiceError::forbidden("Not allowed to view this score"))
    }

    /// Cohort in position order
    pub async fn list_cohort(
        &self,
        actor: &Actor,
        cohort: &CohortKey,
    ) -> ServiceResult<Vec<ScoreRecord>> {
        require_staff(actor)?;
        Ok(self.store.list_cohort(cohort).await?)
    }

    pub async fn recompute_cohort(&self, cohort: &CohortKey) -> ServiceResult<Vec<ScoreRecord>> {
        let _guard = self.locks.lock(cohort).await;
        self.rerank(cohort).await
    }

    /// Caller must hold the cohort lock.
    ///
    /// Positions are written through `set_position`, which never runs the save
    /// path, and only for records whose position moved. A failing write stops
    /// the walk and leaves earlier writes in place.
    async fn rerank(&self, cohort: &CohortKey) -> ServiceResult<Vec<ScoreRecord>> {
        let mut records = self.store.list_cohort(cohort).await?;
        let totals: Vec<f64> = records.iter().map(|r| r.total).collect();
        let positions = competition_positions(&totals);

        let mut writes = 0usize;
        for (record, position) in records.iter_mut().zip(positions) {
            if record.position != Some(position) {
                self.store.set_position(&record.id, position).await?;
                record.position = Some(position);
                writes += 1;
            }
        }

        COHORT_RERANKS_TOTAL.inc();
        tracing::debug!(
            subject_id = %cohort.subject_id,
            term_id = %cohort.term_id,
            cohort_size = records.len(),
            writes,
            "Cohort re-ranked"
        );
        Ok(records)
    }

    /// Caller must hold the cohort lock for `key`
    async fn write_unlocked(
        &self,
        actor: &Actor,
        key: &ScoreKey,
        ca_score: Option<f64>,
        exam_score: Option<f64>,
        source: ScoreSource,
    ) -> ServiceResult<(ScoreRecord, UpsertOutcome)> {
        let now = Utc::now();
        let teacher_id = actor.is_staff().then(|| actor.id.clone());

        match self.store.find_score_by_key(key).await? {
            Some(mut record) => {
                let ca = ca_score.unwrap_or(record.ca_score);
                let exam = exam_score.unwrap_or(record.exam_score);
                let changed = apply_scores(&mut record, ca, exam);
                if teacher_id.is_some() {
                    record.teacher_id = teacher_id;
                }
                record.source = source;
                record.updated_at = now;

                if !self.store.replace_score(&record).await? {
                    return Err(ServiceError::not_found("Score not found"));
                }
                Ok((record, UpsertOutcome::Updated { changed }))
            }
            None => {
                let mut record = ScoreRecord {
                    id: Uuid::new_v4().to_string(),
                    student_id: key.student_id.clone(),
                    subject_id: key.subject_id.clone(),
                    term_id: key.term_id.clone(),
                    ca_score: 0.0,
                    exam_score: 0.0,
                    total: 0.0,
                    grade: String::new(),
                    position: None,
                    teacher_id,
                    source,
                    created_at: now,
                    updated_at: now,
                };
                apply_scores(
                    &mut record,
                    ca_score.unwrap_or(0.0),
                    exam_score.unwrap_or(0.0),
                );
                self.store.insert_score(&record).await?;
                Ok((record, UpsertOutcome::Created))
            }
        }
    }

    async fn load(&self, id: &str) -> ServiceResult<ScoreRecord> {
        self.store
            .find_score(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Score not found"))
    }

    async fn notify(&self, actor: &Actor, record: &ScoreRecord, category: NotificationCategory) {
        let request = result_notification(actor, record, category);
        dispatch(self.notifier.as_ref(), request).await;
    }
}

fn require_staff(actor: &Actor) -> ServiceResult<()> {
    if actor.is_staff() {
        Ok(())
    } else {
        tracing::warn!("User {} attempted a staff-only score operation", actor.id);
        Err(ServiceError::forbidden("Teacher or admin role required"))
    }
}

/// Sets both components and re-derives total and grade. Returns whether a
/// component changed.
fn apply_scores(record: &mut ScoreRecord, ca_score: f64, exam_score: f64) -> bool {
    let changed = record.ca_score != ca_score || record.exam_score != exam_score;
    record.ca_score = ca_score;
    record.exam_score = exam_score;
    record.total = compute_total(ca_score, exam_score);
    record.grade = grade_for(record.total).to_string();
    changed
}

fn pick(ranked: Vec<ScoreRecord>, written: ScoreRecord) -> ScoreRecord {
    ranked
        .into_iter()
        .find(|r| r.id == written.id)
        .unwrap_or(written)
}

fn pick_ref(ranked: &[ScoreRecord], written: ScoreRecord) -> ScoreRecord {
    ranked
        .iter()
        .find(|r| r.id == written.id)
        .cloned()
        .unwrap_or(written)
}

fn result_notification(
    actor: &Actor,
    record: &ScoreRecord,
    category: NotificationCategory,
) -> NotificationRequest {
    let (title, body) = match category {
        NotificationCategory::ResultUpdated => (
            "Result updated",
            format!(
                "Your {} result for term {} was updated to {} ({}).",
                record.subject_id, record.term_id, record.total, record.grade
            ),
        ),
        NotificationCategory::ResultRemoved => (
            "Result removed",
            format!(
                "Your {} result for term {} was removed.",
                record.subject_id, record.term_id
            ),
        ),
        _ => (
            "New result published",
            format!(
                "Your {} result for term {} is {} ({}).",
                record.subject_id, record.term_id, record.total, record.grade
            ),
        ),
    };

    NotificationRequest {
        recipient_id: record.student_id.clone(),
        sender_id: Some(actor.id.clone()),
        title: title.to_string(),
        body,
        category,
        related_id: Some(record.id.clone()),
    }
}
