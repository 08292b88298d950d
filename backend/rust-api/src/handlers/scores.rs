use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;
use validator::Validate;

use crate::error::ApiError;
use crate::extractors::AppJson;
use crate::models::score::{
    BulkScoreRequest, CohortQuery, CohortResponse, SaveScoreRequest, ScoreResponse,
    UpdateScoreRequest,
};
use crate::models::{Actor, CohortKey};
use crate::services::score_service::ScoreService;
use crate::services::AppState;

pub async fn create_score(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    AppJson(req): AppJson<SaveScoreRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;

    let service = ScoreService::from_state(&state);
    let record = service.create_score(&actor, req).await?;
    Ok((StatusCode::CREATED, Json(ScoreResponse::from(record))))
}

pub async fn bulk_upsert(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    AppJson(req): AppJson<BulkScoreRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;

    let service = ScoreService::from_state(&state);
    let response = service.bulk_upsert(&actor, req).await?;
    Ok(Json(response))
}

pub async fn list_cohort(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<CohortQuery>,
) -> Result<impl IntoResponse, ApiError> {
    if query.subject_id.is_empty() || query.term_id.is_empty() {
        return Err(ApiError::bad_request("subject_id and term_id are required"));
    }

    let cohort = CohortKey {
        subject_id: query.subject_id,
        term_id: query.term_id,
    };
    let service = ScoreService::from_state(&state);
    let records = service.list_cohort(&actor, &cohort).await?;

    Ok(Json(CohortResponse {
        subject_id: cohort.subject_id,
        term_id: cohort.term_id,
        scores: records.into_iter().map(ScoreResponse::from).collect(),
    }))
}

pub async fn get_score(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let service = ScoreService::from_state(&state);
    let record = service.get_score(&actor, &id).await?;
    Ok(Json(ScoreResponse::from(record)))
}

pub async fn update_score(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    AppJson(req): AppJson<UpdateScoreRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;
    if req.ca_score.is_none() && req.exam_score.is_none() {
        return Err(ApiError::bad_request(
            "At least one of ca_score or exam_score is required",
        ));
    }

    let service = ScoreService::from_state(&state);
    let record = service.update_score(&actor, &id, req).await?;
    Ok(Json(ScoreResponse::from(record)))
}

pub async fn delete_score(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let service = ScoreService::from_state(&state);
    service.delete_score(&actor, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
