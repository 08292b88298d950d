use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;
use validator::Validate;

use crate::error::ApiError;
use crate::extractors::AppJson;
use crate::models::attempt::{AttemptResponse, SubmitAnswersRequest};
use crate::models::Actor;
use crate::services::attempt_service::AttemptService;
use crate::services::AppState;

pub async fn get_attempt(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let service = AttemptService::from_state(&state);
    let attempt = service.get_attempt(&actor, &id).await?;
    Ok(Json(AttemptResponse::from(attempt)))
}

pub async fn submit_answers(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    AppJson(req): AppJson<SubmitAnswersRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;

    let service = AttemptService::from_state(&state);
    let attempt = service.submit_answers(&actor, &id, req).await?;
    Ok(Json(AttemptResponse::from(attempt)))
}

pub async fn complete_attempt(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let service = AttemptService::from_state(&state);
    let attempt = service.complete_attempt(&actor, &id).await?;
    Ok(Json(AttemptResponse::from(attempt)))
}

pub async fn abandon_attempt(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let service = AttemptService::from_state(&state);
    let attempt = service.abandon_attempt(&actor, &id).await?;
    Ok(Json(AttemptResponse::from(attempt)))
}

pub async fn resync_attempt(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let service = AttemptService::from_state(&state);
    let attempt = service.resync_attempt(&actor, &id).await?;
    Ok(Json(AttemptResponse::from(attempt)))
}
