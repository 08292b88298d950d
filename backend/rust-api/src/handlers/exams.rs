use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;

use crate::error::ApiError;
use crate::extractors::AppJson;
use crate::models::attempt::AttemptResponse;
use crate::models::exam::{CreateExamRequest, ExamResponse};
use crate::models::Actor;
use crate::services::attempt_service::AttemptService;
use crate::services::exam_service::ExamService;
use crate::services::AppState;

pub async fn create_exam(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    AppJson(req): AppJson<CreateExamRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let service = ExamService::new(state.store.clone());
    let exam = service.create_exam(&actor, req).await?;
    Ok((StatusCode::CREATED, Json(ExamResponse::for_staff(exam))))
}

pub async fn get_exam(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let service = ExamService::new(state.store.clone());
    Ok(Json(service.get_exam(&actor, &id).await?))
}

pub async fn start_attempt(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(exam_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let service = AttemptService::from_state(&state);
    let attempt = service.start_attempt(&actor, &exam_id).await?;
    Ok((StatusCode::CREATED, Json(AttemptResponse::from(attempt))))
}
