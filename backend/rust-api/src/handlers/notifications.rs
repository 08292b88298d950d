use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;

use crate::error::ApiError;
use crate::models::Actor;
use crate::services::notification_service::NotificationService;
use crate::services::AppState;

pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
) -> Result<impl IntoResponse, ApiError> {
    let service = NotificationService::new(state.store.clone());
    Ok(Json(service.list_for(&actor).await?))
}

pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let service = NotificationService::new(state.store.clone());
    Ok(Json(service.mark_read(&actor, &id).await?))
}
