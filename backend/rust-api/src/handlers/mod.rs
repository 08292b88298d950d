use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;

use crate::metrics;
use crate::services::AppState;

pub mod attempts;
pub mod exams;
pub mod notifications;
pub mod scores;

pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let backend = state.store.backend_tag();

    let store_health = match tokio::time::timeout(
        std::time::Duration::from_secs(1),
        state.store.ping(),
    )
    .await
    {
        Ok(Ok(())) => json!({ "status": "healthy" }),
        Ok(Err(e)) => json!({ "status": "unhealthy", "error": format!("{} error: {}", backend, e) }),
        Err(_) => json!({ "status": "unhealthy", "error": format!("{} timeout after 1s", backend) }),
    };

    let healthy = store_health.get("status").and_then(|v| v.as_str()) == Some("healthy");
    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let status = if healthy { "healthy" } else { "degraded" };
    let mut dependencies = serde_json::Map::new();
    dependencies.insert(backend.to_string(), store_health);

    (
        status_code,
        Json(json!({
            "status": status,
            "service": "school-results-api",
            "version": env!("CARGO_PKG_VERSION"),
            "dependencies": dependencies
        })),
    )
}

pub async fn metrics_handler() -> impl IntoResponse {
    match metrics::render_metrics() {
        Ok(metrics_text) => (StatusCode::OK, metrics_text),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to render metrics: {}", e),
        ),
    }
}
