use axum::{
    http::{header, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod store;

pub use config::Config;
pub use services::AppState;

use middlewares::auth::{auth_middleware, staff_guard_middleware};

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(tower_http::cors::Any);

    Router::new()
        // Public
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_handler))
        // Everything under /api/v1 needs a bearer token
        .nest(
            "/api/v1",
            api_routes().layer(middleware::from_fn_with_state(
                app_state.clone(),
                auth_middleware,
            )),
        )
        .with_state(app_state)
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(middleware::from_fn(
            middlewares::trace::trace_context_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

fn api_routes() -> Router<Arc<AppState>> {
    let staff_only = || middleware::from_fn(staff_guard_middleware);

    Router::new()
        // Results
        .route(
            "/scores",
            get(handlers::scores::list_cohort)
                .post(handlers::scores::create_score)
                .route_layer(staff_only()),
        )
        .route(
            "/scores/bulk",
            post(handlers::scores::bulk_upsert).route_layer(staff_only()),
        )
        .route(
            "/scores/{id}",
            get(handlers::scores::get_score)
                .patch(handlers::scores::update_score)
                .delete(handlers::scores::delete_score),
        )
        // CBT
        .route(
            "/exams",
            post(handlers::exams::create_exam).route_layer(staff_only()),
        )
        .route("/exams/{id}", get(handlers::exams::get_exam))
        .route("/exams/{id}/attempts", post(handlers::exams::start_attempt))
        .route("/attempts/{id}", get(handlers::attempts::get_attempt))
        .route(
            "/attempts/{id}/answers",
            post(handlers::attempts::submit_answers),
        )
        .route(
            "/attempts/{id}/complete",
            post(handlers::attempts::complete_attempt),
        )
        .route(
            "/attempts/{id}/abandon",
            post(handlers::attempts::abandon_attempt),
        )
        .route(
            "/attempts/{id}/resync",
            post(handlers::attempts::resync_attempt).route_layer(staff_only()),
        )
        // Notifications
        .route(
            "/notifications",
            get(handlers::notifications::list_notifications),
        )
        .route(
            "/notifications/{id}/read",
            post(handlers::notifications::mark_read),
        )
}
