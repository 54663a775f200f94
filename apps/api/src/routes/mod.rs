pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::solutions::handlers as solutions;
use crate::state::AppState;
use crate::training::handlers as training;

pub fn build_router(state: AppState) -> Router {
    let upload_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/health", get(health::health_handler))
        // Solutions
        .route(
            "/api/v1/solutions",
            post(solutions::handle_create).get(solutions::handle_list_published),
        )
        .route(
            "/api/v1/solutions/output-schema",
            post(solutions::handle_output_schema),
        )
        .route(
            "/api/v1/solutions/slug/:slug",
            get(solutions::handle_get_by_slug),
        )
        .route(
            "/api/v1/solutions/:id",
            get(solutions::handle_get)
                .patch(solutions::handle_update)
                .delete(solutions::handle_delete),
        )
        .route(
            "/api/v1/solutions/:id/publish",
            post(solutions::handle_publish),
        )
        .route(
            "/api/v1/solutions/:id/data-items",
            get(solutions::handle_list_data_items),
        )
        .route("/api/v1/solutions/:id/run", post(solutions::handle_run))
        // Training sessions
        .route(
            "/api/v1/training/sessions",
            post(training::handle_start_session),
        )
        .route(
            "/api/v1/training/sessions/:sid",
            get(training::handle_get_session).delete(training::handle_close_session),
        )
        .route(
            "/api/v1/training/sessions/:sid/documents",
            post(training::handle_upload),
        )
        .route(
            "/api/v1/training/sessions/:sid/documents/:did",
            axum::routing::delete(training::handle_delete_document),
        )
        .route(
            "/api/v1/training/sessions/:sid/documents/:did/approve",
            post(training::handle_approve),
        )
        .route(
            "/api/v1/training/sessions/:sid/documents/:did/reject",
            post(training::handle_reject),
        )
        .route(
            "/api/v1/training/sessions/:sid/documents/:did/feedback",
            post(training::handle_feedback),
        )
        .route(
            "/api/v1/training/sessions/:sid/documents/:did/reprocess",
            post(training::handle_reprocess),
        )
        .layer(DefaultBodyLimit::max(upload_limit))
        .with_state(state)
}
