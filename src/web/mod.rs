//! HTTP surface: password gate, group picker API, run control, progress,
//! and artifact downloads.

pub mod auth;
pub mod handlers;
pub mod page;
pub mod run;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;

use crate::state::AppState;

/// Builds the application router. Everything under `/api` except the login
/// endpoint sits behind the session middleware.
pub fn router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/api/groups", get(handlers::groups))
        .route("/api/groups/{label}/csv", get(handlers::group_csv))
        .route("/api/export/start", post(handlers::start_export))
        .route("/api/export/resume", post(handlers::resume_export))
        .route("/api/progress", get(handlers::progress))
        .route("/api/checkpoint", delete(handlers::clear_checkpoint))
        .route("/api/download/xlsx", get(handlers::download_workbook))
        .route("/api/download/csv", get(handlers::download_flat_csv))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_session,
        ));

    Router::new()
        .route("/", get(page::index))
        .route("/api/login", post(auth::login))
        .merge(protected)
        .with_state(state)
}
