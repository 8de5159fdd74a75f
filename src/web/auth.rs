//! Password gate and session middleware.
//!
//! One shared password guards the tool. A successful login issues an opaque
//! session token which the frontend sends as a bearer header. With no
//! password configured the gate is disabled (dev mode).

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
}

/// `POST /api/login` — validates the shared password, returns a session
/// token.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    if !state.auth_required() {
        warn!("APP_PASSWORD not set, the gate is disabled (dev mode)");
    }
    let token = state.login(&request.password).await?;
    Ok(Json(LoginResponse { token }))
}

/// Extracts the bearer token from the Authorization header.
fn extract_bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Middleware guarding the API routes. Passes everything through in dev
/// mode; otherwise requires a bearer token from a live session.
pub async fn require_session(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !state.auth_required() {
        return Ok(next.run(request).await);
    }

    let Some(token) = extract_bearer_token(&request) else {
        return Err(AppError::NotAuthenticated);
    };
    if !state.is_authorized(token).await {
        return Err(AppError::NotAuthenticated);
    }

    Ok(next.run(request).await)
}
