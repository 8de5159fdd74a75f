use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Patterns (lowercase) that indicate sensitive data not safe for UI display.
/// Used by `contains_sensitive()` for case-insensitive matching.
pub(crate) const SENSITIVE_PATTERNS: &[&str] = &[
    "bearer ",
    "secret_",
    "ntn_",
    "authorization:",
    "api_key",
];

/// Returns true if the message contains any sensitive pattern (case-insensitive).
fn contains_sensitive(msg: &str) -> bool {
    let lower = msg.to_ascii_lowercase();
    SENSITIVE_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Sanitizes a message for UI display.
/// If sensitive content is detected, returns the fallback instead.
fn sanitize_message(msg: &str, fallback: &str) -> String {
    if contains_sensitive(msg) {
        fallback.into()
    } else {
        msg.to_string()
    }
}

/// User-friendly error presentation for the frontend.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorPresentation {
    pub title: String,
    pub message: String,
    pub action: Option<String>,
}

/// Application-wide error type.
#[derive(Debug, Error)]
pub enum AppError {
    // ── Auth ──────────────────────────────────────────────────────────────────
    #[error("Invalid password")]
    BadPassword,

    #[error("Not authenticated")]
    NotAuthenticated,

    // ── Remote, transient ─────────────────────────────────────────────────────
    #[error("Rate limited")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Remote server error: {0}")]
    ServerError(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    // ── Remote, permanent ─────────────────────────────────────────────────────
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Notion error: [{code}] {message}")]
    NotionError { code: String, message: String },

    // ── Artifacts ─────────────────────────────────────────────────────────────
    #[error("Write failed: {0}")]
    WriteError(String),

    // ── Run lifecycle ─────────────────────────────────────────────────────────
    #[error("An export run is already in progress")]
    RunInProgress,

    #[error("No groups found for the configured property")]
    NoGroups,

    // ── Generic fallback ──────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// True for errors worth retrying with backoff (rate limits, 5xx,
    /// connection failures).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::RateLimited { .. }
                | AppError::ServerError(_)
                | AppError::ConnectionFailed(_)
        )
    }

    /// True for remote errors that retrying cannot fix. A group that hits one
    /// of these is skipped rather than left pending.
    pub fn is_permanent_remote(&self) -> bool {
        matches!(self, AppError::NotFound(_) | AppError::Forbidden(_))
    }

    /// Converts the error into a user-friendly presentation suitable for UI
    /// display. Never leaks tokens or credential material.
    pub fn to_presentation(&self) -> ErrorPresentation {
        match self {
            // ── Auth ──────────────────────────────────────────────────────────
            AppError::BadPassword => ErrorPresentation {
                title: "Hibás jelszó".into(),
                message: "A megadott jelszó nem megfelelő.".into(),
                action: Some("Próbáld újra".into()),
            },

            AppError::NotAuthenticated => ErrorPresentation {
                title: "Belépés szükséges".into(),
                message: "A folytatáshoz jelentkezz be.".into(),
                action: Some("Jelentkezz be".into()),
            },

            // ── Remote, transient ─────────────────────────────────────────────
            AppError::RateLimited { retry_after_secs } => {
                let wait_msg = match retry_after_secs {
                    Some(secs) => format!("Várj {} másodpercet, majd próbáld újra.", secs),
                    None => "Várj egy kicsit, majd próbáld újra.".into(),
                };
                ErrorPresentation {
                    title: "Túl sok kérés".into(),
                    message: format!("A távoli szolgáltatás korlátozza a kéréseket. {}", wait_msg),
                    action: Some("Várj és próbáld újra".into()),
                }
            }

            AppError::ServerError(msg) => ErrorPresentation {
                title: "Szolgáltatás hiba".into(),
                message: sanitize_message(msg, "A távoli szolgáltatás hibát jelzett."),
                action: Some("Próbáld újra később".into()),
            },

            AppError::ConnectionFailed(_) => ErrorPresentation {
                title: "Kapcsolódási hiba".into(),
                message: "Nem sikerült elérni a távoli szolgáltatást. Ellenőrizd a hálózatot."
                    .into(),
                action: Some("Ellenőrizd a hálózatot és próbáld újra".into()),
            },

            // ── Remote, permanent ─────────────────────────────────────────────
            AppError::NotFound(msg) => ErrorPresentation {
                title: "Nem található".into(),
                message: sanitize_message(msg, "A kért erőforrás nem található."),
                action: None,
            },

            AppError::Forbidden(msg) => ErrorPresentation {
                title: "Hozzáférés megtagadva".into(),
                message: sanitize_message(msg, "Nincs jogosultság az erőforráshoz."),
                action: Some("Ellenőrizd az integráció jogosultságait".into()),
            },

            AppError::NotionError { code, message } => ErrorPresentation {
                title: "Notion hiba".into(),
                message: sanitize_message(
                    &format!("[{}] {}", code, message),
                    "A Notion API hibát jelzett.",
                ),
                action: None,
            },

            // ── Artifacts ─────────────────────────────────────────────────────
            AppError::WriteError(msg) => ErrorPresentation {
                title: "Írási hiba".into(),
                message: sanitize_message(msg, "Nem sikerült kiírni az export fájlt."),
                action: Some("Ellenőrizd az export könyvtárat".into()),
            },

            // ── Run lifecycle ─────────────────────────────────────────────────
            AppError::RunInProgress => ErrorPresentation {
                title: "Export folyamatban".into(),
                message: "Már fut egy export. Várd meg, amíg befejeződik.".into(),
                action: Some("Figyeld a folyamatjelzőt".into()),
            },

            AppError::NoGroups => ErrorPresentation {
                title: "Nincs csoport".into(),
                message: "Nem találtam csoportokat/értékeket a megadott property alatt.".into(),
                action: None,
            },

            // ── Generic ───────────────────────────────────────────────────────
            AppError::Internal(_) => ErrorPresentation {
                title: "Váratlan hiba".into(),
                message: "Valami elromlott. Próbáld újra.".into(),
                action: Some("Próbáld újra".into()),
            },
        }
    }

    /// HTTP status code for the web layer.
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadPassword | AppError::NotAuthenticated => StatusCode::UNAUTHORIZED,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::NotFound(_) | AppError::NoGroups => StatusCode::NOT_FOUND,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::RunInProgress => StatusCode::CONFLICT,
            AppError::NotionError { .. } => StatusCode::BAD_GATEWAY,
            AppError::ServerError(_) | AppError::ConnectionFailed(_) => StatusCode::BAD_GATEWAY,
            AppError::WriteError(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(self.to_presentation());
        (status, body).into_response()
    }
}
