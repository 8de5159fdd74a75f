//! The embedded single-page frontend.

use axum::response::Html;

/// `GET /` — the export form.
pub async fn index() -> Html<&'static str> {
    Html(include_str!("page.html"))
}
