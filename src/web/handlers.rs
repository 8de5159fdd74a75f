//! JSON API handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::AppError;
use crate::export::artifacts::{group_csv_bytes, FLAT_CSV_FILENAME, WORKBOOK_FILENAME};
use crate::export::engine::{collect_group_once, NotionRowSource};
use crate::export::progress::{ProgressSnapshot, RunPhase};
use crate::notion::text::slugify;
use crate::state::AppState;
use crate::web::run::spawn_run;

/// UTF-8 byte order mark, prepended to CSV downloads so spreadsheet apps
/// pick the right encoding.
const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";

// ─────────────────────────────────────────────────────────────────────────────
// Response types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct GroupInfo {
    pub label: String,
    pub display_name: String,
    pub count: usize,
    /// `pending`, `done`, or `skipped` per the current checkpoint.
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct CheckpointSummary {
    pub total: usize,
    pub done: usize,
    pub skipped: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct GroupsResponse {
    pub property_name: String,
    pub groups: Vec<GroupInfo>,
    pub checkpoint: Option<CheckpointSummary>,
}

#[derive(Debug, Serialize)]
pub struct ProgressResponse {
    pub progress: ProgressSnapshot,
    pub run_active: bool,
    pub checkpoint: Option<CheckpointSummary>,
}

#[derive(Debug, Serialize)]
pub struct StartedResponse {
    pub started: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// `GET /api/groups` — the group picker data, ordered by count descending.
pub async fn groups(State(state): State<Arc<AppState>>) -> Result<Json<GroupsResponse>, AppError> {
    let ctx = state.group_context().await?;
    let checkpoint = state.store.load().await?;

    let groups = ctx
        .index
        .entries
        .iter()
        .map(|entry| {
            let label = entry.label();
            let status = match &checkpoint {
                Some(cp) if cp.is_done(&label) => "done",
                Some(cp) if cp.is_skipped(&label) => "skipped",
                _ => "pending",
            };
            GroupInfo {
                label,
                display_name: entry.display_name.clone(),
                count: entry.count,
                status,
            }
        })
        .collect();

    Ok(Json(GroupsResponse {
        property_name: ctx.group_property.name.clone(),
        groups,
        checkpoint: checkpoint.as_ref().map(summarize),
    }))
}

fn summarize(checkpoint: &crate::checkpoint::Checkpoint) -> CheckpointSummary {
    CheckpointSummary {
        total: checkpoint.groups.len(),
        done: checkpoint.done.len(),
        skipped: checkpoint.skipped.len(),
        created_at: checkpoint.created_at,
        updated_at: checkpoint.updated_at,
    }
}

/// `POST /api/export/start` — fresh run over all groups.
pub async fn start_export(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<StartedResponse>), AppError> {
    spawn_run(state, true).await?;
    Ok((StatusCode::ACCEPTED, Json(StartedResponse { started: true })))
}

/// `POST /api/export/resume` — continue from the persisted checkpoint.
pub async fn resume_export(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<StartedResponse>), AppError> {
    spawn_run(state, false).await?;
    Ok((StatusCode::ACCEPTED, Json(StartedResponse { started: true })))
}

/// `GET /api/progress` — current run phase and checkpoint counts.
pub async fn progress(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ProgressResponse>, AppError> {
    let checkpoint = state.store.load().await?;
    Ok(Json(ProgressResponse {
        progress: state.progress.snapshot(),
        run_active: state.run_active(),
        checkpoint: checkpoint.as_ref().map(summarize),
    }))
}

/// `DELETE /api/checkpoint` — drop the saved progress.
pub async fn clear_checkpoint(
    State(state): State<Arc<AppState>>,
) -> Result<StatusCode, AppError> {
    if state.run_active() {
        return Err(AppError::RunInProgress);
    }
    state.store.clear().await?;
    state.invalidate_group_context().await;
    state
        .progress
        .finish(RunPhase::Idle, Some("Mentés törölve.".to_string()));
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/groups/{label}/csv` — on-demand CSV for one group, fetched
/// outside any checkpointed run.
pub async fn group_csv(
    State(state): State<Arc<AppState>>,
    Path(label): Path<String>,
) -> Result<Response, AppError> {
    let ctx = state.group_context().await?;

    let source = NotionRowSource::new(
        state.notion.clone(),
        state.config.notion_database_id.clone(),
        (*ctx).clone(),
    );
    let rows = collect_group_once(&source, &ctx.index, &label, &state.progress).await?;

    let mut bytes = Vec::from(UTF8_BOM);
    bytes.extend(group_csv_bytes(&rows)?);

    let slug = slugify(&label);
    let filename = if slug.is_empty() {
        "export.csv".to_string()
    } else {
        format!("export_{}.csv", slug)
    };
    Ok(csv_response(bytes, &filename))
}

/// `GET /api/download/xlsx` — the combined workbook.
pub async fn download_workbook(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    let bytes = read_artifact(state.layout.workbook_path()).await?;
    Ok((
        [
            (
                header::CONTENT_TYPE,
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet".to_string(),
            ),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", WORKBOOK_FILENAME),
            ),
        ],
        bytes,
    )
        .into_response())
}

/// `GET /api/download/csv` — the flat concatenated CSV.
pub async fn download_flat_csv(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    let file_bytes = read_artifact(state.layout.flat_csv_path()).await?;
    let mut bytes = Vec::from(UTF8_BOM);
    bytes.extend(file_bytes);
    Ok(csv_response(bytes, FLAT_CSV_FILENAME))
}

fn csv_response(bytes: Vec<u8>, filename: &str) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        bytes,
    )
        .into_response()
}

async fn read_artifact(path: std::path::PathBuf) -> Result<Vec<u8>, AppError> {
    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok(bytes),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(AppError::NotFound(
            "Az export fájl még nem készült el.".to_string(),
        )),
        Err(err) => Err(AppError::WriteError(format!(
            "Failed to read artifact {}: {}",
            path.display(),
            err
        ))),
    }
}
