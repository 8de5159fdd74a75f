//! Client for the remote spreadsheet service.
//!
//! The mirror talks to a Sheets-style REST backend: one spreadsheet,
//! addressed worksheets, whole-sheet reads and replacements. Replacement is
//! the only write primitive — a re-mirrored group always overwrites its
//! worksheet, which is what keeps re-runs duplication-free.

use std::time::{Duration, Instant};

use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use url::Url;

use crate::config::MirrorConfig;
use crate::error::AppError;
use crate::retry::with_retry;

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Parsed service credential blob.
#[derive(Debug, Deserialize)]
struct WireCredentials {
    token: String,
}

/// Sheet contents as returned by the service.
#[derive(Debug, Deserialize)]
struct WireSheetValues {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

/// Client for one remote spreadsheet.
#[derive(Clone)]
pub struct SheetMirror {
    http: reqwest::Client,
    base_url: Url,
    spreadsheet_id: String,
    token: SecretString,
}

impl std::fmt::Debug for SheetMirror {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SheetMirror")
            .field("base_url", &self.base_url.as_str())
            .field("spreadsheet_id", &self.spreadsheet_id)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl SheetMirror {
    /// Builds the mirror client from configuration, parsing the credential
    /// blob. The blob never reaches logs or error messages.
    pub fn from_config(config: &MirrorConfig) -> Result<Self, AppError> {
        let creds: WireCredentials = serde_json::from_str(config.credentials.expose_secret())
            .map_err(|_| AppError::Internal("Invalid mirror credential blob".to_string()))?;

        let base_url = Url::parse(&config.base_url)
            .map_err(|_| AppError::Internal("Invalid mirror base URL".to_string()))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url,
            spreadsheet_id: config.spreadsheet_id.clone(),
            token: SecretString::from(creds.token),
        })
    }

    fn sheet_url(&self, title: &str) -> Result<Url, AppError> {
        // Percent-encode the title via the path-segment API so names with
        // spaces or slashes survive.
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AppError::Internal("Mirror base URL cannot be a base".to_string()))?
            .push("spreadsheets")
            .push(&self.spreadsheet_id)
            .push("sheets")
            .push(title);
        Ok(url)
    }

    /// Replaces the named worksheet's contents with the given rows, creating
    /// the worksheet when it does not exist yet.
    pub async fn replace_sheet(
        &self,
        title: &str,
        values: &[Vec<String>],
    ) -> Result<(), AppError> {
        let url = self.sheet_url(title)?;
        let body = json!({ "values": values });

        with_retry("mirror replace", || async {
            let response = self
                .execute(Method::PUT, url.clone(), Some(&body))
                .await?;
            check_status(response).await.map(|_| ())
        })
        .await
    }

    /// Reads the named worksheet's contents. `NotFound` when the worksheet
    /// does not exist.
    pub async fn read_sheet(&self, title: &str) -> Result<Vec<Vec<String>>, AppError> {
        let url = self.sheet_url(title)?;

        let response = with_retry("mirror read", || async {
            let response = self.execute(Method::GET, url.clone(), None).await?;
            check_status(response).await
        })
        .await?;

        let wire: WireSheetValues = response
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to parse sheet values: {}", e)))?;
        Ok(wire.values)
    }

    /// Sends one request with timing and sanitized logging.
    async fn execute(
        &self,
        method: Method,
        url: Url,
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Response, AppError> {
        let start = Instant::now();
        let log_path = url.path().to_string();

        let mut request = self
            .http
            .request(method.clone(), url)
            .bearer_auth(self.token.expose_secret());
        if let Some(body) = body {
            request = request.json(body);
        }

        match request.send().await {
            Ok(response) => {
                info!(
                    "[MIRROR] {} {} {} {}ms",
                    method,
                    log_path,
                    response.status().as_u16(),
                    start.elapsed().as_millis()
                );
                Ok(response)
            }
            Err(_) => {
                info!(
                    "[MIRROR] {} {} FAILED {}ms",
                    method,
                    log_path,
                    start.elapsed().as_millis()
                );
                Err(AppError::ConnectionFailed(
                    "Connection to the mirror service failed".to_string(),
                ))
            }
        }
    }
}

/// Maps a response's status onto the error taxonomy, passing success through.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, AppError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    Err(match status.as_u16() {
        429 => AppError::RateLimited {
            retry_after_secs: retry_after,
        },
        404 => AppError::NotFound("worksheet not found".to_string()),
        401 | 403 => AppError::Forbidden("mirror access denied".to_string()),
        500..=599 => AppError::ServerError(format!(
            "HTTP {} - {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown error")
        )),
        code => AppError::WriteError(format!("Mirror rejected the request: HTTP {}", code)),
    })
}

/// Serializes course rows to sheet values: a header row plus one row per
/// record, matching the CSV column order.
pub fn rows_to_values(rows: &[crate::export::rows::CourseRow]) -> Vec<Vec<String>> {
    let mut values = Vec::with_capacity(rows.len() + 1);
    values.push(
        crate::export::rows::CSV_FIELDNAMES
            .iter()
            .map(|s| s.to_string())
            .collect(),
    );
    for row in rows {
        values.push(vec![
            row.oldal_cime.clone(),
            row.szakasz.clone(),
            row.sorszam.clone(),
            row.tartalom.clone(),
        ]);
    }
    values
}
