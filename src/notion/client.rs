//! Notion HTTP client with secure credential handling and safe logging.
//!
//! All requests carry the integration token as a bearer header and the
//! pinned `Notion-Version`. Transient failures (429, 5xx, connection errors)
//! are retried with bounded exponential backoff; permanent failures map into
//! the `AppError` taxonomy. Logs only ever contain the URL path — never query
//! strings, request bodies, or tokens.

use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::info;
use url::Url;

use crate::error::AppError;
use crate::retry::with_retry;

/// Notion API version pinned for stable response shapes.
const NOTION_VERSION: &str = "2022-06-28";

/// User agent string for all Notion API requests.
const CLIENT_USER_AGENT: &str = "kurzus-export/0.1.0";

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Notion API error response format.
#[derive(Debug, Deserialize)]
struct WireNotionError {
    code: String,
    message: String,
}

/// Thread-safe HTTP client for the Notion API.
#[derive(Clone)]
pub struct NotionClient {
    http: reqwest::Client,
    base_url: Url,
    token: SecretString,
}

impl std::fmt::Debug for NotionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotionClient")
            .field("base_url", &self.base_url.as_str())
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl NotionClient {
    /// Creates a client against the given base URL (production or a test
    /// server) with the integration token.
    pub fn new(base_url: &str, token: SecretString) -> Result<Self, AppError> {
        let base_url = Url::parse(base_url)
            .map_err(|_| AppError::Internal("Invalid Notion base URL".to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));
        headers.insert("Notion-Version", HeaderValue::from_static(NOTION_VERSION));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url,
            token,
        })
    }

    /// Executes a GET request against an API path and parses the JSON body.
    pub async fn get(&self, path: &str) -> Result<serde_json::Value, AppError> {
        self.request(Method::GET, path, None).await
    }

    /// Executes a POST request with a JSON body and parses the JSON response.
    pub async fn post(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, AppError> {
        self.request(Method::POST, path, Some(body)).await
    }

    /// Shared request path with retry. The path component is the only part of
    /// the URL that ever reaches the logs.
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<serde_json::Value, AppError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|_| AppError::Internal(format!("Invalid path: {}", path)))?;

        with_retry("notion request", || {
            self.execute_once(method.clone(), url.clone(), body)
        })
        .await
    }

    /// Executes a single request (no retry) with timing and safe logging.
    async fn execute_once(
        &self,
        method: Method,
        url: Url,
        body: Option<&serde_json::Value>,
    ) -> Result<serde_json::Value, AppError> {
        let start = Instant::now();
        let log_path = url.path().to_string();

        let mut request = self
            .http
            .request(method.clone(), url)
            .bearer_auth(self.token.expose_secret());
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(_) => {
                info!(
                    "[NOTION] {} {} FAILED {}ms",
                    method,
                    log_path,
                    start.elapsed().as_millis()
                );
                return Err(AppError::ConnectionFailed(
                    "Connection to Notion failed".to_string(),
                ));
            }
        };

        let status = response.status();
        info!(
            "[NOTION] {} {} {} {}ms",
            method,
            log_path,
            status.as_u16(),
            start.elapsed().as_millis()
        );

        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| AppError::Internal(format!("Failed to parse response: {}", e)));
        }

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        let body_text = response.text().await.unwrap_or_default();
        Err(map_error_status(status, retry_after, &body_text))
    }
}

/// Maps a non-success HTTP status onto the error taxonomy.
fn map_error_status(
    status: reqwest::StatusCode,
    retry_after: Option<u64>,
    body: &str,
) -> AppError {
    match status.as_u16() {
        429 => AppError::RateLimited {
            retry_after_secs: retry_after,
        },
        404 => AppError::NotFound(notion_message(body, "object not found")),
        401 | 403 => AppError::Forbidden(notion_message(body, "access denied")),
        500..=599 => AppError::ServerError(format!(
            "HTTP {} - {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown error")
        )),
        _ => match serde_json::from_str::<WireNotionError>(body) {
            Ok(err) => AppError::NotionError {
                code: err.code,
                message: err.message,
            },
            Err(_) => AppError::NotionError {
                code: format!("http_{}", status.as_u16()),
                message: status
                    .canonical_reason()
                    .unwrap_or("Unknown error")
                    .to_string(),
            },
        },
    }
}

/// Extracts the message from a Notion error body, with a fallback.
fn notion_message(body: &str, fallback: &str) -> String {
    serde_json::from_str::<WireNotionError>(body)
        .map(|e| e.message)
        .unwrap_or_else(|_| fallback.to_string())
}
