//! Shared application state for the web layer.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use secrecy::ExposeSecret;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::checkpoint::{DualStore, LocalCheckpointStore, RemoteCheckpointStore};
use crate::config::Config;
use crate::error::AppError;
use crate::export::artifacts::ExportLayout;
use crate::export::progress::Progress;
use crate::export::{load_group_context, GroupContext};
use crate::mirror::SheetMirror;
use crate::notion::NotionClient;

/// Filename of the local checkpoint inside the export directory.
const CHECKPOINT_FILENAME: &str = "checkpoint.json";

/// Global application state shared across handlers and the run supervisor.
pub struct AppState {
    pub config: Config,
    pub notion: NotionClient,
    pub mirror: Option<SheetMirror>,
    pub layout: ExportLayout,
    pub store: DualStore,
    pub progress: Progress,
    /// Opaque tokens of authenticated sessions.
    sessions: RwLock<HashSet<String>>,
    /// Guards the single background export task.
    run_active: AtomicBool,
    /// Group context cached for the lifetime of the process (schema +
    /// full-scan group index).
    group_ctx: RwLock<Option<Arc<GroupContext>>>,
}

impl AppState {
    /// Builds the state from configuration: HTTP clients, export layout,
    /// and the dual checkpoint store.
    pub fn new(config: Config) -> Result<Self, AppError> {
        let notion = NotionClient::new(&config.notion_base_url, config.notion_api_key.clone())?;

        let mirror = match &config.mirror {
            Some(mirror_config) => Some(SheetMirror::from_config(mirror_config)?),
            None => None,
        };

        let layout = ExportLayout::new(&config.export_dir)?;
        let local = LocalCheckpointStore::new(config.export_dir.join(CHECKPOINT_FILENAME));
        let remote = mirror.clone().map(RemoteCheckpointStore::new);
        let store = DualStore::new(local, remote);

        Ok(Self {
            config,
            notion,
            mirror,
            layout,
            store,
            progress: Progress::new(),
            sessions: RwLock::new(HashSet::new()),
            run_active: AtomicBool::new(false),
            group_ctx: RwLock::new(None),
        })
    }

    // ── Sessions ──────────────────────────────────────────────────────────────

    /// Whether the password gate is enabled at all.
    pub fn auth_required(&self) -> bool {
        self.config.app_password.is_some()
    }

    /// Validates the shared password and issues a session token.
    pub async fn login(&self, password: &str) -> Result<String, AppError> {
        let Some(expected) = &self.config.app_password else {
            // Dev mode: no password configured, accept anything.
            return Ok(self.issue_session().await);
        };
        if password != expected.expose_secret() {
            return Err(AppError::BadPassword);
        }
        Ok(self.issue_session().await)
    }

    async fn issue_session(&self) -> String {
        let token = Uuid::new_v4().to_string();
        self.sessions.write().await.insert(token.clone());
        token
    }

    /// Whether the given bearer token belongs to an authenticated session.
    pub async fn is_authorized(&self, token: &str) -> bool {
        self.sessions.read().await.contains(token)
    }

    // ── Run guard ─────────────────────────────────────────────────────────────

    /// Claims the single run slot. Returns false when a run is active.
    pub fn try_begin_run(&self) -> bool {
        self.run_active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn end_run(&self) {
        self.run_active.store(false, Ordering::SeqCst);
    }

    pub fn run_active(&self) -> bool {
        self.run_active.load(Ordering::SeqCst)
    }

    // ── Group context cache ───────────────────────────────────────────────────

    /// Returns the cached group context, loading it on first use.
    pub async fn group_context(&self) -> Result<Arc<GroupContext>, AppError> {
        if let Some(ctx) = self.group_ctx.read().await.clone() {
            return Ok(ctx);
        }

        let ctx = Arc::new(load_group_context(&self.notion, &self.config).await?);
        *self.group_ctx.write().await = Some(ctx.clone());
        Ok(ctx)
    }

    /// Drops the cached context so the next request re-reads the database.
    pub async fn invalidate_group_context(&self) {
        *self.group_ctx.write().await = None;
    }
}
