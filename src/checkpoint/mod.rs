//! Resumable run state.
//!
//! A checkpoint records the ordered group list and which groups completed or
//! were skipped, plus enough metadata to tell whether it belongs to the
//! current database and grouping property. It serializes as one JSON
//! document so the same bytes round-trip through the local file store and
//! the remote sheet cell.

pub mod local;
pub mod remote;

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::AppError;

pub use local::LocalCheckpointStore;
pub use remote::RemoteCheckpointStore;

/// Current checkpoint schema version.
pub const CHECKPOINT_VERSION: u32 = 1;

/// Persisted progress of an export run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub version: u32,
    pub database_id: String,
    pub property_name: String,
    /// Ordered group labels (display names) for this run.
    pub groups: Vec<String>,
    /// Completed groups. Always a subset of `groups`.
    #[serde(default)]
    pub done: Vec<String>,
    /// Groups the remote source permanently rejected. Subset of `groups`,
    /// disjoint from `done`.
    #[serde(default)]
    pub skipped: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Starts a fresh checkpoint for a run over `groups`.
    pub fn new(database_id: &str, property_name: &str, groups: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            version: CHECKPOINT_VERSION,
            database_id: database_id.to_string(),
            property_name: property_name.to_string(),
            groups,
            done: Vec::new(),
            skipped: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_done(&self, label: &str) -> bool {
        self.done.iter().any(|l| l == label)
    }

    pub fn is_skipped(&self, label: &str) -> bool {
        self.skipped.iter().any(|l| l == label)
    }

    /// Marks a group completed. Idempotent; ignores labels outside `groups`;
    /// a completed group cannot stay skipped.
    pub fn mark_done(&mut self, label: &str) {
        if !self.groups.iter().any(|l| l == label) || self.is_done(label) {
            return;
        }
        self.skipped.retain(|l| l != label);
        self.done.push(label.to_string());
        self.updated_at = Utc::now();
    }

    /// Marks a group permanently skipped. Idempotent; never demotes a done
    /// group.
    pub fn mark_skipped(&mut self, label: &str) {
        if !self.groups.iter().any(|l| l == label)
            || self.is_done(label)
            || self.is_skipped(label)
        {
            return;
        }
        self.skipped.push(label.to_string());
        self.updated_at = Utc::now();
    }

    /// Groups still to process, in run order.
    pub fn pending(&self) -> Vec<String> {
        self.groups
            .iter()
            .filter(|l| !self.is_done(l) && !self.is_skipped(l))
            .cloned()
            .collect()
    }

    /// Drops `done`/`skipped` labels that no longer appear in `groups`.
    /// A partially-written or stale checkpoint thus degrades to "not done
    /// yet" instead of failing the load.
    pub fn prune_unknown(&mut self) {
        let groups = self.groups.clone();
        self.done.retain(|l| groups.contains(l));
        self.skipped.retain(|l| groups.contains(l));
    }

    /// Whether this checkpoint was created for the given source.
    pub fn matches_source(&self, database_id: &str, property_name: &str) -> bool {
        self.database_id == database_id && self.property_name == property_name
    }
}

/// Storage backend for checkpoints.
///
/// Implementations must treat an absent checkpoint as `Ok(None)` and a
/// corrupt one as absent (after logging), so a first run and a damaged store
/// behave the same: no groups done yet.
pub trait CheckpointStore: Send + Sync {
    fn load<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Checkpoint>, AppError>> + Send + 'a>>;

    fn save<'a>(
        &'a self,
        checkpoint: &'a Checkpoint,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>>;

    fn clear<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>>;
}

/// Local store plus optional remote store. The remote copy wins on load and
/// both are written on save; a remote save failure is logged but does not
/// fail the run, since local state alone guarantees resumability.
pub struct DualStore {
    local: LocalCheckpointStore,
    remote: Option<RemoteCheckpointStore>,
}

impl DualStore {
    pub fn new(local: LocalCheckpointStore, remote: Option<RemoteCheckpointStore>) -> Self {
        Self { local, remote }
    }

    /// Loads the authoritative checkpoint. When the remote copy exists it
    /// replaces the local one (and is written back so the two agree).
    pub async fn load(&self) -> Result<Option<Checkpoint>, AppError> {
        if let Some(remote) = &self.remote {
            match remote.load().await {
                Ok(Some(mut checkpoint)) => {
                    checkpoint.prune_unknown();
                    if let Err(err) = self.local.save(&checkpoint).await {
                        warn!("Failed to sync remote checkpoint to local store: {}", err);
                    }
                    return Ok(Some(checkpoint));
                }
                Ok(None) => {}
                Err(err) => {
                    warn!("Remote checkpoint load failed, falling back to local: {}", err);
                }
            }
        }

        match self.local.load().await? {
            Some(mut checkpoint) => {
                checkpoint.prune_unknown();
                Ok(Some(checkpoint))
            }
            None => Ok(None),
        }
    }

    /// Persists the checkpoint. Local failure is fatal; remote failure is
    /// logged and swallowed.
    pub async fn save(&self, checkpoint: &Checkpoint) -> Result<(), AppError> {
        self.local.save(checkpoint).await?;
        if let Some(remote) = &self.remote {
            if let Err(err) = remote.save(checkpoint).await {
                warn!("Failed to mirror checkpoint to remote store: {}", err);
            }
        }
        Ok(())
    }

    /// Clears both stores.
    pub async fn clear(&self) -> Result<(), AppError> {
        self.local.clear().await?;
        if let Some(remote) = &self.remote {
            if let Err(err) = remote.clear().await {
                warn!("Failed to clear remote checkpoint: {}", err);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkpoint() -> Checkpoint {
        Checkpoint::new(
            "db-1",
            "Kurzus",
            vec!["A".to_string(), "B".to_string(), "C".to_string()],
        )
    }

    #[test]
    fn new_checkpoint_has_no_progress() {
        let cp = checkpoint();
        assert_eq!(cp.version, CHECKPOINT_VERSION);
        assert!(cp.done.is_empty());
        assert!(cp.skipped.is_empty());
        assert_eq!(cp.pending(), vec!["A", "B", "C"]);
    }

    #[test]
    fn mark_done_is_idempotent() {
        let mut cp = checkpoint();
        cp.mark_done("A");
        cp.mark_done("A");
        assert_eq!(cp.done, vec!["A"]);
        assert_eq!(cp.pending(), vec!["B", "C"]);
    }

    #[test]
    fn mark_done_ignores_unknown_labels() {
        let mut cp = checkpoint();
        cp.mark_done("Z");
        assert!(cp.done.is_empty());
    }

    #[test]
    fn skipped_groups_leave_pending() {
        let mut cp = checkpoint();
        cp.mark_skipped("B");
        assert_eq!(cp.pending(), vec!["A", "C"]);
        assert!(cp.is_skipped("B"));
    }

    #[test]
    fn done_wins_over_skipped() {
        let mut cp = checkpoint();
        cp.mark_skipped("B");
        cp.mark_done("B");
        assert!(cp.is_done("B"));
        assert!(!cp.is_skipped("B"));

        // And a done group cannot be demoted.
        cp.mark_skipped("B");
        assert!(!cp.is_skipped("B"));
    }

    #[test]
    fn prune_unknown_drops_stale_labels() {
        let mut cp = checkpoint();
        cp.done.push("Régi csoport".to_string());
        cp.skipped.push("Másik régi".to_string());
        cp.prune_unknown();
        assert!(cp.done.is_empty());
        assert!(cp.skipped.is_empty());
    }

    #[test]
    fn matches_source_compares_both_fields() {
        let cp = checkpoint();
        assert!(cp.matches_source("db-1", "Kurzus"));
        assert!(!cp.matches_source("db-2", "Kurzus"));
        assert!(!cp.matches_source("db-1", "Más"));
    }

    #[test]
    fn json_roundtrip_preserves_state() {
        let mut cp = checkpoint();
        cp.mark_done("A");
        cp.mark_skipped("B");

        let json = serde_json::to_string(&cp).unwrap();
        let parsed: Checkpoint = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, cp);
    }

    #[test]
    fn missing_optional_fields_default_empty() {
        let json = r#"{
            "version": 1,
            "database_id": "db-1",
            "property_name": "Kurzus",
            "groups": ["A"],
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": "2026-01-01T00:00:00Z"
        }"#;
        let parsed: Checkpoint = serde_json::from_str(json).unwrap();
        assert!(parsed.done.is_empty());
        assert!(parsed.skipped.is_empty());
    }
}
