//! Local JSON-file checkpoint store.

use std::future::Future;
use std::io::Write;
use std::path::PathBuf;
use std::pin::Pin;

use tempfile::NamedTempFile;
use tracing::warn;

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::error::AppError;

/// Checkpoint persisted as pretty JSON next to the export artifacts.
#[derive(Debug, Clone)]
pub struct LocalCheckpointStore {
    path: PathBuf,
}

impl LocalCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    async fn load_inner(&self) -> Result<Option<Checkpoint>, AppError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(AppError::WriteError(format!(
                    "Failed to read checkpoint {}: {}",
                    self.path.display(),
                    err
                )))
            }
        };

        match serde_json::from_slice::<Checkpoint>(&bytes) {
            Ok(checkpoint) => Ok(Some(checkpoint)),
            Err(err) => {
                // A corrupt checkpoint degrades to a fresh start.
                warn!(
                    "Ignoring unreadable checkpoint {}: {}",
                    self.path.display(),
                    err
                );
                Ok(None)
            }
        }
    }

    async fn save_inner(&self, checkpoint: &Checkpoint) -> Result<(), AppError> {
        let parent = self.path.parent().ok_or_else(|| {
            AppError::WriteError(format!(
                "Checkpoint path has no parent: {}",
                self.path.display()
            ))
        })?;
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            AppError::WriteError(format!("Failed to create checkpoint dir: {}", e))
        })?;

        let json = serde_json::to_vec_pretty(checkpoint)
            .map_err(|e| AppError::Internal(format!("Failed to serialize checkpoint: {}", e)))?;

        // Blocking section: NamedTempFile has no async API, but the write is
        // tiny and runs on the blocking pool.
        let path = self.path.clone();
        let parent = parent.to_path_buf();
        tokio::task::spawn_blocking(move || -> Result<(), AppError> {
            let mut temp = NamedTempFile::new_in(&parent).map_err(|e| {
                AppError::WriteError(format!("Failed to create temporary file: {}", e))
            })?;
            temp.write_all(&json)
                .map_err(|e| AppError::WriteError(format!("Failed to write checkpoint: {}", e)))?;
            temp.persist(&path).map_err(|e| {
                AppError::WriteError(format!(
                    "Failed to persist checkpoint to {}: {}",
                    path.display(),
                    e.error
                ))
            })?;
            Ok(())
        })
        .await
        .map_err(|e| AppError::Internal(format!("Checkpoint save task failed: {}", e)))?
    }

    async fn clear_inner(&self) -> Result<(), AppError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(AppError::WriteError(format!(
                "Failed to remove checkpoint {}: {}",
                self.path.display(),
                err
            ))),
        }
    }
}

impl CheckpointStore for LocalCheckpointStore {
    fn load<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Checkpoint>, AppError>> + Send + 'a>> {
        Box::pin(self.load_inner())
    }

    fn save<'a>(
        &'a self,
        checkpoint: &'a Checkpoint,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>> {
        Box::pin(self.save_inner(checkpoint))
    }

    fn clear<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>> {
        Box::pin(self.clear_inner())
    }
}
