//! Remote sheet-backed checkpoint store.
//!
//! The checkpoint JSON lives in a dedicated worksheet of the mirror
//! spreadsheet, as a single cell. This shares the schema with the local file
//! store byte-for-byte, which is what lets either side be authoritative.

use std::future::Future;
use std::pin::Pin;

use tracing::warn;

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::error::AppError;
use crate::mirror::SheetMirror;

/// Worksheet holding the serialized checkpoint.
pub const CHECKPOINT_SHEET: &str = "checkpoint";

pub struct RemoteCheckpointStore {
    mirror: SheetMirror,
}

impl RemoteCheckpointStore {
    pub fn new(mirror: SheetMirror) -> Self {
        Self { mirror }
    }

    async fn load_inner(&self) -> Result<Option<Checkpoint>, AppError> {
        let values = match self.mirror.read_sheet(CHECKPOINT_SHEET).await {
            Ok(values) => values,
            Err(AppError::NotFound(_)) => return Ok(None),
            Err(err) => return Err(err),
        };

        let Some(cell) = values.first().and_then(|row| row.first()) else {
            return Ok(None);
        };
        if cell.trim().is_empty() {
            return Ok(None);
        }

        match serde_json::from_str::<Checkpoint>(cell) {
            Ok(checkpoint) => Ok(Some(checkpoint)),
            Err(err) => {
                warn!("Ignoring unreadable remote checkpoint: {}", err);
                Ok(None)
            }
        }
    }

    async fn save_inner(&self, checkpoint: &Checkpoint) -> Result<(), AppError> {
        let json = serde_json::to_string(checkpoint)
            .map_err(|e| AppError::Internal(format!("Failed to serialize checkpoint: {}", e)))?;
        self.mirror
            .replace_sheet(CHECKPOINT_SHEET, &[vec![json]])
            .await
    }

    async fn clear_inner(&self) -> Result<(), AppError> {
        self.mirror.replace_sheet(CHECKPOINT_SHEET, &[]).await
    }
}

impl CheckpointStore for RemoteCheckpointStore {
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
