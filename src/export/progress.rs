//! Shared run progress, observed by the web layer.

use std::sync::{Arc, RwLock};

use serde::Serialize;

/// Lifecycle of the export run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    #[default]
    Idle,
    Running,
    Completed,
    /// Stopped on a budget or with groups still pending; a re-invocation
    /// will resume from the checkpoint.
    NeedsRerun,
    Failed,
}

/// Point-in-time view of the run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProgressSnapshot {
    pub phase: RunPhase,
    pub total: usize,
    pub completed: usize,
    pub percent: u8,
    pub current: Option<String>,
    pub message: Option<String>,
}

/// Cheap-to-clone handle updated by the engine and read by handlers.
/// Lock scope is a field copy, never held across await points.
#[derive(Clone, Default)]
pub struct Progress {
    inner: Arc<RwLock<ProgressSnapshot>>,
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    fn update(&self, f: impl FnOnce(&mut ProgressSnapshot)) {
        let mut snapshot = self.inner.write().expect("progress lock poisoned");
        f(&mut snapshot);
        snapshot.percent = if snapshot.total == 0 {
            100
        } else {
            ((snapshot.completed * 100) / snapshot.total).min(100) as u8
        };
    }

    /// Begins a run over `total` steps.
    pub fn start(&self, total: usize) {
        self.update(|s| {
            *s = ProgressSnapshot {
                phase: RunPhase::Running,
                total,
                ..Default::default()
            };
        });
    }

    /// Records a status line without advancing.
    pub fn log(&self, message: String) {
        self.update(|s| s.message = Some(message));
    }

    /// Advances one step with a status line.
    pub fn tick(&self, message: String) {
        self.update(|s| {
            s.completed = (s.completed + 1).min(s.total);
            s.message = Some(message);
        });
    }

    pub fn set_current(&self, current: Option<String>) {
        self.update(|s| s.current = current);
    }

    /// Ends the run in the given phase.
    pub fn finish(&self, phase: RunPhase, message: Option<String>) {
        self.update(|s| {
            s.phase = phase;
            s.current = None;
            if message.is_some() {
                s.message = message;
            }
        });
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.inner.read().expect("progress lock poisoned").clone()
    }
}
