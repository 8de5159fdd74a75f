//! The resumable batch-export loop.
//!
//! Groups move `Pending → InProgress → Done`, or `Pending → Skipped` when
//! the remote source permanently rejects every canonical name. Each group is
//! atomic: rows are collected, the CSV artifact is written, the mirror sheet
//! is replaced, and only then is the group marked done and the checkpoint
//! persisted. A failure anywhere in between leaves the group pending for the
//! next run and never aborts the loop.
//!
//! Budgets are checked before each group. A budget stop is a planned
//! outcome, not an error: the checkpoint is already saved, so a fresh
//! invocation resumes at the first pending group. The combined workbook and
//! flat CSV are assembled from the per-group artifacts once nothing is
//! pending, which is what lets resumed runs skip re-fetching done groups.

use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

use crate::checkpoint::{Checkpoint, DualStore};
use crate::error::AppError;
use crate::export::artifacts::{
    read_group_csv, write_flat_csv, write_group_csv, write_workbook, ExportLayout,
};
use crate::export::grouping::GroupIndex;
use crate::export::progress::Progress;
use crate::export::rows::CourseRow;
use crate::export::GroupContext;
use crate::mirror::client::rows_to_values;
use crate::mirror::SheetMirror;
use crate::notion::client::NotionClient;

/// Budgets bounding a single invocation.
#[derive(Debug, Clone, Copy)]
pub struct RunBudget {
    /// Wall-clock limit. Zero means unlimited.
    pub time_budget: Duration,
    /// Group-count limit. Zero means unlimited.
    pub max_groups: usize,
}

impl RunBudget {
    pub fn unlimited() -> Self {
        Self {
            time_budget: Duration::ZERO,
            max_groups: 0,
        }
    }

    /// True when starting another group would exceed a budget.
    fn exhausted(&self, elapsed: Duration, processed: usize) -> bool {
        if self.max_groups > 0 && processed >= self.max_groups {
            return true;
        }
        if !self.time_budget.is_zero() && elapsed >= self.time_budget {
            return true;
        }
        false
    }
}

/// How a single invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum RunOutcome {
    /// Every group is done or skipped; combined artifacts were assembled.
    Completed,
    /// A budget stopped the loop. Resuming will continue the run.
    BudgetExceeded { remaining: usize },
    /// Groups failed this run and remain pending for the next one.
    Incomplete { remaining: usize },
}

/// A group that failed this run (and stays pending).
#[derive(Debug, Clone, Serialize)]
pub struct GroupFailure {
    pub label: String,
    pub message: String,
}

/// Summary of one invocation.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub processed: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<GroupFailure>,
}

/// Source of a group's detail rows, keyed by canonical option name.
///
/// Decouples the engine from the Notion client so the loop's state machine
/// can be tested against a scripted fake.
pub trait GroupRowSource: Send + Sync {
    fn fetch_rows<'a>(
        &'a self,
        canonical_name: &'a str,
        progress: &'a Progress,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<CourseRow>, AppError>> + Send + 'a>>;
}

/// Row source backed by the Notion API.
pub struct NotionRowSource {
    client: NotionClient,
    database_id: String,
    ctx: GroupContext,
}

impl NotionRowSource {
    pub fn new(client: NotionClient, database_id: String, ctx: GroupContext) -> Self {
        Self {
            client,
            database_id,
            ctx,
        }
    }
}

impl GroupRowSource for NotionRowSource {
    fn fetch_rows<'a>(
        &'a self,
        canonical_name: &'a str,
        progress: &'a Progress,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<CourseRow>, AppError>> + Send + 'a>> {
        Box::pin(async move {
            let on_progress = move |message: String| progress.log(message);
            crate::export::rows::collect_rows_for_group(
                &self.client,
                &self.database_id,
                &self.ctx,
                canonical_name,
                &on_progress,
            )
            .await
        })
    }
}

/// The batch-export loop over one checkpointed run.
pub struct ExportEngine<'a> {
    pub source: &'a dyn GroupRowSource,
    pub store: &'a DualStore,
    pub mirror: Option<&'a SheetMirror>,
    pub layout: &'a ExportLayout,
    pub budget: RunBudget,
    pub progress: Progress,
}

/// Result of resolving one group's rows through its canonical names.
enum FetchOutcome {
    Rows(Vec<CourseRow>),
    /// Every canonical name was permanently rejected.
    AllRejected(AppError),
    /// A transient failure survived its retries; the group stays pending.
    Failed(AppError),
}

impl<'a> ExportEngine<'a> {
    /// Runs one invocation: load or create the checkpoint, process pending
    /// groups under the budgets, assemble combined artifacts when nothing is
    /// left pending.
    pub async fn run(
        &self,
        index: &GroupIndex,
        database_id: &str,
        property_name: &str,
    ) -> Result<RunReport, AppError> {
        let mut checkpoint = self.load_or_create(index, database_id, property_name).await?;

        let pending = checkpoint.pending();
        self.progress.start(pending.len());
        info!(
            "Export run: {} groups, {} pending",
            checkpoint.groups.len(),
            pending.len()
        );

        let started = Instant::now();
        let mut processed: Vec<String> = Vec::new();
        let mut skipped: Vec<String> = Vec::new();
        let mut failed: Vec<GroupFailure> = Vec::new();
        let mut budget_hit = false;

        for label in checkpoint.groups.clone() {
            if checkpoint.is_done(&label) || checkpoint.is_skipped(&label) {
                continue;
            }
            if self.budget.exhausted(started.elapsed(), processed.len()) {
                budget_hit = true;
                info!("Budget exhausted after {} groups, stopping", processed.len());
                break;
            }

            self.progress.set_current(Some(label.clone()));

            match self.fetch_group(index, &label).await {
                FetchOutcome::Failed(err) => {
                    warn!("Group '{}' failed this run: {}", label, err);
                    self.progress.log(format!("{} – hiba: {}", label, err));
                    failed.push(GroupFailure {
                        label,
                        message: err.to_string(),
                    });
                }
                FetchOutcome::AllRejected(err) => {
                    info!("Group '{}' skipped: {}", label, err);
                    checkpoint.mark_skipped(&label);
                    if let Err(save_err) = self.store.save(&checkpoint).await {
                        failed.push(GroupFailure {
                            label: label.clone(),
                            message: save_err.to_string(),
                        });
                    }
                    skipped.push(label.clone());
                    self.progress.tick(format!("{} – kihagyva.", label));
                }
                FetchOutcome::Rows(rows) => {
                    match self.complete_group(&mut checkpoint, &label, &rows).await {
                        Ok(()) => {
                            processed.push(label.clone());
                            self.progress
                                .tick(format!("{} – {} sor kész.", label, rows.len()));
                        }
                        Err(err) => {
                            warn!("Group '{}' not completed: {}", label, err);
                            self.progress.log(format!("{} – hiba: {}", label, err));
                            failed.push(GroupFailure {
                                label,
                                message: err.to_string(),
                            });
                        }
                    }
                }
            }
        }

        self.progress.set_current(None);

        let remaining = checkpoint.pending().len();
        let outcome = if budget_hit {
            RunOutcome::BudgetExceeded { remaining }
        } else if remaining > 0 {
            RunOutcome::Incomplete { remaining }
        } else {
            self.assemble_artifacts(&checkpoint)?;
            RunOutcome::Completed
        };

        Ok(RunReport {
            outcome,
            processed,
            skipped,
            failed,
        })
    }

    /// Loads the checkpoint when it belongs to this source, otherwise starts
    /// a fresh one over the current group labels and persists it.
    async fn load_or_create(
        &self,
        index: &GroupIndex,
        database_id: &str,
        property_name: &str,
    ) -> Result<Checkpoint, AppError> {
        if let Some(checkpoint) = self.store.load().await? {
            if checkpoint.matches_source(database_id, property_name) {
                return Ok(checkpoint);
            }
            info!("Checkpoint belongs to a different source, starting fresh");
        }

        let checkpoint = Checkpoint::new(database_id, property_name, index.labels());
        self.store.save(&checkpoint).await?;
        Ok(checkpoint)
    }

    /// Collects a group's rows, trying each canonical name until one returns
    /// rows. A name that resolves but matches nothing still counts as a
    /// successful (empty) fetch; only when every name is permanently
    /// rejected does the group become skippable.
    async fn fetch_group(&self, index: &GroupIndex, label: &str) -> FetchOutcome {
        let canonical: Vec<String> = match index.find_by_label(label) {
            Some(entry) => entry.canonical.iter().cloned().collect(),
            // The checkpoint may carry labels the current index no longer
            // knows; fall back to the bare name.
            None => vec![label.to_string()],
        };

        let mut empty_rows: Option<Vec<CourseRow>> = None;
        let mut last_rejection: Option<AppError> = None;

        for canonical_name in &canonical {
            match self.source.fetch_rows(canonical_name, &self.progress).await {
                Ok(rows) if !rows.is_empty() => return FetchOutcome::Rows(rows),
                Ok(rows) => {
                    empty_rows.get_or_insert(rows);
                }
                Err(err) if err.is_permanent_remote() => {
                    last_rejection = Some(err);
                }
                Err(err) => return FetchOutcome::Failed(err),
            }
        }

        match (empty_rows, last_rejection) {
            (Some(rows), _) => FetchOutcome::Rows(rows),
            (None, Some(err)) => FetchOutcome::AllRejected(err),
            (None, None) => FetchOutcome::AllRejected(AppError::NotFound(format!(
                "no canonical name resolved for {}",
                label
            ))),
        }
    }

    /// Artifact write + mirror + checkpoint update for one fetched group.
    async fn complete_group(
        &self,
        checkpoint: &mut Checkpoint,
        label: &str,
        rows: &[CourseRow],
    ) -> Result<(), AppError> {
        write_group_csv(self.layout, label, rows)?;

        if let Some(mirror) = self.mirror {
            mirror.replace_sheet(label, &rows_to_values(rows)).await?;
        }

        checkpoint.mark_done(label);
        self.store.save(checkpoint).await?;
        Ok(())
    }

    /// Builds the combined workbook and flat CSV from the per-group
    /// artifacts, in checkpoint group order. Skipped groups get no sheet.
    fn assemble_artifacts(&self, checkpoint: &Checkpoint) -> Result<(), AppError> {
        let mut groups: Vec<(String, Vec<CourseRow>)> = Vec::new();
        for label in &checkpoint.groups {
            if checkpoint.is_done(label) {
                let rows = read_group_csv(self.layout, label)?;
                groups.push((label.clone(), rows));
            }
        }

        write_workbook(self.layout, &groups)?;
        write_flat_csv(self.layout, &groups)?;
        info!("Assembled combined artifacts for {} groups", groups.len());
        Ok(())
    }
}

/// Collects rows for an ad-hoc single-group download, outside any
/// checkpointed run. Tries canonical names the same way the engine does.
pub async fn collect_group_once(
    source: &dyn GroupRowSource,
    index: &GroupIndex,
    label: &str,
    progress: &Progress,
) -> Result<Vec<CourseRow>, AppError> {
    let canonical: Vec<String> = match index.find_by_label(label) {
        Some(entry) => entry.canonical.iter().cloned().collect(),
        None => vec![label.to_string()],
    };

    let mut fallback: Option<Vec<CourseRow>> = None;
    let mut last_err: Option<AppError> = None;
    for canonical_name in &canonical {
        match source.fetch_rows(canonical_name, progress).await {
            Ok(rows) if !rows.is_empty() => return Ok(rows),
            Ok(rows) => {
                fallback.get_or_insert(rows);
            }
            Err(err) => last_err = Some(err),
        }
    }
    match (fallback, last_err) {
        (Some(rows), _) => Ok(rows),
        (None, Some(err)) => Err(err),
        (None, None) => Ok(Vec::new()),
    }
}
