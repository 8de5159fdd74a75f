//! Run supervisor: starts the export task and implements the cooperative
//! watchdog restart.
//!
//! A budget stop ends the engine invocation cleanly; when auto-resume is
//! configured the supervisor immediately starts a fresh invocation, which
//! reloads the checkpoint and continues at the first pending group. Without
//! auto-resume the progress phase reports `needs_rerun` and an operator (or
//! an external timer calling the resume endpoint) restarts it.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::error::AppError;
use crate::export::engine::{ExportEngine, NotionRowSource, RunBudget, RunOutcome};
use crate::export::progress::RunPhase;
use crate::state::AppState;

/// Starts the background export task. `fresh` clears any existing
/// checkpoint first, so the run covers the full current group list.
pub async fn spawn_run(state: Arc<AppState>, fresh: bool) -> Result<(), AppError> {
    if !state.try_begin_run() {
        return Err(AppError::RunInProgress);
    }

    // Resolve the context before spawning so a broken configuration
    // surfaces in the HTTP response instead of a dead background task.
    let setup = async {
        if fresh {
            state.store.clear().await?;
        }
        state.group_context().await
    };
    let ctx = match setup.await {
        Ok(ctx) => ctx,
        Err(err) => {
            state.end_run();
            return Err(err);
        }
    };

    let task_state = state.clone();
    tokio::spawn(async move {
        run_loop(task_state, ctx).await;
    });

    Ok(())
}

async fn run_loop(state: Arc<AppState>, ctx: Arc<crate::export::GroupContext>) {
    let budget = RunBudget {
        time_budget: Duration::from_secs(state.config.watchdog_budget_secs),
        max_groups: state.config.max_groups_per_run,
    };

    loop {
        let source = NotionRowSource::new(
            state.notion.clone(),
            state.config.notion_database_id.clone(),
            (*ctx).clone(),
        );
        let engine = ExportEngine {
            source: &source,
            store: &state.store,
            mirror: state.mirror.as_ref(),
            layout: &state.layout,
            budget,
            progress: state.progress.clone(),
        };

        let result = engine
            .run(
                &ctx.index,
                &state.config.notion_database_id,
                &state.config.notion_property_name,
            )
            .await;

        match result {
            Ok(report) => match report.outcome {
                RunOutcome::Completed => {
                    info!(
                        "Export completed: {} processed, {} skipped",
                        report.processed.len(),
                        report.skipped.len()
                    );
                    state
                        .progress
                        .finish(RunPhase::Completed, Some("Export kész.".to_string()));
                    break;
                }
                RunOutcome::BudgetExceeded { remaining } if state.config.auto_resume => {
                    info!("Budget stop with {} groups remaining, auto-resuming", remaining);
                    state
                        .progress
                        .log(format!("Újraindítás, {} csoport van hátra…", remaining));
                    continue;
                }
                RunOutcome::BudgetExceeded { remaining } => {
                    info!("Budget stop with {} groups remaining", remaining);
                    state.progress.finish(
                        RunPhase::NeedsRerun,
                        Some(format!(
                            "Időkeret elérve, {} csoport van hátra. Indítsd újra a folytatáshoz.",
                            remaining
                        )),
                    );
                    break;
                }
                RunOutcome::Incomplete { remaining } => {
                    info!("Run incomplete: {} groups still pending", remaining);
                    state.progress.finish(
                        RunPhase::NeedsRerun,
                        Some(format!(
                            "{} csoport nem készült el. Indítsd újra a folytatáshoz.",
                            remaining
                        )),
                    );
                    break;
                }
            },
            Err(err) => {
                error!("Export run failed: {}", err);
                let presentation = err.to_presentation();
                state
                    .progress
                    .finish(RunPhase::Failed, Some(presentation.message));
                break;
            }
        }
    }

    state.end_run();
}
