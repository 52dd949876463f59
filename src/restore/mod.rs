pub mod import;
pub mod statements;
pub mod verification;

use std::fs::File;
use std::path::Path;
use std::time::Instant;

use tracing::{info, warn};

use crate::config::DbConfig;
use crate::errors::{AppError, Result};
use crate::gateway::{DataStore, Session, TableCount};
use crate::jobs::{JobKind, JobSummary, Phase, RestoreJob, STRATEGIES, Strategy};
use crate::runner::ToolRunner;

const RESTORE_START: f32 = 0.7;
/// Replay progress stops short of 1.0; sequences and verification come after.
const REPLAY_END: f32 = 0.95;

/// Body of a restore job: check the file, wipe existing rows, then try each
/// strategy in turn and count what landed.
pub(crate) async fn run(
    job: &mut RestoreJob,
    store: &dyn DataStore,
    runner: &dyn ToolRunner,
    db: &DbConfig,
) -> Result<JobSummary> {
    let started = Instant::now();
    job.progress.advance(
        Phase::Preparing,
        0.1,
        format!("Preparing restore from {}", job.source_file.display()),
    );
    ensure_readable(&job.source_file)?;

    let mut session = store.acquire().await?;
    let outcome = restore_into(job, session.as_mut(), runner, db).await;
    if let Err(e) = session.close().await {
        warn!(error = %e, "Failed to close database connection cleanly");
    }
    let (strategy, tables) = outcome?;

    job.progress.advance(Phase::Restoring, 1.0, "Restore complete");
    info!(path = %job.source_file.display(), strategy = %strategy, "Restore finished");

    Ok(JobSummary {
        kind: JobKind::Restore,
        path: job.source_file.clone(),
        strategy,
        tables,
        elapsed: started.elapsed(),
    })
}

fn ensure_readable(path: &Path) -> Result<()> {
    let metadata = path.metadata().map_err(|e| {
        AppError::Restore(format!("Restore file {} is not accessible: {}", path.display(), e))
    })?;
    if !metadata.is_file() {
        return Err(AppError::Restore(format!(
            "Restore source {} is not a regular file",
            path.display()
        )));
    }
    File::open(path).map_err(|e| {
        AppError::Restore(format!("Restore file {} is not readable: {}", path.display(), e))
    })?;
    Ok(())
}

async fn restore_into(
    job: &mut RestoreJob,
    session: &mut dyn Session,
    runner: &dyn ToolRunner,
    db: &DbConfig,
) -> Result<(Strategy, Vec<TableCount>)> {
    job.progress.advance(Phase::ClearingData, 0.3, "Clearing existing data");
    let tables = session.list_tables().await?;
    session.clear_tables(&tables).await?;
    info!(tables = tables.len(), "Cleared existing data");

    let strategy = run_strategies(job, session, runner, db, &tables).await?;
    let counts = verification::verify_restore(session).await?;
    Ok((strategy, counts))
}

async fn run_strategies(
    job: &mut RestoreJob,
    session: &mut dyn Session,
    runner: &dyn ToolRunner,
    db: &DbConfig,
    tables: &[String],
) -> Result<Strategy> {
    let mut last_error = None;

    for strategy in STRATEGIES {
        let attempt = match strategy {
            Strategy::ExternalTool => {
                job.progress.advance(Phase::Restoring, RESTORE_START, "Restoring with external tool");
                restore_with_tool(runner, db, &job.source_file)
            }
            Strategy::ManualSql => {
                job.progress.advance(Phase::Restoring, RESTORE_START, "Replaying SQL statements");
                if last_error.is_some() {
                    // A failed tool run may have inserted part of the file.
                    session.clear_tables(tables).await?;
                }
                replay_manually(job, session).await
            }
        };

        match attempt {
            Ok(()) => return Ok(strategy),
            Err(e) => {
                warn!(strategy = %strategy, error = %e, "Restore strategy failed");
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| AppError::Restore("no restore strategy available".to_string())))
}

fn restore_with_tool(runner: &dyn ToolRunner, db: &DbConfig, input: &Path) -> Result<()> {
    match runner.run_restore_tool(db, input)? {
        0 => Ok(()),
        code => Err(AppError::ToolExit {
            tool: "restore tool".to_string(),
            code,
        }),
    }
}

async fn replay_manually(job: &mut RestoreJob, session: &mut dyn Session) -> Result<()> {
    let progress = &mut job.progress;
    let executed = import::replay_file(session, &job.source_file, |done, total| {
        let fraction = RESTORE_START + (REPLAY_END - RESTORE_START) * done as f32 / total as f32;
        progress.advance(
            Phase::Restoring,
            fraction,
            format!("Executed statement {} of {}", done, total),
        );
    })
    .await?;

    let sequences = session.reset_sequences().await?;
    info!(statements = executed, sequences, "Manual restore applied");
    Ok(())
}
