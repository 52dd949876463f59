pub mod export;
pub mod listing;

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::Path;
use std::time::Instant;

use chrono::NaiveDateTime;
use tracing::{info, warn};

use crate::config::DbConfig;
use crate::errors::{AppError, Result};
use crate::gateway::{DataStore, Session, TableCount};
use crate::jobs::{BackupJob, JobKind, JobSummary, Phase, Progress, STRATEGIES, Strategy};
use crate::runner::ToolRunner;

pub use listing::{BackupEntry, list_backups};

pub const BACKUP_FILE_PREFIX: &str = "property_manager_backup_";
pub const BACKUP_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

const EXPORT_START: f32 = 0.3;
const MAX_NAME_ATTEMPTS: u32 = 100;
/// First line of a manual export; keeps the file non-empty for an empty database.
const EXPORT_HEADER: &str = "-- property_manager data export";

pub fn backup_file_name(timestamp: NaiveDateTime) -> String {
    format!("{}{}.sql", BACKUP_FILE_PREFIX, timestamp.format(BACKUP_TIMESTAMP_FORMAT))
}

/// Body of a backup job: connect, then try each strategy in turn.
///
/// The output file is not removed on failure; only a job that reached
/// `Done` produced a trustworthy backup.
pub(crate) async fn run(
    job: &mut BackupJob,
    store: &dyn DataStore,
    runner: &dyn ToolRunner,
    db: &DbConfig,
) -> Result<JobSummary> {
    let started = Instant::now();
    job.progress.advance(
        Phase::Connecting,
        0.1,
        format!("Connecting to {}", db.redacted_url()),
    );

    fs::create_dir_all(&job.target_directory).map_err(|e| {
        AppError::Backup(format!(
            "Cannot create backup directory {}: {}",
            job.target_directory.display(),
            e
        ))
    })?;

    let mut session = store.acquire().await?;
    let outcome = run_strategies(job, session.as_mut(), runner, db).await;
    if let Err(e) = session.close().await {
        warn!(error = %e, "Failed to close database connection cleanly");
    }
    let (strategy, tables) = outcome?;

    job.progress.advance(Phase::Exporting, 1.0, "Backup complete");
    info!(path = %job.output_path().display(), strategy = %strategy, "Backup finished");

    Ok(JobSummary {
        kind: JobKind::Backup,
        path: job.output_path(),
        strategy,
        tables,
        elapsed: started.elapsed(),
    })
}

/// Claims the output file with `create_new`, moving to `<stem>_2.sql`,
/// `<stem>_3.sql`, ... when a backup from the same second already exists.
fn reserve_output_file(job: &mut BackupJob) -> Result<()> {
    let stem = job
        .file_name
        .strip_suffix(".sql")
        .unwrap_or(job.file_name.as_str())
        .to_string();

    for attempt in 1..=MAX_NAME_ATTEMPTS {
        let candidate = if attempt == 1 {
            format!("{}.sql", stem)
        } else {
            format!("{}_{}.sql", stem, attempt)
        };
        let path = job.target_directory.join(&candidate);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => {
                job.file_name = candidate;
                return Ok(());
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => {
                return Err(AppError::Backup(format!(
                    "Cannot create backup file {}: {}",
                    path.display(),
                    e
                )));
            }
        }
    }

    Err(AppError::Backup(format!(
        "No free backup file name for {} in {}",
        stem,
        job.target_directory.display()
    )))
}

async fn run_strategies(
    job: &mut BackupJob,
    session: &mut dyn Session,
    runner: &dyn ToolRunner,
    db: &DbConfig,
) -> Result<(Strategy, Vec<TableCount>)> {
    reserve_output_file(job)?;
    let output = job.output_path();
    let mut last_error = None;

    for strategy in STRATEGIES {
        let attempt = match strategy {
            Strategy::ExternalTool => {
                job.progress.advance(Phase::Exporting, EXPORT_START, "Dumping database with external tool");
                dump_with_tool(runner, db, &output).map(|()| Vec::new())
            }
            Strategy::ManualSql => {
                job.progress.advance(Phase::Exporting, EXPORT_START, "Exporting tables as SQL");
                export_manually(&mut job.progress, session, &output).await
            }
        };

        match attempt {
            Ok(tables) => return Ok((strategy, tables)),
            Err(e) => {
                warn!(strategy = %strategy, error = %e, "Backup strategy failed");
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| AppError::Backup("no backup strategy available".to_string())))
}

fn dump_with_tool(runner: &dyn ToolRunner, db: &DbConfig, output: &Path) -> Result<()> {
    match runner.run_dump(db, output)? {
        0 => Ok(()),
        code => Err(AppError::ToolExit {
            tool: "dump tool".to_string(),
            code,
        }),
    }
}

async fn export_manually(
    progress: &mut Progress,
    session: &mut dyn Session,
    output: &Path,
) -> Result<Vec<TableCount>> {
    let file = File::create(output).map_err(|e| {
        AppError::Backup(format!("Cannot write backup file {}: {}", output.display(), e))
    })?;
    let mut writer = BufWriter::new(file);
    writeln!(writer, "{}\n", EXPORT_HEADER)?;

    export::export_database(session, &mut writer, |done, total, count| {
        let fraction = EXPORT_START + (1.0 - EXPORT_START) * done as f32 / total as f32;
        progress.advance(
            Phase::Exporting,
            fraction,
            format!("Exported {} ({} rows)", count.table, count.rows),
        );
    })
    .await
}
