use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;

use chrono::Local;
use tracing::{error, info};
use uuid::Uuid;

use super::{BackupJob, JobHandle, JobKind, RestoreJob};
use crate::backup;
use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use crate::gateway::{DataStore, PgDataStore};
use crate::restore;
use crate::runner::{ProcessRunner, ToolRunner};

/// Runs backups and restores off the caller's thread.
///
/// At most one job is in flight per orchestrator; starting another while one
/// runs fails with [`AppError::Busy`].
pub struct Orchestrator {
    config: Arc<AppConfig>,
    store: Arc<dyn DataStore>,
    runner: Arc<dyn ToolRunner>,
    in_flight: Arc<AtomicBool>,
}

impl Orchestrator {
    pub fn new(config: AppConfig, store: Arc<dyn DataStore>, runner: Arc<dyn ToolRunner>) -> Self {
        Orchestrator {
            config: Arc::new(config),
            store,
            runner,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// PostgreSQL datastore plus the configured client tools.
    pub fn postgres(config: AppConfig) -> Self {
        let store = Arc::new(PgDataStore::new(config.db.clone()));
        let runner = Arc::new(ProcessRunner::new(&config.dump_tool, &config.restore_tool));
        Orchestrator::new(config, store, runner)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Writes `property_manager_backup_<timestamp>.sql` into `target_directory`,
    /// creating the directory when needed.
    pub fn start_backup(&self, target_directory: impl Into<PathBuf>) -> Result<JobHandle> {
        let guard = InFlightGuard::acquire(&self.in_flight)?;
        let (tx, rx) = mpsc::channel();
        let file_name = backup::backup_file_name(Local::now().naive_local());
        let mut job = BackupJob::new(target_directory.into(), file_name, tx);
        info!(path = %job.output_path().display(), "Starting backup job");

        let config = Arc::clone(&self.config);
        let store = Arc::clone(&self.store);
        let runner = Arc::clone(&self.runner);
        self.spawn(JobKind::Backup, rx, move || {
            let outcome = run_to_completion(backup::run(&mut job, store.as_ref(), runner.as_ref(), &config.db));
            drop(guard);
            job.progress.finish(outcome);
        })
    }

    /// Replays `source_file` into the datastore after clearing existing rows.
    pub fn start_restore(&self, source_file: impl Into<PathBuf>) -> Result<JobHandle> {
        let guard = InFlightGuard::acquire(&self.in_flight)?;
        let (tx, rx) = mpsc::channel();
        let mut job = RestoreJob::new(source_file.into(), tx);
        info!(path = %job.source_file.display(), "Starting restore job");

        let config = Arc::clone(&self.config);
        let store = Arc::clone(&self.store);
        let runner = Arc::clone(&self.runner);
        self.spawn(JobKind::Restore, rx, move || {
            let outcome = run_to_completion(restore::run(&mut job, store.as_ref(), runner.as_ref(), &config.db));
            drop(guard);
            job.progress.finish(outcome);
        })
    }

    fn spawn(
        &self,
        kind: JobKind,
        events: mpsc::Receiver<super::JobEvent>,
        work: impl FnOnce() + Send + 'static,
    ) -> Result<JobHandle> {
        let id = Uuid::new_v4();
        let worker = thread::Builder::new()
            .name(format!("pm-{}-{}", kind, &id.simple().to_string()[..8]))
            .spawn(work)?;
        Ok(JobHandle::new(id, kind, events, worker))
    }
}

/// Drives one job future on a private runtime and folds every way it can go
/// wrong (error, runtime failure, panic) into a message.
fn run_to_completion<T, F>(future: F) -> std::result::Result<T, String>
where
    F: Future<Output = Result<T>>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("Failed to start job runtime: {}", e))?;

    match panic::catch_unwind(AssertUnwindSafe(|| runtime.block_on(future))) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            error!(error = %e, "Job failed");
            Err(e.to_string())
        }
        Err(payload) => {
            let detail = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(panic = %detail, "Job panicked");
            Err(format!("Job aborted unexpectedly: {}", detail))
        }
    }
}

/// Holds the single in-flight slot; released on drop, including when the
/// worker thread fails to spawn.
struct InFlightGuard {
    flag: Arc<AtomicBool>,
}

impl InFlightGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| AppError::Busy)?;
        Ok(InFlightGuard {
            flag: Arc::clone(flag),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
