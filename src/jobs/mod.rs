//! Backup and restore jobs.
//!
//! A job runs on its own worker thread and talks to the caller only through
//! a channel of [`JobEvent`]s: a series of progress updates with
//! non-decreasing fractions, then exactly one terminal `Done` or `Failed`.

mod handle;
mod orchestrator;

use std::fmt;
use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::gateway::TableCount;

pub use handle::{JobHandle, JobStatus};
pub use orchestrator::Orchestrator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobKind {
    Backup,
    Restore,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Backup => write!(f, "backup"),
            JobKind::Restore => write!(f, "restore"),
        }
    }
}

/// Backups go Connecting → Exporting; restores go Preparing → ClearingData →
/// Restoring. Both end in Done or Failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Connecting,
    Exporting,
    Preparing,
    ClearingData,
    Restoring,
    Done,
    Failed,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Done | Phase::Failed)
    }
}

/// How a job got its work done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Strategy {
    ExternalTool,
    ManualSql,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::ExternalTool => write!(f, "external tool"),
            Strategy::ManualSql => write!(f, "manual SQL"),
        }
    }
}

/// Tried in order; the next one only runs when the previous returned an error.
pub const STRATEGIES: [Strategy; 2] = [Strategy::ExternalTool, Strategy::ManualSql];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressUpdate {
    pub phase: Phase,
    pub message: String,
    pub fraction: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSummary {
    pub kind: JobKind,
    /// Backup file written, or dump file replayed.
    pub path: PathBuf,
    pub strategy: Strategy,
    /// Rows per table: exported rows for a manual backup, verified rows after a restore.
    pub tables: Vec<TableCount>,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    Progress(ProgressUpdate),
    Done(JobSummary),
    Failed(String),
}

impl JobEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobEvent::Progress(_))
    }
}

/// Worker-side progress state. Keeps fractions monotonic and makes sure the
/// terminal event is the last thing sent.
pub(crate) struct Progress {
    phase: Phase,
    fraction: f32,
    error: Option<String>,
    events: Sender<JobEvent>,
}

impl Progress {
    fn new(initial: Phase, events: Sender<JobEvent>) -> Self {
        Progress {
            phase: initial,
            fraction: 0.0,
            error: None,
            events,
        }
    }

    pub(crate) fn advance(&mut self, phase: Phase, fraction: f32, message: impl Into<String>) {
        self.phase = phase;
        self.fraction = self.fraction.max(fraction.clamp(0.0, 1.0));
        let update = ProgressUpdate {
            phase,
            message: message.into(),
            fraction: self.fraction,
        };
        debug!(phase = ?update.phase, fraction = update.fraction, message = %update.message, "Job progress");
        // A dropped receiver only means nobody is watching any more.
        let _ = self.events.send(JobEvent::Progress(update));
    }

    pub(crate) fn finish(&mut self, outcome: std::result::Result<JobSummary, String>) {
        let event = match outcome {
            Ok(summary) => {
                self.phase = Phase::Done;
                JobEvent::Done(summary)
            }
            Err(message) => {
                self.phase = Phase::Failed;
                self.error = Some(message.clone());
                JobEvent::Failed(message)
            }
        };
        let _ = self.events.send(event);
    }
}

/// Task-owned state of one backup.
pub struct BackupJob {
    pub target_directory: PathBuf,
    pub file_name: String,
    pub(crate) progress: Progress,
}

impl BackupJob {
    pub(crate) fn new(target_directory: PathBuf, file_name: String, events: Sender<JobEvent>) -> Self {
        BackupJob {
            target_directory,
            file_name,
            progress: Progress::new(Phase::Connecting, events),
        }
    }

    pub fn output_path(&self) -> PathBuf {
        self.target_directory.join(&self.file_name)
    }

    pub fn phase(&self) -> Phase {
        self.progress.phase
    }

    pub fn error_detail(&self) -> Option<&str> {
        self.progress.error.as_deref()
    }
}

/// Task-owned state of one restore.
pub struct RestoreJob {
    pub source_file: PathBuf,
    pub(crate) progress: Progress,
}

impl RestoreJob {
    pub(crate) fn new(source_file: PathBuf, events: Sender<JobEvent>) -> Self {
        RestoreJob {
            source_file,
            progress: Progress::new(Phase::Preparing, events),
        }
    }

    pub fn phase(&self) -> Phase {
        self.progress.phase
    }

    pub fn error_detail(&self) -> Option<&str> {
        self.progress.error.as_deref()
    }
}
