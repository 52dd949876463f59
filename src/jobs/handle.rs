use std::sync::mpsc::{Receiver, TryRecvError};
use std::thread::JoinHandle;

use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use super::{JobEvent, JobKind, JobSummary, Phase};
use crate::errors::{AppError, Result};

/// Latest state seen by the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatus {
    pub phase: Phase,
    pub fraction: f32,
    pub message: String,
    pub error: Option<String>,
}

/// Caller-side view of a running job.
///
/// Nothing here blocks except [`JobHandle::next_event`] and
/// [`JobHandle::wait`]; an interactive thread should stick to
/// [`JobHandle::poll`].
pub struct JobHandle {
    id: Uuid,
    kind: JobKind,
    events: Receiver<JobEvent>,
    worker: Option<JoinHandle<()>>,
    status: JobStatus,
    finished: bool,
}

impl JobHandle {
    pub(crate) fn new(id: Uuid, kind: JobKind, events: Receiver<JobEvent>, worker: JoinHandle<()>) -> Self {
        let initial = match kind {
            JobKind::Backup => Phase::Connecting,
            JobKind::Restore => Phase::Preparing,
        };
        JobHandle {
            id,
            kind,
            events,
            worker: Some(worker),
            status: JobStatus {
                phase: initial,
                fraction: 0.0,
                message: String::new(),
                error: None,
            },
            finished: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn status(&self) -> &JobStatus {
        &self.status
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Drains whatever events are already queued without blocking.
    pub fn poll(&mut self) -> Vec<JobEvent> {
        let mut drained = Vec::new();
        while !self.finished {
            match self.events.try_recv() {
                Ok(event) => {
                    self.observe(&event);
                    drained.push(event);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    drained.push(self.worker_vanished());
                    break;
                }
            }
        }
        drained
    }

    /// Blocks for the next event. `None` once the terminal event has been
    /// handed out.
    pub fn next_event(&mut self) -> Option<JobEvent> {
        if self.finished {
            return None;
        }
        let event = match self.events.recv() {
            Ok(event) => {
                self.observe(&event);
                event
            }
            Err(_) => self.worker_vanished(),
        };
        Some(event)
    }

    /// Blocks until the job reaches its terminal state and the worker thread
    /// has exited.
    pub fn wait(mut self) -> Result<JobSummary> {
        let mut outcome = Err(AppError::JobFailed("job produced no result".to_string()));
        while let Some(event) = self.next_event() {
            match event {
                JobEvent::Done(summary) => outcome = Ok(summary),
                JobEvent::Failed(message) => outcome = Err(AppError::JobFailed(message)),
                JobEvent::Progress(_) => {}
            }
        }
        outcome
    }

    fn observe(&mut self, event: &JobEvent) {
        match event {
            JobEvent::Progress(update) => {
                self.status.phase = update.phase;
                self.status.fraction = update.fraction;
                self.status.message = update.message.clone();
            }
            JobEvent::Done(_) => {
                self.status.phase = Phase::Done;
                self.status.fraction = 1.0;
                self.mark_finished();
            }
            JobEvent::Failed(message) => {
                self.status.phase = Phase::Failed;
                self.status.error = Some(message.clone());
                self.mark_finished();
            }
        }
    }

    /// The worker sends its terminal event as its last act, so joining here
    /// is at most a brief wait.
    fn mark_finished(&mut self) {
        self.finished = true;
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!(job = %self.id, "Worker thread panicked after reporting");
            }
        }
    }

    fn worker_vanished(&mut self) -> JobEvent {
        let event = JobEvent::Failed(format!("{} worker exited without reporting a result", self.kind));
        self.observe(&event);
        event
    }
}
