//! Event-driven trigger loop for compilation jobs
//!
//! Callers send [`CompileCommand`]s to a background worker and receive
//! [`CompileUpdate`]s back. The worker feeds each finished batch's
//! follow-up trigger into its own command channel, so other commands can
//! interleave between batches.

mod worker;

pub use worker::worker_task;

use press_compile::{BatchTrigger, CompileRequest, JobId, Orchestrator, PageId};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Commands sent to the worker
#[derive(Debug)]
pub enum CompileCommand {
    Request(CompileRequest),
    Batch(BatchTrigger),
    Merge { job_id: JobId },
    /// Pick a job up from its persisted state
    Resume { job_id: JobId },
    Shutdown,
}

/// Updates sent from the worker
#[derive(Debug, Clone, PartialEq)]
pub enum CompileUpdate {
    Accepted {
        job_id: JobId,
        estimated_minutes: u64,
    },
    Cached {
        job_id: JobId,
        download_url: String,
    },
    Progress {
        job_id: JobId,
        pages_rendered: usize,
        total_pages: usize,
    },
    Completed {
        job_id: JobId,
        download_url: String,
        page_count: usize,
    },
    Failed {
        job_id: JobId,
        page_id: Option<PageId>,
        message: String,
    },
    Error {
        job_id: Option<JobId>,
        message: String,
    },
}

impl CompileUpdate {
    /// True for updates after which the job will not change again
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            CompileUpdate::Cached { .. }
                | CompileUpdate::Completed { .. }
                | CompileUpdate::Failed { .. }
        )
    }
}

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Compile worker has stopped")]
    WorkerStopped,
}

/// Sending side of a running worker
#[derive(Debug, Clone)]
pub struct CompileHandle {
    command_tx: mpsc::UnboundedSender<CompileCommand>,
}

impl CompileHandle {
    pub fn send(&self, command: CompileCommand) -> Result<(), RuntimeError> {
        self.command_tx
            .send(command)
            .map_err(|_| RuntimeError::WorkerStopped)
    }

    pub fn submit(&self, request: CompileRequest) -> Result<(), RuntimeError> {
        self.send(CompileCommand::Request(request))
    }

    pub fn resume(&self, job_id: JobId) -> Result<(), RuntimeError> {
        self.send(CompileCommand::Resume { job_id })
    }

    pub fn shutdown(&self) -> Result<(), RuntimeError> {
        self.send(CompileCommand::Shutdown)
    }
}

/// Spawn a worker on the current tokio runtime.
///
/// The worker runs until it receives [`CompileCommand::Shutdown`] or every
/// handle is dropped and its queue is empty.
pub fn spawn_worker(
    orchestrator: Arc<Orchestrator>,
) -> (
    CompileHandle,
    mpsc::UnboundedReceiver<CompileUpdate>,
    JoinHandle<()>,
) {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (update_tx, update_rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(worker_task(
        orchestrator,
        command_tx.downgrade(),
        command_rx,
        update_tx,
    ));
    (CompileHandle { command_tx }, update_rx, task)
}
