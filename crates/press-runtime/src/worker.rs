use crate::{CompileCommand, CompileUpdate};
use press_compile::{
    BatchOutcome, BatchTrigger, CompileResponse, JobId, JobStatus, MergeOutcome, Orchestrator,
};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Async worker task that drives compilation jobs and sends updates.
///
/// Follow-up triggers go back through `command_tx`. Once every external
/// sender is gone they are kept in a local backlog instead, so jobs already
/// in flight still finish.
pub async fn worker_task(
    orchestrator: Arc<Orchestrator>,
    command_tx: mpsc::WeakUnboundedSender<CompileCommand>,
    mut command_rx: mpsc::UnboundedReceiver<CompileCommand>,
    update_tx: mpsc::UnboundedSender<CompileUpdate>,
) {
    let mut worker = Worker {
        orchestrator,
        command_tx,
        update_tx,
        backlog: VecDeque::new(),
    };

    loop {
        let cmd = match worker.backlog.pop_front() {
            Some(cmd) => cmd,
            None => match command_rx.recv().await {
                Some(cmd) => cmd,
                None => break,
            },
        };
        if let CompileCommand::Shutdown = cmd {
            log::info!("Compile worker shutting down");
            break;
        }
        worker.process_command(cmd).await;
    }
}

struct Worker {
    orchestrator: Arc<Orchestrator>,
    command_tx: mpsc::WeakUnboundedSender<CompileCommand>,
    update_tx: mpsc::UnboundedSender<CompileUpdate>,
    backlog: VecDeque<CompileCommand>,
}

impl Worker {
    async fn process_command(&mut self, cmd: CompileCommand) {
        match cmd {
            CompileCommand::Request(request) => self.handle_request(request).await,
            CompileCommand::Batch(trigger) => self.handle_batch(trigger).await,
            CompileCommand::Merge { job_id } => self.handle_merge(job_id).await,
            CompileCommand::Resume { job_id } => self.handle_resume(job_id).await,
            CompileCommand::Shutdown => {}
        }
    }

    async fn handle_request(&mut self, request: press_compile::CompileRequest) {
        match self.orchestrator.request_compile(request).await {
            Ok(CompileResponse::Accepted {
                job_id,
                estimated_minutes,
                trigger,
            }) => {
                self.update(CompileUpdate::Accepted {
                    job_id,
                    estimated_minutes,
                });
                self.enqueue(CompileCommand::Batch(trigger));
            }
            Ok(CompileResponse::Cached {
                job_id,
                download_url,
            }) => self.update(CompileUpdate::Cached {
                job_id,
                download_url,
            }),
            Err(e) => self.update(CompileUpdate::Error {
                job_id: None,
                message: e.to_string(),
            }),
        }
    }

    async fn handle_batch(&mut self, trigger: BatchTrigger) {
        match self.orchestrator.process_batch(trigger).await {
            Ok(BatchOutcome::Next(next)) => {
                self.report_progress(trigger.job_id).await;
                self.enqueue(CompileCommand::Batch(next));
            }
            Ok(BatchOutcome::ReadyToMerge(job_id)) => {
                self.report_progress(job_id).await;
                self.enqueue(CompileCommand::Merge { job_id });
            }
            Ok(BatchOutcome::Failed {
                job_id,
                page_id,
                message,
            }) => self.update(CompileUpdate::Failed {
                job_id,
                page_id: Some(page_id),
                message,
            }),
            Ok(BatchOutcome::Skipped) => {
                log::debug!(
                    "Trigger for job {} batch {} skipped",
                    trigger.job_id,
                    trigger.batch_index
                );
            }
            // The job stays at its batch boundary; a later resume continues it
            Err(e) => self.update(CompileUpdate::Error {
                job_id: Some(trigger.job_id),
                message: e.to_string(),
            }),
        }
    }

    async fn handle_merge(&mut self, job_id: JobId) {
        match self.orchestrator.merge_job(&job_id).await {
            Ok(MergeOutcome::Complete {
                job_id,
                download_url,
                page_count,
                ..
            }) => self.update(CompileUpdate::Completed {
                job_id,
                download_url,
                page_count,
            }),
            Ok(MergeOutcome::Failed { job_id, message }) => self.update(CompileUpdate::Failed {
                job_id,
                page_id: None,
                message,
            }),
            Ok(MergeOutcome::Skipped) => log::debug!("Merge for job {job_id} skipped"),
            Err(e) => self.update(CompileUpdate::Error {
                job_id: Some(job_id),
                message: e.to_string(),
            }),
        }
    }

    async fn handle_resume(&mut self, job_id: JobId) {
        let job = match self.orchestrator.job(&job_id).await {
            Ok(job) => job,
            Err(e) => {
                self.update(CompileUpdate::Error {
                    job_id: Some(job_id),
                    message: e.to_string(),
                });
                return;
            }
        };

        match job.status {
            JobStatus::Rendering { current_batch, .. } => {
                self.enqueue(CompileCommand::Batch(BatchTrigger {
                    job_id,
                    batch_index: current_batch,
                }));
            }
            JobStatus::Merging { .. } => self.enqueue(CompileCommand::Merge { job_id }),
            JobStatus::Complete { page_count, .. } => {
                // The stored URL may have expired; hand out a fresh one
                match self.orchestrator.download_url(&job_id).await {
                    Ok(download_url) => self.update(CompileUpdate::Completed {
                        job_id,
                        download_url,
                        page_count,
                    }),
                    Err(e) => self.update(CompileUpdate::Error {
                        job_id: Some(job_id),
                        message: e.to_string(),
                    }),
                }
            }
            JobStatus::Failed {
                failed_page_id,
                message,
                ..
            } => self.update(CompileUpdate::Failed {
                job_id,
                page_id: failed_page_id,
                message,
            }),
            JobStatus::Pending => match self.orchestrator.start_job(&job_id).await {
                Ok(Some(trigger)) => self.enqueue(CompileCommand::Batch(trigger)),
                // Someone else moved it on; look again
                Ok(None) => self.enqueue(CompileCommand::Resume { job_id }),
                Err(e) => self.update(CompileUpdate::Error {
                    job_id: Some(job_id),
                    message: e.to_string(),
                }),
            },
        }
    }

    async fn report_progress(&self, job_id: JobId) {
        match self.orchestrator.job(&job_id).await {
            Ok(job) => self.update(CompileUpdate::Progress {
                job_id,
                pages_rendered: job.pages_rendered(),
                total_pages: job.page_count(),
            }),
            Err(e) => log::warn!("Could not read progress for job {job_id}: {e}"),
        }
    }

    fn enqueue(&mut self, cmd: CompileCommand) {
        let cmd = match self.command_tx.upgrade() {
            Some(tx) => match tx.send(cmd) {
                Ok(()) => return,
                Err(mpsc::error::SendError(cmd)) => cmd,
            },
            None => cmd,
        };
        self.backlog.push_back(cmd);
    }

    fn update(&self, update: CompileUpdate) {
        // Nobody listening is fine; the job record is the source of truth
        let _ = self.update_tx.send(update);
    }
}
