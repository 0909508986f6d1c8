//! Job orchestration
//!
//! Every step persists the job before the next one may start, so a crash
//! between steps loses at most the work of one batch. Steps are driven by
//! [`BatchTrigger`]s from outside (a queue, the runtime worker, or
//! [`Orchestrator::run_to_completion`]).

use crate::config::CompileConfig;
use crate::fingerprint::{PageRef, content_hash};
use crate::fulfillment::{OrderOptions, PrintOrderRequest, build_order_request};
use crate::job::{CompilationJob, FailureStage, JobId, JobStatus};
use crate::merge::{BookMetadata, merge_book_async};
use crate::preflight::{PreflightReport, check_page};
use crate::provider::PageContentProvider;
use crate::render::{PageRenderer, Rasterizer, RenderGeometry};
use crate::repository::JobRepository;
use crate::signing::TokenIssuer;
use crate::store::{ArtifactStore, CommittedBook, ObjectMetadata, ObjectStore};
use crate::types::*;
use bytes::Bytes;
use chrono::Utc;
use press_layout::{LayoutSpec, TrimSize};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Caller's compile request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileRequest {
    pub collection_id: String,
    pub trim_size: String,
    /// Explicit page order; all pages of the collection when absent
    #[serde(default)]
    pub page_ids: Option<Vec<String>>,
    #[serde(default)]
    pub force_recompile: bool,
    /// Proceed despite critical pre-flight violations
    #[serde(default)]
    pub acknowledge_warnings: bool,
}

impl CompileRequest {
    pub fn new(collection_id: impl Into<String>, trim_size: impl Into<String>) -> Self {
        Self {
            collection_id: collection_id.into(),
            trim_size: trim_size.into(),
            ..Default::default()
        }
    }
}

/// Work item for one batch of one job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchTrigger {
    pub job_id: JobId,
    pub batch_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum CompileResponse {
    Accepted {
        job_id: JobId,
        estimated_minutes: u64,
        trigger: BatchTrigger,
    },
    Cached {
        job_id: JobId,
        download_url: String,
    },
}

impl CompileResponse {
    pub fn http_status(&self) -> u16 {
        match self {
            CompileResponse::Accepted { .. } => 202,
            CompileResponse::Cached { .. } => 200,
        }
    }

    pub fn job_id(&self) -> JobId {
        match self {
            CompileResponse::Accepted { job_id, .. } | CompileResponse::Cached { job_id, .. } => {
                *job_id
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    /// Batch done; this trigger runs the next one
    Next(BatchTrigger),
    /// Last batch done; the job is waiting for [`Orchestrator::merge_job`]
    ReadyToMerge(JobId),
    /// A page exhausted its retries and the job is now failed
    Failed {
        job_id: JobId,
        page_id: PageId,
        message: String,
    },
    /// Stale or duplicate trigger, or another writer advanced the job first
    Skipped,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    Complete {
        job_id: JobId,
        artifact_key: String,
        download_url: String,
        page_count: usize,
    },
    Failed {
        job_id: JobId,
        message: String,
    },
    Skipped,
}

pub struct Orchestrator {
    config: CompileConfig,
    store: ArtifactStore,
    jobs: Arc<dyn JobRepository>,
    provider: Arc<dyn PageContentProvider>,
    renderer: PageRenderer,
}

impl Orchestrator {
    pub fn new(
        config: CompileConfig,
        backend: Arc<dyn ObjectStore>,
        jobs: Arc<dyn JobRepository>,
        provider: Arc<dyn PageContentProvider>,
        rasterizer: Arc<dyn Rasterizer>,
    ) -> Result<Self> {
        config.validate()?;
        let store = ArtifactStore::new(backend);
        let tokens = TokenIssuer::new(&config.signing_secret, config.capability_token_ttl());
        let renderer = PageRenderer::new(rasterizer, store.clone(), tokens, config.retry.clone());
        Ok(Self {
            config,
            store,
            jobs,
            provider,
            renderer,
        })
    }

    pub fn config(&self) -> &CompileConfig {
        &self.config
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Validate a request and either answer from cache or create a job
    /// ready for its first batch.
    pub async fn request_compile(&self, request: CompileRequest) -> Result<CompileResponse> {
        let trim_size = TrimSize::from_key(&request.trim_size)?;
        let collection_id = CollectionId::new(request.collection_id);

        let page_ids = match request.page_ids {
            Some(ids) => ids.into_iter().map(PageId::new).collect(),
            None => self.provider.list_pages(&collection_id).await?,
        };
        if page_ids.is_empty() {
            return Err(CompileError::InvalidRequest(format!(
                "collection {collection_id} has no pages to compile"
            )));
        }

        let mut pages = Vec::with_capacity(page_ids.len());
        for page_id in page_ids {
            let version = self.provider.version_marker(&collection_id, &page_id).await?;
            pages.push(PageRef { page_id, version });
        }

        let layout = trim_size.layout(self.config.include_bleed, pages.len());
        let report = self.preflight(&collection_id, &layout, &pages).await?;
        if self.config.enforce_preflight {
            report.enforce(request.acknowledge_warnings)?;
        }
        if !report.violations.is_empty() {
            log::info!(
                "Pre-flight for {collection_id}: {} critical, {} warning(s)",
                report.critical().count(),
                report.warnings().count()
            );
        }

        let fingerprint = content_hash(&collection_id, &pages, trim_size);

        if !request.force_recompile {
            if let Some(job) = self.cached_job(&fingerprint, trim_size).await? {
                match self
                    .store
                    .signed_url(&job.storage_key(), self.config.download_url_ttl())
                    .await
                {
                    Ok(download_url) => {
                        log::debug!("Cache hit for {collection_id}: job {}", job.id);
                        return Ok(CompileResponse::Cached {
                            job_id: job.id,
                            download_url,
                        });
                    }
                    Err(CompileError::NotFound(key)) => {
                        log::warn!("Cached job {} lost its artifact {key}; recompiling", job.id);
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        let owner_name = self.provider.owner_name(&collection_id).await?;
        let job = CompilationJob::new(
            collection_id,
            owner_name,
            trim_size,
            self.config.include_bleed,
            pages,
            fingerprint,
        );
        self.jobs.insert(&job).await?;

        let rendering = job.transition(JobStatus::Rendering {
            current_batch: 0,
            pages_rendered: 0,
        })?;
        self.save(&job, &rendering).await?;
        log::info!(
            "Job {} accepted: {} pages at {}",
            rendering.id,
            rendering.page_count(),
            trim_size
        );

        Ok(CompileResponse::Accepted {
            job_id: rendering.id,
            estimated_minutes: self.config.estimated_minutes(rendering.page_count()),
            trigger: BatchTrigger {
                job_id: rendering.id,
                batch_index: 0,
            },
        })
    }

    /// Render one batch. Safe to deliver the same trigger more than once.
    pub async fn process_batch(&self, trigger: BatchTrigger) -> Result<BatchOutcome> {
        let job = self.job(&trigger.job_id).await?;
        let pages_rendered = match job.status {
            JobStatus::Rendering {
                current_batch,
                pages_rendered,
            } if current_batch == trigger.batch_index => pages_rendered,
            _ => {
                log::debug!(
                    "Skipping trigger for job {} batch {}: job is {}",
                    job.id,
                    trigger.batch_index,
                    job.status.name()
                );
                return Ok(BatchOutcome::Skipped);
            }
        };

        let batch_size = self.config.batch_size;
        let geometry = RenderGeometry::from(&self.layout_for(&job));
        let batch = job.batch_pages(trigger.batch_index, batch_size);

        for page in batch {
            match self.renderer.render(page, &job.collection_id, &geometry).await {
                Ok(_) => {}
                Err(CompileError::RenderFailed { page_id, cause }) => {
                    let message = format!("Failed to render page {page_id}: {cause}");
                    let failed = job.transition(JobStatus::Failed {
                        stage: FailureStage::Render,
                        failed_page_id: Some(page_id.clone()),
                        message: message.clone(),
                    })?;
                    if !self.jobs.compare_and_swap(job.revision, &failed).await? {
                        return Ok(BatchOutcome::Skipped);
                    }
                    log::error!("Job {} failed: {message}", job.id);
                    return Ok(BatchOutcome::Failed {
                        job_id: job.id,
                        page_id,
                        message,
                    });
                }
                Err(e) => return Err(e),
            }
        }

        let pages_rendered = pages_rendered + batch.len();
        let next_batch = trigger.batch_index + 1;
        let next = if next_batch < job.batch_count(batch_size) {
            JobStatus::Rendering {
                current_batch: next_batch,
                pages_rendered,
            }
        } else {
            JobStatus::Merging { pages_rendered }
        };

        let updated = job.transition(next)?;
        if !self.jobs.compare_and_swap(job.revision, &updated).await? {
            log::debug!(
                "Job {} batch {} already advanced by another worker",
                job.id,
                trigger.batch_index
            );
            return Ok(BatchOutcome::Skipped);
        }
        log::info!(
            "Job {}: batch {} done ({}/{} pages), now {}",
            job.id,
            trigger.batch_index,
            pages_rendered,
            job.page_count(),
            updated.status.name()
        );

        Ok(match updated.status {
            JobStatus::Merging { .. } => BatchOutcome::ReadyToMerge(job.id),
            _ => BatchOutcome::Next(BatchTrigger {
                job_id: job.id,
                batch_index: next_batch,
            }),
        })
    }

    /// Merge the rendered fragments and publish the book. Any error fails
    /// the job at the merge stage; errors other than a bad merge also
    /// propagate.
    pub async fn merge_job(&self, job_id: &JobId) -> Result<MergeOutcome> {
        let job = self.job(job_id).await?;
        if !matches!(job.status, JobStatus::Merging { .. }) {
            log::debug!("Skipping merge for job {job_id}: job is {}", job.status.name());
            return Ok(MergeOutcome::Skipped);
        }

        match self.publish_book(&job).await {
            Ok(outcome) => Ok(outcome),
            Err(e @ CompileError::MergeFailed(_)) => self.fail_merge(&job, e.to_string()).await,
            Err(e) => {
                self.fail_merge(&job, format!("Merge failed: {e}")).await?;
                Err(e)
            }
        }
    }

    async fn publish_book(&self, job: &CompilationJob) -> Result<MergeOutcome> {
        let artifact_key = job.storage_key();
        let book = match self.store.committed_book(&artifact_key, &job.id).await? {
            Some(book) => {
                log::info!("Job {}: book already committed at {artifact_key}", job.id);
                book
            }
            None => self.merge_and_commit(job, &artifact_key).await?,
        };

        let ttl = self.config.download_url_ttl();
        let download_url = self.store.signed_url(&artifact_key, ttl).await?;
        let url_expires_at = Utc::now() + chrono::Duration::seconds(ttl.as_secs() as i64);

        let complete = job.transition(JobStatus::Complete {
            artifact_key: artifact_key.clone(),
            size_bytes: book.size_bytes,
            page_count: book.page_count,
            download_url: download_url.clone(),
            url_expires_at,
        })?;
        if !self.jobs.compare_and_swap(job.revision, &complete).await? {
            return Ok(MergeOutcome::Skipped);
        }
        log::info!(
            "Job {} complete: {} pages, {} bytes at {}",
            job.id,
            book.page_count,
            book.size_bytes,
            artifact_key
        );

        Ok(MergeOutcome::Complete {
            job_id: job.id,
            artifact_key,
            download_url,
            page_count: book.page_count,
        })
    }

    async fn merge_and_commit(
        &self,
        job: &CompilationJob,
        artifact_key: &str,
    ) -> Result<CommittedBook> {
        let fragments = self.store.load_page_artifacts(&job.pages).await?;
        let metadata = BookMetadata {
            title: format!("{}'s book", job.owner_name),
            owner_name: job.owner_name.clone(),
            job_id: job.id.to_string(),
            trim_size: job.trim_size,
            page_ids: job.pages.iter().map(|p| p.page_id.clone()).collect(),
            created_at: Utc::now(),
        };

        let book = merge_book_async(fragments, metadata).await?;
        if book.blank_added {
            log::debug!(
                "Job {}: appended blank page after {} content pages",
                job.id,
                book.content_pages
            );
        }

        let committed = CommittedBook {
            size_bytes: book.bytes.len() as u64,
            page_count: book.page_count,
        };
        let object_metadata = ObjectMetadata::pdf()
            .with_attribute("job_id", job.id.to_string())
            .with_attribute("fingerprint", job.fingerprint.as_str())
            .with_attribute("page_count", committed.page_count.to_string())
            .with_attribute("size_bytes", committed.size_bytes.to_string());
        self.store
            .commit_book(artifact_key, Bytes::from(book.bytes), object_metadata)
            .await?;
        Ok(committed)
    }

    /// Drive a job from `trigger` until it completes, fails, or another
    /// worker takes over
    pub async fn run_to_completion(&self, trigger: BatchTrigger) -> Result<CompilationJob> {
        let mut trigger = trigger;
        loop {
            match self.process_batch(trigger).await? {
                BatchOutcome::Next(next) => trigger = next,
                BatchOutcome::ReadyToMerge(job_id) => {
                    self.merge_job(&job_id).await?;
                    break;
                }
                BatchOutcome::Failed { .. } | BatchOutcome::Skipped => break,
            }
        }
        self.job(&trigger.job_id).await
    }

    /// Move a pending job to its first batch. `None` when the job is no
    /// longer pending, e.g. another writer started it first.
    pub async fn start_job(&self, job_id: &JobId) -> Result<Option<BatchTrigger>> {
        let job = self.job(job_id).await?;
        if job.status != JobStatus::Pending {
            return Ok(None);
        }
        let rendering = job.transition(JobStatus::Rendering {
            current_batch: 0,
            pages_rendered: 0,
        })?;
        if !self.jobs.compare_and_swap(job.revision, &rendering).await? {
            return Ok(None);
        }
        Ok(Some(BatchTrigger {
            job_id: *job_id,
            batch_index: 0,
        }))
    }

    /// Continue a job from wherever its persisted state left off
    pub async fn resume(&self, job_id: &JobId) -> Result<CompilationJob> {
        let job = self.job(job_id).await?;
        match job.status {
            JobStatus::Pending => {
                log::info!("Starting job {job_id} left pending");
                match self.start_job(job_id).await? {
                    Some(trigger) => self.run_to_completion(trigger).await,
                    None => self.job(job_id).await,
                }
            }
            JobStatus::Rendering { current_batch, .. } => {
                log::info!("Resuming job {job_id} at batch {current_batch}");
                self.run_to_completion(BatchTrigger {
                    job_id: *job_id,
                    batch_index: current_batch,
                })
                .await
            }
            JobStatus::Merging { .. } => {
                log::info!("Resuming job {job_id} at merge");
                self.merge_job(job_id).await?;
                self.job(job_id).await
            }
            _ => Ok(job),
        }
    }

    pub async fn job(&self, job_id: &JobId) -> Result<CompilationJob> {
        self.jobs
            .get(job_id)
            .await?
            .ok_or(CompileError::JobNotFound(*job_id))
    }

    /// Fresh short-lived download URL for a complete job
    pub async fn download_url(&self, job_id: &JobId) -> Result<String> {
        let job = self.complete_job(job_id).await?;
        self.store
            .signed_url(&job.storage_key(), self.config.download_url_ttl())
            .await
    }

    /// Long-lived URL for the fulfillment partner's queue
    pub async fn fulfillment_url(&self, job_id: &JobId) -> Result<String> {
        let job = self.complete_job(job_id).await?;
        self.store
            .signed_url(&job.storage_key(), self.config.fulfillment_url_ttl())
            .await
    }

    /// Build the partner order for a complete job. Both the interior and the
    /// cover URL use the fulfillment TTL.
    pub async fn prepare_print_order(
        &self,
        job_id: &JobId,
        options: &OrderOptions,
    ) -> Result<PrintOrderRequest> {
        let job = self.complete_job(job_id).await?;
        let ttl = self.config.fulfillment_url_ttl();
        let interior_url = self.store.signed_url(&job.storage_key(), ttl).await?;
        let cover_url = self.store.signed_url(&options.cover_key, ttl).await?;
        build_order_request(&job, options, interior_url, cover_url)
    }

    async fn preflight(
        &self,
        collection_id: &CollectionId,
        layout: &LayoutSpec,
        pages: &[PageRef],
    ) -> Result<PreflightReport> {
        let mut report = PreflightReport::default();
        for page in pages {
            let elements = self.provider.elements(collection_id, &page.page_id).await?;
            report
                .violations
                .extend(check_page(layout, &page.page_id, &elements));
        }
        Ok(report)
    }

    async fn cached_job(
        &self,
        fingerprint: &crate::fingerprint::ContentFingerprint,
        trim_size: TrimSize,
    ) -> Result<Option<CompilationJob>> {
        self.jobs
            .find_complete(fingerprint, trim_size, self.config.include_bleed)
            .await
    }

    async fn complete_job(&self, job_id: &JobId) -> Result<CompilationJob> {
        let job = self.job(job_id).await?;
        if !matches!(job.status, JobStatus::Complete { .. }) {
            return Err(CompileError::InvalidRequest(format!(
                "job {job_id} is {}, not complete",
                job.status.name()
            )));
        }
        Ok(job)
    }

    fn layout_for(&self, job: &CompilationJob) -> LayoutSpec {
        job.trim_size.layout(job.include_bleed, job.page_count())
    }

    async fn save(&self, previous: &CompilationJob, next: &CompilationJob) -> Result<()> {
        if !self.jobs.compare_and_swap(previous.revision, next).await? {
            return Err(CompileError::Repository(format!(
                "job {} was modified concurrently",
                next.id
            )));
        }
        Ok(())
    }

    async fn fail_merge(&self, job: &CompilationJob, message: String) -> Result<MergeOutcome> {
        let failed = job.transition(JobStatus::Failed {
            stage: FailureStage::Merge,
            failed_page_id: None,
            message: message.clone(),
        })?;
        if !self.jobs.compare_and_swap(job.revision, &failed).await? {
            return Ok(MergeOutcome::Skipped);
        }
        log::error!("Job {} failed: {message}", job.id);
        Ok(MergeOutcome::Failed {
            job_id: job.id,
            message,
        })
    }
}
