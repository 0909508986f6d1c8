//! Job record persistence
//!
//! There is no lock service. Writers advance a job with
//! [`JobRepository::compare_and_swap`] on the record revision, so two
//! triggers racing on the same batch cannot both win.

mod fs;
mod memory;

pub use fs::FsJobRepository;
pub use memory::MemoryJobRepository;

use crate::fingerprint::ContentFingerprint;
use crate::job::{CompilationJob, JobId};
use crate::types::*;
use async_trait::async_trait;
use press_layout::TrimSize;

#[async_trait]
pub trait JobRepository: Send + Sync + 'static {
    /// Store a new job. Fails if the id is taken.
    async fn insert(&self, job: &CompilationJob) -> Result<()>;

    async fn get(&self, id: &JobId) -> Result<Option<CompilationJob>>;

    /// Replace the stored record with `job` if the stored revision still
    /// equals `expected_revision`. Returns `false` when another writer got
    /// there first.
    async fn compare_and_swap(&self, expected_revision: u64, job: &CompilationJob) -> Result<bool>;

    /// Most recent complete job for this content, size and bleed setting
    async fn find_complete(
        &self,
        fingerprint: &ContentFingerprint,
        trim_size: TrimSize,
        include_bleed: bool,
    ) -> Result<Option<CompilationJob>>;
}
