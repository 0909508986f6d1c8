//! JSON-file job repository
//!
//! One record per job under `<root>/jobs/<id>.json`; complete jobs are also
//! indexed under `<root>/complete/<fingerprint>_<trim>_<bleed>.json`. Updates go
//! through a temp file and rename. The compare-and-swap is serialized per
//! process; cross-process writers need a store with native conditional
//! writes.

use super::JobRepository;
use crate::fingerprint::ContentFingerprint;
use crate::job::{CompilationJob, JobId, JobStatus};
use crate::types::*;
use async_trait::async_trait;
use press_layout::TrimSize;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

#[derive(Debug, Serialize, Deserialize)]
struct CompleteIndexEntry {
    job_id: JobId,
}

#[derive(Debug)]
pub struct FsJobRepository {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FsJobRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn job_path(&self, id: &JobId) -> PathBuf {
        self.root.join("jobs").join(format!("{id}.json"))
    }

    fn index_path(
        &self,
        fingerprint: &ContentFingerprint,
        trim_size: TrimSize,
        include_bleed: bool,
    ) -> PathBuf {
        let bleed = if include_bleed { "bleed" } else { "nobleed" };
        self.root
            .join("complete")
            .join(format!("{}_{}_{bleed}.json", fingerprint, trim_size.key()))
    }

    async fn read_job(&self, id: &JobId) -> Result<Option<CompilationJob>> {
        match tokio::fs::read(self.job_path(id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_job(&self, job: &CompilationJob) -> Result<()> {
        write_atomic(&self.job_path(&job.id), &serde_json::to_vec_pretty(job)?).await?;
        if matches!(job.status, JobStatus::Complete { .. }) {
            let entry = CompleteIndexEntry { job_id: job.id };
            write_atomic(
                &self.index_path(&job.fingerprint, job.trim_size, job.include_bleed),
                &serde_json::to_vec(&entry)?,
            )
            .await?;
        }
        Ok(())
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl JobRepository for FsJobRepository {
    async fn insert(&self, job: &CompilationJob) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if self.read_job(&job.id).await?.is_some() {
            return Err(CompileError::Repository(format!("job {} already exists", job.id)));
        }
        self.write_job(job).await
    }

    async fn get(&self, id: &JobId) -> Result<Option<CompilationJob>> {
        self.read_job(id).await
    }

    async fn compare_and_swap(&self, expected_revision: u64, job: &CompilationJob) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let current = self
            .read_job(&job.id)
            .await?
            .ok_or(CompileError::JobNotFound(job.id))?;
        if current.revision != expected_revision {
            return Ok(false);
        }
        self.write_job(job).await?;
        Ok(true)
    }

    async fn find_complete(
        &self,
        fingerprint: &ContentFingerprint,
        trim_size: TrimSize,
        include_bleed: bool,
    ) -> Result<Option<CompilationJob>> {
        let index = self.index_path(fingerprint, trim_size, include_bleed);
        let entry: CompleteIndexEntry = match tokio::fs::read(index).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(self
            .read_job(&entry.job_id)
            .await?
            .filter(|job| matches!(job.status, JobStatus::Complete { .. })))
    }
}
