use super::JobRepository;
use crate::fingerprint::ContentFingerprint;
use crate::job::{CompilationJob, JobId, JobStatus};
use crate::types::*;
use async_trait::async_trait;
use press_layout::TrimSize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone, Default)]
pub struct MemoryJobRepository {
    jobs: Arc<Mutex<HashMap<JobId, CompilationJob>>>,
}

impl MemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<JobId, CompilationJob>> {
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl JobRepository for MemoryJobRepository {
    async fn insert(&self, job: &CompilationJob) -> Result<()> {
        let mut jobs = self.lock();
        if jobs.contains_key(&job.id) {
            return Err(CompileError::Repository(format!("job {} already exists", job.id)));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get(&self, id: &JobId) -> Result<Option<CompilationJob>> {
        Ok(self.lock().get(id).cloned())
    }

    async fn compare_and_swap(&self, expected_revision: u64, job: &CompilationJob) -> Result<bool> {
        let mut jobs = self.lock();
        match jobs.get(&job.id) {
            Some(current) if current.revision == expected_revision => {
                jobs.insert(job.id, job.clone());
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(CompileError::JobNotFound(job.id)),
        }
    }

    async fn find_complete(
        &self,
        fingerprint: &ContentFingerprint,
        trim_size: TrimSize,
        include_bleed: bool,
    ) -> Result<Option<CompilationJob>> {
        Ok(self
            .lock()
            .values()
            .filter(|job| {
                &job.fingerprint == fingerprint
                    && job.trim_size == trim_size
                    && job.include_bleed == include_bleed
                    && matches!(job.status, JobStatus::Complete { .. })
            })
            .max_by_key(|job| job.updated_at)
            .cloned())
    }
}
