//! Compilation job record and its state machine
//!
//! ```text
//! pending ─▶ rendering ─▶ merging ─▶ complete
//!               │  ▲          │
//!               │  └ batch+1  │
//!               ▼             ▼
//!             failed ◀────────┘
//! ```

use crate::fingerprint::{ContentFingerprint, PageRef, UniquenessToken, storage_key};
use crate::types::*;
use chrono::{DateTime, Utc};
use press_layout::TrimSize;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Pipeline stage a job failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Render,
    Merge,
}

/// Job status. Fields only meaningful in one state live in that variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Rendering {
        current_batch: usize,
        pages_rendered: usize,
    },
    Merging {
        pages_rendered: usize,
    },
    Complete {
        artifact_key: String,
        size_bytes: u64,
        /// Pages in the final artifact, trailing blank included
        page_count: usize,
        download_url: String,
        url_expires_at: DateTime<Utc>,
    },
    Failed {
        stage: FailureStage,
        failed_page_id: Option<PageId>,
        message: String,
    },
}

impl JobStatus {
    pub fn name(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Rendering { .. } => "rendering",
            JobStatus::Merging { .. } => "merging",
            JobStatus::Complete { .. } => "complete",
            JobStatus::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Complete { .. } | JobStatus::Failed { .. })
    }

    /// Whether moving from `self` to `next` is a legal transition
    pub fn can_transition_to(&self, next: &JobStatus) -> bool {
        match (self, next) {
            (JobStatus::Pending, JobStatus::Rendering { current_batch, .. }) => *current_batch == 0,
            (
                JobStatus::Rendering {
                    current_batch: from,
                    ..
                },
                JobStatus::Rendering {
                    current_batch: to, ..
                },
            ) => *to == from + 1,
            (JobStatus::Rendering { .. }, JobStatus::Merging { .. }) => true,
            (JobStatus::Rendering { .. }, JobStatus::Failed { .. }) => true,
            (JobStatus::Merging { .. }, JobStatus::Complete { .. }) => true,
            (JobStatus::Merging { .. }, JobStatus::Failed { .. }) => true,
            _ => false,
        }
    }
}

/// One compile request's unit of work. Never deleted: complete jobs double
/// as the cache index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompilationJob {
    pub id: JobId,
    pub collection_id: CollectionId,
    pub owner_name: String,
    pub trim_size: TrimSize,
    pub include_bleed: bool,
    pub pages: Vec<PageRef>,
    pub fingerprint: ContentFingerprint,
    pub uniqueness_token: UniquenessToken,
    #[serde(flatten)]
    pub status: JobStatus,
    /// Bumped on every persisted change; the optimistic-concurrency check
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CompilationJob {
    pub fn new(
        collection_id: CollectionId,
        owner_name: impl Into<String>,
        trim_size: TrimSize,
        include_bleed: bool,
        pages: Vec<PageRef>,
        fingerprint: ContentFingerprint,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            collection_id,
            owner_name: owner_name.into(),
            trim_size,
            include_bleed,
            pages,
            fingerprint,
            uniqueness_token: UniquenessToken::generate(),
            status: JobStatus::Pending,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn pages_rendered(&self) -> usize {
        match &self.status {
            JobStatus::Pending => 0,
            JobStatus::Rendering { pages_rendered, .. } | JobStatus::Merging { pages_rendered } => {
                *pages_rendered
            }
            JobStatus::Complete { .. } => self.page_count(),
            JobStatus::Failed { .. } => 0,
        }
    }

    pub fn current_batch(&self) -> Option<usize> {
        match &self.status {
            JobStatus::Rendering { current_batch, .. } => Some(*current_batch),
            _ => None,
        }
    }

    pub fn batch_count(&self, batch_size: usize) -> usize {
        self.page_count().div_ceil(batch_size.max(1))
    }

    /// Pages belonging to batch `index`; empty past the end
    pub fn batch_pages(&self, index: usize, batch_size: usize) -> &[PageRef] {
        let batch_size = batch_size.max(1);
        let start = (index * batch_size).min(self.pages.len());
        let end = (start + batch_size).min(self.pages.len());
        &self.pages[start..end]
    }

    /// Write-once address of this job's book
    pub fn storage_key(&self) -> String {
        storage_key(&self.fingerprint, self.trim_size, &self.uniqueness_token)
    }

    /// Download URL when complete
    pub fn download_url(&self) -> Option<&str> {
        match &self.status {
            JobStatus::Complete { download_url, .. } => Some(download_url),
            _ => None,
        }
    }

    /// Next revision of this record with `next` as its status
    pub fn transition(&self, next: JobStatus) -> Result<CompilationJob> {
        if !self.status.can_transition_to(&next) {
            return Err(CompileError::InvalidTransition {
                job_id: self.id,
                from: self.status.name(),
                to: next.name(),
            });
        }
        let mut updated = self.clone();
        updated.status = next;
        updated.revision = self.revision + 1;
        updated.updated_at = Utc::now();
        Ok(updated)
    }
}
