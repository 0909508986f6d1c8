//! Artifact storage
//!
//! [`ObjectStore`] is the narrow object-storage seam (exists / head /
//! put-if-absent / get / signed URL). [`ArtifactStore`] layers the pipeline's addressing and
//! write-once rules on top of it.

mod fs;
mod memory;

pub use fs::FsObjectStore;
pub use memory::{MemoryObjectStore, StoreOp};

use crate::fingerprint::{PageRef, page_artifact_key};
use crate::job::JobId;
use crate::types::*;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Metadata stored alongside an object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub content_type: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl ObjectMetadata {
    pub fn pdf() -> Self {
        Self {
            content_type: PDF_CONTENT_TYPE.to_string(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Result of an atomic write-if-absent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Created,
    /// Something already lives at the key; nothing was written
    AlreadyExists,
}

#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Metadata of a stored object; `None` for a missing key
    async fn head(&self, key: &str) -> Result<Option<ObjectMetadata>>;

    /// Atomically write `data` unless the key is already populated.
    /// An occupied key is a normal outcome, not an error.
    async fn put_if_absent(
        &self,
        key: &str,
        data: Bytes,
        metadata: ObjectMetadata,
    ) -> Result<PutOutcome>;

    /// Returns [`CompileError::NotFound`] for a missing key.
    async fn get(&self, key: &str) -> Result<Bytes>;

    async fn signed_url(&self, key: &str, ttl: Duration) -> Result<String>;
}

/// A book found already written at its address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommittedBook {
    pub size_bytes: u64,
    pub page_count: usize,
}

/// Pipeline view of the object store
#[derive(Clone)]
pub struct ArtifactStore {
    backend: Arc<dyn ObjectStore>,
}

impl ArtifactStore {
    pub fn new(backend: Arc<dyn ObjectStore>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<dyn ObjectStore> {
        &self.backend
    }

    /// Cached fragment for this page version, if any
    pub async fn page_artifact(&self, page: &PageRef) -> Result<Option<Bytes>> {
        let key = page_artifact_key(page);
        if !self.backend.exists(&key).await? {
            return Ok(None);
        }
        match self.backend.get(&key).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(CompileError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Persist a rendered fragment under its content address. A concurrent
    /// writer having got there first is fine: same address, same content.
    pub async fn store_page_artifact(&self, page: &PageRef, bytes: Bytes) -> Result<String> {
        let key = page_artifact_key(page);
        let metadata = ObjectMetadata::pdf()
            .with_attribute("page_id", page.page_id.as_str())
            .with_attribute("version", page.version.as_str());
        if self.backend.put_if_absent(&key, bytes, metadata).await? == PutOutcome::AlreadyExists {
            log::debug!("Page artifact {key} already stored");
        }
        Ok(key)
    }

    /// Fetch every page fragment in book order
    pub async fn load_page_artifacts(&self, pages: &[PageRef]) -> Result<Vec<Bytes>> {
        let mut fragments = Vec::with_capacity(pages.len());
        for page in pages {
            fragments.push(self.backend.get(&page_artifact_key(page)).await?);
        }
        Ok(fragments)
    }

    /// Write the final book. The address must be fresh: an occupied address
    /// means two compiles collided, which is never recoverable here.
    pub async fn commit_book(
        &self,
        key: &str,
        bytes: Bytes,
        metadata: ObjectMetadata,
    ) -> Result<()> {
        match self.backend.put_if_absent(key, bytes, metadata).await? {
            PutOutcome::Created => Ok(()),
            PutOutcome::AlreadyExists => {
                log::error!("Refusing to overwrite compiled book at {key}");
                Err(CompileError::ImmutabilityViolation {
                    key: key.to_string(),
                })
            }
        }
    }

    /// Book previously committed at `key` by this job, if any. An object
    /// there from any other writer is an immutability violation.
    pub async fn committed_book(
        &self,
        key: &str,
        job_id: &JobId,
    ) -> Result<Option<CommittedBook>> {
        let Some(metadata) = self.backend.head(key).await? else {
            return Ok(None);
        };
        let job_id = job_id.to_string();
        match metadata.attributes.get("job_id") {
            Some(owner) if *owner == job_id => {}
            owner => {
                log::error!(
                    "Book at {key} was written by {}, not job {job_id}",
                    owner.map_or("an unknown writer", String::as_str)
                );
                return Err(CompileError::ImmutabilityViolation {
                    key: key.to_string(),
                });
            }
        }

        let attribute = |name: &str| {
            metadata
                .attributes
                .get(name)
                .and_then(|value| value.parse::<u64>().ok())
                .ok_or_else(|| CompileError::Storage(format!("book {key} has no valid {name}")))
        };
        Ok(Some(CommittedBook {
            size_bytes: attribute("size_bytes")?,
            page_count: attribute("page_count")? as usize,
        }))
    }

    pub async fn get(&self, key: &str) -> Result<Bytes> {
        self.backend.get(key).await
    }

    /// Fresh signed URL for an existing artifact
    pub async fn signed_url(&self, key: &str, ttl: Duration) -> Result<String> {
        if !self.backend.exists(key).await? {
            return Err(CompileError::NotFound(key.to_string()));
        }
        self.backend.signed_url(key, ttl).await
    }
}

/// Reject keys that could escape a storage root
pub(crate) fn validate_key(key: &str) -> Result<()> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..");
    if bad {
        return Err(CompileError::Storage(format!("invalid object key: {key:?}")));
    }
    Ok(())
}
