//! Filesystem-backed object store
//!
//! Objects live under `<root>/objects/<key>`, metadata under
//! `<root>/meta/<key>.json`. Write-if-absent is a hard link from a fully
//! written temp file, so readers never observe a partial object and the
//! link fails atomically when the key is taken.

use super::{ObjectMetadata, ObjectStore, PutOutcome, validate_key};
use crate::signing::UrlSigner;
use crate::types::*;
use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
    signer: UrlSigner,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>, signer: UrlSigner) -> Self {
        Self {
            root: root.into(),
            signer,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> PathBuf {
        self.root.join("objects").join(key)
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.root.join("meta").join(format!("{key}.json"))
    }

    /// Metadata written alongside an object
    pub async fn metadata(&self, key: &str) -> Result<ObjectMetadata> {
        validate_key(key)?;
        match tokio::fs::read(self.meta_path(key)).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(CompileError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

async fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(())
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        Ok(tokio::fs::try_exists(self.object_path(key)).await?)
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectMetadata>> {
        match self.metadata(key).await {
            Ok(metadata) => Ok(Some(metadata)),
            Err(CompileError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn put_if_absent(
        &self,
        key: &str,
        data: Bytes,
        metadata: ObjectMetadata,
    ) -> Result<PutOutcome> {
        validate_key(key)?;
        let path = self.object_path(key);
        ensure_parent(&path).await?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = path.with_file_name(format!(".{file_name}.{}.tmp", Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, &data).await?;

        let linked = tokio::fs::hard_link(&tmp, &path).await;
        if let Err(e) = tokio::fs::remove_file(&tmp).await {
            log::warn!("Could not remove temp file {}: {e}", tmp.display());
        }

        match linked {
            Ok(()) => {
                let meta_path = self.meta_path(key);
                ensure_parent(&meta_path).await?;
                tokio::fs::write(&meta_path, serde_json::to_vec_pretty(&metadata)?).await?;
                Ok(PutOutcome::Created)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(PutOutcome::AlreadyExists),
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        validate_key(key)?;
        match tokio::fs::read(self.object_path(key)).await {
            Ok(bytes) => Ok(Bytes::from(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(CompileError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn signed_url(&self, key: &str, ttl: Duration) -> Result<String> {
        validate_key(key)?;
        self.signer.signed_url(key, ttl)
    }
}
