//! Directory-backed page source
//!
//! Each page is a pre-rendered `<page-id>.pdf` in one directory. An optional
//! `<page-id>.elements.json` sidecar lists placed elements for pre-flight.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use press_compile::{
    CollectionId, CompileError, PageContentProvider, PageElement, PageId, RasterizeError,
    Rasterizer, RenderRequest, Result, TokenIssuer,
};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

const PDF_EXTENSION: &str = "pdf";
const ELEMENTS_SUFFIX: &str = ".elements.json";

fn page_path(dir: &Path, page_id: &PageId) -> PathBuf {
    dir.join(format!("{}.{PDF_EXTENSION}", page_id))
}

pub struct DirectoryProvider {
    dir: PathBuf,
    owner_name: Option<String>,
}

impl DirectoryProvider {
    pub fn new(dir: impl Into<PathBuf>, owner_name: Option<String>) -> Self {
        Self {
            dir: dir.into(),
            owner_name,
        }
    }
}

#[async_trait]
impl PageContentProvider for DirectoryProvider {
    /// Page files sorted by name
    async fn list_pages(&self, _collection_id: &CollectionId) -> Result<Vec<PageId>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut pages = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(PDF_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                pages.push(PageId::new(stem));
            }
        }
        pages.sort();
        Ok(pages)
    }

    /// File length plus modification time
    async fn version_marker(
        &self,
        _collection_id: &CollectionId,
        page_id: &PageId,
    ) -> Result<String> {
        let path = page_path(&self.dir, page_id);
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(CompileError::Provider(format!(
                    "page {page_id} not found at {}",
                    path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };
        let modified = metadata
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        Ok(format!("{}-{}", metadata.len(), modified))
    }

    async fn elements(
        &self,
        _collection_id: &CollectionId,
        page_id: &PageId,
    ) -> Result<Vec<PageElement>> {
        let path = self.dir.join(format!("{page_id}{ELEMENTS_SUFFIX}"));
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn owner_name(&self, collection_id: &CollectionId) -> Result<String> {
        Ok(self
            .owner_name
            .clone()
            .unwrap_or_else(|| collection_id.to_string()))
    }
}

/// Serves the pre-rendered page files, after checking the capability token
/// the pipeline issued for the page
pub struct DirectoryRasterizer {
    dir: PathBuf,
    tokens: TokenIssuer,
}

impl DirectoryRasterizer {
    pub fn new(dir: impl Into<PathBuf>, tokens: TokenIssuer) -> Self {
        Self {
            dir: dir.into(),
            tokens,
        }
    }
}

#[async_trait]
impl Rasterizer for DirectoryRasterizer {
    async fn rasterize(
        &self,
        request: RenderRequest,
    ) -> std::result::Result<Bytes, RasterizeError> {
        if !self.tokens.verify(&request.token, &request.page_id, Utc::now()) {
            return Err(RasterizeError(format!(
                "capability token rejected for page {}",
                request.page_id
            )));
        }
        let path = page_path(&self.dir, &request.page_id);
        tokio::fs::read(&path)
            .await
            .map(Bytes::from)
            .map_err(|e| RasterizeError(format!("{}: {e}", path.display())))
    }
}
