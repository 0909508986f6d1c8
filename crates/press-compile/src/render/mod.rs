//! Page rendering with content-addressed caching and local retries
//!
//! The rasterizer itself is external; this module decides whether it needs
//! to run at all, hands it a one-page capability, and retries transient
//! failures on a fixed schedule.

mod retry;

pub use retry::RetryPolicy;

use crate::fingerprint::{PageRef, page_artifact_key};
use crate::signing::{CapabilityToken, TokenIssuer};
use crate::store::ArtifactStore;
use crate::types::*;
use async_trait::async_trait;
use bytes::Bytes;
use press_layout::constants::PRINT_DPI;
use press_layout::{LayoutSpec, PixelSize, TrimSize};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Target geometry handed to the rasterizer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RenderGeometry {
    pub trim_size: TrimSize,
    pub include_bleed: bool,
    /// Layout viewport in points
    pub viewport: PixelSize,
    /// Exact raster target
    pub output_pixels: PixelSize,
    /// Surface scale from viewport to output; keeps text and vectors crisp
    pub scale_factor: f64,
    pub dpi: f64,
}

impl From<&LayoutSpec> for RenderGeometry {
    fn from(layout: &LayoutSpec) -> Self {
        Self {
            trim_size: layout.trim_size,
            include_bleed: layout.include_bleed,
            viewport: layout.viewport,
            output_pixels: layout.output_pixels,
            scale_factor: layout.scale_factor,
            dpi: PRINT_DPI,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderRequest {
    pub page_id: PageId,
    pub collection_id: CollectionId,
    pub geometry: RenderGeometry,
    pub token: CapabilityToken,
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{0}")]
pub struct RasterizeError(pub String);

/// External renderer: page in, single-page PDF out
#[async_trait]
pub trait Rasterizer: Send + Sync + 'static {
    async fn rasterize(&self, request: RenderRequest)
    -> std::result::Result<Bytes, RasterizeError>;
}

pub struct PageRenderer {
    rasterizer: Arc<dyn Rasterizer>,
    store: ArtifactStore,
    tokens: TokenIssuer,
    retry: RetryPolicy,
}

impl PageRenderer {
    pub fn new(
        rasterizer: Arc<dyn Rasterizer>,
        store: ArtifactStore,
        tokens: TokenIssuer,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            rasterizer,
            store,
            tokens,
            retry,
        }
    }

    /// Render one page, or return its cached fragment.
    ///
    /// Fails with [`CompileError::RenderFailed`] once the retry budget is
    /// spent. Storage errors propagate unchanged.
    pub async fn render(
        &self,
        page: &PageRef,
        collection_id: &CollectionId,
        geometry: &RenderGeometry,
    ) -> Result<Bytes> {
        if let Some(bytes) = self.store.page_artifact(page).await? {
            log::debug!("Cache hit for page {} ({})", page.page_id, page_artifact_key(page));
            return Ok(bytes);
        }

        let bytes = self.rasterize_with_retry(page, collection_id, geometry).await?;
        self.store.store_page_artifact(page, bytes.clone()).await?;
        Ok(bytes)
    }

    async fn rasterize_with_retry(
        &self,
        page: &PageRef,
        collection_id: &CollectionId,
        geometry: &RenderGeometry,
    ) -> Result<Bytes> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let request = RenderRequest {
                page_id: page.page_id.clone(),
                collection_id: collection_id.clone(),
                geometry: *geometry,
                token: self.tokens.issue(&page.page_id, collection_id)?,
            };

            let cause = match self.rasterizer.rasterize(request).await {
                Ok(bytes) if looks_like_pdf(&bytes) => return Ok(bytes),
                Ok(_) => "rasterizer returned a non-PDF payload".to_string(),
                Err(e) => e.to_string(),
            };

            if attempt >= self.retry.max_attempts {
                return Err(CompileError::RenderFailed {
                    page_id: page.page_id.clone(),
                    cause: format!("{cause} (after {attempt} attempts)"),
                });
            }

            let delay = self.retry.delay_after(attempt);
            log::warn!(
                "Render attempt {attempt}/{} for page {} failed: {cause}; retrying in {:?}",
                self.retry.max_attempts,
                page.page_id,
                delay
            );
            tokio::time::sleep(delay).await;
        }
    }
}

fn looks_like_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF-")
}
