//! Page content provider seam
//!
//! The editor owns page content. The pipeline only needs, per page, a
//! version marker for cache addressing and the placed elements for
//! pre-flight checks.

use crate::types::*;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// What an element on the page is; decides how strict pre-flight is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Text,
    Image,
    Decoration,
}

/// An element placed on a page, in inches relative to the top-left trim
/// corner. Negative offsets reach into the bleed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageElement {
    pub kind: ElementKind,
    /// Human-readable label for violation reports
    pub label: String,
    pub x_in: f64,
    pub y_in: f64,
    pub width_in: f64,
    pub height_in: f64,
}

#[async_trait]
pub trait PageContentProvider: Send + Sync + 'static {
    /// Page ids of a collection in book order
    async fn list_pages(&self, collection_id: &CollectionId) -> Result<Vec<PageId>>;

    /// Last-modified marker of a page; changes whenever its content does
    async fn version_marker(&self, collection_id: &CollectionId, page_id: &PageId)
    -> Result<String>;

    async fn elements(
        &self,
        _collection_id: &CollectionId,
        _page_id: &PageId,
    ) -> Result<Vec<PageElement>> {
        Ok(Vec::new())
    }

    /// Name printed into the book's metadata
    async fn owner_name(&self, collection_id: &CollectionId) -> Result<String> {
        Ok(collection_id.to_string())
    }
}
