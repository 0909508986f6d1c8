//! Content addressing
//!
//! Two separate notions of identity:
//! - [`content_hash`] answers "was this exact content compiled before?" and
//!   drives the cache lookup.
//! - [`storage_key`] names one specific compiled artifact. It mixes in a
//!   per-compile [`UniquenessToken`], so two compiles of identical content
//!   never share an address.

use crate::types::*;
use chrono::Utc;
use press_layout::TrimSize;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

/// One page at one content version
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageRef {
    pub page_id: PageId,
    /// Last-modified marker supplied by the page content provider
    pub version: String,
}

impl PageRef {
    pub fn new(page_id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            page_id: PageId::new(page_id),
            version: version.into(),
        }
    }
}

/// Hex SHA-256 over the collection, its page versions and the trim size
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentFingerprint(String);

impl ContentFingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-compile token separating artifacts of identical content
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UniquenessToken(String);

impl UniquenessToken {
    /// Millisecond timestamp plus a random suffix
    pub fn generate() -> Self {
        Self(format!(
            "{}-{}",
            Utc::now().timestamp_millis(),
            Uuid::new_v4().simple()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UniquenessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute the cache-lookup fingerprint. Deliberately excludes any
/// timestamp.
pub fn content_hash(
    collection_id: &CollectionId,
    pages: &[PageRef],
    trim_size: TrimSize,
) -> ContentFingerprint {
    let mut hasher = Sha256::new();
    update_field(&mut hasher, collection_id.as_str().as_bytes());
    update_field(&mut hasher, &(pages.len() as u64).to_be_bytes());
    for page in pages {
        update_field(&mut hasher, page.page_id.as_str().as_bytes());
        update_field(&mut hasher, page.version.as_bytes());
    }
    update_field(&mut hasher, trim_size.key().as_bytes());
    ContentFingerprint(hex(&hasher.finalize()))
}

/// Storage address of one rendered page fragment
pub fn page_artifact_key(page: &PageRef) -> String {
    let mut hasher = Sha256::new();
    update_field(&mut hasher, page.page_id.as_str().as_bytes());
    update_field(&mut hasher, page.version.as_bytes());
    format!("pages/{}.pdf", hex(&hasher.finalize()))
}

/// Write-once address of a compiled book
pub fn storage_key(
    fingerprint: &ContentFingerprint,
    trim_size: TrimSize,
    token: &UniquenessToken,
) -> String {
    format!("books/{}/{}/{}.pdf", fingerprint, trim_size.key(), token)
}

// Length-framed so ("ab","c") and ("a","bc") hash differently
fn update_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}

fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages() -> Vec<PageRef> {
        vec![
            PageRef::new("p1", "2024-05-01T10:00:00Z"),
            PageRef::new("p2", "2024-05-02T10:00:00Z"),
        ]
    }

    #[test]
    fn fingerprint_is_stable() {
        let collection = CollectionId::new("family");
        let a = content_hash(&collection, &pages(), TrimSize::Square8);
        let b = content_hash(&collection, &pages(), TrimSize::Square8);
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn fingerprint_tracks_versions_order_and_trim() {
        let collection = CollectionId::new("family");
        let base = content_hash(&collection, &pages(), TrimSize::Square8);

        let mut edited = pages();
        edited[1].version = "2024-06-01T00:00:00Z".to_string();
        assert_ne!(base, content_hash(&collection, &edited, TrimSize::Square8));

        let mut reordered = pages();
        reordered.reverse();
        assert_ne!(base, content_hash(&collection, &reordered, TrimSize::Square8));

        assert_ne!(base, content_hash(&collection, &pages(), TrimSize::Square10));
    }

    #[test]
    fn field_framing_prevents_concatenation_collisions() {
        let a = page_artifact_key(&PageRef::new("ab", "c"));
        let b = page_artifact_key(&PageRef::new("a", "bc"));
        assert_ne!(a, b);
    }

    #[test]
    fn page_key_ignores_neighbours() {
        let key = page_artifact_key(&PageRef::new("p1", "v1"));
        assert_eq!(key, page_artifact_key(&PageRef::new("p1", "v1")));
        assert_ne!(key, page_artifact_key(&PageRef::new("p1", "v2")));
        assert!(key.starts_with("pages/") && key.ends_with(".pdf"));
    }

    #[test]
    fn same_content_gets_distinct_storage_keys() {
        let fingerprint = content_hash(&CollectionId::new("c"), &pages(), TrimSize::Square8);
        let first = storage_key(&fingerprint, TrimSize::Square8, &UniquenessToken::generate());
        let second = storage_key(&fingerprint, TrimSize::Square8, &UniquenessToken::generate());
        assert_ne!(first, second);
        assert!(first.starts_with(&format!("books/{}/8x8/", fingerprint)));
    }
}
