//! File I/O for page fragments and compiled books

use crate::types::*;
use bytes::Bytes;
use std::path::Path;

/// Read one page fragment from disk
pub async fn load_fragment(path: impl AsRef<Path>) -> Result<Bytes> {
    Ok(Bytes::from(tokio::fs::read(path.as_ref()).await?))
}

/// Read several page fragments, preserving order
pub async fn load_fragments(paths: &[impl AsRef<Path>]) -> Result<Vec<Bytes>> {
    let mut fragments = Vec::with_capacity(paths.len());
    for path in paths {
        fragments.push(load_fragment(path).await?);
    }
    Ok(fragments)
}

/// Write a compiled book to disk
pub async fn save_book(bytes: &[u8], path: impl AsRef<Path>) -> Result<()> {
    tokio::fs::write(path.as_ref(), bytes).await?;
    Ok(())
}
