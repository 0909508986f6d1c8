//! Book assembly
//!
//! 1. Copy every page of every fragment, in order, into a fresh document
//! 2. Pad odd page counts with one tinted blank so content never backs onto
//!    the inside cover
//! 3. Stamp traceability metadata into the document info dictionary

mod blank;
mod copy;
mod io;

pub use blank::BLANK_PAGE_TINT;
pub use io::{load_fragment, load_fragments, save_book};

use crate::types::*;
use blank::create_tinted_blank_page;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use copy::copy_page;
use lopdf::{Dictionary, Document, Object, ObjectId};
use press_layout::TrimSize;
use std::collections::HashMap;

pub const PRODUCER: &str = "Keepsake Press";

/// Traceability metadata embedded in the compiled book
#[derive(Debug, Clone, PartialEq)]
pub struct BookMetadata {
    pub title: String,
    pub owner_name: String,
    pub job_id: String,
    pub trim_size: TrimSize,
    pub page_ids: Vec<PageId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergedBook {
    pub bytes: Vec<u8>,
    /// Pages in the output, filler included
    pub page_count: usize,
    /// Pages copied from fragments
    pub content_pages: usize,
    pub blank_added: bool,
}

/// Merge page fragments into one book.
///
/// Any failure is reported as a single [`MergeError`]; there is no partial
/// output.
pub fn merge_book(
    fragments: &[Bytes],
    metadata: &BookMetadata,
) -> std::result::Result<MergedBook, MergeError> {
    if fragments.is_empty() {
        return Err(MergeError::NoPages);
    }

    let mut output = Document::with_version("1.7");
    let pages_id = output.new_object_id();

    let mut kids = Vec::new();
    let mut last_media_box = None;
    for (index, fragment) in fragments.iter().enumerate() {
        let source = Document::load_mem(fragment.as_ref())?;
        let page_ids: Vec<ObjectId> = source.get_pages().into_values().collect();
        if page_ids.is_empty() {
            return Err(MergeError::EmptyFragment { index });
        }

        // Object ids are per-document, so the copy cache is too
        let mut cache = HashMap::new();
        for page_id in page_ids {
            let (new_page_id, media_box) =
                copy_page(&mut output, &source, page_id, pages_id, &mut cache)?;
            kids.push(Object::Reference(new_page_id));
            last_media_box = Some(media_box);
        }
    }

    let content_pages = kids.len();
    let blank_added = content_pages % 2 == 1;
    if blank_added {
        let media_box = last_media_box.unwrap_or_default();
        let blank_id = create_tinted_blank_page(&mut output, &media_box, pages_id)?;
        kids.push(Object::Reference(blank_id));
    }
    let page_count = kids.len();

    let pages_dict = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Pages".to_vec())),
        ("Kids", Object::Array(kids)),
        ("Count", Object::Integer(page_count as i64)),
    ]);
    output.objects.insert(pages_id, Object::Dictionary(pages_dict));

    let catalog_id = output.add_object(Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]));
    output.trailer.set("Root", catalog_id);

    let info_id = output.add_object(info_dictionary(metadata, page_count));
    output.trailer.set("Info", info_id);

    let mut bytes = Vec::new();
    output.save_to(&mut bytes)?;

    Ok(MergedBook {
        bytes,
        page_count,
        content_pages,
        blank_added,
    })
}

/// Merge on a blocking thread
pub async fn merge_book_async(fragments: Vec<Bytes>, metadata: BookMetadata) -> Result<MergedBook> {
    let merged = tokio::task::spawn_blocking(move || merge_book(&fragments, &metadata)).await??;
    Ok(merged)
}

fn info_dictionary(metadata: &BookMetadata, page_count: usize) -> Dictionary {
    let page_ids = metadata
        .page_ids
        .iter()
        .map(PageId::as_str)
        .collect::<Vec<_>>()
        .join(",");

    Dictionary::from_iter(vec![
        ("Title", Object::string_literal(metadata.title.as_str())),
        ("Author", Object::string_literal(metadata.owner_name.as_str())),
        ("Producer", Object::string_literal(PRODUCER)),
        ("CreationDate", Object::string_literal(pdf_date(&metadata.created_at))),
        ("JobId", Object::string_literal(metadata.job_id.as_str())),
        ("TrimSize", Object::string_literal(metadata.trim_size.key())),
        ("PageCount", Object::Integer(page_count as i64)),
        ("PageIds", Object::string_literal(page_ids)),
    ])
}

/// PDF date string, e.g. `D:20240501120000Z`
fn pdf_date(at: &DateTime<Utc>) -> String {
    at.format("D:%Y%m%d%H%M%SZ").to_string()
}
