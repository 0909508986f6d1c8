//! Pagination filler page

use super::copy::extract_number;
use crate::types::MergeError;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

/// Off-white fill for the filler page, so the printer can tell an
/// intentional blank from a dropped page
pub const BLANK_PAGE_TINT: (f32, f32, f32) = (0.98, 0.97, 0.95);

/// Create a tinted blank page with the given media box
pub(crate) fn create_tinted_blank_page(
    doc: &mut Document,
    media_box: &[Object],
    parent_id: ObjectId,
) -> Result<ObjectId, MergeError> {
    let coords: Vec<f32> = media_box.iter().filter_map(extract_number).collect();
    let (x, y, width, height) = match coords.as_slice() {
        [x0, y0, x1, y1] => (*x0, *y0, x1 - x0, y1 - y0),
        _ => (0.0, 0.0, 612.0, 792.0),
    };

    let (r, g, b) = BLANK_PAGE_TINT;
    let content = format!("q {r:.3} {g:.3} {b:.3} rg {x} {y} {width} {height} re f Q");
    let content_id = doc.add_object(Stream::new(Dictionary::new(), content.into_bytes()));

    let mut page_dict = Dictionary::new();
    page_dict.set("Type", Object::Name(b"Page".to_vec()));
    page_dict.set("Parent", Object::Reference(parent_id));
    page_dict.set("MediaBox", Object::Array(media_box.to_vec()));
    page_dict.set("Contents", Object::Reference(content_id));
    page_dict.set("Resources", Object::Dictionary(Dictionary::new()));

    Ok(doc.add_object(page_dict))
}
