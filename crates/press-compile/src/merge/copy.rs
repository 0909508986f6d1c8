//! Copying pages between lopdf documents

use crate::types::MergeError;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::collections::HashMap;

type Result<T> = std::result::Result<T, MergeError>;

/// US Letter, used when a fragment carries no MediaBox anywhere in its tree
const DEFAULT_MEDIA_BOX: [i64; 4] = [0, 0, 612, 792];

/// Page attributes a page may inherit from its ancestors in the page tree
const INHERITABLE_KEYS: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

/// Guard against malformed, cyclic page trees
const MAX_TREE_DEPTH: usize = 32;

/// Copy one page from `source` into `output` under `parent_id`.
///
/// Returns the new page id and its resolved MediaBox.
pub(crate) fn copy_page(
    output: &mut Document,
    source: &Document,
    page_id: ObjectId,
    parent_id: ObjectId,
    cache: &mut HashMap<ObjectId, ObjectId>,
) -> Result<(ObjectId, Vec<Object>)> {
    let page_dict = source.get_dictionary(page_id)?;

    // Annotations point back at their page
    let new_id = output.new_object_id();
    cache.insert(page_id, new_id);

    let mut new_dict = Dictionary::new();
    for (key, value) in page_dict.iter() {
        // The source page tree stays behind
        if key.as_slice() == b"Parent" {
            continue;
        }
        new_dict.set(key.clone(), copy_object_deep(output, source, value, cache)?);
    }

    for key in INHERITABLE_KEYS {
        if new_dict.has(key) {
            continue;
        }
        if let Some(value) = inherited_attribute(source, page_dict, key) {
            new_dict.set(key.to_vec(), copy_object_deep(output, source, value, cache)?);
        }
    }

    let resolved = new_dict
        .get(b"MediaBox")
        .ok()
        .and_then(|obj| resolve(output, obj))
        .and_then(|obj| obj.as_array().ok())
        .cloned();
    let media_box = match resolved {
        Some(media_box) => media_box,
        None => {
            let media_box = default_media_box();
            new_dict.set("MediaBox", Object::Array(media_box.clone()));
            media_box
        }
    };
    if !new_dict.has(b"Resources") {
        new_dict.set("Resources", Object::Dictionary(Dictionary::new()));
    }

    new_dict.set("Parent", Object::Reference(parent_id));
    output.objects.insert(new_id, Object::Dictionary(new_dict));
    Ok((new_id, media_box))
}

fn default_media_box() -> Vec<Object> {
    DEFAULT_MEDIA_BOX.iter().map(|v| Object::Integer(*v)).collect()
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

/// Walk up the page tree looking for an inherited attribute
fn inherited_attribute<'a>(
    source: &'a Document,
    page_dict: &'a Dictionary,
    key: &[u8],
) -> Option<&'a Object> {
    let mut current = page_dict;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = current.get(key) {
            return Some(value);
        }
        let parent_id = current.get(b"Parent").ok()?.as_reference().ok()?;
        current = source.get_dictionary(parent_id).ok()?;
    }
    None
}

/// Deep copy an object from source to output document, following references.
///
/// Each referenced object is copied once per source document; the id is
/// reserved before recursing so reference cycles terminate.
pub(crate) fn copy_object_deep(
    output: &mut Document,
    source: &Document,
    obj: &Object,
    cache: &mut HashMap<ObjectId, ObjectId>,
) -> Result<Object> {
    match obj {
        Object::Reference(id) => {
            if let Some(&new_id) = cache.get(id) {
                return Ok(Object::Reference(new_id));
            }

            let new_id = output.new_object_id();
            cache.insert(*id, new_id);

            let referenced = source.get_object(*id)?;
            let copied = copy_object_deep(output, source, referenced, cache)?;
            output.objects.insert(new_id, copied);

            Ok(Object::Reference(new_id))
        }
        Object::Dictionary(dict) => Ok(Object::Dictionary(copy_dictionary(
            output, source, dict, cache,
        )?)),
        Object::Array(arr) => {
            let new_arr: Result<Vec<_>> = arr
                .iter()
                .map(|item| copy_object_deep(output, source, item, cache))
                .collect();
            Ok(Object::Array(new_arr?))
        }
        Object::Stream(stream) => Ok(Object::Stream(Stream {
            dict: copy_dictionary(output, source, &stream.dict, cache)?,
            content: stream.content.clone(),
            allows_compression: stream.allows_compression,
            start_position: None,
        })),
        _ => Ok(obj.clone()),
    }
}

fn copy_dictionary(
    output: &mut Document,
    source: &Document,
    dict: &Dictionary,
    cache: &mut HashMap<ObjectId, ObjectId>,
) -> Result<Dictionary> {
    let mut new_dict = Dictionary::new();
    for (key, value) in dict.iter() {
        new_dict.set(key.clone(), copy_object_deep(output, source, value, cache)?);
    }
    Ok(new_dict)
}

/// Numeric value of a PDF object
pub(crate) fn extract_number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}
