//! Page-tree lookups shared by the compositor and the rasterizer

use crate::error::{Result, StampError};
use crate::geometry::PageBox;
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::path::Path;

/// US Letter, used when a page tree carries no usable box at all.
const FALLBACK_BOX: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

pub fn open_document(path: &Path) -> Result<Document> {
    Document::load(path).map_err(|e| StampError::PdfOpen(format!("{}: {}", path.display(), e)))
}

pub fn load_document(bytes: &[u8]) -> Result<Document> {
    Document::load_mem(bytes).map_err(|e| StampError::PdfOpen(e.to_string()))
}

/// Resolve a 1-based page number to its object id.
pub fn page_id(doc: &Document, page_number: u32) -> Result<ObjectId> {
    let pages = doc.get_pages();
    let page_count = pages.len() as u32;
    if page_number == 0 || page_number > page_count {
        return Err(StampError::PageOutOfRange {
            page: page_number,
            page_count,
        });
    }
    pages
        .get(&page_number)
        .copied()
        .ok_or(StampError::PageOutOfRange {
            page: page_number,
            page_count,
        })
}

/// Look up a page attribute, following the `Parent` chain for inheritable keys.
pub fn inherited_attribute<'a>(
    doc: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Option<&'a Object> {
    let mut current = Some(page_id);
    // Bound the walk so a cyclic Parent chain cannot hang us
    for _ in 0..64 {
        let id = current?;
        let dict = doc.get_object(id).and_then(|o| o.as_dict()).ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(resolve(doc, value));
        }
        current = dict.get(b"Parent").and_then(|p| p.as_reference()).ok();
    }
    None
}

/// Follow a single indirect reference, returning the object itself otherwise.
pub fn resolve<'a>(doc: &'a Document, object: &'a Object) -> &'a Object {
    match object {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(object),
        other => other,
    }
}

pub fn resolve_dict(doc: &Document, object: &Object) -> Option<Dictionary> {
    resolve(doc, object).as_dict().ok().cloned()
}

/// Effective page box: CropBox if present, else MediaBox, with the page's
/// (possibly inherited) `/Rotate`.
pub fn page_box(doc: &Document, page_id: ObjectId) -> PageBox {
    let corners = [b"CropBox".as_slice(), b"MediaBox".as_slice()]
        .iter()
        .find_map(|key| inherited_attribute(doc, page_id, key).and_then(rect_corners))
        .unwrap_or(FALLBACK_BOX);
    let rotation = inherited_attribute(doc, page_id, b"Rotate")
        .and_then(|o| o.as_i64().ok())
        .unwrap_or(0);
    PageBox::from_corners(corners).with_rotation(rotation)
}

fn rect_corners(object: &Object) -> Option<[f64; 4]> {
    let arr = object.as_array().ok()?;
    if arr.len() != 4 {
        return None;
    }
    Some([
        number(&arr[0])?,
        number(&arr[1])?,
        number(&arr[2])?,
        number(&arr[3])?,
    ])
}

fn number(object: &Object) -> Option<f64> {
    match object {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(f) => Some((*f).into()),
        _ => None,
    }
}
