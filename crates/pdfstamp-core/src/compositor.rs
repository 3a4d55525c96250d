//! Embeds a prepared stamp image into one page of a PDF
//!
//! The page's existing content is wrapped in `q … Q` so whatever graphics
//! state it leaves behind cannot leak into the stamp, then the stamp is drawn
//! as an image XObject stretched over the target rectangle. The rectangle is
//! measured on the page as displayed, so on pages with `/Rotate` the image is
//! counter-rotated to appear upright.

use crate::error::{Result, StampError};
use crate::geometry::{PageBox, PdfRect};
use crate::page;
use crate::xobject;
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use std::path::Path;

const XOBJECT_PREFIX: &str = "StampIm";

/// Stamp `stamp_image` onto `page_number` (1-based) of the PDF at `source`,
/// filling `rect` exactly. Returns the new document; `source` is untouched.
pub fn composite(
    source: &Path,
    page_number: u32,
    rect: &PdfRect,
    stamp_image: &Path,
) -> Result<Vec<u8>> {
    if !rect.is_finite() || rect.is_empty() {
        return Err(StampError::InvalidInput(format!(
            "Stamp rectangle must enclose an area, got {:?}",
            rect
        )));
    }

    let mut doc = page::open_document(source)?;
    let page_id = page::page_id(&doc, page_number)?;

    let stamp = image::open(stamp_image)
        .map_err(|e| StampError::ImageLoad(format!("{}: {}", stamp_image.display(), e)))?
        .to_rgba8();
    let image_id = xobject::add_rgba_image(&mut doc, &stamp)?;

    let page_box = page::page_box(&doc, page_id);
    let target = page_box.to_user_space(rect);
    let matrix = page_box
        .image_matrix(rect)
        .iter()
        .map(|v| format_number(*v))
        .collect::<Vec<_>>()
        .join(" ");
    let name = attach_xobject(&mut doc, page_id, image_id)?;
    let ops = format!("q {} cm /{} Do Q\n", matrix, name);
    wrap_page_contents(&mut doc, page_id, ops.into_bytes())?;

    tracing::info!(
        "Stamped page {} (rotate {}) at [{:.2}, {:.2}, {:.2}, {:.2}] with {}x{} image",
        page_number,
        page_box.rotation,
        target.x0,
        target.y0,
        target.x1,
        target.y1,
        stamp.width(),
        stamp.height()
    );

    xobject::save_compacted(&mut doc)
}

/// Effective page box of a page. Its visible size is the mapper's page size.
pub fn page_box(source: &Path, page_number: u32) -> Result<PageBox> {
    let doc = page::open_document(source)?;
    let page_id = page::page_id(&doc, page_number)?;
    Ok(page::page_box(&doc, page_id))
}

/// Get the number of pages in a PDF
pub fn page_count(bytes: &[u8]) -> Result<u32> {
    let doc = page::load_document(bytes)?;
    Ok(doc.get_pages().len() as u32)
}

fn page_dict_mut(doc: &mut Document, page_id: ObjectId) -> Result<&mut Dictionary> {
    doc.get_object_mut(page_id)
        .and_then(|o| o.as_dict_mut())
        .map_err(|e| StampError::PdfOpen(format!("Page object {:?}: {}", page_id, e)))
}

/// Register the image under a fresh name in the page's own resources.
///
/// Resources may be shared with other pages or inherited from the page tree,
/// so they are copied into the page before being extended.
fn attach_xobject(doc: &mut Document, page_id: ObjectId, image_id: ObjectId) -> Result<String> {
    let mut resources = page::inherited_attribute(doc, page_id, b"Resources")
        .and_then(|o| o.as_dict().ok().cloned())
        .unwrap_or_default();
    let mut xobjects = resources
        .get(b"XObject")
        .ok()
        .and_then(|o| page::resolve_dict(doc, o))
        .unwrap_or_default();

    let name = unused_name(&xobjects);
    xobjects.set(name.clone(), image_id);
    resources.set("XObject", xobjects);
    page_dict_mut(doc, page_id)?.set("Resources", resources);
    Ok(name)
}

fn unused_name(xobjects: &Dictionary) -> String {
    let mut index = 0u32;
    loop {
        let candidate = format!("{}{}", XOBJECT_PREFIX, index);
        if !xobjects.has(candidate.as_bytes()) {
            return candidate;
        }
        index += 1;
    }
}

/// Replace the page's content with `q`, the original streams, `Q`, then the
/// stamp operators.
fn wrap_page_contents(doc: &mut Document, page_id: ObjectId, stamp_ops: Vec<u8>) -> Result<()> {
    let contents = doc
        .get_object(page_id)
        .and_then(|o| o.as_dict())
        .ok()
        .and_then(|d| d.get(b"Contents").ok())
        .cloned();
    let existing = match contents {
        Some(Object::Reference(id)) => match doc.get_object(id) {
            Ok(Object::Array(items)) => items.clone(),
            _ => vec![Object::Reference(id)],
        },
        Some(Object::Array(items)) => items,
        _ => Vec::new(),
    };

    let open_id = doc.add_object(Stream::new(dictionary! {}, b"q\n".to_vec()));
    let mut close = b"\nQ\n".to_vec();
    close.extend_from_slice(&stamp_ops);
    let close_id = doc.add_object(Stream::new(dictionary! {}, close));

    let mut parts = Vec::with_capacity(existing.len() + 2);
    parts.push(Object::Reference(open_id));
    parts.extend(existing);
    parts.push(Object::Reference(close_id));

    page_dict_mut(doc, page_id)?.set("Contents", parts);
    Ok(())
}

/// Compact decimal form for content stream operands.
fn format_number(value: f64) -> String {
    let text = format!("{:.4}", value);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text == "-0" {
        "0".to_string()
    } else {
        text.to_string()
    }
}
