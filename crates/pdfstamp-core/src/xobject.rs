//! Image XObject construction and compacted serialization

use crate::error::{Result, StampError};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::{RgbImage, RgbaImage};
use lopdf::{dictionary, Document, ObjectId, Stream};
use std::io::Write;

/// Zlib-compress a buffer for a `/FlateDecode` stream.
pub fn deflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn image_stream(
    width: u32,
    height: u32,
    color_space: &str,
    samples: &[u8],
    smask: Option<ObjectId>,
) -> Result<Stream> {
    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width as i64,
        "Height" => height as i64,
        "ColorSpace" => color_space,
        "BitsPerComponent" => 8,
        "Filter" => "FlateDecode",
    };
    if let Some(smask_id) = smask {
        dict.set("SMask", smask_id);
    }
    // Already deflated; keep lopdf from compressing it a second time
    Ok(Stream::new(dict, deflate(samples)?).with_compression(false))
}

/// Add an opaque RGB image and return its object id.
pub fn add_rgb_image(doc: &mut Document, image: &RgbImage) -> Result<ObjectId> {
    let stream = image_stream(
        image.width(),
        image.height(),
        "DeviceRGB",
        image.as_raw(),
        None,
    )?;
    Ok(doc.add_object(stream))
}

/// Add an RGBA image as an RGB XObject with a soft mask carrying the alpha
/// channel. The mask is omitted when every pixel is opaque.
pub fn add_rgba_image(doc: &mut Document, image: &RgbaImage) -> Result<ObjectId> {
    let pixel_count = (image.width() * image.height()) as usize;
    let mut rgb = Vec::with_capacity(pixel_count * 3);
    let mut alpha = Vec::with_capacity(pixel_count);
    for pixel in image.pixels() {
        rgb.extend_from_slice(&pixel.0[..3]);
        alpha.push(pixel.0[3]);
    }

    let smask = if alpha.iter().any(|&a| a != u8::MAX) {
        let mask = image_stream(image.width(), image.height(), "DeviceGray", &alpha, None)?;
        Some(doc.add_object(mask))
    } else {
        None
    };

    let stream = image_stream(image.width(), image.height(), "DeviceRGB", &rgb, smask)?;
    Ok(doc.add_object(stream))
}

/// Serialize with cleanup: drop unreachable objects and empty streams,
/// renumber, and compress whatever streams are still raw.
pub fn save_compacted(doc: &mut Document) -> Result<Vec<u8>> {
    doc.prune_objects();
    doc.delete_zero_length_streams();
    doc.renumber_objects();
    doc.compress();

    let mut output = Vec::new();
    doc.save_to(&mut output)
        .map_err(|e| StampError::Serialization(e.to_string()))?;
    Ok(output)
}
