//! Signature image preparation
//!
//! A stored signature is a PNG. Before it can be composited it is rotated to
//! the angle chosen in the editor and written to a scratch PNG that lives
//! exactly as long as the returned [`PreparedStamp`].

use crate::error::{Result, StampError};
use image::{imageops, ImageFormat, Rgba, RgbaImage};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use std::path::Path;
use tempfile::NamedTempFile;

/// PNG magic bytes: 89 50 4E 47 0D 0A 1A 0A
const PNG_MAGIC: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// Slack for trigonometric noise when sizing the expanded canvas.
const CANVAS_EPSILON: f64 = 1e-6;

/// A rotated signature written to a scratch PNG.
///
/// The scratch file is deleted when this value is dropped.
#[derive(Debug)]
pub struct PreparedStamp {
    file: NamedTempFile,
    width: u32,
    height: u32,
}

impl PreparedStamp {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

/// Check that the bytes are a PNG that decodes to a non-empty image.
pub fn decode_signature(bytes: &[u8]) -> Result<RgbaImage> {
    if bytes.len() < PNG_MAGIC.len() || !bytes.starts_with(&PNG_MAGIC) {
        return Err(StampError::ImageLoad(
            "Signature image is not a PNG".to_string(),
        ));
    }
    let image = image::load_from_memory_with_format(bytes, ImageFormat::Png)
        .map_err(|e| StampError::ImageLoad(format!("Corrupt signature image: {}", e)))?
        .to_rgba8();
    if image.width() == 0 || image.height() == 0 {
        return Err(StampError::ImageLoad(
            "Signature image has no pixels".to_string(),
        ));
    }
    Ok(image)
}

/// Rotate a signature for stamping, using the system temp directory.
pub fn prepare_stamp(signature_path: &Path, rotation_degrees: f64) -> Result<PreparedStamp> {
    prepare_stamp_in(&std::env::temp_dir(), signature_path, rotation_degrees)
}

/// Rotate a signature for stamping, writing the scratch PNG into `scratch_dir`.
pub fn prepare_stamp_in(
    scratch_dir: &Path,
    signature_path: &Path,
    rotation_degrees: f64,
) -> Result<PreparedStamp> {
    if !rotation_degrees.is_finite() {
        return Err(StampError::InvalidInput(format!(
            "Rotation must be finite, got {}",
            rotation_degrees
        )));
    }

    let bytes = std::fs::read(signature_path).map_err(|e| {
        StampError::ImageLoad(format!("{}: {}", signature_path.display(), e))
    })?;
    let signature = decode_signature(&bytes)?;
    let rotated = rotate_expanded(&signature, rotation_degrees);

    let mut file = tempfile::Builder::new()
        .prefix("stamp-")
        .suffix(".png")
        .tempfile_in(scratch_dir)?;
    rotated
        .write_to(file.as_file_mut(), ImageFormat::Png)
        .map_err(|e| StampError::Serialization(format!("PNG encoding failed: {}", e)))?;

    tracing::debug!(
        "Prepared stamp {}x{} -> {}x{} at {} degrees",
        signature.width(),
        signature.height(),
        rotated.width(),
        rotated.height(),
        rotation_degrees
    );

    Ok(PreparedStamp {
        file,
        width: rotated.width(),
        height: rotated.height(),
    })
}

/// Rotate screen-clockwise by `rotation_degrees`, growing the canvas so no
/// corner is cropped. Uncovered canvas is transparent.
///
/// Quarter turns are exact pixel transpositions; other angles are resampled
/// bicubically.
pub fn rotate_expanded(source: &RgbaImage, rotation_degrees: f64) -> RgbaImage {
    let degrees = rotation_degrees.rem_euclid(360.0);
    match degrees {
        d if d == 0.0 => return source.clone(),
        d if d == 90.0 => return imageops::rotate90(source),
        d if d == 180.0 => return imageops::rotate180(source),
        d if d == 270.0 => return imageops::rotate270(source),
        _ => {}
    }

    let (width, height) = source.dimensions();
    let (canvas_width, canvas_height) = expanded_size(width, height, degrees);

    // Move the source centre to the origin, turn, then move it to the centre
    // of the expanded canvas. imageproc's rotation is clockwise in image
    // space (y down), which is the editor's convention, so the angle is
    // used as-is.
    let projection = Projection::translate(canvas_width as f32 / 2.0, canvas_height as f32 / 2.0)
        * Projection::rotate(degrees.to_radians() as f32)
        * Projection::translate(-(width as f32) / 2.0, -(height as f32) / 2.0);

    let mut canvas = RgbaImage::from_pixel(canvas_width, canvas_height, Rgba([0, 0, 0, 0]));
    warp_into(
        source,
        &projection,
        Interpolation::Bicubic,
        Rgba([0, 0, 0, 0]),
        &mut canvas,
    );
    canvas
}

/// Bounding box of a `width`×`height` image turned by `degrees`.
pub fn expanded_size(width: u32, height: u32, degrees: f64) -> (u32, u32) {
    let (sin, cos) = degrees.to_radians().sin_cos();
    let (w, h) = (width as f64, height as f64);
    let bound_w = w * cos.abs() + h * sin.abs();
    let bound_h = w * sin.abs() + h * cos.abs();
    (
        (bound_w - CANVAS_EPSILON).ceil().max(1.0) as u32,
        (bound_h - CANVAS_EPSILON).ceil().max(1.0) as u32,
    )
}
