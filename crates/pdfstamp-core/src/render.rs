//! Page rendering backends for the rasterizer

use crate::error::{Result, StampError};
use crate::page;
use image::{Rgb, RgbImage};
use std::path::Path;

/// PDF points per inch.
pub const POINTS_PER_INCH: f64 = 72.0;

/// Turns the pages of a PDF into bitmaps.
pub trait PageRenderer {
    /// Render every page of `source` at `dpi`, in page order, handing each
    /// bitmap to `sink` together with its 1-based page number. Returns the
    /// number of pages rendered.
    fn render_pages(
        &self,
        source: &Path,
        dpi: u32,
        sink: &mut dyn FnMut(u32, RgbImage) -> Result<()>,
    ) -> Result<u32>;
}

/// Largest bitmap a single page may render to. Letter and A4 at the maximum
/// DPI fit; poster-sized pages at high DPI do not.
pub const MAX_PAGE_PIXELS: u64 = 150_000_000;

/// Pixel extent of `points` at `dpi`, never less than one pixel.
pub fn pixels_for(points: f64, dpi: u32) -> u32 {
    (points * dpi as f64 / POINTS_PER_INCH)
        .round()
        .clamp(1.0, u32::MAX as f64) as u32
}

/// Bitmap size of a `width`×`height` point page at `dpi`, refusing pages
/// whose bitmap would exceed [`MAX_PAGE_PIXELS`].
pub fn raster_size(page_number: u32, width: f64, height: f64, dpi: u32) -> Result<(u32, u32)> {
    let (w, h) = (pixels_for(width, dpi), pixels_for(height, dpi));
    let pixels = w as u64 * h as u64;
    if pixels > MAX_PAGE_PIXELS {
        return Err(StampError::Rasterization {
            page: page_number,
            reason: format!(
                "{}x{} pixels at {} dpi exceeds the {} pixel limit",
                w, h, dpi, MAX_PAGE_PIXELS
            ),
        });
    }
    Ok((w, h))
}

/// Renders every page as plain white at its page-box size.
///
/// Page geometry comes from the PDF itself, so this is enough to exercise
/// the rasterization pipeline where no PDFium library is installed.
#[derive(Debug, Default, Clone, Copy)]
pub struct BlankRenderer;

impl PageRenderer for BlankRenderer {
    fn render_pages(
        &self,
        source: &Path,
        dpi: u32,
        sink: &mut dyn FnMut(u32, RgbImage) -> Result<()>,
    ) -> Result<u32> {
        let doc = page::open_document(source)?;
        let mut rendered = 0;
        for (page_number, page_id) in doc.get_pages() {
            let page_box = page::page_box(&doc, page_id);
            let (width, height) = raster_size(
                page_number,
                page_box.visible_width(),
                page_box.visible_height(),
                dpi,
            )?;
            let image = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
            sink(page_number, image)?;
            rendered += 1;
        }
        Ok(rendered)
    }
}

#[cfg(feature = "pdfium")]
pub use self::pdfium::PdfiumRenderer;

#[cfg(feature = "pdfium")]
mod pdfium {
    use super::*;
    use pdfium_render::prelude::*;

    /// Renderer backed by a PDFium shared library bound at runtime.
    pub struct PdfiumRenderer {
        pdfium: Pdfium,
    }

    impl PdfiumRenderer {
        /// Bind libpdfium from `library_dir` if given, else from the working
        /// directory, else from the system library path.
        pub fn bind(library_dir: Option<&Path>) -> Result<Self> {
            let local = library_dir
                .map(|dir| dir.to_path_buf())
                .unwrap_or_else(|| Path::new("./").to_path_buf());
            let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(
                local.to_string_lossy().as_ref(),
            ))
            .or_else(|_| Pdfium::bind_to_system_library())
            .map_err(|e| StampError::Rasterization {
                page: 0,
                reason: format!("Failed to load PDFium library: {:?}", e),
            })?;
            tracing::debug!("Bound PDFium (searched {})", local.display());
            Ok(Self {
                pdfium: Pdfium::new(bindings),
            })
        }
    }

    impl PageRenderer for PdfiumRenderer {
        fn render_pages(
            &self,
            source: &Path,
            dpi: u32,
            sink: &mut dyn FnMut(u32, RgbImage) -> Result<()>,
        ) -> Result<u32> {
            let document = self
                .pdfium
                .load_pdf_from_file(source, None)
                .map_err(|e| StampError::PdfOpen(format!("{}: {:?}", source.display(), e)))?;

            let scale = (dpi as f64 / POINTS_PER_INCH) as f32;
            let config = PdfRenderConfig::new().scale_page_by_factor(scale);

            let mut rendered = 0;
            for (index, pdf_page) in document.pages().iter().enumerate() {
                let page_number = index as u32 + 1;
                raster_size(
                    page_number,
                    pdf_page.width().value as f64,
                    pdf_page.height().value as f64,
                    dpi,
                )?;
                let bitmap = pdf_page
                    .render_with_config(&config)
                    .map_err(|e| StampError::Rasterization {
                        page: page_number,
                        reason: format!("{:?}", e),
                    })?;
                let image = flatten_rgba(
                    bitmap.width() as u32,
                    bitmap.height() as u32,
                    &bitmap.as_rgba_bytes(),
                )
                .ok_or_else(|| StampError::Rasterization {
                    page: page_number,
                    reason: "Bitmap size does not match its dimensions".to_string(),
                })?;
                sink(page_number, image)?;
                rendered += 1;
            }
            Ok(rendered)
        }
    }

    /// Composite RGBA samples over white.
    pub(super) fn flatten_rgba(width: u32, height: u32, rgba: &[u8]) -> Option<RgbImage> {
        if width == 0 || height == 0 || rgba.len() != (width as usize) * (height as usize) * 4 {
            return None;
        }
        let rgb = rgba
            .chunks_exact(4)
            .flat_map(|px| {
                let alpha = px[3] as u32;
                let blend = move |c: u8| ((c as u32 * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
                [blend(px[0]), blend(px[1]), blend(px[2])]
            })
            .collect();
        RgbImage::from_raw(width, height, rgb)
    }
}
