//! Flatten a PDF into one full-page raster image per page
//!
//! Every page is rendered to a bitmap and replaced by a page that holds
//! nothing but that bitmap. Text, vector art and annotations stop being
//! separately extractable, which is the point.

use crate::error::{Result, StampError};
use crate::page;
use crate::render::PageRenderer;
use crate::xobject;
use image::RgbImage;
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tempfile::NamedTempFile;

/// Resolution used unless the caller picks one.
pub const DEFAULT_DPI: u32 = 200;

/// Highest accepted resolution. A Letter page at this DPI is already
/// roughly 10200x13200 pixels.
pub const MAX_DPI: u32 = 1200;

const RASTER_NAME: &str = "Im0";

/// A rasterized document in a scratch file, deleted on drop.
#[derive(Debug)]
pub struct RasterizedPdf {
    file: NamedTempFile,
    page_count: u32,
}

impl RasterizedPdf {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    pub fn bytes(&self) -> Result<Vec<u8>> {
        Ok(std::fs::read(self.file.path())?)
    }
}

/// Renders documents page by page and rebuilds them from the bitmaps.
pub struct Rasterizer<R> {
    renderer: R,
    dpi: u32,
    scratch_dir: Option<PathBuf>,
}

impl<R: PageRenderer> Rasterizer<R> {
    pub fn new(renderer: R) -> Self {
        Self {
            renderer,
            dpi: DEFAULT_DPI,
            scratch_dir: None,
        }
    }

    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.dpi = dpi;
        self
    }

    /// Directory for the output scratch file; the system temp dir otherwise.
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    pub fn dpi(&self) -> u32 {
        self.dpi
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// Rasterize every page of `source`, preserving page order and count.
    ///
    /// Either every page renders and a complete document is returned, or an
    /// error is returned and nothing is written.
    pub fn rasterize(&self, source: &Path) -> Result<RasterizedPdf> {
        if self.dpi == 0 || self.dpi > MAX_DPI {
            return Err(StampError::InvalidInput(format!(
                "DPI must be between 1 and {}, got {}",
                MAX_DPI, self.dpi
            )));
        }

        let expected = page::open_document(source)?.get_pages().len() as u32;
        if expected == 0 {
            return Err(StampError::Rasterization {
                page: 0,
                reason: "Document has no pages".to_string(),
            });
        }

        let started = Instant::now();
        let mut output = Document::with_version("1.7");
        let pages_id = output.new_object_id();
        let mut kids: Vec<Object> = Vec::with_capacity(expected as usize);

        self.renderer
            .render_pages(source, self.dpi, &mut |page_number, image| {
                if kids.len() as u32 >= expected {
                    return Err(StampError::Rasterization {
                        page: page_number,
                        reason: format!("Renderer produced more than {} pages", expected),
                    });
                }
                let page_id = add_raster_page(&mut output, pages_id, &image).map_err(|e| {
                    StampError::Rasterization {
                        page: page_number,
                        reason: e.to_string(),
                    }
                })?;
                kids.push(Object::Reference(page_id));
                tracing::debug!(
                    "Rasterized page {} to {}x{}",
                    page_number,
                    image.width(),
                    image.height()
                );
                Ok(())
            })?;

        let rendered = kids.len() as u32;
        if rendered != expected {
            return Err(StampError::Rasterization {
                page: rendered + 1,
                reason: format!("Renderer produced {} of {} pages", rendered, expected),
            });
        }

        output.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => rendered as i64,
            }),
        );
        let catalog_id = output.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        output.trailer.set("Root", catalog_id);

        let bytes = xobject::save_compacted(&mut output)?;
        let scratch_dir = self
            .scratch_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        let mut file = tempfile::Builder::new()
            .prefix("raster-")
            .suffix(".pdf")
            .tempfile_in(&scratch_dir)?;
        file.write_all(&bytes)?;
        file.flush()?;

        tracing::info!(
            "Rasterized {} pages at {} dpi ({} bytes) in {:?}",
            rendered,
            self.dpi,
            bytes.len(),
            started.elapsed()
        );

        Ok(RasterizedPdf {
            file,
            page_count: rendered,
        })
    }
}

/// Add a page whose MediaBox is the bitmap's pixel size, filled by the bitmap.
fn add_raster_page(doc: &mut Document, pages_id: ObjectId, image: &RgbImage) -> Result<ObjectId> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(StampError::InvalidInput("Rendered page is empty".to_string()));
    }

    let image_id = xobject::add_rgb_image(doc, image)?;
    let ops = format!("q {} 0 0 {} 0 0 cm /{} Do Q\n", width, height, RASTER_NAME);
    let content_id = doc.add_object(Stream::new(dictionary! {}, ops.into_bytes()));

    Ok(doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), (width as i64).into(), (height as i64).into()],
        "Contents" => content_id,
        "Resources" => dictionary! {
            "XObject" => dictionary! { RASTER_NAME => image_id },
        },
    }))
}
