//! PDFium renderer that binds the native library on first use

use pdfstamp_core::{PageRenderer, PdfiumRenderer, Result};
use std::cell::RefCell;
use std::path::{Path, PathBuf};

/// Commands that never rasterize should not need libpdfium installed, so
/// binding is deferred until a page is actually rendered.
pub struct LazyPdfium {
    library_dir: Option<PathBuf>,
    bound: RefCell<Option<PdfiumRenderer>>,
}

impl LazyPdfium {
    pub fn new(library_dir: Option<PathBuf>) -> Self {
        Self {
            library_dir,
            bound: RefCell::new(None),
        }
    }

    #[cfg(test)]
    pub fn is_bound(&self) -> bool {
        self.bound.borrow().is_some()
    }
}

impl PageRenderer for LazyPdfium {
    fn render_pages(
        &self,
        source: &Path,
        dpi: u32,
        sink: &mut dyn FnMut(u32, image::RgbImage) -> Result<()>,
    ) -> Result<u32> {
        let mut slot = self.bound.borrow_mut();
        let renderer = match slot.take() {
            Some(renderer) => renderer,
            None => PdfiumRenderer::bind(self.library_dir.as_deref())?,
        };
        let result = renderer.render_pages(source, dpi, sink);
        *slot = Some(renderer);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nothing_is_bound_up_front() {
        let renderer = LazyPdfium::new(Some(PathBuf::from("/nonexistent/pdfium")));
        assert!(!renderer.is_bound());
    }
}
