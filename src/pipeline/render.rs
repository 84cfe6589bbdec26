//! PDF rasterisation: render selected pages to `DynamicImage` via pdfium.
//!
//! ## Why cap pixels as well as DPI?
//!
//! Scans are usually A4, but a stray A0 plan at 200 DPI would produce a
//! 6,600 × 9,300 px image that tesseract then chews on for minutes.
//! `max_rendered_pixels` caps the longest edge regardless of physical size.
//!
//! pdfium keeps thread-local state and blocks; callers run the renderer inside
//! `tokio::task::spawn_blocking`.

use crate::error::CollaboratorError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info, warn};

/// Rasterises the pages of a PDF.
pub trait PageRenderer: Send + Sync {
    /// Number of pages in `pdf`.
    fn page_count(&self, pdf: &Path) -> Result<usize, CollaboratorError>;

    /// Render the 0-based `indices` of `pdf`.
    ///
    /// Returns `(page_index_0based, image)` pairs; out-of-range indices are
    /// skipped.
    fn render_pages(
        &self,
        pdf: &Path,
        indices: &[usize],
    ) -> Result<Vec<(usize, DynamicImage)>, CollaboratorError>;
}

/// The default renderer, backed by the pdfium library.
#[derive(Debug, Clone)]
pub struct PdfiumRenderer {
    dpi: u32,
    max_rendered_pixels: u32,
}

impl PdfiumRenderer {
    pub fn new(dpi: u32, max_rendered_pixels: u32) -> Self {
        Self {
            dpi,
            max_rendered_pixels,
        }
    }

    fn render_config(&self) -> PdfRenderConfig {
        PdfRenderConfig::new()
            .scale_page_by_factor(self.dpi as f32 / 72.0)
            .set_maximum_width(pixel_limit(self.max_rendered_pixels))
            .set_maximum_height(pixel_limit(self.max_rendered_pixels))
    }
}

/// pdfium takes `i32` bounds; larger limits saturate.
fn pixel_limit(px: u32) -> i32 {
    i32::try_from(px).unwrap_or(i32::MAX)
}

/// Bind pdfium from the working directory, falling back to the system library.
fn bind_pdfium() -> Result<Pdfium, CollaboratorError> {
    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| CollaboratorError::new("pdfium", format!("library not available: {:?}", e)))?;
    Ok(Pdfium::new(bindings))
}

fn load_error(e: PdfiumError) -> CollaboratorError {
    CollaboratorError::new("pdfium", format!("failed to open document: {:?}", e))
}

impl PageRenderer for PdfiumRenderer {
    fn page_count(&self, pdf: &Path) -> Result<usize, CollaboratorError> {
        let pdfium = bind_pdfium()?;
        let document = pdfium.load_pdf_from_file(pdf, None).map_err(load_error)?;
        Ok(document.pages().len() as usize)
    }

    fn render_pages(
        &self,
        pdf: &Path,
        indices: &[usize],
    ) -> Result<Vec<(usize, DynamicImage)>, CollaboratorError> {
        let pdfium = bind_pdfium()?;
        let document = pdfium.load_pdf_from_file(pdf, None).map_err(load_error)?;

        let pages = document.pages();
        let total_pages = pages.len() as usize;
        info!("{}: {} pages, rendering {}", pdf.display(), total_pages, indices.len());

        let render_config = self.render_config();
        let mut results = Vec::with_capacity(indices.len());

        for &idx in indices {
            if idx >= total_pages {
                warn!(
                    "Skipping page {} (out of range, total={})",
                    idx + 1,
                    total_pages
                );
                continue;
            }

            let page = pages.get(idx as u16).map_err(|e| {
                CollaboratorError::new("pdfium", format!("page {}: {:?}", idx + 1, e))
            })?;

            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                CollaboratorError::new("pdfium", format!("page {}: {:?}", idx + 1, e))
            })?;

            let image = bitmap.as_image();
            debug!(
                "Rendered page {} → {}x{} px",
                idx + 1,
                image.width(),
                image.height()
            );

            results.push((idx, image));
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_limit_saturates() {
        assert_eq!(pixel_limit(3000), 3000);
        assert_eq!(pixel_limit(i32::MAX as u32), i32::MAX);
        assert_eq!(pixel_limit(u32::MAX), i32::MAX);
    }
}
