//! Rasterisation: PDF pages → `DynamicImage`, and image uploads → `DynamicImage`.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the PDFium C++ library, which keeps thread-local
//! state and does heavy CPU work; image decoding is CPU-bound too. Both run on
//! tokio's blocking pool so request handling on the worker threads never
//! stalls behind a 40-page scan.
//!
//! ## Why a trait?
//!
//! [`PageRasterizer`] hides how the PDFium library was located (explicit path,
//! system library) from the request path, and lets tests hand the pipeline
//! synthetic pages without a PDFium install.

use crate::config::ServiceConfig;
use crate::error::OcrError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Turns a PDF file into one image per page, in page order.
///
/// Implementations are blocking; [`render_pdf`] moves them off the runtime.
pub trait PageRasterizer: Send + Sync {
    fn rasterize(&self, pdf_path: &Path) -> Result<Vec<DynamicImage>, OcrError>;
}

/// Rasterise `pdf_path` on the blocking pool.
pub async fn render_pdf(
    rasterizer: Arc<dyn PageRasterizer>,
    pdf_path: &Path,
) -> Result<Vec<DynamicImage>, OcrError> {
    let path = pdf_path.to_path_buf();
    tokio::task::spawn_blocking(move || rasterizer.rasterize(&path))
        .await
        .map_err(|e| OcrError::Internal(format!("Render task panicked: {e}")))?
}

/// Decode a non-PDF upload as a single image on the blocking pool.
///
/// The format is guessed from content, not the extension, so a PNG uploaded
/// as `scan.jpg` still decodes.
pub async fn load_image(path: &Path) -> Result<DynamicImage, OcrError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || load_image_blocking(&path))
        .await
        .map_err(|e| OcrError::Internal(format!("Image decode task panicked: {e}")))?
}

fn load_image_blocking(path: &Path) -> Result<DynamicImage, OcrError> {
    let reader = image::ImageReader::open(path)
        .map_err(|source| OcrError::Io {
            path: path.to_path_buf(),
            source,
        })?
        .with_guessed_format()
        .map_err(|source| OcrError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    let img = reader.decode().map_err(|e| OcrError::UnreadableImage {
        detail: e.to_string(),
    })?;
    debug!("Decoded image {}x{}", img.width(), img.height());
    Ok(img)
}

/// [`PageRasterizer`] backed by PDFium.
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    library_path: Option<PathBuf>,
    dpi: u32,
    max_pixels: u32,
}

impl PdfiumRasterizer {
    /// `library_path` may name the library file or the directory holding it;
    /// `None` binds the system library.
    pub fn new(library_path: Option<PathBuf>, dpi: u32, max_pixels: u32) -> Self {
        Self {
            library_path,
            dpi,
            max_pixels,
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(
            config.pdfium_library_path.clone(),
            config.dpi,
            config.max_rendered_pixels,
        )
    }

    fn bind(&self) -> Result<Pdfium, OcrError> {
        let bindings = match &self.library_path {
            Some(path) if path.is_dir() => {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(path))
            }
            Some(path) => Pdfium::bind_to_library(path),
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| OcrError::RasterizerUnavailable {
            detail: e.to_string(),
        })?;
        Ok(Pdfium::new(bindings))
    }

    /// Pixel width for a page `width_pts` points wide, capped at `max_pixels`.
    fn target_width(&self, width_pts: f32) -> i32 {
        let cap = i32::try_from(self.max_pixels).unwrap_or(i32::MAX).max(1);
        let px = (width_pts * self.dpi as f32 / 72.0).round() as i32;
        px.clamp(1, cap)
    }
}

impl PageRasterizer for PdfiumRasterizer {
    fn rasterize(&self, pdf_path: &Path) -> Result<Vec<DynamicImage>, OcrError> {
        let pdfium = self.bind()?;

        let document = pdfium
            .load_pdf_from_file(pdf_path, None)
            .map_err(|e| OcrError::CorruptPdf {
                detail: format!("{e:?}"),
            })?;

        let pages = document.pages();
        info!("PDF loaded: {} pages", pages.len());

        let mut images = Vec::with_capacity(pages.len() as usize);
        for (idx, page) in pages.iter().enumerate() {
            let render_config = PdfRenderConfig::new()
                .set_target_width(self.target_width(page.width().value))
                .set_maximum_height(i32::try_from(self.max_pixels).unwrap_or(i32::MAX));

            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                OcrError::RasterisationFailed {
                    page: idx + 1,
                    detail: format!("{e:?}"),
                }
            })?;

            let image = bitmap.as_image();
            debug!(
                "Rendered page {} → {}x{} px",
                idx + 1,
                image.width(),
                image.height()
            );
            images.push(image);
        }

        Ok(images)
    }
}
