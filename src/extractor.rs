//! End-to-end document processing: staged upload → OCR → entities.
//!
//! [`DocumentExtractor`] owns one instance of every collaborator (rasterizer,
//! OCR engine, extraction backend) and is shared by all requests behind an
//! `Arc`. It holds no per-request state; each call to
//! [`DocumentExtractor::process_upload`] is independent.

use crate::config::ServiceConfig;
use crate::error::{MedocrError, OcrError, PipelineError};
use crate::output::{join_pages, ExtractionResponse, PageText};
use crate::pipeline::input::StagedUpload;
use crate::pipeline::llm::{backend_from_config, extract_entities, ExtractionBackend};
use crate::pipeline::ocr::{ocr_document, OcrEngine, TesseractEngine};
use crate::pipeline::render::{PageRasterizer, PdfiumRasterizer};
use bytes::Bytes;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// The OCR + extraction pipeline with its collaborators bound.
pub struct DocumentExtractor {
    config: Arc<ServiceConfig>,
    rasterizer: Arc<dyn PageRasterizer>,
    ocr: Arc<dyn OcrEngine>,
    backend: Arc<dyn ExtractionBackend>,
}

impl DocumentExtractor {
    /// Wire up PDFium, Tesseract and the configured model backend.
    pub fn from_config(config: ServiceConfig) -> Result<Self, MedocrError> {
        let backend = backend_from_config(&config)?;
        let rasterizer = Arc::new(PdfiumRasterizer::from_config(&config));
        let ocr = Arc::new(TesseractEngine::from_config(&config));
        Ok(Self::new(config, rasterizer, ocr, backend))
    }

    /// Assemble from explicit parts. Tests use this to swap in fakes.
    pub fn new(
        config: ServiceConfig,
        rasterizer: Arc<dyn PageRasterizer>,
        ocr: Arc<dyn OcrEngine>,
        backend: Arc<dyn ExtractionBackend>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            rasterizer,
            ocr,
            backend,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// OCR a local file, one entry per page.
    pub async fn ocr_pages(&self, path: &Path) -> Result<Vec<PageText>, OcrError> {
        ocr_document(
            path,
            Arc::clone(&self.rasterizer),
            self.ocr.as_ref(),
            self.config.ocr_concurrency,
        )
        .await
    }

    /// Run the full pipeline on a file already on disk.
    ///
    /// `filename` is echoed back in the response and used for logging only.
    pub async fn process_file(
        &self,
        path: &Path,
        filename: &str,
    ) -> Result<ExtractionResponse, PipelineError> {
        let start = Instant::now();

        let pages = self.ocr_pages(path).await?;
        let ocr_text = join_pages(&pages);
        if ocr_text.trim().is_empty() {
            info!("OCR found no text in '{filename}'");
            return Err(PipelineError::NoText);
        }

        let outcome = extract_entities(self.backend.as_ref(), &ocr_text).await;
        let parsed = outcome.is_parsed();

        let response = ExtractionResponse {
            filename: filename.to_string(),
            ocr_text,
            extracted_entities: outcome.into_entities(),
        };

        info!(
            "Processed '{}': {} page(s), {} chars of text, entities {} in {:?}",
            filename,
            pages.len(),
            response.ocr_text.len(),
            if parsed { "extracted" } else { "fell back to error object" },
            start.elapsed()
        );
        if let Ok(payload) = serde_json::to_string(&response) {
            debug!("Final response payload: {payload}");
        }
        Ok(response)
    }

    /// Stage `bytes` in a temporary file, run the pipeline, then remove it.
    ///
    /// The staged file is gone when this returns, whatever the result.
    pub async fn process_upload(
        &self,
        bytes: impl Into<Bytes>,
        filename: &str,
    ) -> Result<ExtractionResponse, PipelineError> {
        let bytes = bytes.into();
        let len = bytes.len();
        let staged =
            StagedUpload::stage_blocking(bytes, filename, self.config.scratch_dir.as_deref())
                .await
                .map_err(PipelineError::Staging)?;
        info!(
            "Received '{}' ({} bytes), staged at {}",
            filename,
            len,
            staged.path().display()
        );

        let result = self.process_file(staged.path(), filename).await;
        staged.close();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExtractionError;
    use async_trait::async_trait;
    use image::{DynamicImage, Rgb, RgbImage};
    use std::sync::Mutex;

    struct ThreePages;

    impl PageRasterizer for ThreePages {
        fn rasterize(&self, _pdf_path: &Path) -> Result<Vec<DynamicImage>, OcrError> {
            Ok((1..=3)
                .map(|w| DynamicImage::ImageRgb8(RgbImage::new(w, 1)))
                .collect())
        }
    }

    /// Reads "page N" off an N-pixel-wide image, or only whitespace when `blank`.
    struct ByWidth {
        blank: bool,
    }

    #[async_trait]
    impl OcrEngine for ByWidth {
        fn name(&self) -> &str {
            "by-width"
        }

        async fn recognize(&self, page: &DynamicImage) -> Result<String, OcrError> {
            if self.blank {
                Ok("  \n".into())
            } else {
                Ok(format!("page {}", page.width()))
            }
        }
    }

    #[derive(Default)]
    struct RecordingBackend {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ExtractionBackend for RecordingBackend {
        fn name(&self) -> &str {
            "recording"
        }

        async fn generate_json(&self, prompt: &str) -> Result<String, ExtractionError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(r#"{"name": "Jane Roe"}"#.into())
        }
    }

    fn extractor(blank: bool, scratch: &Path) -> (DocumentExtractor, Arc<RecordingBackend>) {
        let backend = Arc::new(RecordingBackend::default());
        let config = ServiceConfig::builder()
            .api_key("k")
            .scratch_dir(scratch)
            .build()
            .unwrap();
        let ex = DocumentExtractor::new(
            config,
            Arc::new(ThreePages),
            Arc::new(ByWidth { blank }),
            backend.clone(),
        );
        (ex, backend)
    }

    fn is_empty_dir(dir: &Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    fn png_bytes() -> Vec<u8> {
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([255, 255, 255])))
            .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    fn assert_send<T: Send>(_: &T) {}

    #[test]
    fn process_upload_future_is_send() {
        let scratch = tempfile::tempdir().unwrap();
        let (ex, _) = extractor(false, scratch.path());
        let fut = ex.process_upload(Bytes::from_static(b"%PDF-1.4"), "a.pdf");
        assert_send(&fut);
    }

    #[tokio::test]
    async fn pdf_upload_end_to_end() {
        let scratch = tempfile::tempdir().unwrap();
        let (ex, backend) = extractor(false, scratch.path());

        let resp = ex
            .process_upload(Bytes::from_static(b"%PDF-1.4 fake"), "labs.pdf")
            .await
            .unwrap();
        assert_eq!(resp.filename, "labs.pdf");
        assert_eq!(
            resp.ocr_text,
            "page 1\n\n--- Page Break ---\n\npage 2\n\n--- Page Break ---\n\npage 3"
        );
        assert_eq!(resp.extracted_entities["name"], "Jane Roe");

        let prompts = backend.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("page 1"));
        drop(prompts);
        assert!(is_empty_dir(scratch.path()));
    }

    #[tokio::test]
    async fn blank_image_skips_extraction() {
        let scratch = tempfile::tempdir().unwrap();
        let (ex, backend) = extractor(true, scratch.path());

        let err = ex.process_upload(png_bytes(), "blank.png").await.unwrap_err();
        assert!(matches!(err, PipelineError::NoText));
        assert!(backend.prompts.lock().unwrap().is_empty());
        assert!(is_empty_dir(scratch.path()));
    }

    #[tokio::test]
    async fn blank_multi_page_pdf_still_reaches_extraction() {
        // The no-text check applies to the joined text, which carries the
        // page-break markers once there is more than one page.
        let scratch = tempfile::tempdir().unwrap();
        let (ex, backend) = extractor(true, scratch.path());

        let resp = ex
            .process_upload(Bytes::from_static(b"%PDF-1.4 fake"), "blank.pdf")
            .await
            .unwrap();
        assert_eq!(resp.ocr_text.matches("--- Page Break ---").count(), 2);
        assert_eq!(backend.prompts.lock().unwrap().len(), 1);
        assert!(is_empty_dir(scratch.path()));
    }

    #[tokio::test]
    async fn ocr_failure_still_removes_staged_file() {
        let scratch = tempfile::tempdir().unwrap();
        let (ex, _) = extractor(false, scratch.path());

        // Not a PDF and not a decodable image.
        let err = ex
            .process_upload(Bytes::from_static(b"plain text"), "notes.txt")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Ocr(OcrError::UnreadableImage { .. })
        ));
        assert!(is_empty_dir(scratch.path()));
    }
}
