//! OCR: page images → text via the Tesseract command-line engine.
//!
//! Tesseract is driven as a subprocess (`tesseract stdin stdout -l <lang>`)
//! with the PNG-encoded page piped on stdin, so no per-page files are written
//! and nothing needs cleaning up besides the child process itself, which is
//! killed if the request future is dropped.

use crate::config::ServiceConfig;
use crate::error::OcrError;
use crate::output::PageText;
use crate::pipeline::encode::encode_png;
use crate::pipeline::input::{detect_kind, DocumentKind};
use crate::pipeline::render::{load_image, render_pdf, PageRasterizer};
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Recognises the text on one page image.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    async fn recognize(&self, page: &DynamicImage) -> Result<String, OcrError>;
}

/// [`OcrEngine`] that shells out to the Tesseract CLI.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    command: PathBuf,
    language: String,
}

impl TesseractEngine {
    pub fn new(command: impl Into<PathBuf>, language: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            language: language.into(),
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(config.tesseract_cmd.clone(), config.ocr_language.clone())
    }

    pub fn command(&self) -> &Path {
        &self.command
    }

    /// Run `tesseract --version` and return its first output line.
    ///
    /// Used at startup to warn early when the binary is missing; requests
    /// still fail individually if it stays missing.
    pub async fn probe(&self) -> Result<String, OcrError> {
        let output = Command::new(&self.command)
            .arg("--version")
            .output()
            .await
            .map_err(|e| self.unavailable(e))?;

        // Older releases print the banner on stderr.
        let text = if output.stdout.is_empty() {
            String::from_utf8_lossy(&output.stderr).into_owned()
        } else {
            String::from_utf8_lossy(&output.stdout).into_owned()
        };
        Ok(text.lines().next().unwrap_or_default().trim().to_string())
    }

    fn unavailable(&self, e: std::io::Error) -> OcrError {
        OcrError::EngineUnavailable {
            command: self.command.display().to_string(),
            detail: e.to_string(),
        }
    }
}

#[async_trait]
impl OcrEngine for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn recognize(&self, page: &DynamicImage) -> Result<String, OcrError> {
        let png = encode_png(page)
            .map_err(|e| OcrError::Internal(format!("Page encoding failed: {e}")))?;

        let mut child = Command::new(&self.command)
            .args(["stdin", "stdout", "-l", self.language.as_str()])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.unavailable(e))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| OcrError::Internal("tesseract stdin was not captured".into()))?;

        // Feed stdin while draining stdout; a large page would otherwise
        // deadlock once both pipe buffers fill.
        let writer = tokio::spawn(async move {
            let result = stdin.write_all(&png).await;
            drop(stdin);
            result
        });

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| OcrError::EngineFailed {
                detail: format!("waiting for tesseract: {e}"),
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(OcrError::EngineFailed {
                detail: format!("exit status {}: {}", output.status, stderr.trim()),
            });
        }

        match writer.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(OcrError::EngineFailed {
                    detail: format!("writing page to tesseract: {e}"),
                })
            }
            Err(e) => return Err(OcrError::Internal(format!("stdin writer panicked: {e}"))),
        }

        if !stderr.trim().is_empty() {
            debug!("tesseract: {}", stderr.trim());
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// OCR a staged document, returning one [`PageText`] per page in page order.
///
/// PDFs are rasterised first; anything else is decoded as a single image.
/// Pages are recognised `concurrency` at a time; ordering is preserved.
pub async fn ocr_document(
    path: &Path,
    rasterizer: Arc<dyn PageRasterizer>,
    engine: &dyn OcrEngine,
    concurrency: usize,
) -> Result<Vec<PageText>, OcrError> {
    let kind = {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || detect_kind(&path))
            .await
            .map_err(|e| OcrError::Internal(format!("Type detection task panicked: {e}")))??
    };
    let images = match kind {
        DocumentKind::Pdf => render_pdf(rasterizer, path).await?,
        DocumentKind::Image => vec![load_image(path).await?],
    };
    info!(
        "Running {} OCR on {} page(s) of {}",
        engine.name(),
        images.len(),
        path.display()
    );

    let pages: Vec<PageText> = stream::iter(images.into_iter().enumerate())
        .map(|(idx, img)| async move {
            let text = engine.recognize(&img).await?;
            Ok::<_, OcrError>(PageText {
                page: idx + 1,
                text,
            })
        })
        .buffered(concurrency.max(1))
        .try_collect()
        .await?;

    for p in pages.iter().filter(|p| p.text.trim().is_empty()) {
        warn!("Page {}: OCR produced no text", p.page);
    }
    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns the image width as text so each page is identifiable.
    struct WidthEngine {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl OcrEngine for WidthEngine {
        fn name(&self) -> &str {
            "width"
        }

        async fn recognize(&self, page: &DynamicImage) -> Result<String, OcrError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            // Later pages answer sooner, to prove ordering survives concurrency.
            tokio::time::sleep(std::time::Duration::from_millis(
                (20u32.saturating_sub(page.width())) as u64,
            ))
            .await;
            Ok(format!("width {}", page.width()))
        }
    }

    struct WidePages;

    impl PageRasterizer for WidePages {
        fn rasterize(&self, _pdf_path: &Path) -> Result<Vec<DynamicImage>, OcrError> {
            Ok((1..=4)
                .map(|w| DynamicImage::ImageRgb8(RgbImage::new(w, 1)))
                .collect())
        }
    }

    struct NoPdfium;

    impl PageRasterizer for NoPdfium {
        fn rasterize(&self, _pdf_path: &Path) -> Result<Vec<DynamicImage>, OcrError> {
            Err(OcrError::RasterizerUnavailable {
                detail: "not installed".into(),
            })
        }
    }

    #[tokio::test]
    async fn pdf_pages_keep_order_under_concurrency() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.pdf");
        std::fs::write(&path, b"%PDF-1.4").unwrap();

        let engine = WidthEngine {
            calls: AtomicUsize::new(0),
        };
        let pages = ocr_document(&path, Arc::new(WidePages), &engine, 4)
            .await
            .unwrap();

        assert_eq!(engine.calls.load(Ordering::SeqCst), 4);
        let numbered: Vec<(usize, &str)> =
            pages.iter().map(|p| (p.page, p.text.as_str())).collect();
        assert_eq!(
            numbered,
            vec![(1, "width 1"), (2, "width 2"), (3, "width 3"), (4, "width 4")]
        );
    }

    #[tokio::test]
    async fn image_is_a_single_page() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.png");
        RgbImage::from_pixel(7, 3, Rgb([0, 0, 0])).save(&path).unwrap();

        let engine = WidthEngine {
            calls: AtomicUsize::new(0),
        };
        let pages = ocr_document(&path, Arc::new(NoPdfium), &engine, 1)
            .await
            .unwrap();
        assert_eq!(
            pages,
            vec![PageText {
                page: 1,
                text: "width 7".into()
            }]
        );
    }

    #[tokio::test]
    async fn rasterizer_failure_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.pdf");
        std::fs::write(&path, b"%PDF-1.4").unwrap();

        let engine = WidthEngine {
            calls: AtomicUsize::new(0),
        };
        let err = ocr_document(&path, Arc::new(NoPdfium), &engine, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, OcrError::RasterizerUnavailable { .. }));
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    }

    fn assert_send<T: Send>(_: &T) {}

    #[test]
    fn ocr_document_future_is_send() {
        let engine = WidthEngine {
            calls: AtomicUsize::new(0),
        };
        let fut = ocr_document(Path::new("doc.pdf"), Arc::new(WidePages), &engine, 2);
        assert_send(&fut);
    }

    #[tokio::test]
    async fn missing_tesseract_binary_is_unavailable() {
        let engine = TesseractEngine::new("/definitely/not/tesseract", "eng");
        let img = DynamicImage::ImageRgb8(RgbImage::new(4, 4));
        let err = engine.recognize(&img).await.unwrap_err();
        assert!(
            matches!(err, OcrError::EngineUnavailable { .. }),
            "got: {err:?}"
        );
        assert!(err.to_string().contains("/definitely/not/tesseract"));

        let err = engine.probe().await.unwrap_err();
        assert!(matches!(err, OcrError::EngineUnavailable { .. }));
    }
}
