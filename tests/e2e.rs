//! End-to-end tests against the real collaborators: PDFium, Tesseract and
//! the Gemini API.
//!
//! They are gated behind the `E2E_ENABLED` environment variable so they do
//! not run in CI unless explicitly requested. Tests that need a sample
//! document look for it in `./test_cases/` and skip when it is absent; tests
//! that call Gemini also need `GEMINI_API_KEY`.
//!
//! Run with:
//!   E2E_ENABLED=1 PDFIUM_LIB_PATH=/opt/pdfium/lib cargo test --test e2e -- --nocapture

use medocr::pipeline::ocr::ocr_document;
use medocr::pipeline::render::PageRasterizer;
use medocr::{
    DocumentExtractor, PdfiumRasterizer, PipelineError, ServiceConfig, TesseractEngine,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

/// Skip this test unless E2E_ENABLED is set.
macro_rules! e2e_skip_unless_enabled {
    () => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
    }};
}

/// Skip this test if E2E_ENABLED is not set *or* no file at `path`.
macro_rules! e2e_skip_unless_ready {
    ($path:expr) => {{
        e2e_skip_unless_enabled!();
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP — test file not found: {}", p.display());
            return;
        }
        p
    }};
}

/// Config from the environment; OCR-only unless a Gemini key is present.
fn env_config(scratch: &Path) -> Option<ServiceConfig> {
    let mut builder = ServiceConfig::builder().scratch_dir(scratch);
    if let Ok(lib) = std::env::var("PDFIUM_LIB_PATH") {
        builder = builder.pdfium_library_path(lib);
    }
    if let Ok(cmd) = std::env::var("TESSERACT_CMD") {
        builder = builder.tesseract_cmd(cmd);
    }
    match std::env::var("GEMINI_API_KEY") {
        Ok(key) if !key.trim().is_empty() => builder.api_key(key).build().ok(),
        _ => {
            println!("SKIP — GEMINI_API_KEY not set");
            None
        }
    }
}

fn ocr_config() -> ServiceConfig {
    let mut builder = ServiceConfig::builder();
    if let Ok(lib) = std::env::var("PDFIUM_LIB_PATH") {
        builder = builder.pdfium_library_path(lib);
    }
    if let Ok(cmd) = std::env::var("TESSERACT_CMD") {
        builder = builder.tesseract_cmd(cmd);
    }
    builder.build_ocr_only().expect("valid OCR config")
}

/// A one-page PDF with an empty page. The xref offsets are approximate;
/// PDFium rebuilds the table on load.
const BLANK_PDF: &[u8] = b"%PDF-1.4
1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj
2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj
3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >> endobj
xref
0 4
0000000000 65535 f
0000000009 00000 n
0000000058 00000 n
0000000115 00000 n
trailer << /Size 4 /Root 1 0 R >>
startxref
186
%%EOF
";

// ── Collaborator availability (no LLM) ──────────────────────────────────────

#[tokio::test]
async fn test_tesseract_probe() {
    e2e_skip_unless_enabled!();

    let engine = TesseractEngine::from_config(&ocr_config());
    let version = engine.probe().await.expect("tesseract should be installed");
    println!("Tesseract: {version}");
    assert!(version.to_lowercase().contains("tesseract"));
}

#[tokio::test]
async fn test_pdfium_renders_blank_page() {
    e2e_skip_unless_enabled!();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("blank.pdf");
    std::fs::write(&path, BLANK_PDF).unwrap();

    let rasterizer = PdfiumRasterizer::from_config(&ocr_config());
    let pages = rasterizer.rasterize(&path).expect("PDFium should render");
    assert_eq!(pages.len(), 1);
    // 612pt at 200 DPI.
    assert_eq!(pages[0].width(), 1700);
}

#[tokio::test]
async fn test_blank_pdf_has_no_text() {
    e2e_skip_unless_enabled!();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("blank.pdf");
    std::fs::write(&path, BLANK_PDF).unwrap();

    let config = ocr_config();
    let pages = ocr_document(
        &path,
        Arc::new(PdfiumRasterizer::from_config(&config)),
        &TesseractEngine::from_config(&config),
        1,
    )
    .await
    .expect("OCR should succeed");
    assert_eq!(pages.len(), 1);
    assert!(pages[0].text.trim().is_empty(), "got: {:?}", pages[0].text);
}

// ── Real documents (OCR only) ────────────────────────────────────────────────

#[tokio::test]
async fn test_ocr_lab_report_pdf() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("lab_report.pdf"));

    let config = ocr_config();
    let pages = ocr_document(
        &path,
        Arc::new(PdfiumRasterizer::from_config(&config)),
        &TesseractEngine::from_config(&config),
        2,
    )
    .await
    .expect("OCR should succeed");

    assert!(!pages.is_empty());
    for (i, p) in pages.iter().enumerate() {
        assert_eq!(p.page, i + 1);
    }
    let total: usize = pages.iter().map(|p| p.text.len()).sum();
    println!("{} page(s), {total} chars", pages.len());
    assert!(total > 50, "Output suspiciously short: {total} chars");
}

// ── Full pipeline (needs Gemini) ─────────────────────────────────────────────

#[tokio::test]
async fn test_extract_prescription_image() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("prescription.png"));
    let scratch = tempfile::tempdir().unwrap();
    let Some(config) = env_config(scratch.path()) else {
        return;
    };

    let extractor = DocumentExtractor::from_config(config).expect("extractor");
    let bytes = std::fs::read(&path).unwrap();
    let response = extractor
        .process_upload(bytes, "prescription.png")
        .await
        .expect("pipeline should succeed");

    println!(
        "{}",
        serde_json::to_string_pretty(&response.extracted_entities).unwrap()
    );
    assert_eq!(response.filename, "prescription.png");
    assert!(!response.ocr_text.trim().is_empty());
    assert!(
        response.extracted_entities.is_object(),
        "entities should be a JSON object"
    );
    assert!(
        response.extracted_entities.get("error").is_none(),
        "extraction fell back: {}",
        response.extracted_entities
    );
    assert!(std::fs::read_dir(scratch.path()).unwrap().next().is_none());
}

#[tokio::test]
async fn test_extract_blank_pdf_is_no_text() {
    e2e_skip_unless_enabled!();
    let scratch = tempfile::tempdir().unwrap();
    let Some(config) = env_config(scratch.path()) else {
        return;
    };

    let extractor = DocumentExtractor::from_config(config).expect("extractor");
    let err = extractor
        .process_upload(BLANK_PDF, "blank.pdf")
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::NoText), "got: {err}");
    assert!(std::fs::read_dir(scratch.path()).unwrap().next().is_none());
}
