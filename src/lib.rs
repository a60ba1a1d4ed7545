//! # medocr
//!
//! Turn scanned medical documents into structured JSON.
//!
//! A client uploads a PDF or an image; the service OCRs every page with
//! Tesseract and asks a language model (Gemini by default) to pull a fixed set
//! of fields out of the text: patient name and age, the diagnosed condition,
//! lab values, doctor details, vitals, prescriptions and free-text notes.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload
//!  │
//!  ├─ 1. Stage    write to a request-scoped temp file
//!  ├─ 2. Render   PDF pages via pdfium (spawn_blocking) or decode the image
//!  ├─ 3. OCR      tesseract per page, joined with "--- Page Break ---"
//!  ├─ 4. Extract  one model call, JSON mode
//!  ├─ 5. Parse    fence cleanup, fallback object on malformed JSON
//!  └─ 6. Respond  {filename, ocr_text, extracted_entities}
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use medocr::{server, DocumentExtractor, ServiceConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServiceConfig::builder()
//!         .api_key(std::env::var("GEMINI_API_KEY")?)
//!         .build()?;
//!     let addr = config.bind_addr;
//!     let extractor = Arc::new(DocumentExtractor::from_config(config)?);
//!     server::serve(extractor, addr).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `medocr` binary (clap + anyhow + tracing-subscriber) |
//!
//! ## Runtime Dependencies
//!
//! Tesseract must be installed (on `PATH`, or at the installer's default
//! location on Windows). PDF uploads additionally need the PDFium shared
//! library; point `PDFIUM_LIB_PATH` at it when it is not on the loader path.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extractor;
pub mod output;
pub mod pipeline;
pub mod prompts;
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ServiceConfig, ServiceConfigBuilder};
pub use error::{ExtractionError, MedocrError, OcrError, PipelineError};
pub use extractor::DocumentExtractor;
pub use output::{ExtractionOutcome, ExtractionResponse, PageText};
pub use pipeline::llm::{ExtractionBackend, GeminiBackend, ProviderBackend};
pub use pipeline::ocr::{OcrEngine, TesseractEngine};
pub use pipeline::render::{PageRasterizer, PdfiumRasterizer};
pub use server::{router, ApiError};
