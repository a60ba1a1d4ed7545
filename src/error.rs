//! Error types for the medocr library.
//!
//! Failures are split by how far they are allowed to travel:
//!
//! * [`MedocrError`] — **Fatal**: the service cannot start or keep serving
//!   (missing API key, bad configuration, socket bind failure).
//!
//! * [`OcrError`] — the text-extraction step failed (rasterizer missing,
//!   undecodable image, Tesseract crashed). Surfaces to HTTP clients as a 500.
//!
//! * [`ExtractionError`] — the model call failed. Never leaves the extraction
//!   step: it is folded into [`crate::output::ExtractionOutcome::Failed`] and
//!   returned to the client inside a 200 response.
//!
//! * [`PipelineError`] — the per-request result of the whole pipeline, so the
//!   HTTP layer can tell a staging failure from an OCR failure from an empty
//!   document without string matching.

use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors raised while configuring or running the service.
#[derive(Debug, Error)]
pub enum MedocrError {
    /// The selected provider needs an API key and none was supplied.
    #[error("{env_var} not found. Set it in the environment or pass --api-key to use provider '{provider}'.")]
    MissingApiKey {
        provider: String,
        env_var: &'static str,
    },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// `edgequake-llm` could not construct the named provider.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The HTTP listener could not be bound.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The HTTP server stopped with an I/O error.
    #[error("Server error: {0}")]
    Server(#[source] std::io::Error),
}

/// Failures while turning a document into text.
#[derive(Debug, Error)]
pub enum OcrError {
    /// The staged document could not be read.
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The PDFium library could not be loaded.
    #[error(
        "Failed to process PDF. Is PDFium installed and discoverable? \
         Set PDFIUM_LIB_PATH to the libpdfium file. Error: {detail}"
    )]
    RasterizerUnavailable { detail: String },

    /// PDFium loaded but refused the document.
    #[error("Failed to process PDF: the document could not be opened: {detail}")]
    CorruptPdf { detail: String },

    /// A single page failed to render.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// The upload is not a PDF and not a decodable image.
    #[error("Failed to open image: {detail}")]
    UnreadableImage { detail: String },

    /// The OCR binary could not be spawned.
    #[error("OCR engine '{command}' could not be started: {detail}. Is Tesseract installed and on PATH?")]
    EngineUnavailable { command: String, detail: String },

    /// The OCR binary ran but reported failure.
    #[error("OCR engine failed: {detail}")]
    EngineFailed { detail: String },

    /// Unexpected internal error (task panic, encoding failure).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failures while calling the extraction model.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Transport-level failure talking to the model API.
    #[error("Request to extraction service failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("Extraction service returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    /// The API answered 200 with a body that is not a `generateContent`
    /// response. `body` is kept for the fallback payload.
    #[error("Extraction service returned an unreadable response: {detail}")]
    UnexpectedBody { detail: String, body: String },

    /// The API answered 200 but carried no text (safety block, no candidates).
    #[error("Extraction service returned no text: {reason}")]
    EmptyResponse { reason: String },

    /// Error surfaced by an `edgequake-llm` provider.
    #[error("LLM provider error: {0}")]
    Provider(String),
}

impl ExtractionError {
    /// Response text the service did send, if any.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            ExtractionError::UnexpectedBody { body, .. } => Some(body),
            _ => None,
        }
    }
}

/// Per-request pipeline failure, one variant per step that can fail.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The upload could not be written to its temporary location.
    #[error("Failed to stage upload: {0}")]
    Staging(#[source] std::io::Error),

    /// Text extraction failed.
    #[error(transparent)]
    Ocr(#[from] OcrError),

    /// OCR succeeded but produced only whitespace.
    #[error("OCR could not extract any text from the document.")]
    NoText,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rasterizer_unavailable_names_pdfium() {
        let e = OcrError::RasterizerUnavailable {
            detail: "libpdfium.so: cannot open shared object file".into(),
        };
        let msg = e.to_string();
        assert!(msg.starts_with("Failed to process PDF."), "got: {msg}");
        assert!(msg.contains("PDFium"));
        assert!(msg.contains("libpdfium.so"));
    }

    #[test]
    fn missing_api_key_display() {
        let e = MedocrError::MissingApiKey {
            provider: "gemini".into(),
            env_var: "GEMINI_API_KEY",
        };
        let msg = e.to_string();
        assert!(msg.contains("GEMINI_API_KEY"));
        assert!(msg.contains("gemini"));
    }

    #[test]
    fn no_text_display_matches_client_message() {
        assert_eq!(
            PipelineError::NoText.to_string(),
            "OCR could not extract any text from the document."
        );
    }

    #[test]
    fn ocr_error_is_transparent_in_pipeline_error() {
        let e: PipelineError = OcrError::EngineFailed {
            detail: "Error in pixReadStream".into(),
        }
        .into();
        assert_eq!(e.to_string(), "OCR engine failed: Error in pixReadStream");
    }

    #[test]
    fn api_error_display() {
        let e = ExtractionError::Api {
            status: 403,
            message: "API key not valid".into(),
        };
        assert!(e.to_string().contains("HTTP 403"));
        assert!(e.to_string().contains("API key not valid"));
    }
}
