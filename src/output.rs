//! Output types: per-page OCR text, the extraction outcome, and the response
//! payload returned to clients.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Literal marker inserted between page texts in the combined OCR output.
pub const PAGE_BREAK: &str = "\n\n--- Page Break ---\n\n";

/// Fallback `error` message when the model's reply is not valid JSON.
pub const PARSE_FAILURE_MESSAGE: &str = "Failed to parse Gemini response as JSON";

/// Text recognised on a single page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageText {
    /// 1-indexed page number.
    pub page: usize,
    /// Raw OCR output for the page; may be empty.
    pub text: String,
}

/// Join page texts in page order with [`PAGE_BREAK`].
pub fn join_pages(pages: &[PageText]) -> String {
    pages
        .iter()
        .map(|p| p.text.as_str())
        .collect::<Vec<_>>()
        .join(PAGE_BREAK)
}

/// Result of the structured-extraction step.
///
/// Extraction never fails the request: the two failure variants render to
/// error-shaped JSON objects that are returned to the client as entities.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionOutcome {
    /// The model replied with valid JSON (passed through as-is, any shape).
    Parsed(Value),
    /// The model replied, but not with valid JSON.
    Malformed { raw_text: String },
    /// The call or the response handling failed.
    Failed {
        message: String,
        raw_text: Option<String>,
    },
}

impl ExtractionOutcome {
    pub fn is_parsed(&self) -> bool {
        matches!(self, ExtractionOutcome::Parsed(_))
    }

    /// Render the outcome as the `extracted_entities` value.
    pub fn into_entities(self) -> Value {
        match self {
            ExtractionOutcome::Parsed(v) => v,
            ExtractionOutcome::Malformed { raw_text } => json!({
                "error": PARSE_FAILURE_MESSAGE,
                "raw_text": raw_text,
            }),
            ExtractionOutcome::Failed { message, raw_text } => json!({
                "error": format!("An unexpected error occurred: {message}"),
                "raw_text": raw_text,
            }),
        }
    }
}

/// Successful response body of `POST /extract-entities`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResponse {
    /// Filename as supplied by the client.
    pub filename: String,
    /// Combined OCR text, pages joined with [`PAGE_BREAK`].
    pub ocr_text: String,
    /// Model output, or a fallback object when extraction failed.
    pub extracted_entities: Value,
}
