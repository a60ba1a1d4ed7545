//! Pipeline stages for document-to-entities extraction.
//!
//! Each submodule implements exactly one transformation step, so stages can be
//! tested alone and swapped (a different OCR engine, a different model
//! backend) without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ ocr ──▶ llm ──▶ postprocess
//! (stage)   (pdfium)   (PNG)    (tesseract) (Gemini) (JSON cleanup)
//! ```
//!
//! 1. [`input`]  — stage the upload in a temp file and sniff PDF vs image
//! 2. [`render`] — rasterise PDF pages, or decode the image; runs in
//!    `spawn_blocking` because pdfium is not async-safe
//! 3. [`encode`] — PNG-encode each page for the OCR engine
//! 4. [`ocr`]    — recognise text per page, preserving page order
//! 5. [`llm`]    — one model call turning the joined text into JSON fields
//! 6. [`postprocess`] — strip fences and stray characters before parsing

pub mod encode;
pub mod input;
pub mod llm;
pub mod ocr;
pub mod postprocess;
pub mod render;
