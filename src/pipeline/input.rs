//! Input handling: stage uploads to a scoped temporary file and classify them.
//!
//! ## Why a named temp file?
//!
//! PDFium opens documents by path, so an upload has to land on disk. Wrapping
//! it in [`tempfile::NamedTempFile`] ties the file's lifetime to the request:
//! [`StagedUpload::close`] removes it on the normal path and `Drop` removes it
//! on every other one, including early returns and panics.

use crate::error::OcrError;
use bytes::Bytes;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Leading bytes of every PDF file.
const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// What the OCR stage should do with a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// Rasterise every page, then OCR each.
    Pdf,
    /// OCR the file once as a single image.
    Image,
}

/// Classify a file as PDF or image.
///
/// PDF if either signal matches: the `%PDF` magic bytes or a `.pdf` suffix
/// (case-insensitive). Everything else is treated as an image; decoding
/// decides later whether it really is one.
pub fn detect_kind(path: &Path) -> Result<DocumentKind, OcrError> {
    let mut magic = [0u8; 4];
    let mut file = std::fs::File::open(path).map_err(|source| OcrError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    // Short files simply fail the magic check.
    let sniffed_pdf = file.read_exact(&mut magic).is_ok() && &magic == PDF_MAGIC;

    let kind = if sniffed_pdf || has_pdf_suffix(path) {
        DocumentKind::Pdf
    } else {
        DocumentKind::Image
    };
    debug!(path = %path.display(), ?kind, sniffed_pdf, "Classified document");
    Ok(kind)
}

fn has_pdf_suffix(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

/// Extension of a client-supplied filename, with its leading dot (`".pdf"`),
/// or an empty string when there is none.
pub fn file_suffix(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default()
}

/// An upload written to a request-scoped temporary file.
#[derive(Debug)]
pub struct StagedUpload {
    file: NamedTempFile,
}

impl StagedUpload {
    /// Write `bytes` to a fresh temporary file carrying `filename`'s extension.
    ///
    /// The file is created in `scratch_dir` when given, else in the OS temp
    /// directory. Only the extension of `filename` is used; the client's name
    /// never becomes part of a path.
    pub fn stage(
        bytes: &[u8],
        filename: &str,
        scratch_dir: Option<&Path>,
    ) -> std::io::Result<Self> {
        let suffix = file_suffix(filename);
        let mut builder = tempfile::Builder::new();
        builder.prefix("medocr-upload-").suffix(&suffix);

        let mut file = match scratch_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                builder.tempfile_in(dir)?
            }
            None => builder.tempfile()?,
        };
        file.write_all(bytes)?;
        file.flush()?;

        debug!(path = %file.path().display(), bytes = bytes.len(), "Staged upload");
        Ok(Self { file })
    }

    /// [`StagedUpload::stage`] on the blocking pool.
    pub async fn stage_blocking(
        bytes: Bytes,
        filename: &str,
        scratch_dir: Option<&Path>,
    ) -> std::io::Result<Self> {
        let filename = filename.to_string();
        let scratch_dir = scratch_dir.map(Path::to_path_buf);
        tokio::task::spawn_blocking(move || Self::stage(&bytes, &filename, scratch_dir.as_deref()))
            .await
            .map_err(std::io::Error::other)?
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Delete the file now, logging rather than propagating a failure.
    ///
    /// Returns the path that was removed.
    pub fn close(self) -> PathBuf {
        let path = self.file.path().to_path_buf();
        match self.file.close() {
            Ok(()) => debug!(path = %path.display(), "Cleaned up temporary file"),
            Err(e) => warn!(path = %path.display(), "Failed to remove temporary file: {e}"),
        }
        path
    }
}
