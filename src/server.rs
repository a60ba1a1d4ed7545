//! HTTP surface: `POST /extract-entities` and `GET /health`.
//!
//! Handlers are thin. They pull the `file` part out of the multipart body,
//! hand the bytes to [`DocumentExtractor::process_upload`], and map its result
//! onto a status code. Every error body has the shape `{"error": "<message>"}`.

use crate::error::{MedocrError, PipelineError};
use crate::extractor::DocumentExtractor;
use crate::output::ExtractionResponse;
use axum::body::Bytes;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tracing::{debug, error, info, warn};

/// Multipart field carrying the document.
pub const FILE_FIELD: &str = "file";

/// Errors returned to HTTP clients.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("No file part in the request")]
    NoFilePart,
    #[error("No file selected")]
    NoFileSelected,
    #[error("OCR could not extract any text from the document.")]
    NoText,
    /// The multipart body could not be read (malformed, or over the size cap).
    #[error("Failed to read upload: {detail}")]
    Upload { status: StatusCode, detail: String },
    #[error("An internal error occurred: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NoFilePart | ApiError::NoFileSelected | ApiError::NoText => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Upload { status, .. } => *status,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {self}");
        } else {
            warn!("Rejected request: {self}");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::NoText => ApiError::NoText,
            other => ApiError::Internal(other.to_string()),
        }
    }
}

#[derive(Clone)]
struct AppState {
    extractor: Arc<DocumentExtractor>,
}

/// Build the application router.
pub fn router(extractor: Arc<DocumentExtractor>) -> Router {
    let body_limit = extractor.config().max_upload_bytes;
    Router::new()
        .route("/extract-entities", post(extract_entities_handler))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CatchPanicLayer::custom(panic_response))
        .with_state(AppState { extractor })
}

/// A panic inside a handler becomes the usual 500 error body.
fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "request handler panicked".to_string()
    };
    ApiError::Internal(detail).into_response()
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn serve(extractor: Arc<DocumentExtractor>, addr: SocketAddr) -> Result<(), MedocrError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| MedocrError::Bind { addr, source })?;
    let local = listener.local_addr().unwrap_or(addr);
    info!("Listening on http://{local}");

    axum::serve(listener, router(extractor))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(MedocrError::Server)?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Could not install Ctrl-C handler: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn extract_entities_handler(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ExtractionResponse>, ApiError> {
    let mut multipart = multipart.map_err(|e| {
        debug!("Request body is not multipart: {e}");
        ApiError::NoFilePart
    })?;

    let (filename, bytes) = read_file_part(&mut multipart)
        .await?
        .ok_or(ApiError::NoFilePart)?;
    if filename.is_empty() {
        return Err(ApiError::NoFileSelected);
    }

    let response = state.extractor.process_upload(bytes, &filename).await?;
    Ok(Json(response))
}

/// First `file` part that carries a filename, as `(filename, bytes)`.
async fn read_file_part(multipart: &mut Multipart) -> Result<Option<(String, Bytes)>, ApiError> {
    let upload_error = |e: axum::extract::multipart::MultipartError| ApiError::Upload {
        status: e.status(),
        detail: e.body_text(),
    };

    while let Some(field) = multipart.next_field().await.map_err(upload_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        // A `file` field without a filename is a form value, not an upload.
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        let bytes = field.bytes().await.map_err(upload_error)?;
        return Ok(Some((filename, bytes)));
    }
    Ok(None)
}
