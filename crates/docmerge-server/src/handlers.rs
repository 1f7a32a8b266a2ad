//! HTTP request handlers for API endpoints

use axum::{
    body::Bytes,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use docmerge_core::{detect, validate_and_merge, ErrorKind, MergeError};
use tracing::{error, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

use crate::types::{DetectResponse, DocumentRequest, ErrorResponse, HealthResponse, MergeResponse};

/// Handler failure, rendered as `{"error": ...}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "Failed to process document".to_string(),
        }
    }
}

impl From<MergeError> for ApiError {
    fn from(err: MergeError) -> Self {
        match err.kind() {
            ErrorKind::MalformedInput => {
                warn!("Rejected input: {err}");
                Self::bad_request(err.to_string())
            }
            ErrorKind::NotADocument => {
                warn!("Rejected document: {err}");
                Self {
                    status: StatusCode::UNPROCESSABLE_ENTITY,
                    message: err.to_string(),
                }
            }
            ErrorKind::Internal => {
                error!("Processing failed: {err}");
                Self::internal()
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// List the merge fields of a document
///
/// Body: `{"docx": "<base64>"}`. Any `data` member is ignored.
pub async fn detect_fields(body: Bytes) -> Result<Json<DetectResponse>, ApiError> {
    let span = info_span!("detect", request_id = %Uuid::new_v4());
    async move {
        let request = parse_request(&body)?;
        let docx = decode_document(&request.docx)?;
        info!("Detect request: {} document bytes", docx.len());

        let report = run_blocking(move || detect(&docx)).await?;
        info!("Detected {} fields", report.count);
        Ok(Json(DetectResponse::new(report.fields)))
    }
    .instrument(span)
    .await
}

/// Validate merge data against a document and merge it
///
/// Body: `{"docx": "<base64>", "data": {...}}`. Responds 200 with the merged
/// document, or 400 with the validation report when validation fails.
pub async fn merge_document(body: Bytes) -> Result<Response, ApiError> {
    let span = info_span!("merge", request_id = %Uuid::new_v4());
    async move {
        let request = parse_request(&body)?;
        let docx = decode_document(&request.docx)?;
        let Some(data) = request.data else {
            return Err(ApiError::bad_request("'data' key missing"));
        };
        info!(
            "Merge request: {} document bytes, {} data bytes",
            docx.len(),
            data.get().len()
        );

        let report = run_blocking(move || validate_and_merge(&docx, data.get().as_bytes())).await?;

        let Some(merged) = &report.merged else {
            info!(
                "Validation failed: {} errors",
                report.validation.errors.len()
            );
            let response = MergeResponse::new(report, None);
            return Ok((StatusCode::BAD_REQUEST, Json(response)).into_response());
        };

        let encoded = STANDARD.encode(&merged.bytes);
        info!(
            "Merged document: {} bytes, {} skipped",
            merged.bytes.len(),
            merged.skipped.len()
        );
        Ok(Json(MergeResponse::new(report, Some(encoded))).into_response())
    }
    .instrument(span)
    .await
}

fn parse_request(body: &[u8]) -> Result<DocumentRequest, ApiError> {
    serde_json::from_slice(body).map_err(|e| {
        warn!("Request body is not valid JSON: {e}");
        ApiError::bad_request("Invalid input")
    })
}

fn decode_document(encoded: &str) -> Result<Vec<u8>, ApiError> {
    if encoded.is_empty() {
        return Err(ApiError::bad_request("'docx' key missing"));
    }
    STANDARD.decode(encoded.trim()).map_err(|e| {
        warn!("Base64 decode failed: {e}");
        ApiError::bad_request("Failed to decode base64 input")
    })
}

/// Run core work off the async executor, keeping the request span
async fn run_blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> docmerge_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let span = Span::current();
    tokio::task::spawn_blocking(move || span.in_scope(work))
        .await
        .map_err(|e| {
            error!("Worker task failed: {e}");
            ApiError::internal()
        })?
        .map_err(ApiError::from)
}
