use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::error::GuardError;
use crate::state::SharedState;

const FILE_FIELD: &str = "file";

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub filename: String,
    pub size: u64,
}

/// POST /upload — store the multipart `file` field under the upload root.
pub async fn upload_handler(
    State(state): State<SharedState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, GuardError> {
    let mut multipart = multipart.map_err(|e| {
        tracing::warn!(error = %e, "upload without multipart body");
        GuardError::MissingFile
    })?;

    let max = state.uploads.max_bytes();

    while let Some(mut field) = multipart.next_field().await.map_err(field_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let raw_filename = field.file_name().unwrap_or_default().to_string();

        // Stop reading as soon as the bound is crossed.
        let mut content = Vec::new();
        while let Some(chunk) = field.chunk().await.map_err(field_error)? {
            if (content.len() + chunk.len()) as u64 > max {
                tracing::warn!(max, "upload exceeded size limit while streaming");
                return Err(GuardError::TooLarge);
            }
            content.extend_from_slice(&chunk);
        }

        let entry = state.uploads.confine_upload(&raw_filename, &content)?;
        tracing::debug!(path = %entry.path.display(), "upload persisted");
        return Ok(Json(UploadResponse {
            message: "File uploaded successfully!".to_string(),
            filename: entry.filename,
            size: entry.size,
        }));
    }

    Err(GuardError::MissingFile)
}

fn field_error(e: axum::extract::multipart::MultipartError) -> GuardError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        GuardError::TooLarge
    } else {
        tracing::warn!(error = %e, "malformed multipart body");
        GuardError::MissingFile
    }
}
