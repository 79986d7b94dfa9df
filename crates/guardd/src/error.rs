use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Every way a guarded operation can fail.
///
/// Validation kinds are terminal for the request and map to client errors.
/// `Internal` carries detail for the log only; the response body stays generic.
#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    #[error("invalid host")]
    InvalidHost,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("filename escapes upload root")]
    PathEscape,

    #[error("file exceeds maximum upload size")]
    TooLarge,

    #[error("No file uploaded")]
    MissingFile,

    #[error("untrusted redirect target")]
    UntrustedRedirectTarget,

    #[error("diagnostic timed out")]
    UpstreamTimeout,

    #[error("internal error: {0:#}")]
    Internal(#[source] anyhow::Error),
}

impl GuardError {
    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        GuardError::Internal(err.into())
    }

    /// Stable machine-readable name, used as the `kind` field of error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            GuardError::InvalidHost => "InvalidHost",
            GuardError::InvalidCredentials => "InvalidCredentials",
            GuardError::PathEscape => "PathEscape",
            GuardError::TooLarge => "TooLarge",
            GuardError::MissingFile => "MissingFile",
            GuardError::UntrustedRedirectTarget => "UntrustedRedirectTarget",
            GuardError::UpstreamTimeout => "UpstreamTimeout",
            GuardError::Internal(_) => "Internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GuardError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            GuardError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            GuardError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GuardError::InvalidHost
            | GuardError::PathEscape
            | GuardError::TooLarge
            | GuardError::MissingFile
            | GuardError::UntrustedRedirectTarget => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for GuardError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            // Login keeps its historical `{message}` shape.
            GuardError::InvalidCredentials => json!({ "message": self.to_string() }),
            GuardError::Internal(e) => {
                tracing::error!(error = %format!("{e:#}"), "internal failure");
                json!({ "error": "internal server error", "kind": self.kind() })
            }
            _ => json!({ "error": self.to_string(), "kind": self.kind() }),
        };
        (status, Json(body)).into_response()
    }
}
