use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::error::GuardError;
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct RedirectParams {
    pub url: Option<String>,
}

/// GET /redirect?url=<target> — header-only redirect to an allow-listed target.
pub async fn redirect_handler(
    State(state): State<SharedState>,
    params: Result<Query<RedirectParams>, QueryRejection>,
) -> Result<Response, GuardError> {
    let Query(params) = params.map_err(|e| {
        tracing::warn!(error = %e, "malformed redirect query");
        GuardError::UntrustedRedirectTarget
    })?;
    let target = state
        .redirects
        .validate_redirect(params.url.as_deref().unwrap_or_default())?;

    Ok((
        StatusCode::SEE_OTHER,
        [(header::LOCATION, target.location().clone())],
    )
        .into_response())
}
