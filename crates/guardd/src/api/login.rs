use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::credentials::verify_credentials;
use crate::error::GuardError;
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: String,
}

/// POST /login — verify a username/password pair.
///
/// Any body that does not deserialize is treated as bad credentials.
pub async fn login_handler(
    State(state): State<SharedState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, GuardError> {
    let Json(req) = payload.map_err(|e| {
        tracing::warn!(error = %e, "malformed login body");
        GuardError::InvalidCredentials
    })?;

    let (Some(username), Some(password)) = (req.username, req.password) else {
        return Err(GuardError::InvalidCredentials);
    };

    let auth = verify_credentials(&state.credentials, &username, password).await?;

    tracing::info!(username = ?auth.username(), "login succeeded");

    Ok(Json(LoginResponse {
        message: "Login successful!".to_string(),
    }))
}
