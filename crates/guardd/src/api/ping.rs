use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::GuardError;
use crate::host::validate_host;
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct PingParams {
    pub ip: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PingResponse {
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

/// GET /ping?ip=<host> — run the diagnostic against a validated host.
pub async fn ping_handler(
    State(state): State<SharedState>,
    params: Result<Query<PingParams>, QueryRejection>,
) -> Result<Json<PingResponse>, GuardError> {
    let Query(params) = params.map_err(|e| {
        tracing::warn!(error = %e, "malformed ping query");
        GuardError::InvalidHost
    })?;
    let host = validate_host(params.ip.as_deref().unwrap_or_default())?;
    let result = state.diagnostic.run(&host).await?;
    Ok(Json(PingResponse {
        output: result.output,
        exit_code: result.exit_code,
    }))
}
