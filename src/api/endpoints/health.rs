//! Health check endpoint.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub drug_lookup: bool,
}

/// `GET /api/health`: liveness plus a database round trip.
pub async fn check(State(ctx): State<ApiContext>) -> Result<Json<HealthResponse>, ApiError> {
    ctx.core.open_db()?;

    Ok(Json(HealthResponse {
        status: "ok",
        version: crate::config::APP_VERSION,
        drug_lookup: ctx.core.drug_lookup().is_some(),
    }))
}
