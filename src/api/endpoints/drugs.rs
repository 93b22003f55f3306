//! Drug search: `GET /api/drugs?q=metformin&limit=10`.

use axum::extract::{Query, State};
use axum::{Extension, Json};
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, UserContext};
use crate::drugs::{self, MAX_SEARCH_RESULTS};
use crate::models::Drug;

#[derive(Deserialize)]
pub struct DrugSearchQuery {
    #[serde(default)]
    pub q: String,
    pub limit: Option<usize>,
}

/// Local results first, topped up from the external lookup when enabled.
/// Runs on the blocking pool since the lookup client is synchronous.
pub async fn search(
    State(ctx): State<ApiContext>,
    Extension(_user): Extension<UserContext>,
    Query(query): Query<DrugSearchQuery>,
) -> Result<Json<Vec<Drug>>, ApiError> {
    if query.q.trim().is_empty() {
        return Err(ApiError::BadRequest("query parameter q is required".into()));
    }
    let limit = query.limit.unwrap_or(MAX_SEARCH_RESULTS);

    let core = ctx.core.clone();
    let found = tokio::task::spawn_blocking(move || -> Result<Vec<Drug>, ApiError> {
        let conn = core.open_db()?;
        let lookup = core.drug_lookup();
        Ok(drugs::search_drugs(&conn, lookup.as_deref(), &query.q, limit)?)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("drug search task: {e}")))??;

    Ok(Json(found))
}
