//! Biomarker reference list and per-user history.

use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::Serialize;
use uuid::Uuid;

use super::found;
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, UserContext};
use crate::db;
use crate::models::{Biomarker, BiomarkerReading};

#[derive(Serialize)]
pub struct BiomarkerHistory {
    pub biomarker: Biomarker,
    pub readings: Vec<BiomarkerReading>,
}

/// `GET /api/biomarkers`
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(_user): Extension<UserContext>,
) -> Result<Json<Vec<Biomarker>>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(db::list_biomarkers(&conn)?))
}

/// `GET /api/biomarkers/:id/history`: the user's readings, oldest report first.
pub async fn history(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<BiomarkerHistory>, ApiError> {
    let conn = ctx.core.open_db()?;
    let biomarker = found(db::get_biomarker(&conn, &id)?, "Biomarker")?;
    let readings = db::biomarker_history(&conn, &user.user_id, &id)?;
    Ok(Json(BiomarkerHistory {
        biomarker,
        readings,
    }))
}
