//! Dose log endpoints: `POST /api/logs`, `PUT|DELETE /api/logs/:id`.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use super::{clean_text, found};
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, UserContext};
use crate::db;
use crate::models::enums::LogStatus;
use crate::models::MedicationLog;
use crate::schedule::local_now;

#[derive(Deserialize)]
pub struct CreateLogRequest {
    pub schedule_id: Uuid,
    pub scheduled_for: NaiveDate,
    pub status: LogStatus,
    pub notes: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateLogRequest {
    pub status: LogStatus,
    pub notes: Option<String>,
}

/// `POST /api/logs`: record a dose as taken or skipped. One log per
/// schedule and date; a second one is a conflict.
pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    Json(body): Json<CreateLogRequest>,
) -> Result<(StatusCode, Json<MedicationLog>), ApiError> {
    let now = local_now();
    if body.scheduled_for > now.date() {
        return Err(ApiError::Validation("cannot log a dose for a future date".into()));
    }

    let conn = ctx.core.open_db()?;
    let schedule = found(
        db::get_schedule(&conn, &user.user_id, &body.schedule_id)?,
        "MedicationSchedule",
    )?;

    let log = MedicationLog {
        id: Uuid::new_v4(),
        schedule_id: schedule.id,
        medication_id: schedule.medication_id,
        scheduled_for: body.scheduled_for,
        status: body.status,
        logged_at: now,
        notes: clean_text(body.notes),
    };
    db::insert_log(&conn, &log)?;

    tracing::debug!(log_id = %log.id, status = %log.status, "Dose logged");
    Ok((StatusCode::CREATED, Json(log)))
}

/// `PUT /api/logs/:id`: change the recorded outcome.
pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateLogRequest>,
) -> Result<Json<MedicationLog>, ApiError> {
    let conn = ctx.core.open_db()?;
    let mut log = found(db::get_log(&conn, &user.user_id, &id)?, "MedicationLog")?;
    log.status = body.status;
    log.notes = clean_text(body.notes);
    log.logged_at = local_now();
    db::update_log(&conn, &user.user_id, &log)?;
    Ok(Json(log))
}

/// `DELETE /api/logs/:id`: undo, the dose goes back to pending.
pub async fn delete(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let conn = ctx.core.open_db()?;
    db::delete_log(&conn, &user.user_id, &id)?;
    Ok(StatusCode::NO_CONTENT)
}
