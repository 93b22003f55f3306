//! Schedule endpoints: `GET|PUT|DELETE /api/schedules/:id`.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::NaiveTime;
use serde::Deserialize;
use uuid::Uuid;

use super::{clean_text, found};
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, UserContext};
use crate::db;
use crate::models::{MedicationSchedule, WeekdaySet};

#[derive(Deserialize)]
pub struct ScheduleRequest {
    pub time_of_day: NaiveTime,
    pub days_of_week: WeekdaySet,
    pub dose_amount: Option<f64>,
    pub dose_unit: Option<String>,
    pub instructions: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl ScheduleRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.days_of_week.is_empty() {
            return Err(ApiError::Validation("days_of_week needs at least one day".into()));
        }
        if let Some(amount) = self.dose_amount {
            if !(amount.is_finite() && amount > 0.0) {
                return Err(ApiError::Validation("dose_amount must be positive".into()));
            }
        }
        Ok(())
    }
}

/// `GET /api/schedules/:id`
pub async fn get(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<MedicationSchedule>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(found(db::get_schedule(&conn, &user.user_id, &id)?, "MedicationSchedule")?))
}

/// `PUT /api/schedules/:id`. Creation time is kept so past days stay as they were.
pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<Uuid>,
    Json(body): Json<ScheduleRequest>,
) -> Result<Json<MedicationSchedule>, ApiError> {
    body.validate()?;
    let conn = ctx.core.open_db()?;
    let mut schedule = found(db::get_schedule(&conn, &user.user_id, &id)?, "MedicationSchedule")?;

    schedule.time_of_day = body.time_of_day;
    schedule.days_of_week = body.days_of_week;
    schedule.dose_amount = body.dose_amount;
    schedule.dose_unit = clean_text(body.dose_unit);
    schedule.instructions = clean_text(body.instructions);
    schedule.active = body.active;
    db::update_schedule(&conn, &user.user_id, &schedule)?;
    Ok(Json(schedule))
}

/// `DELETE /api/schedules/:id`
pub async fn delete(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let conn = ctx.core.open_db()?;
    db::delete_schedule(&conn, &user.user_id, &id)?;
    Ok(StatusCode::NO_CONTENT)
}
