//! Medication endpoints.
//!
//! - `GET /api/medications?active=true`
//! - `GET|PUT|DELETE /api/medications/:id`
//! - `GET|POST /api/medications/:id/schedules`
//! - `GET /api/medications/:id/logs`

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Deserialize;
use uuid::Uuid;

use super::schedules::ScheduleRequest;
use super::{clean_text, found};
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, UserContext};
use crate::db;
use crate::models::{Medication, MedicationLog, MedicationSchedule};
use crate::schedule::local_now;

#[derive(Deserialize)]
pub struct MedicationRequest {
    pub name: String,
    pub drug_id: Option<Uuid>,
    pub dosage: Option<String>,
    pub form: Option<String>,
    pub instructions: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// A `MedicationRequest` that passed validation, text fields cleaned.
pub struct MedicationFields {
    pub name: String,
    pub drug_id: Option<Uuid>,
    pub dosage: Option<String>,
    pub form: Option<String>,
    pub instructions: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub active: bool,
}

impl MedicationRequest {
    pub fn validate(self, conn: &Connection) -> Result<MedicationFields, ApiError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(ApiError::Validation("name is required".into()));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if end < start {
                return Err(ApiError::Validation(
                    "end_date must not be before start_date".into(),
                ));
            }
        }
        if let Some(drug_id) = self.drug_id {
            if db::get_drug(conn, &drug_id)?.is_none() {
                return Err(ApiError::Validation(format!("unknown drug {drug_id}")));
            }
        }
        Ok(MedicationFields {
            name,
            drug_id: self.drug_id,
            dosage: clean_text(self.dosage),
            form: clean_text(self.form),
            instructions: clean_text(self.instructions),
            start_date: self.start_date,
            end_date: self.end_date,
            active: self.active,
        })
    }
}

#[derive(Deserialize)]
pub struct MedicationListQuery {
    #[serde(default)]
    pub active: bool,
}

/// `GET /api/medications`
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    Query(query): Query<MedicationListQuery>,
) -> Result<Json<Vec<Medication>>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(db::list_medications(&conn, &user.user_id, query.active)?))
}

/// `GET /api/medications/:id`
pub async fn get(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<Medication>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(found(db::get_medication(&conn, &user.user_id, &id)?, "Medication")?))
}

/// `PUT /api/medications/:id`
pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<Uuid>,
    Json(body): Json<MedicationRequest>,
) -> Result<Json<Medication>, ApiError> {
    let conn = ctx.core.open_db()?;
    let mut medication = found(db::get_medication(&conn, &user.user_id, &id)?, "Medication")?;
    let fields = body.validate(&conn)?;

    medication.name = fields.name;
    medication.drug_id = fields.drug_id;
    medication.dosage = fields.dosage;
    medication.form = fields.form;
    medication.instructions = fields.instructions;
    medication.start_date = fields.start_date;
    medication.end_date = fields.end_date;
    medication.active = fields.active;
    db::update_medication(&conn, &user.user_id, &medication)?;
    Ok(Json(medication))
}

/// `DELETE /api/medications/:id`: removes its schedules and logs too.
pub async fn delete(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let conn = ctx.core.open_db()?;
    db::delete_medication(&conn, &user.user_id, &id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/medications/:id/schedules`
pub async fn list_schedules(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<MedicationSchedule>>, ApiError> {
    let conn = ctx.core.open_db()?;
    found(db::get_medication(&conn, &user.user_id, &id)?, "Medication")?;
    Ok(Json(db::list_medication_schedules(&conn, &user.user_id, &id)?))
}

/// `POST /api/medications/:id/schedules`
pub async fn add_schedule(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<Uuid>,
    Json(body): Json<ScheduleRequest>,
) -> Result<(StatusCode, Json<MedicationSchedule>), ApiError> {
    body.validate()?;
    let conn = ctx.core.open_db()?;
    found(db::get_medication(&conn, &user.user_id, &id)?, "Medication")?;

    let schedule = MedicationSchedule {
        id: Uuid::new_v4(),
        medication_id: id,
        time_of_day: body.time_of_day,
        days_of_week: body.days_of_week,
        dose_amount: body.dose_amount,
        dose_unit: clean_text(body.dose_unit),
        instructions: clean_text(body.instructions),
        active: body.active,
        created_at: local_now(),
    };
    db::insert_schedule(&conn, &schedule)?;
    Ok((StatusCode::CREATED, Json(schedule)))
}

/// `GET /api/medications/:id/logs`: newest first.
pub async fn list_logs(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<MedicationLog>>, ApiError> {
    let conn = ctx.core.open_db()?;
    found(db::get_medication(&conn, &user.user_id, &id)?, "Medication")?;
    Ok(Json(db::list_medication_logs(&conn, &user.user_id, &id)?))
}
