//! Prescription endpoints.
//!
//! - `GET /api/prescriptions`, `POST /api/prescriptions`
//! - `GET|PUT|DELETE /api/prescriptions/:id`
//! - `GET|POST /api/prescriptions/:id/medications`

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::medications::MedicationRequest;
use super::{clean_text, found};
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, UserContext};
use crate::db;
use crate::models::{Medication, Prescription, ScanFields};
use crate::schedule::local_now;

#[derive(Deserialize)]
pub struct PrescriptionRequest {
    pub doctor_name: Option<String>,
    pub prescribed_on: Option<NaiveDate>,
    pub valid_until: Option<NaiveDate>,
    pub notes: Option<String>,
}

impl PrescriptionRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if let (Some(from), Some(until)) = (self.prescribed_on, self.valid_until) {
            if until < from {
                return Err(ApiError::Validation(
                    "valid_until must not be before prescribed_on".into(),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Serialize)]
pub struct PrescriptionDetail {
    #[serde(flatten)]
    pub prescription: Prescription,
    pub medications: Vec<Medication>,
}

/// `GET /api/prescriptions`
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
) -> Result<Json<Vec<Prescription>>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(db::list_prescriptions(&conn, &user.user_id)?))
}

/// `POST /api/prescriptions`: a hand-entered prescription (`manual` status).
pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    Json(body): Json<PrescriptionRequest>,
) -> Result<(StatusCode, Json<Prescription>), ApiError> {
    body.validate()?;
    let prescription = Prescription {
        id: Uuid::new_v4(),
        user_id: user.user_id,
        doctor_name: clean_text(body.doctor_name),
        prescribed_on: body.prescribed_on,
        valid_until: body.valid_until,
        notes: clean_text(body.notes),
        scan: ScanFields::manual(),
        created_at: local_now(),
    };
    let conn = ctx.core.open_db()?;
    db::insert_prescription(&conn, &prescription)?;
    Ok((StatusCode::CREATED, Json(prescription)))
}

/// `GET /api/prescriptions/:id`: the prescription with its medications.
pub async fn get(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<PrescriptionDetail>, ApiError> {
    let conn = ctx.core.open_db()?;
    let prescription = found(db::get_prescription(&conn, &user.user_id, &id)?, "Prescription")?;
    let medications = db::list_prescription_medications(&conn, &user.user_id, &id)?;
    Ok(Json(PrescriptionDetail {
        prescription,
        medications,
    }))
}

/// `PUT /api/prescriptions/:id`
pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<Uuid>,
    Json(body): Json<PrescriptionRequest>,
) -> Result<Json<Prescription>, ApiError> {
    body.validate()?;
    let conn = ctx.core.open_db()?;
    let mut prescription =
        found(db::get_prescription(&conn, &user.user_id, &id)?, "Prescription")?;
    prescription.doctor_name = clean_text(body.doctor_name);
    prescription.prescribed_on = body.prescribed_on;
    prescription.valid_until = body.valid_until;
    prescription.notes = clean_text(body.notes);
    db::update_prescription(&conn, &prescription)?;
    Ok(Json(prescription))
}

/// `DELETE /api/prescriptions/:id`: cascades to medications, schedules and logs.
pub async fn delete(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let conn = ctx.core.open_db()?;
    db::delete_prescription(&conn, &user.user_id, &id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/prescriptions/:id/medications`
pub async fn list_medications(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Medication>>, ApiError> {
    let conn = ctx.core.open_db()?;
    found(db::get_prescription(&conn, &user.user_id, &id)?, "Prescription")?;
    Ok(Json(db::list_prescription_medications(&conn, &user.user_id, &id)?))
}

/// `POST /api/prescriptions/:id/medications`
pub async fn add_medication(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<Uuid>,
    Json(body): Json<MedicationRequest>,
) -> Result<(StatusCode, Json<Medication>), ApiError> {
    let conn = ctx.core.open_db()?;
    found(db::get_prescription(&conn, &user.user_id, &id)?, "Prescription")?;
    let fields = body.validate(&conn)?;

    let medication = Medication {
        id: Uuid::new_v4(),
        prescription_id: id,
        drug_id: fields.drug_id,
        name: fields.name,
        dosage: fields.dosage,
        form: fields.form,
        instructions: fields.instructions,
        start_date: fields.start_date,
        end_date: fields.end_date,
        active: fields.active,
        created_at: local_now(),
    };
    db::insert_medication(&conn, &medication)?;
    Ok((StatusCode::CREATED, Json(medication)))
}
