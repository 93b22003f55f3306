//! Biology report and test result endpoints.
//!
//! - `GET|POST /api/biology_reports`
//! - `GET|PUT|DELETE /api/biology_reports/:id`
//! - `GET|POST /api/biology_reports/:id/results`
//! - `PUT|DELETE /api/test_results/:id`

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{clean_text, found};
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, UserContext};
use crate::db;
use crate::models::{BiologyReport, Biomarker, ScanFields, TestResult, TestResultDetail};
use crate::schedule::local_now;

#[derive(Deserialize)]
pub struct BiologyReportRequest {
    pub lab_name: Option<String>,
    pub test_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Serialize)]
pub struct BiologyReportDetail {
    #[serde(flatten)]
    pub report: BiologyReport,
    pub results: Vec<TestResultDetail>,
}

#[derive(Deserialize)]
pub struct TestResultRequest {
    pub biomarker_id: Uuid,
    pub value: f64,
    pub unit: Option<String>,
    pub reference_min: Option<f64>,
    pub reference_max: Option<f64>,
}

impl TestResultRequest {
    /// Check the value and bounds, filling unit and bounds from the biomarker
    /// when not given.
    fn resolve(self, conn: &Connection) -> Result<(Biomarker, ResolvedResult), ApiError> {
        if !self.value.is_finite() {
            return Err(ApiError::Validation("value must be a number".into()));
        }
        let biomarker = db::get_biomarker(conn, &self.biomarker_id)?
            .ok_or_else(|| ApiError::Validation(format!("unknown biomarker {}", self.biomarker_id)))?;

        let reference_min = self.reference_min.or(biomarker.normal_min);
        let reference_max = self.reference_max.or(biomarker.normal_max);
        if let (Some(lo), Some(hi)) = (reference_min, reference_max) {
            if lo > hi {
                return Err(ApiError::Validation(
                    "reference_min must not exceed reference_max".into(),
                ));
            }
        }

        let resolved = ResolvedResult {
            value: self.value,
            unit: clean_text(self.unit).or_else(|| biomarker.unit.clone()),
            reference_min,
            reference_max,
        };
        Ok((biomarker, resolved))
    }
}

struct ResolvedResult {
    value: f64,
    unit: Option<String>,
    reference_min: Option<f64>,
    reference_max: Option<f64>,
}

fn detail(result: TestResult, biomarker: &Biomarker) -> TestResultDetail {
    TestResultDetail {
        flag: result.flag(),
        biomarker_name: biomarker.name.clone(),
        result,
    }
}

/// `GET /api/biology_reports`
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
) -> Result<Json<Vec<BiologyReport>>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(db::list_biology_reports(&conn, &user.user_id)?))
}

/// `POST /api/biology_reports`: a hand-entered report (`manual` status).
pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    Json(body): Json<BiologyReportRequest>,
) -> Result<(StatusCode, Json<BiologyReport>), ApiError> {
    let report = BiologyReport {
        id: Uuid::new_v4(),
        user_id: user.user_id,
        lab_name: clean_text(body.lab_name),
        test_date: body.test_date,
        notes: clean_text(body.notes),
        scan: ScanFields::manual(),
        created_at: local_now(),
    };
    let conn = ctx.core.open_db()?;
    db::insert_biology_report(&conn, &report)?;
    Ok((StatusCode::CREATED, Json(report)))
}

/// `GET /api/biology_reports/:id`: the report with its flagged results.
pub async fn get(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<BiologyReportDetail>, ApiError> {
    let conn = ctx.core.open_db()?;
    let report = found(db::get_biology_report(&conn, &user.user_id, &id)?, "BiologyReport")?;
    let results = db::list_report_results(&conn, &user.user_id, &id)?;
    Ok(Json(BiologyReportDetail { report, results }))
}

/// `PUT /api/biology_reports/:id`
pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<Uuid>,
    Json(body): Json<BiologyReportRequest>,
) -> Result<Json<BiologyReport>, ApiError> {
    let conn = ctx.core.open_db()?;
    let mut report = found(db::get_biology_report(&conn, &user.user_id, &id)?, "BiologyReport")?;
    report.lab_name = clean_text(body.lab_name);
    report.test_date = body.test_date;
    report.notes = clean_text(body.notes);
    db::update_biology_report(&conn, &report)?;
    Ok(Json(report))
}

/// `DELETE /api/biology_reports/:id`: cascades to its results.
pub async fn delete(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let conn = ctx.core.open_db()?;
    db::delete_biology_report(&conn, &user.user_id, &id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/biology_reports/:id/results`
pub async fn list_results(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<TestResultDetail>>, ApiError> {
    let conn = ctx.core.open_db()?;
    found(db::get_biology_report(&conn, &user.user_id, &id)?, "BiologyReport")?;
    Ok(Json(db::list_report_results(&conn, &user.user_id, &id)?))
}

/// `POST /api/biology_reports/:id/results`
pub async fn add_result(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<Uuid>,
    Json(body): Json<TestResultRequest>,
) -> Result<(StatusCode, Json<TestResultDetail>), ApiError> {
    let conn = ctx.core.open_db()?;
    found(db::get_biology_report(&conn, &user.user_id, &id)?, "BiologyReport")?;
    let (biomarker, resolved) = body.resolve(&conn)?;

    let result = TestResult {
        id: Uuid::new_v4(),
        biology_report_id: id,
        biomarker_id: biomarker.id,
        value: resolved.value,
        unit: resolved.unit,
        reference_min: resolved.reference_min,
        reference_max: resolved.reference_max,
        created_at: local_now(),
    };
    db::insert_test_result(&conn, &result)?;
    Ok((StatusCode::CREATED, Json(detail(result, &biomarker))))
}

/// `PUT /api/test_results/:id`
pub async fn update_result(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<Uuid>,
    Json(body): Json<TestResultRequest>,
) -> Result<Json<TestResultDetail>, ApiError> {
    let conn = ctx.core.open_db()?;
    let mut result = found(db::get_test_result(&conn, &user.user_id, &id)?, "TestResult")?;
    let (biomarker, resolved) = body.resolve(&conn)?;

    result.biomarker_id = biomarker.id;
    result.value = resolved.value;
    result.unit = resolved.unit;
    result.reference_min = resolved.reference_min;
    result.reference_max = resolved.reference_max;
    db::update_test_result(&conn, &user.user_id, &result)?;
    Ok(Json(detail(result, &biomarker)))
}

/// `DELETE /api/test_results/:id`
pub async fn delete_result(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let conn = ctx.core.open_db()?;
    db::delete_test_result(&conn, &user.user_id, &id)?;
    Ok(StatusCode::NO_CONTENT)
}
