//! Schedule views: daily, weekly and adherence.

use axum::extract::{Query, State};
use axum::{Extension, Json};
use chrono::NaiveDate;
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, UserContext};
use crate::schedule::{
    local_now, AdherenceCalculationService, AdherencePeriod, AdherenceReport, DailySchedule,
    DailyScheduleQuery, WeeklySchedule, WeeklyScheduleQuery,
};

#[derive(Deserialize)]
pub struct DateQuery {
    /// Defaults to today.
    pub date: Option<NaiveDate>,
}

#[derive(Deserialize)]
pub struct PeriodQuery {
    /// 7, 30 or 90 days; defaults to 7.
    pub period: Option<u32>,
}

/// `GET /api/schedule/daily?date=YYYY-MM-DD`
pub async fn daily(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    Query(query): Query<DateQuery>,
) -> Result<Json<DailySchedule>, ApiError> {
    let now = local_now();
    let conn = ctx.core.open_db()?;
    let schedule = DailyScheduleQuery::new(&conn, user.user_id)
        .run(query.date.unwrap_or(now.date()), now)?;
    Ok(Json(schedule))
}

/// `GET /api/schedule/weekly?date=YYYY-MM-DD`: Monday to Sunday around `date`.
pub async fn weekly(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    Query(query): Query<DateQuery>,
) -> Result<Json<WeeklySchedule>, ApiError> {
    let now = local_now();
    let conn = ctx.core.open_db()?;
    let reference = query.date.unwrap_or(now.date());
    let schedule = WeeklyScheduleQuery::new(&conn, user.user_id)
        .run(reference, now)?
        .ok_or_else(|| ApiError::Validation(format!("no full week around {reference}")))?;
    Ok(Json(schedule))
}

/// `GET /api/adherence?period=7|30|90`
pub async fn adherence(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    Query(query): Query<PeriodQuery>,
) -> Result<Json<AdherenceReport>, ApiError> {
    let days = query.period.unwrap_or(7);
    let period = AdherencePeriod::from_days(days)
        .ok_or_else(|| ApiError::Validation(format!("period must be 7, 30 or 90 days, got {days}")))?;

    let conn = ctx.core.open_db()?;
    let report = AdherenceCalculationService::new(&conn, user.user_id)
        .calculate(period, local_now().date())?;
    Ok(Json(report))
}
