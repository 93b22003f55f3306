//! Profile endpoints.

use axum::extract::State;
use axum::{Extension, Json};
use chrono::NaiveDate;
use serde::Deserialize;

use super::{clean_text, found};
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, UserContext};
use crate::db;
use crate::models::Profile;
use crate::schedule::local_now;

#[derive(Deserialize)]
pub struct ProfileRequest {
    pub full_name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub sex: Option<String>,
    pub notes: Option<String>,
}

/// `GET /api/profile`
pub async fn get(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
) -> Result<Json<Profile>, ApiError> {
    let conn = ctx.core.open_db()?;
    let profile = found(db::get_profile(&conn, &user.user_id)?, "Profile")?;
    Ok(Json(profile))
}

/// `PUT /api/profile`: replaces every editable field.
pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    Json(body): Json<ProfileRequest>,
) -> Result<Json<Profile>, ApiError> {
    let now = local_now();
    if body.date_of_birth.is_some_and(|dob| dob > now.date()) {
        return Err(ApiError::Validation("date_of_birth cannot be in the future".into()));
    }

    let profile = Profile {
        user_id: user.user_id,
        full_name: clean_text(body.full_name),
        date_of_birth: body.date_of_birth,
        sex: clean_text(body.sex),
        notes: clean_text(body.notes),
        updated_at: now,
    };
    let conn = ctx.core.open_db()?;
    db::upsert_profile(&conn, &profile)?;
    Ok(Json(profile))
}
