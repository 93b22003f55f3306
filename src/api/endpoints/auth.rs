//! Account endpoints: register, login, logout, current user.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, UserContext};
use crate::auth::{self, AuthError};
use crate::models::User;
use crate::schedule::local_now;

#[derive(Deserialize)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: NaiveDateTime,
    pub user: User,
}

/// `POST /api/auth/register`
pub async fn register(
    State(ctx): State<ApiContext>,
    Json(body): Json<CredentialsRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let core = ctx.core.clone();
    let user = tokio::task::spawn_blocking(move || -> Result<User, ApiError> {
        let conn = core.open_db()?;
        Ok(auth::register(&conn, &body.email, &body.password, local_now())?)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("register task: {e}")))??;

    Ok((StatusCode::CREATED, Json(user)))
}

/// `POST /api/auth/login`: throttled per email after repeated failures.
/// Password hashing runs on the blocking pool.
pub async fn login(
    State(ctx): State<ApiContext>,
    Json(body): Json<CredentialsRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let core = ctx.core.clone();
    let response = tokio::task::spawn_blocking(move || -> Result<LoginResponse, ApiError> {
        let key = auth::normalize_email(&body.email)
            .unwrap_or_else(|_| body.email.trim().to_lowercase());

        core.login_throttle()?
            .check(&key)
            .map_err(|retry_after| ApiError::RateLimited { retry_after })?;

        let conn = core.open_db()?;
        match auth::login(&conn, &body.email, &body.password, local_now(), core.session_ttl()) {
            Ok(session) => {
                core.login_throttle()?.reset(&key);
                Ok(LoginResponse {
                    token: session.token,
                    expires_at: session.expires_at,
                    user: session.user,
                })
            }
            Err(AuthError::InvalidCredentials) => {
                core.login_throttle()?.record_failure(&key);
                tracing::warn!("Failed login attempt");
                Err(ApiError::Unauthorized)
            }
            Err(e) => Err(e.into()),
        }
    })
    .await
    .map_err(|e| ApiError::Internal(format!("login task: {e}")))??;

    Ok(Json(response))
}

/// `POST /api/auth/logout`
pub async fn logout(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
) -> Result<StatusCode, ApiError> {
    let conn = ctx.core.open_db()?;
    auth::logout(&conn, &user.token)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
pub struct MeResponse {
    pub id: uuid::Uuid,
    pub email: String,
}

/// `GET /api/auth/me`
pub async fn me(Extension(user): Extension<UserContext>) -> Json<MeResponse> {
    Json(MeResponse {
        id: user.user_id,
        email: user.email,
    })
}
