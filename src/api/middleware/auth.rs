//! Bearer token authentication middleware.
//!
//! Extracts `Authorization: Bearer <token>`, resolves it to a live session
//! and injects `UserContext` into request extensions for downstream handlers.

use axum::http::{HeaderValue, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, UserContext};
use crate::auth;
use crate::schedule::local_now;

/// Require a valid bearer token.
///
/// Accesses `ApiContext` from request extensions (injected by Extension layer).
/// On success: injects `UserContext` and marks the response `no-store`.
pub async fn require_auth(req: Request<axum::body::Body>, next: Next) -> Response {
    match require_auth_inner(req, next).await {
        Ok(resp) => resp,
        Err(err) => err.into_response(),
    }
}

async fn require_auth_inner(
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx: ApiContext = req
        .extensions()
        .get::<ApiContext>()
        .cloned()
        .ok_or(ApiError::Internal("missing API context".into()))?;

    let token = bearer_token(&req).ok_or(ApiError::Unauthorized)?;

    let user = {
        let conn = ctx.core.open_db()?;
        auth::authenticate(&conn, &token, local_now())?
    }; // Connection dropped here, before any .await

    req.extensions_mut().insert(UserContext {
        user_id: user.id,
        email: user.email,
        token,
    });

    let mut response = next.run(req).await;
    response
        .headers_mut()
        .insert("Cache-Control", HeaderValue::from_static("no-store"));

    Ok(response)
}

fn bearer_token(req: &Request<axum::body::Body>) -> Option<String> {
    req.headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
}
