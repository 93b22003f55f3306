//! Access logging middleware.
//!
//! Logs every API request with method, path, response status and, on
//! protected routes, the authenticated user.

use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::api::types::UserContext;

pub async fn log_access(req: Request<axum::body::Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let user_id = req
        .extensions()
        .get::<UserContext>()
        .map(|u| u.user_id.to_string());

    let response = next.run(req).await;

    let status = response.status().as_u16();
    match user_id {
        Some(user_id) => tracing::info!(%method, path, status, user_id, "API request"),
        None => tracing::info!(%method, path, status, "API request"),
    }

    response
}
