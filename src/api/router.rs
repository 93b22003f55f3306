//! HTTP API router.
//!
//! Returns a composable `Router` with every endpoint nested under `/api/`.
//! Public routes: health, register, login. Everything else passes the
//! bearer auth middleware first.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::api::endpoints;
use crate::api::middleware;
use crate::api::types::ApiContext;
use crate::core_state::CoreState;

/// Room for multipart framing and the `kind` field on top of the file itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Build the API router.
///
/// Middleware uses `Extension<ApiContext>` (injected as the outermost layer).
/// Endpoint handlers use `State<ApiContext>` (provided via `with_state`).
pub fn api_router(core: Arc<CoreState>) -> Router {
    build_router(ApiContext::new(core))
}

fn build_router(ctx: ApiContext) -> Router {
    let body_limit = ctx.core.config.max_upload_bytes.saturating_add(MULTIPART_OVERHEAD_BYTES);
    let cors_origin = ctx.core.config.cors_origin.clone();

    // Layers run bottom (outermost) to top (innermost):
    //   Extension -> Auth -> Access log -> Handler
    //
    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    let protected = Router::new()
        .route("/auth/logout", post(endpoints::auth::logout))
        .route("/auth/me", get(endpoints::auth::me))
        .route(
            "/profile",
            get(endpoints::profile::get).put(endpoints::profile::update),
        )
        .route(
            "/prescriptions",
            get(endpoints::prescriptions::list).post(endpoints::prescriptions::create),
        )
        .route(
            "/prescriptions/:id",
            get(endpoints::prescriptions::get)
                .put(endpoints::prescriptions::update)
                .delete(endpoints::prescriptions::delete),
        )
        .route(
            "/prescriptions/:id/medications",
            get(endpoints::prescriptions::list_medications)
                .post(endpoints::prescriptions::add_medication),
        )
        .route("/medications", get(endpoints::medications::list))
        .route(
            "/medications/:id",
            get(endpoints::medications::get)
                .put(endpoints::medications::update)
                .delete(endpoints::medications::delete),
        )
        .route(
            "/medications/:id/schedules",
            get(endpoints::medications::list_schedules).post(endpoints::medications::add_schedule),
        )
        .route("/medications/:id/logs", get(endpoints::medications::list_logs))
        .route(
            "/schedules/:id",
            get(endpoints::schedules::get)
                .put(endpoints::schedules::update)
                .delete(endpoints::schedules::delete),
        )
        .route("/logs", post(endpoints::logs::create))
        .route(
            "/logs/:id",
            put(endpoints::logs::update).delete(endpoints::logs::delete),
        )
        .route("/schedule/daily", get(endpoints::schedule::daily))
        .route("/schedule/weekly", get(endpoints::schedule::weekly))
        .route("/adherence", get(endpoints::schedule::adherence))
        .route(
            "/biology_reports",
            get(endpoints::biology::list).post(endpoints::biology::create),
        )
        .route(
            "/biology_reports/:id",
            get(endpoints::biology::get)
                .put(endpoints::biology::update)
                .delete(endpoints::biology::delete),
        )
        .route(
            "/biology_reports/:id/results",
            get(endpoints::biology::list_results).post(endpoints::biology::add_result),
        )
        .route(
            "/test_results/:id",
            put(endpoints::biology::update_result).delete(endpoints::biology::delete_result),
        )
        .route("/biomarkers", get(endpoints::biomarkers::list))
        .route("/biomarkers/:id/history", get(endpoints::biomarkers::history))
        .route("/drugs", get(endpoints::drugs::search))
        .route("/document_scans", post(endpoints::scans::upload))
        .route("/document_scans/:kind/:id", get(endpoints::scans::get))
        .route(
            "/document_scans/:kind/:id/confirm",
            post(endpoints::scans::confirm),
        )
        .route("/document_scans/:kind/:id/retry", post(endpoints::scans::retry))
        .with_state(ctx.clone())
        .layer(axum::middleware::from_fn(middleware::access_log::log_access))
        .layer(axum::middleware::from_fn(middleware::auth::require_auth))
        .layer(axum::Extension(ctx.clone()));

    let public = Router::new()
        .route("/health", get(endpoints::health::check))
        .route("/auth/register", post(endpoints::auth::register))
        .route("/auth/login", post(endpoints::auth::login))
        .with_state(ctx.clone())
        .layer(axum::middleware::from_fn(middleware::access_log::log_access))
        .layer(axum::Extension(ctx));

    let app = Router::new()
        .nest("/api", protected.merge(public))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ));

    match cors_origin.as_deref().map(HeaderValue::from_str) {
        Some(Ok(origin)) => app.layer(
            CorsLayer::new()
                .allow_origin(origin)
                .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]),
        ),
        Some(Err(_)) => {
            tracing::warn!(origin = ?cors_origin, "Ignoring invalid CORS origin");
            app
        }
        None => app,
    }
}
