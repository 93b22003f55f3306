//! Document scan endpoints.
//!
//! - `POST /api/document_scans`: multipart `kind` + `file`, queues extraction
//! - `GET /api/document_scans/:kind/:id`: scan status and extracted data
//! - `POST /api/document_scans/:kind/:id/confirm`: optional `{"data": ...}` edits
//! - `POST /api/document_scans/:kind/:id/retry`: failed scans only

use std::str::FromStr;

use axum::body::Bytes;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use super::found;
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, UserContext};
use crate::db;
use crate::models::enums::ScanKind;
use crate::models::ScanRecord;
use crate::scanning::{self, ConfirmOutcome, ScanJob};
use crate::schedule::local_now;

#[derive(Deserialize)]
pub struct ConfirmRequest {
    #[serde(default)]
    pub data: Option<Value>,
}

/// Accept an uploaded prescription or lab report image and queue it.
pub async fn upload(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ScanRecord>), ApiError> {
    let mut kind: Option<ScanKind> = None;
    let mut file: Option<(Option<String>, Bytes)> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("kind") => {
                let text = field.text().await?;
                let parsed = ScanKind::from_str(text.trim()).map_err(|_| {
                    ApiError::Validation(format!(
                        "kind must be prescription or biology_report, got '{}'",
                        text.trim()
                    ))
                })?;
                kind = Some(parsed);
            }
            Some("file") => {
                let file_name = field.file_name().map(String::from);
                let bytes = field.bytes().await?;
                file = Some((file_name, bytes));
            }
            _ => {}
        }
    }

    let kind = kind.ok_or_else(|| ApiError::BadRequest("missing field: kind".into()))?;
    let (file_name, bytes) = file.ok_or_else(|| ApiError::BadRequest("missing field: file".into()))?;

    let record = {
        let conn = ctx.core.open_db()?;
        scanning::create_scan(
            &conn,
            &ctx.core.uploads_dir(),
            &user.user_id,
            kind,
            file_name.as_deref(),
            &bytes,
            ctx.core.config.max_upload_bytes,
            local_now(),
        )?
    };

    ctx.core.enqueue_scan(ScanJob { kind, id: record.id });
    tracing::info!(scan_id = %record.id, kind = %kind, size = bytes.len(), "Scan uploaded");

    Ok((StatusCode::ACCEPTED, Json(record)))
}

/// Current scan state. Clients poll this until `extracted` or `failed`.
pub async fn get(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    Path((kind, id)): Path<(ScanKind, Uuid)>,
) -> Result<Json<ScanRecord>, ApiError> {
    let conn = ctx.core.open_db()?;
    let record = found(db::get_scan_record_for_user(&conn, kind, &user.user_id, &id)?, "Scan")?;
    Ok(Json(record))
}

/// Turn the extracted data, or the client's corrected version, into records.
pub async fn confirm(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    Path((kind, id)): Path<(ScanKind, Uuid)>,
    body: Bytes,
) -> Result<Json<ConfirmOutcome>, ApiError> {
    let edits = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        let request: ConfirmRequest = serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("invalid JSON body: {e}")))?;
        request.data
    };

    let conn = ctx.core.open_db()?;
    let outcome = scanning::confirm_scan(&conn, &user.user_id, kind, &id, edits, local_now())?;
    Ok(Json(outcome))
}

/// Send a failed scan back to the worker.
pub async fn retry(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    Path((kind, id)): Path<(ScanKind, Uuid)>,
) -> Result<(StatusCode, Json<ScanRecord>), ApiError> {
    let conn = ctx.core.open_db()?;
    scanning::retry_scan(&conn, &user.user_id, kind, &id)?;
    let record = found(db::get_scan_record_for_user(&conn, kind, &user.user_id, &id)?, "Scan")?;
    ctx.core.enqueue_scan(ScanJob { kind, id });
    Ok((StatusCode::ACCEPTED, Json(record)))
}
