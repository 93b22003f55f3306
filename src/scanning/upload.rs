use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use rusqlite::Connection;
use uuid::Uuid;

use super::ScanError;
use crate::db;
use crate::models::enums::ScanKind;
use crate::models::{BiologyReport, Prescription, ScanFields, ScanRecord};

/// Image types the vision model accepts, with the extension used on disk.
const ACCEPTED: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/webp", "webp"),
];

/// Identify an accepted image format from its leading bytes.
pub fn sniff_image_type(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        Some("image/png")
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else {
        None
    }
}

/// Check size and content of an upload and return its MIME type.
///
/// The content decides the type; a file name whose extension names a
/// different, unsupported type (e.g. `.pdf`) is rejected as well.
pub fn validate_upload(
    file_name: Option<&str>,
    bytes: &[u8],
    max_bytes: usize,
) -> Result<&'static str, ScanError> {
    if bytes.is_empty() {
        return Err(ScanError::EmptyFile);
    }
    if bytes.len() > max_bytes {
        return Err(ScanError::TooLarge {
            size: bytes.len(),
            max: max_bytes,
        });
    }

    if let Some(guessed) = file_name.and_then(|n| mime_guess::from_path(n).first()) {
        let essence = guessed.essence_str();
        if !ACCEPTED.iter().any(|(mime, _)| *mime == essence) {
            return Err(ScanError::UnsupportedType(essence.to_string()));
        }
    }

    sniff_image_type(bytes)
        .ok_or_else(|| ScanError::UnsupportedType("unrecognized image data".into()))
}

fn extension_for(mime: &str) -> &'static str {
    ACCEPTED
        .iter()
        .find(|(m, _)| *m == mime)
        .map(|(_, ext)| *ext)
        .unwrap_or("bin")
}

/// Write the upload under `<uploads_dir>/<user_id>/` and return its path
/// relative to `uploads_dir`.
pub fn store_upload(
    uploads_dir: &Path,
    user_id: &Uuid,
    bytes: &[u8],
    mime: &str,
) -> Result<String, ScanError> {
    let user_dir = uploads_dir.join(user_id.to_string());
    std::fs::create_dir_all(&user_dir)?;

    let file_name = format!("{}.{}", Uuid::new_v4(), extension_for(mime));
    std::fs::write(user_dir.join(&file_name), bytes)?;
    Ok(format!("{user_id}/{file_name}"))
}

/// Validate and store an uploaded document, then create its record in
/// `pending` state. The stored file is removed if the record cannot be
/// created.
#[allow(clippy::too_many_arguments)]
pub fn create_scan(
    conn: &Connection,
    uploads_dir: &Path,
    user_id: &Uuid,
    kind: ScanKind,
    file_name: Option<&str>,
    bytes: &[u8],
    max_bytes: usize,
    now: NaiveDateTime,
) -> Result<ScanRecord, ScanError> {
    let mime = validate_upload(file_name, bytes, max_bytes)?;
    let relative = store_upload(uploads_dir, user_id, bytes, mime)?;
    let scan = ScanFields::pending(relative.clone(), mime.to_string());
    let id = Uuid::new_v4();

    let inserted = match kind {
        ScanKind::Prescription => db::insert_prescription(
            conn,
            &Prescription {
                id,
                user_id: *user_id,
                doctor_name: None,
                prescribed_on: None,
                valid_until: None,
                notes: None,
                scan: scan.clone(),
                created_at: now,
            },
        ),
        ScanKind::BiologyReport => db::insert_biology_report(
            conn,
            &BiologyReport {
                id,
                user_id: *user_id,
                lab_name: None,
                test_date: None,
                notes: None,
                scan: scan.clone(),
                created_at: now,
            },
        ),
    };

    if let Err(e) = inserted {
        let path: PathBuf = uploads_dir.join(&relative);
        if let Err(io) = std::fs::remove_file(&path) {
            tracing::warn!(error = %io, "Failed to remove orphaned upload");
        }
        return Err(e.into());
    }

    tracing::info!(scan_id = %id, kind = %kind, user_id = %user_id, size = bytes.len(), "Document uploaded");
    Ok(ScanRecord {
        kind,
        id,
        user_id: *user_id,
        scan,
        created_at: now,
    })
}
