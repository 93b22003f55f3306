use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{ExtractionStatus, ScanKind};

/// Columns shared by every record that can come from a document scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanFields {
    #[serde(skip_serializing, default)]
    pub source_file: Option<String>,
    pub source_mime: Option<String>,
    pub extraction_status: ExtractionStatus,
    pub extracted_data: Option<serde_json::Value>,
    pub extraction_error: Option<String>,
    pub extracted_at: Option<NaiveDateTime>,
}

impl ScanFields {
    /// Fields for a record typed in by hand.
    pub fn manual() -> Self {
        Self {
            source_file: None,
            source_mime: None,
            extraction_status: ExtractionStatus::Manual,
            extracted_data: None,
            extraction_error: None,
            extracted_at: None,
        }
    }

    /// Fields for a freshly uploaded scan waiting for the worker.
    pub fn pending(source_file: String, source_mime: String) -> Self {
        Self {
            source_file: Some(source_file),
            source_mime: Some(source_mime),
            extraction_status: ExtractionStatus::Pending,
            extracted_data: None,
            extraction_error: None,
            extracted_at: None,
        }
    }
}

/// Scan state of one prescription or biology report, independent of its kind.
#[derive(Debug, Clone, Serialize)]
pub struct ScanRecord {
    pub kind: ScanKind,
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(flatten)]
    pub scan: ScanFields,
    pub created_at: NaiveDateTime,
}
