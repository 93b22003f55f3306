//! Document scanning: upload, background vision extraction, review and
//! confirmation of prescriptions and biology reports.
//!
//! Status flow: `pending → processing → extracted → confirmed`, with
//! `failed` reachable from `pending`/`processing` and `failed → pending`
//! on retry. Records typed in by hand stay `manual`.

pub mod confirm;
pub mod matching;
pub mod parser;
pub mod processor;
pub mod prompt;
pub mod types;
pub mod upload;
pub mod vision;
pub mod worker;

pub use confirm::{confirm_scan, retry_scan, ConfirmOutcome};
pub use processor::{process_scan, ScanOutcome};
pub use types::*;
pub use upload::create_scan;
pub use vision::{MockVisionClient, OllamaVisionClient, VisionClient};
pub use worker::{recover_scans, start_scan_worker, ScanJob, ScanQueue, ScanWorkerHandle};

use crate::db::DatabaseError;
use crate::models::enums::ExtractionStatus;

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("Vision service is not reachable at {0}")]
    VisionConnection(String),

    #[error("Vision service returned error (status {status}): {body}")]
    VisionError { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("Malformed vision response: {0}")]
    MalformedResponse(String),

    #[error("JSON parsing error: {0}")]
    JsonParsing(String),

    #[error("Nothing usable was extracted from the document")]
    NothingExtracted,

    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),

    #[error("File is empty")]
    EmptyFile,

    #[error("File too large ({size} bytes, max {max})")]
    TooLarge { size: usize, max: usize },

    #[error("Scan not found")]
    NotFound,

    #[error("Cannot {action} a scan in status {status}")]
    InvalidState {
        status: ExtractionStatus,
        action: &'static str,
    },

    #[error("Invalid extraction payload: {0}")]
    InvalidPayload(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}
