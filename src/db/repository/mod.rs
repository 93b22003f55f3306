//! Repository layer: entity-scoped database operations.
//!
//! Every function that touches user data takes the owning `user_id` and
//! scopes its query through `prescriptions.user_id` or
//! `biology_reports.user_id`, so another user's record behaves as missing.

mod biology;
mod biomarker;
mod drug;
mod medication;
mod medication_log;
mod prescription;
mod scan;
mod schedule;
mod session;
mod user;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use uuid::Uuid;

use super::DatabaseError;

pub use biology::*;
pub use biomarker::*;
pub use drug::*;
pub use medication::*;
pub use medication_log::*;
pub use prescription::*;
pub use scan::*;
pub use schedule::*;
pub use session::*;
pub use user::*;

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";
pub(crate) const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub(crate) const TIME_FORMAT: &str = "%H:%M";

pub(crate) fn parse_uuid(s: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

pub(crate) fn parse_opt_uuid(s: Option<String>) -> Result<Option<Uuid>, DatabaseError> {
    s.as_deref().map(parse_uuid).transpose()
}

pub(crate) fn parse_date(s: &str) -> Result<NaiveDate, DatabaseError> {
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .map_err(|e| DatabaseError::ConstraintViolation(format!("bad date '{s}': {e}")))
}

pub(crate) fn parse_opt_date(s: Option<String>) -> Result<Option<NaiveDate>, DatabaseError> {
    s.as_deref().map(parse_date).transpose()
}

pub(crate) fn parse_datetime(s: &str) -> Result<NaiveDateTime, DatabaseError> {
    NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
        .map_err(|e| DatabaseError::ConstraintViolation(format!("bad datetime '{s}': {e}")))
}

pub(crate) fn parse_opt_datetime(s: Option<String>) -> Result<Option<NaiveDateTime>, DatabaseError> {
    s.as_deref().map(parse_datetime).transpose()
}

/// Accepts `HH:MM` and `HH:MM:SS`.
pub(crate) fn parse_time(s: &str) -> Result<NaiveTime, DatabaseError> {
    NaiveTime::parse_from_str(s, TIME_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map_err(|e| DatabaseError::ConstraintViolation(format!("bad time '{s}': {e}")))
}

pub(crate) fn format_date(d: &NaiveDate) -> String {
    d.format(DATE_FORMAT).to_string()
}

pub(crate) fn format_datetime(dt: &NaiveDateTime) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

pub(crate) fn format_time(t: &NaiveTime) -> String {
    t.format(TIME_FORMAT).to_string()
}

/// Turn a UNIQUE constraint failure into `Duplicate`, pass anything else through.
pub(crate) fn map_unique_violation(err: rusqlite::Error, what: &str) -> DatabaseError {
    match &err {
        rusqlite::Error::SqliteFailure(e, msg)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
                && msg.as_deref().is_some_and(|m| m.contains("UNIQUE")) =>
        {
            DatabaseError::Duplicate(what.to_string())
        }
        _ => DatabaseError::Sqlite(err),
    }
}

/// `NotFound` when an UPDATE/DELETE scoped to a user touched nothing.
pub(crate) fn require_affected(
    affected: usize,
    entity_type: &str,
    id: &Uuid,
) -> Result<(), DatabaseError> {
    if affected == 0 {
        Err(DatabaseError::not_found(entity_type, id))
    } else {
        Ok(())
    }
}
