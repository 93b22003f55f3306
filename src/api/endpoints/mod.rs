//! API endpoint handlers, one module per resource.
//!
//! Handlers open their own connection through `CoreState::open_db` and
//! reuse the repository and domain modules; every user-owned lookup is
//! scoped by the `UserContext` injected by the auth middleware.

pub mod auth;
pub mod biology;
pub mod biomarkers;
pub mod drugs;
pub mod health;
pub mod logs;
pub mod medications;
pub mod prescriptions;
pub mod profile;
pub mod scans;
pub mod schedule;
pub mod schedules;

use crate::api::error::ApiError;

/// Trimmed text, `None` when blank.
pub(crate) fn clean_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// `NotFound` for an owned lookup that came back empty.
pub(crate) fn found<T>(value: Option<T>, entity: &str) -> Result<T, ApiError> {
    value.ok_or_else(|| ApiError::NotFound(format!("{entity} not found")))
}
