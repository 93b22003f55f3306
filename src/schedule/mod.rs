//! Schedule aggregation: daily and weekly dose views and adherence rates.
//!
//! All queries take the current local time as a parameter so the
//! classification is reproducible; `local_now` supplies it in production.

pub mod adherence;
pub mod daily;
pub mod types;
pub mod weekly;

pub use adherence::{AdherenceCalculationService, AdherencePeriod, AdherenceReport};
pub use daily::DailyScheduleQuery;
pub use types::*;
pub use weekly::WeeklyScheduleQuery;

use chrono::{NaiveDateTime, Timelike};

/// Wall-clock time in the server's local timezone, truncated to seconds.
pub fn local_now() -> NaiveDateTime {
    let now = chrono::Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}
