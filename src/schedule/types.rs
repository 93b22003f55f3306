use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;
use uuid::Uuid;

use crate::models::enums::LogStatus;
use crate::models::MedicationLog;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DoseStatus {
    Taken,
    Skipped,
    Pending,
}

impl From<LogStatus> for DoseStatus {
    fn from(status: LogStatus) -> Self {
        match status {
            LogStatus::Taken => DoseStatus::Taken,
            LogStatus::Skipped => DoseStatus::Skipped,
        }
    }
}

/// One dose due on a given day, with its logged outcome if any.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduledDose {
    pub schedule_id: Uuid,
    pub medication_id: Uuid,
    pub medication_name: String,
    pub dosage: Option<String>,
    pub time_of_day: NaiveTime,
    pub dose_amount: Option<f64>,
    pub dose_unit: Option<String>,
    pub instructions: Option<String>,
    pub status: DoseStatus,
    pub overdue: bool,
    pub log_id: Option<Uuid>,
    pub logged_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DaySummary {
    pub total: u32,
    pub taken: u32,
    pub skipped: u32,
    pub pending: u32,
    pub overdue: u32,
}

impl DaySummary {
    pub(crate) fn count(&mut self, dose: &ScheduledDose) {
        self.total += 1;
        match dose.status {
            DoseStatus::Taken => self.taken += 1,
            DoseStatus::Skipped => self.skipped += 1,
            DoseStatus::Pending => self.pending += 1,
        }
        if dose.overdue {
            self.overdue += 1;
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DailySchedule {
    pub date: NaiveDate,
    pub doses: Vec<ScheduledDose>,
    pub summary: DaySummary,
}

/// Coarse per-day classification used by the weekly view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DayAdherence {
    Empty,
    None,
    Partial,
    Complete,
}

impl DayAdherence {
    pub fn classify(summary: &DaySummary) -> Self {
        match (summary.total, summary.taken) {
            (0, _) => DayAdherence::Empty,
            (_, 0) => DayAdherence::None,
            (total, taken) if taken >= total => DayAdherence::Complete,
            _ => DayAdherence::Partial,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WeekDay {
    pub date: NaiveDate,
    pub weekday: &'static str,
    pub summary: DaySummary,
    pub adherence: DayAdherence,
    pub doses: Vec<ScheduledDose>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WeeklySchedule {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub days: Vec<WeekDay>,
}

/// Logs keyed by (schedule, date) for in-memory joins.
pub(crate) type LogIndex<'a> = HashMap<(Uuid, NaiveDate), &'a MedicationLog>;

pub(crate) fn index_logs(logs: &[MedicationLog]) -> LogIndex<'_> {
    logs.iter()
        .map(|log| ((log.schedule_id, log.scheduled_for), log))
        .collect()
}
