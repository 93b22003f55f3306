use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::LogStatus;
use super::medication::Medication;

const WEEKDAYS: [(Weekday, &str); 7] = [
    (Weekday::Mon, "mon"),
    (Weekday::Tue, "tue"),
    (Weekday::Wed, "wed"),
    (Weekday::Thu, "thu"),
    (Weekday::Fri, "fri"),
    (Weekday::Sat, "sat"),
    (Weekday::Sun, "sun"),
];

/// Days of the week a schedule applies to, stored as a 7-bit mask (Monday = bit 0).
///
/// Serialized as a list of short lowercase day names: `["mon", "wed", "fri"]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    pub const ALL: WeekdaySet = WeekdaySet(0b111_1111);

    pub fn from_days(days: &[Weekday]) -> Self {
        Self(
            days.iter()
                .fold(0u8, |mask, d| mask | (1 << d.num_days_from_monday())),
        )
    }

    /// Build from a stored mask; bits above Sunday are dropped.
    pub fn from_mask(mask: u8) -> Self {
        Self(mask & Self::ALL.0)
    }

    pub fn mask(&self) -> u8 {
        self.0
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & (1 << day.num_days_from_monday()) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn days(&self) -> Vec<Weekday> {
        WEEKDAYS
            .iter()
            .filter(|(d, _)| self.contains(*d))
            .map(|(d, _)| *d)
            .collect()
    }
}

impl TryFrom<Vec<String>> for WeekdaySet {
    type Error = String;

    fn try_from(names: Vec<String>) -> Result<Self, Self::Error> {
        let mut days = Vec::with_capacity(names.len());
        for name in &names {
            let lowered = name.trim().to_ascii_lowercase();
            let day = WEEKDAYS
                .iter()
                .find(|(_, short)| lowered.starts_with(short))
                .map(|(d, _)| *d)
                .ok_or_else(|| format!("unknown weekday: {name}"))?;
            days.push(day);
        }
        Ok(Self::from_days(&days))
    }
}

impl From<WeekdaySet> for Vec<String> {
    fn from(set: WeekdaySet) -> Self {
        WEEKDAYS
            .iter()
            .filter(|(d, _)| set.contains(*d))
            .map(|(_, short)| short.to_string())
            .collect()
    }
}

/// Short lowercase name of a weekday (`mon` .. `sun`).
pub fn weekday_name(day: Weekday) -> &'static str {
    WEEKDAYS[day.num_days_from_monday() as usize].1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicationSchedule {
    pub id: Uuid,
    pub medication_id: Uuid,
    pub time_of_day: NaiveTime,
    pub days_of_week: WeekdaySet,
    pub dose_amount: Option<f64>,
    pub dose_unit: Option<String>,
    pub instructions: Option<String>,
    pub active: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicationLog {
    pub id: Uuid,
    pub schedule_id: Uuid,
    pub medication_id: Uuid,
    pub scheduled_for: NaiveDate,
    pub status: LogStatus,
    pub logged_at: NaiveDateTime,
    pub notes: Option<String>,
}

/// A schedule joined with its medication, the unit of schedule aggregation.
#[derive(Debug, Clone)]
pub struct ScheduledMedication {
    pub schedule: MedicationSchedule,
    pub medication: Medication,
}

impl ScheduledMedication {
    /// Whether a dose of this schedule is due on `date`.
    pub fn applies_on(&self, date: NaiveDate) -> bool {
        self.schedule.active
            && self.schedule.days_of_week.contains(date.weekday())
            && self.schedule.created_at.date() <= date
            && self.medication.is_current_on(date)
    }
}
