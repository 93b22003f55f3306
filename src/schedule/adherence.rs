use std::collections::HashMap;

use chrono::{Days, NaiveDate};
use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

use super::types::index_logs;
use crate::db::{self, DatabaseError};
use crate::models::enums::LogStatus;

/// Trailing window lengths the calculator accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "u32")]
pub enum AdherencePeriod {
    Week,
    Month,
    Quarter,
}

impl AdherencePeriod {
    pub fn from_days(days: u32) -> Option<Self> {
        match days {
            7 => Some(Self::Week),
            30 => Some(Self::Month),
            90 => Some(Self::Quarter),
            _ => None,
        }
    }

    pub fn days(&self) -> u32 {
        match self {
            Self::Week => 7,
            Self::Month => 30,
            Self::Quarter => 90,
        }
    }
}

impl From<AdherencePeriod> for u32 {
    fn from(period: AdherencePeriod) -> Self {
        period.days()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AdherenceTotals {
    pub scheduled: u32,
    pub taken: u32,
    pub skipped: u32,
    pub percentage: Option<f64>,
}

impl AdherenceTotals {
    fn record(&mut self, status: Option<LogStatus>) {
        self.scheduled += 1;
        match status {
            Some(LogStatus::Taken) => self.taken += 1,
            Some(LogStatus::Skipped) => self.skipped += 1,
            None => {}
        }
    }

    fn finish(mut self) -> Self {
        self.percentage = percentage(self.taken, self.scheduled);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MedicationAdherence {
    pub medication_id: Uuid,
    pub medication_name: String,
    #[serde(flatten)]
    pub totals: AdherenceTotals,
}

#[derive(Debug, Clone, Serialize)]
pub struct DayAdherenceRate {
    pub date: NaiveDate,
    pub scheduled: u32,
    pub taken: u32,
    pub percentage: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdherenceReport {
    pub period_days: AdherencePeriod,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub overall: AdherenceTotals,
    pub medications: Vec<MedicationAdherence>,
    pub days: Vec<DayAdherenceRate>,
}

/// `taken / scheduled * 100` to one decimal; `None` when nothing was due.
pub fn percentage(taken: u32, scheduled: u32) -> Option<f64> {
    if scheduled == 0 {
        return None;
    }
    let ratio = f64::from(taken) / f64::from(scheduled) * 100.0;
    Some((ratio * 10.0).round() / 10.0)
}

pub struct AdherenceCalculationService<'a> {
    conn: &'a Connection,
    user_id: Uuid,
}

impl<'a> AdherenceCalculationService<'a> {
    pub fn new(conn: &'a Connection, user_id: Uuid) -> Self {
        Self { conn, user_id }
    }

    /// Taken vs scheduled over `today - (period - 1) ..= today`.
    pub fn calculate(
        &self,
        period: AdherencePeriod,
        today: NaiveDate,
    ) -> Result<AdherenceReport, DatabaseError> {
        let start = today - Days::new(u64::from(period.days() - 1));
        let entries = db::load_schedule_entries(self.conn, &self.user_id)?;
        let logs = db::list_logs_in_range(self.conn, &self.user_id, &start, &today)?;
        let index = index_logs(&logs);

        let mut overall = AdherenceTotals::default();
        let mut per_medication: HashMap<Uuid, MedicationAdherence> = HashMap::new();
        let mut days = Vec::with_capacity(period.days() as usize);

        for date in start.iter_days().take_while(|d| *d <= today) {
            let mut day = AdherenceTotals::default();
            for entry in entries.iter().filter(|e| e.applies_on(date)) {
                let status = index.get(&(entry.schedule.id, date)).map(|log| log.status);
                day.record(status);
                overall.record(status);
                per_medication
                    .entry(entry.medication.id)
                    .or_insert_with(|| MedicationAdherence {
                        medication_id: entry.medication.id,
                        medication_name: entry.medication.name.clone(),
                        totals: AdherenceTotals::default(),
                    })
                    .totals
                    .record(status);
            }
            let day = day.finish();
            days.push(DayAdherenceRate {
                date,
                scheduled: day.scheduled,
                taken: day.taken,
                percentage: day.percentage,
            });
        }

        let mut medications: Vec<MedicationAdherence> = per_medication
            .into_values()
            .map(|mut m| {
                m.totals = m.totals.finish();
                m
            })
            .collect();
        medications.sort_by(|a, b| {
            a.medication_name
                .to_lowercase()
                .cmp(&b.medication_name.to_lowercase())
                .then_with(|| a.medication_id.cmp(&b.medication_id))
        });

        Ok(AdherenceReport {
            period_days: period,
            start,
            end: today,
            overall: overall.finish(),
            medications,
            days,
        })
    }
}
