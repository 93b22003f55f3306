use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::Connection;
use uuid::Uuid;

use super::types::{index_logs, DailySchedule, DaySummary, DoseStatus, LogIndex, ScheduledDose};
use crate::db::{self, DatabaseError};
use crate::models::ScheduledMedication;

/// Doses due for one user on one day.
pub struct DailyScheduleQuery<'a> {
    conn: &'a Connection,
    user_id: Uuid,
}

impl<'a> DailyScheduleQuery<'a> {
    pub fn new(conn: &'a Connection, user_id: Uuid) -> Self {
        Self { conn, user_id }
    }

    pub fn run(&self, date: NaiveDate, now: NaiveDateTime) -> Result<DailySchedule, DatabaseError> {
        let entries = db::load_schedule_entries(self.conn, &self.user_id)?;
        let logs = db::list_logs_in_range(self.conn, &self.user_id, &date, &date)?;
        Ok(build_daily(&entries, &index_logs(&logs), date, now))
    }
}

/// A pending dose is overdue once its day, or its time on today, has passed.
pub fn is_overdue(date: NaiveDate, time_of_day: NaiveTime, now: NaiveDateTime) -> bool {
    date < now.date() || (date == now.date() && time_of_day < now.time())
}

/// Classify every entry due on `date`, ordered by time then medication name.
pub(crate) fn build_daily(
    entries: &[ScheduledMedication],
    logs: &LogIndex<'_>,
    date: NaiveDate,
    now: NaiveDateTime,
) -> DailySchedule {
    let mut doses: Vec<ScheduledDose> = entries
        .iter()
        .filter(|entry| entry.applies_on(date))
        .map(|entry| {
            let log = logs.get(&(entry.schedule.id, date));
            let status = log.map_or(DoseStatus::Pending, |l| DoseStatus::from(l.status));
            ScheduledDose {
                schedule_id: entry.schedule.id,
                medication_id: entry.medication.id,
                medication_name: entry.medication.name.clone(),
                dosage: entry.medication.dosage.clone(),
                time_of_day: entry.schedule.time_of_day,
                dose_amount: entry.schedule.dose_amount,
                dose_unit: entry.schedule.dose_unit.clone(),
                instructions: entry.schedule.instructions.clone(),
                status,
                overdue: status == DoseStatus::Pending
                    && is_overdue(date, entry.schedule.time_of_day, now),
                log_id: log.map(|l| l.id),
                logged_at: log.map(|l| l.logged_at),
            }
        })
        .collect();

    doses.sort_by(|a, b| {
        a.time_of_day
            .cmp(&b.time_of_day)
            .then_with(|| a.medication_name.to_lowercase().cmp(&b.medication_name.to_lowercase()))
    });

    let mut summary = DaySummary::default();
    for dose in &doses {
        summary.count(dose);
    }

    DailySchedule { date, doses, summary }
}

#[cfg(test)]
mod tests {
    use chrono::Weekday;

    use super::*;
    use crate::db::repository::test_support::*;
    use crate::models::enums::LogStatus;
    use crate::models::{MedicationLog, WeekdaySet};

    fn log_dose(conn: &Connection, schedule_id: Uuid, med_id: Uuid, day: &str, status: LogStatus) {
        db::insert_log(
            conn,
            &MedicationLog {
                id: Uuid::new_v4(),
                schedule_id,
                medication_id: med_id,
                scheduled_for: date(day),
                status,
                logged_at: datetime(&format!("{day} 08:10:00")),
                notes: None,
            },
        )
        .unwrap();
    }

    #[test]
    fn overdue_rule() {
        let now = datetime("2024-03-06 12:00:00");
        assert!(is_overdue(date("2024-03-05"), time("23:00"), now));
        assert!(is_overdue(date("2024-03-06"), time("08:00"), now));
        assert!(!is_overdue(date("2024-03-06"), time("12:00"), now));
        assert!(!is_overdue(date("2024-03-06"), time("20:00"), now));
        assert!(!is_overdue(date("2024-03-07"), time("08:00"), now));
    }

    #[test]
    fn classifies_and_orders_doses() {
        let conn = db::open_memory_database().unwrap();
        let user_id = make_user(&conn, "ana@example.com");
        let prescription_id = make_prescription(&conn, user_id);
        let metformin = make_medication(&conn, prescription_id, "Metformin");
        let aspirin = make_medication(&conn, prescription_id, "aspirin");
        let ramipril = make_medication(&conn, prescription_id, "Ramipril");

        let morning = make_schedule(&conn, metformin, "08:00", WeekdaySet::ALL);
        let evening = make_schedule(&conn, metformin, "20:00", WeekdaySet::ALL);
        let aspirin_morning = make_schedule(&conn, aspirin, "08:00", WeekdaySet::ALL);
        // 2024-03-06 is a Wednesday
        make_schedule(&conn, ramipril, "09:00", WeekdaySet::from_days(&[Weekday::Mon]));

        log_dose(&conn, morning, metformin, "2024-03-06", LogStatus::Taken);
        log_dose(&conn, aspirin_morning, aspirin, "2024-03-05", LogStatus::Taken);

        let daily = DailyScheduleQuery::new(&conn, user_id)
            .run(date("2024-03-06"), datetime("2024-03-06 12:00:00"))
            .unwrap();

        let order: Vec<(&str, DoseStatus, bool)> = daily
            .doses
            .iter()
            .map(|d| (d.medication_name.as_str(), d.status, d.overdue))
            .collect();
        assert_eq!(
            order,
            vec![
                ("aspirin", DoseStatus::Pending, true),
                ("Metformin", DoseStatus::Taken, false),
                ("Metformin", DoseStatus::Pending, false),
            ]
        );
        assert_eq!(daily.doses[2].schedule_id, evening);
        assert!(daily.doses[1].log_id.is_some());
        assert_eq!(
            daily.summary,
            DaySummary { total: 3, taken: 1, skipped: 0, pending: 2, overdue: 1 }
        );
    }

    #[test]
    fn medication_window_limits_days() {
        let conn = db::open_memory_database().unwrap();
        let user_id = make_user(&conn, "ana@example.com");
        let prescription_id = make_prescription(&conn, user_id);
        let med_id = make_medication(&conn, prescription_id, "Amoxicillin");
        make_schedule(&conn, med_id, "08:00", WeekdaySet::ALL);

        let mut med = db::get_medication(&conn, &user_id, &med_id).unwrap().unwrap();
        med.start_date = Some(date("2024-03-01"));
        med.end_date = Some(date("2024-03-07"));
        db::update_medication(&conn, &user_id, &med).unwrap();

        let query = DailyScheduleQuery::new(&conn, user_id);
        let now = datetime("2024-03-10 07:00:00");
        assert_eq!(query.run(date("2024-03-07"), now).unwrap().summary.total, 1);
        assert_eq!(query.run(date("2024-03-08"), now).unwrap().summary.total, 0);
        assert_eq!(query.run(date("2024-02-29"), now).unwrap().summary.total, 0);
    }

    #[test]
    fn future_day_is_never_overdue() {
        let conn = db::open_memory_database().unwrap();
        let user_id = make_user(&conn, "ana@example.com");
        let prescription_id = make_prescription(&conn, user_id);
        let med_id = make_medication(&conn, prescription_id, "Metformin");
        make_schedule(&conn, med_id, "08:00", WeekdaySet::ALL);

        let daily = DailyScheduleQuery::new(&conn, user_id)
            .run(date("2024-03-08"), datetime("2024-03-06 12:00:00"))
            .unwrap();
        assert_eq!(daily.summary.pending, 1);
        assert_eq!(daily.summary.overdue, 0);
    }
}
