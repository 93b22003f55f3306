use chrono::{Datelike, Days, NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use uuid::Uuid;

use super::daily::build_daily;
use super::types::{index_logs, DayAdherence, WeekDay, WeeklySchedule};
use crate::db::{self, DatabaseError};
use crate::models::weekday_name;

/// Monday..Sunday of the week containing a reference date.
///
/// Schedules and logs for the whole week are loaded with one query each
/// and classified in memory with the daily rules.
pub struct WeeklyScheduleQuery<'a> {
    conn: &'a Connection,
    user_id: Uuid,
}

impl<'a> WeeklyScheduleQuery<'a> {
    pub fn new(conn: &'a Connection, user_id: Uuid) -> Self {
        Self { conn, user_id }
    }

    /// `None` when the week around `reference` leaves the calendar range.
    pub fn run(
        &self,
        reference: NaiveDate,
        now: NaiveDateTime,
    ) -> Result<Option<WeeklySchedule>, DatabaseError> {
        let Some((start, end)) = week_bounds(reference) else {
            return Ok(None);
        };
        let entries = db::load_schedule_entries(self.conn, &self.user_id)?;
        let logs = db::list_logs_in_range(self.conn, &self.user_id, &start, &end)?;
        let index = index_logs(&logs);

        let days = start
            .iter_days()
            .take(7)
            .map(|date| {
                let daily = build_daily(&entries, &index, date, now);
                WeekDay {
                    date,
                    weekday: weekday_name(date.weekday()),
                    adherence: DayAdherence::classify(&daily.summary),
                    summary: daily.summary,
                    doses: daily.doses,
                }
            })
            .collect();

        Ok(Some(WeeklySchedule { start, end, days }))
    }
}

pub fn week_bounds(reference: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
    let offset = u64::from(reference.weekday().num_days_from_monday());
    let start = reference.checked_sub_days(Days::new(offset))?;
    let end = start.checked_add_days(Days::new(6))?;
    Some((start, end))
}

#[cfg(test)]
mod tests {
    use chrono::Weekday;

    use super::*;
    use crate::db::repository::test_support::*;
    use crate::models::enums::LogStatus;
    use crate::models::{MedicationLog, WeekdaySet};

    #[test]
    fn week_bounds_span_monday_to_sunday() {
        let march = Some((date("2024-03-04"), date("2024-03-10")));
        assert_eq!(week_bounds(date("2024-03-06")), march);
        assert_eq!(week_bounds(date("2024-03-04")), march);
        assert_eq!(week_bounds(date("2024-03-10")), march);
        assert_eq!(week_bounds(date("2024-01-03")), Some((date("2024-01-01"), date("2024-01-07"))));
    }

    #[test]
    fn weeks_past_the_calendar_edges_have_no_bounds() {
        assert_eq!(week_bounds(NaiveDate::MAX), None);
        assert_eq!(week_bounds(NaiveDate::MIN), None);

        let conn = db::open_memory_database().unwrap();
        let user_id = make_user(&conn, "ana@example.com");
        let query = WeeklyScheduleQuery::new(&conn, user_id);
        let now = datetime("2024-03-07 12:00:00");
        assert!(query.run(NaiveDate::MAX, now).unwrap().is_none());
        assert!(query.run(NaiveDate::MIN, now).unwrap().is_none());
    }

    #[test]
    fn classifies_each_day() {
        let conn = db::open_memory_database().unwrap();
        let user_id = make_user(&conn, "ana@example.com");
        let prescription_id = make_prescription(&conn, user_id);
        let med_id = make_medication(&conn, prescription_id, "Metformin");
        let weekdays = WeekdaySet::from_days(&[
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
        ]);
        let morning = make_schedule(&conn, med_id, "08:00", weekdays);
        let evening = make_schedule(&conn, med_id, "20:00", weekdays);

        let log = |schedule_id: Uuid, day: &str, status: LogStatus| {
            db::insert_log(
                &conn,
                &MedicationLog {
                    id: Uuid::new_v4(),
                    schedule_id,
                    medication_id: med_id,
                    scheduled_for: date(day),
                    status,
                    logged_at: datetime(&format!("{day} 21:00:00")),
                    notes: None,
                },
            )
            .unwrap();
        };
        // Monday complete, Tuesday partial, Wednesday only skipped
        log(morning, "2024-03-04", LogStatus::Taken);
        log(evening, "2024-03-04", LogStatus::Taken);
        log(morning, "2024-03-05", LogStatus::Taken);
        log(morning, "2024-03-06", LogStatus::Skipped);
        // outside the week
        log(morning, "2024-03-11", LogStatus::Taken);

        let week = WeeklyScheduleQuery::new(&conn, user_id)
            .run(date("2024-03-07"), datetime("2024-03-07 12:00:00"))
            .unwrap()
            .unwrap();

        assert_eq!(week.start, date("2024-03-04"));
        assert_eq!(week.end, date("2024-03-10"));
        let classes: Vec<DayAdherence> = week.days.iter().map(|d| d.adherence).collect();
        assert_eq!(
            classes,
            vec![
                DayAdherence::Complete,
                DayAdherence::Partial,
                DayAdherence::None,
                DayAdherence::None,
                DayAdherence::None,
                DayAdherence::Empty,
                DayAdherence::Empty,
            ]
        );
        assert_eq!(week.days[0].weekday, "mon");
        assert_eq!(week.days[2].summary.skipped, 1);
        // Thursday: morning overdue at noon, evening still ahead
        assert_eq!(week.days[3].summary.overdue, 1);
        assert_eq!(week.days[4].summary.overdue, 0);
    }
}
