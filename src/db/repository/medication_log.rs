use std::str::FromStr;

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{
    format_date, format_datetime, map_unique_violation, parse_date, parse_datetime, parse_uuid,
    require_affected,
};
use crate::db::DatabaseError;
use crate::models::enums::LogStatus;
use crate::models::*;

const LOG_COLUMNS: &str =
    "l.id, l.schedule_id, l.medication_id, l.scheduled_for, l.status, l.logged_at, l.notes";

const OWNED_LOGS: &str = "FROM medication_logs l
    JOIN medications m ON m.id = l.medication_id
    JOIN prescriptions p ON p.id = m.prescription_id";

/// Fails with `Duplicate` when the schedule already has a log for that date.
pub fn insert_log(conn: &Connection, log: &MedicationLog) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO medication_logs (id, schedule_id, medication_id, scheduled_for, status,
         logged_at, notes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            log.id.to_string(),
            log.schedule_id.to_string(),
            log.medication_id.to_string(),
            format_date(&log.scheduled_for),
            log.status.as_str(),
            format_datetime(&log.logged_at),
            log.notes,
        ],
    )
    .map_err(|e| map_unique_violation(e, "dose already logged for this date"))?;
    Ok(())
}

pub fn get_log(
    conn: &Connection,
    user_id: &Uuid,
    id: &Uuid,
) -> Result<Option<MedicationLog>, DatabaseError> {
    let sql = format!("SELECT {LOG_COLUMNS} {OWNED_LOGS} WHERE l.id = ?1 AND p.user_id = ?2");
    let row = conn
        .query_row(
            &sql,
            params![id.to_string(), user_id.to_string()],
            log_row_from_rusqlite,
        )
        .optional()?;
    row.map(log_from_row).transpose()
}

/// Logs with `from <= scheduled_for <= to`, oldest first.
pub fn list_logs_in_range(
    conn: &Connection,
    user_id: &Uuid,
    from: &NaiveDate,
    to: &NaiveDate,
) -> Result<Vec<MedicationLog>, DatabaseError> {
    let sql = format!(
        "SELECT {LOG_COLUMNS} {OWNED_LOGS}
         WHERE p.user_id = ?1 AND l.scheduled_for BETWEEN ?2 AND ?3
         ORDER BY l.scheduled_for, l.logged_at"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![user_id.to_string(), format_date(from), format_date(to)],
        |row| Ok(log_row_from_rusqlite(row)),
    )?;

    let mut logs = Vec::new();
    for row in rows {
        logs.push(log_from_row(row??)?);
    }
    Ok(logs)
}

/// A medication's history, newest first.
pub fn list_medication_logs(
    conn: &Connection,
    user_id: &Uuid,
    medication_id: &Uuid,
) -> Result<Vec<MedicationLog>, DatabaseError> {
    let sql = format!(
        "SELECT {LOG_COLUMNS} {OWNED_LOGS}
         WHERE p.user_id = ?1 AND l.medication_id = ?2
         ORDER BY l.scheduled_for DESC, l.logged_at DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![user_id.to_string(), medication_id.to_string()],
        |row| Ok(log_row_from_rusqlite(row)),
    )?;

    let mut logs = Vec::new();
    for row in rows {
        logs.push(log_from_row(row??)?);
    }
    Ok(logs)
}

pub fn update_log(
    conn: &Connection,
    user_id: &Uuid,
    log: &MedicationLog,
) -> Result<(), DatabaseError> {
    let n = conn.execute(
        "UPDATE medication_logs SET status = ?1, notes = ?2, logged_at = ?3
         WHERE id = ?4 AND medication_id IN (
            SELECT m.id FROM medications m
            JOIN prescriptions p ON p.id = m.prescription_id WHERE p.user_id = ?5)",
        params![
            log.status.as_str(),
            log.notes,
            format_datetime(&log.logged_at),
            log.id.to_string(),
            user_id.to_string(),
        ],
    )?;
    require_affected(n, "MedicationLog", &log.id)
}

pub fn delete_log(conn: &Connection, user_id: &Uuid, id: &Uuid) -> Result<(), DatabaseError> {
    let n = conn.execute(
        "DELETE FROM medication_logs WHERE id = ?1 AND medication_id IN (
            SELECT m.id FROM medications m
            JOIN prescriptions p ON p.id = m.prescription_id WHERE p.user_id = ?2)",
        params![id.to_string(), user_id.to_string()],
    )?;
    require_affected(n, "MedicationLog", id)
}

struct LogRow {
    id: String,
    schedule_id: String,
    medication_id: String,
    scheduled_for: String,
    status: String,
    logged_at: String,
    notes: Option<String>,
}

fn log_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<LogRow, rusqlite::Error> {
    Ok(LogRow {
        id: row.get(0)?,
        schedule_id: row.get(1)?,
        medication_id: row.get(2)?,
        scheduled_for: row.get(3)?,
        status: row.get(4)?,
        logged_at: row.get(5)?,
        notes: row.get(6)?,
    })
}

fn log_from_row(row: LogRow) -> Result<MedicationLog, DatabaseError> {
    Ok(MedicationLog {
        id: parse_uuid(&row.id)?,
        schedule_id: parse_uuid(&row.schedule_id)?,
        medication_id: parse_uuid(&row.medication_id)?,
        scheduled_for: parse_date(&row.scheduled_for)?,
        status: LogStatus::from_str(&row.status)?,
        logged_at: parse_datetime(&row.logged_at)?,
        notes: row.notes,
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    struct Fixture {
        conn: Connection,
        user_id: Uuid,
        med_id: Uuid,
        schedule_id: Uuid,
    }

    fn fixture() -> Fixture {
        let conn = crate::db::open_memory_database().unwrap();
        let user_id = make_user(&conn, "ana@example.com");
        let prescription_id = make_prescription(&conn, user_id);
        let med_id = make_medication(&conn, prescription_id, "Metformin");
        let schedule_id = make_schedule(&conn, med_id, "08:00", WeekdaySet::ALL);
        Fixture { conn, user_id, med_id, schedule_id }
    }

    fn log(f: &Fixture, day: &str, status: LogStatus) -> MedicationLog {
        MedicationLog {
            id: Uuid::new_v4(),
            schedule_id: f.schedule_id,
            medication_id: f.med_id,
            scheduled_for: date(day),
            status,
            logged_at: datetime(&format!("{day} 08:05:00")),
            notes: None,
        }
    }

    #[test]
    fn one_log_per_schedule_per_date() {
        let f = fixture();
        insert_log(&f.conn, &log(&f, "2024-03-04", LogStatus::Taken)).unwrap();
        let second = insert_log(&f.conn, &log(&f, "2024-03-04", LogStatus::Skipped));
        assert!(matches!(second, Err(DatabaseError::Duplicate(_))));
        insert_log(&f.conn, &log(&f, "2024-03-05", LogStatus::Skipped)).unwrap();
    }

    #[test]
    fn range_is_inclusive() {
        let f = fixture();
        for day in ["2024-03-03", "2024-03-04", "2024-03-10", "2024-03-11"] {
            insert_log(&f.conn, &log(&f, day, LogStatus::Taken)).unwrap();
        }
        let logs =
            list_logs_in_range(&f.conn, &f.user_id, &date("2024-03-04"), &date("2024-03-10")).unwrap();
        let days: Vec<_> = logs.iter().map(|l| l.scheduled_for).collect();
        assert_eq!(days, vec![date("2024-03-04"), date("2024-03-10")]);
    }

    #[test]
    fn status_update_and_undo() {
        let f = fixture();
        let mut entry = log(&f, "2024-03-04", LogStatus::Taken);
        insert_log(&f.conn, &entry).unwrap();

        entry.status = LogStatus::Skipped;
        entry.notes = Some("nausea".into());
        update_log(&f.conn, &f.user_id, &entry).unwrap();
        let stored = get_log(&f.conn, &f.user_id, &entry.id).unwrap().unwrap();
        assert_eq!(stored.status, LogStatus::Skipped);
        assert_eq!(stored.notes.as_deref(), Some("nausea"));

        delete_log(&f.conn, &f.user_id, &entry.id).unwrap();
        assert!(list_medication_logs(&f.conn, &f.user_id, &f.med_id).unwrap().is_empty());
    }

    #[test]
    fn logs_hidden_from_other_users() {
        let f = fixture();
        let entry = log(&f, "2024-03-04", LogStatus::Taken);
        insert_log(&f.conn, &entry).unwrap();
        let other = make_user(&f.conn, "bob@example.com");

        assert!(get_log(&f.conn, &other, &entry.id).unwrap().is_none());
        assert!(delete_log(&f.conn, &other, &entry.id).is_err());
        assert!(list_logs_in_range(&f.conn, &other, &date("2024-01-01"), &date("2024-12-31"))
            .unwrap()
            .is_empty());
    }
}
