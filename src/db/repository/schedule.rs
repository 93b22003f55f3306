use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::medication::{medication_from_row, MedicationRow, MEDICATION_COLUMNS};
use super::{format_datetime, format_time, parse_datetime, parse_time, parse_uuid, require_affected};
use crate::db::DatabaseError;
use crate::models::*;

const SCHEDULE_COLUMNS: &str = "s.id, s.medication_id, s.time_of_day, s.days_of_week, s.dose_amount,
    s.dose_unit, s.instructions, s.active, s.created_at";

pub fn insert_schedule(conn: &Connection, s: &MedicationSchedule) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO medication_schedules (id, medication_id, time_of_day, days_of_week,
         dose_amount, dose_unit, instructions, active, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            s.id.to_string(),
            s.medication_id.to_string(),
            format_time(&s.time_of_day),
            s.days_of_week.mask(),
            s.dose_amount,
            s.dose_unit,
            s.instructions,
            s.active as i32,
            format_datetime(&s.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_schedule(
    conn: &Connection,
    user_id: &Uuid,
    id: &Uuid,
) -> Result<Option<MedicationSchedule>, DatabaseError> {
    let sql = format!(
        "SELECT {SCHEDULE_COLUMNS} FROM medication_schedules s
         JOIN medications m ON m.id = s.medication_id
         JOIN prescriptions p ON p.id = m.prescription_id
         WHERE s.id = ?1 AND p.user_id = ?2"
    );
    let row = conn
        .query_row(&sql, params![id.to_string(), user_id.to_string()], |row| {
            ScheduleRow::read(row, 0)
        })
        .optional()?;
    row.map(schedule_from_row).transpose()
}

pub fn list_medication_schedules(
    conn: &Connection,
    user_id: &Uuid,
    medication_id: &Uuid,
) -> Result<Vec<MedicationSchedule>, DatabaseError> {
    let sql = format!(
        "SELECT {SCHEDULE_COLUMNS} FROM medication_schedules s
         JOIN medications m ON m.id = s.medication_id
         JOIN prescriptions p ON p.id = m.prescription_id
         WHERE s.medication_id = ?1 AND p.user_id = ?2
         ORDER BY s.time_of_day"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![medication_id.to_string(), user_id.to_string()],
        |row| Ok(ScheduleRow::read(row, 0)),
    )?;

    let mut schedules = Vec::new();
    for row in rows {
        schedules.push(schedule_from_row(row??)?);
    }
    Ok(schedules)
}

pub fn update_schedule(
    conn: &Connection,
    user_id: &Uuid,
    s: &MedicationSchedule,
) -> Result<(), DatabaseError> {
    let n = conn.execute(
        "UPDATE medication_schedules SET time_of_day = ?1, days_of_week = ?2, dose_amount = ?3,
            dose_unit = ?4, instructions = ?5, active = ?6
         WHERE id = ?7 AND medication_id IN (
            SELECT m.id FROM medications m
            JOIN prescriptions p ON p.id = m.prescription_id WHERE p.user_id = ?8)",
        params![
            format_time(&s.time_of_day),
            s.days_of_week.mask(),
            s.dose_amount,
            s.dose_unit,
            s.instructions,
            s.active as i32,
            s.id.to_string(),
            user_id.to_string(),
        ],
    )?;
    require_affected(n, "MedicationSchedule", &s.id)
}

pub fn delete_schedule(conn: &Connection, user_id: &Uuid, id: &Uuid) -> Result<(), DatabaseError> {
    let n = conn.execute(
        "DELETE FROM medication_schedules WHERE id = ?1 AND medication_id IN (
            SELECT m.id FROM medications m
            JOIN prescriptions p ON p.id = m.prescription_id WHERE p.user_id = ?2)",
        params![id.to_string(), user_id.to_string()],
    )?;
    require_affected(n, "MedicationSchedule", id)
}

/// Every active schedule of an active medication owned by the user, joined
/// with its medication. Weekday and date-window filtering is left to
/// `ScheduledMedication::applies_on` so one load serves a whole date range.
pub fn load_schedule_entries(
    conn: &Connection,
    user_id: &Uuid,
) -> Result<Vec<ScheduledMedication>, DatabaseError> {
    let sql = format!(
        "SELECT {SCHEDULE_COLUMNS}, {MEDICATION_COLUMNS}
         FROM medication_schedules s
         JOIN medications m ON m.id = s.medication_id
         JOIN prescriptions p ON p.id = m.prescription_id
         WHERE p.user_id = ?1 AND s.active = 1 AND m.active = 1
         ORDER BY s.time_of_day, m.name COLLATE NOCASE"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![user_id.to_string()], |row| Ok(entry_row_from_rusqlite(row)))?;

    let mut entries = Vec::new();
    for row in rows {
        let (schedule, medication) = row??;
        entries.push(ScheduledMedication {
            schedule: schedule_from_row(schedule)?,
            medication: medication_from_row(medication)?,
        });
    }
    Ok(entries)
}

struct ScheduleRow {
    id: String,
    medication_id: String,
    time_of_day: String,
    days_of_week: u8,
    dose_amount: Option<f64>,
    dose_unit: Option<String>,
    instructions: Option<String>,
    active: i32,
    created_at: String,
}

impl ScheduleRow {
    fn read(row: &rusqlite::Row<'_>, offset: usize) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get(offset)?,
            medication_id: row.get(offset + 1)?,
            time_of_day: row.get(offset + 2)?,
            days_of_week: row.get(offset + 3)?,
            dose_amount: row.get(offset + 4)?,
            dose_unit: row.get(offset + 5)?,
            instructions: row.get(offset + 6)?,
            active: row.get(offset + 7)?,
            created_at: row.get(offset + 8)?,
        })
    }
}

fn entry_row_from_rusqlite(
    row: &rusqlite::Row<'_>,
) -> Result<(ScheduleRow, MedicationRow), rusqlite::Error> {
    Ok((ScheduleRow::read(row, 0)?, MedicationRow::read(row, 9)?))
}

fn schedule_from_row(row: ScheduleRow) -> Result<MedicationSchedule, DatabaseError> {
    let days_of_week = WeekdaySet::from_mask(row.days_of_week);
    if days_of_week.is_empty() {
        return Err(DatabaseError::ConstraintViolation(format!(
            "schedule {} has no weekday",
            row.id
        )));
    }
    Ok(MedicationSchedule {
        id: parse_uuid(&row.id)?,
        medication_id: parse_uuid(&row.medication_id)?,
        time_of_day: parse_time(&row.time_of_day)?,
        days_of_week,
        dose_amount: row.dose_amount,
        dose_unit: row.dose_unit,
        instructions: row.instructions,
        active: row.active != 0,
        created_at: parse_datetime(&row.created_at)?,
    })
}
