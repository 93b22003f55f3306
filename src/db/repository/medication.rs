use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{
    format_datetime, parse_datetime, parse_opt_date, parse_opt_uuid, parse_uuid, require_affected,
};
use crate::db::DatabaseError;
use crate::models::*;

/// Medication columns (aliased `m`), in the order `MedicationRow::read` expects.
pub(crate) const MEDICATION_COLUMNS: &str = "m.id, m.prescription_id, m.drug_id, m.name, m.dosage,
    m.form, m.instructions, m.start_date, m.end_date, m.active, m.created_at";

pub fn insert_medication(conn: &Connection, med: &Medication) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO medications (id, prescription_id, drug_id, name, dosage, form, instructions,
         start_date, end_date, active, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            med.id.to_string(),
            med.prescription_id.to_string(),
            med.drug_id.map(|id| id.to_string()),
            med.name,
            med.dosage,
            med.form,
            med.instructions,
            med.start_date.map(|d| d.to_string()),
            med.end_date.map(|d| d.to_string()),
            med.active as i32,
            format_datetime(&med.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_medication(
    conn: &Connection,
    user_id: &Uuid,
    id: &Uuid,
) -> Result<Option<Medication>, DatabaseError> {
    let sql = format!(
        "SELECT {MEDICATION_COLUMNS} FROM medications m
         JOIN prescriptions p ON p.id = m.prescription_id
         WHERE m.id = ?1 AND p.user_id = ?2"
    );
    let row = conn
        .query_row(&sql, params![id.to_string(), user_id.to_string()], |row| {
            MedicationRow::read(row, 0)
        })
        .optional()?;
    row.map(medication_from_row).transpose()
}

/// All of a user's medications by name; `active_only` drops stopped ones.
pub fn list_medications(
    conn: &Connection,
    user_id: &Uuid,
    active_only: bool,
) -> Result<Vec<Medication>, DatabaseError> {
    let sql = format!(
        "SELECT {MEDICATION_COLUMNS} FROM medications m
         JOIN prescriptions p ON p.id = m.prescription_id
         WHERE p.user_id = ?1 AND (?2 = 0 OR m.active = 1)
         ORDER BY m.name COLLATE NOCASE, m.created_at"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![user_id.to_string(), active_only as i32], |row| {
        Ok(MedicationRow::read(row, 0))
    })?;

    let mut meds = Vec::new();
    for row in rows {
        meds.push(medication_from_row(row??)?);
    }
    Ok(meds)
}

pub fn list_prescription_medications(
    conn: &Connection,
    user_id: &Uuid,
    prescription_id: &Uuid,
) -> Result<Vec<Medication>, DatabaseError> {
    let sql = format!(
        "SELECT {MEDICATION_COLUMNS} FROM medications m
         JOIN prescriptions p ON p.id = m.prescription_id
         WHERE p.id = ?1 AND p.user_id = ?2
         ORDER BY m.created_at, m.name"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![prescription_id.to_string(), user_id.to_string()],
        |row| Ok(MedicationRow::read(row, 0)),
    )?;

    let mut meds = Vec::new();
    for row in rows {
        meds.push(medication_from_row(row??)?);
    }
    Ok(meds)
}

pub fn update_medication(conn: &Connection, user_id: &Uuid, med: &Medication) -> Result<(), DatabaseError> {
    let n = conn.execute(
        "UPDATE medications SET drug_id = ?1, name = ?2, dosage = ?3, form = ?4, instructions = ?5,
            start_date = ?6, end_date = ?7, active = ?8
         WHERE id = ?9
           AND prescription_id IN (SELECT id FROM prescriptions WHERE user_id = ?10)",
        params![
            med.drug_id.map(|id| id.to_string()),
            med.name,
            med.dosage,
            med.form,
            med.instructions,
            med.start_date.map(|d| d.to_string()),
            med.end_date.map(|d| d.to_string()),
            med.active as i32,
            med.id.to_string(),
            user_id.to_string(),
        ],
    )?;
    require_affected(n, "Medication", &med.id)
}

pub fn delete_medication(conn: &Connection, user_id: &Uuid, id: &Uuid) -> Result<(), DatabaseError> {
    let n = conn.execute(
        "DELETE FROM medications WHERE id = ?1
           AND prescription_id IN (SELECT id FROM prescriptions WHERE user_id = ?2)",
        params![id.to_string(), user_id.to_string()],
    )?;
    require_affected(n, "Medication", id)
}

pub(crate) struct MedicationRow {
    id: String,
    prescription_id: String,
    drug_id: Option<String>,
    name: String,
    dosage: Option<String>,
    form: Option<String>,
    instructions: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
    active: i32,
    created_at: String,
}

impl MedicationRow {
    pub(crate) fn read(row: &rusqlite::Row<'_>, offset: usize) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get(offset)?,
            prescription_id: row.get(offset + 1)?,
            drug_id: row.get(offset + 2)?,
            name: row.get(offset + 3)?,
            dosage: row.get(offset + 4)?,
            form: row.get(offset + 5)?,
            instructions: row.get(offset + 6)?,
            start_date: row.get(offset + 7)?,
            end_date: row.get(offset + 8)?,
            active: row.get(offset + 9)?,
            created_at: row.get(offset + 10)?,
        })
    }
}

pub(crate) fn medication_from_row(row: MedicationRow) -> Result<Medication, DatabaseError> {
    Ok(Medication {
        id: parse_uuid(&row.id)?,
        prescription_id: parse_uuid(&row.prescription_id)?,
        drug_id: parse_opt_uuid(row.drug_id)?,
        name: row.name,
        dosage: row.dosage,
        form: row.form,
        instructions: row.instructions,
        start_date: parse_opt_date(row.start_date)?,
        end_date: parse_opt_date(row.end_date)?,
        active: row.active != 0,
        created_at: parse_datetime(&row.created_at)?,
    })
}
