use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::scan::{ScanColumns, SCAN_COLUMNS};
use super::{format_datetime, parse_datetime, parse_opt_date, parse_uuid, require_affected};
use crate::db::DatabaseError;
use crate::models::*;

pub fn insert_prescription(conn: &Connection, p: &Prescription) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO prescriptions (id, user_id, doctor_name, prescribed_on, valid_until, notes,
         source_file, source_mime, extraction_status, extracted_data, extraction_error, extracted_at,
         created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            p.id.to_string(),
            p.user_id.to_string(),
            p.doctor_name,
            p.prescribed_on.map(|d| d.to_string()),
            p.valid_until.map(|d| d.to_string()),
            p.notes,
            p.scan.source_file,
            p.scan.source_mime,
            p.scan.extraction_status.as_str(),
            p.scan.extracted_data.as_ref().map(|v| v.to_string()),
            p.scan.extraction_error,
            p.scan.extracted_at.as_ref().map(format_datetime),
            format_datetime(&p.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_prescription(
    conn: &Connection,
    user_id: &Uuid,
    id: &Uuid,
) -> Result<Option<Prescription>, DatabaseError> {
    let sql = format!(
        "SELECT id, user_id, doctor_name, prescribed_on, valid_until, notes, created_at, {SCAN_COLUMNS}
         FROM prescriptions WHERE id = ?1 AND user_id = ?2"
    );
    let row = conn
        .query_row(
            &sql,
            params![id.to_string(), user_id.to_string()],
            prescription_row_from_rusqlite,
        )
        .optional()?;
    row.map(prescription_from_row).transpose()
}

/// Newest first: by prescription date, undated ones last.
pub fn list_prescriptions(conn: &Connection, user_id: &Uuid) -> Result<Vec<Prescription>, DatabaseError> {
    let sql = format!(
        "SELECT id, user_id, doctor_name, prescribed_on, valid_until, notes, created_at, {SCAN_COLUMNS}
         FROM prescriptions WHERE user_id = ?1
         ORDER BY prescribed_on IS NULL, prescribed_on DESC, created_at DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![user_id.to_string()], |row| {
        Ok(prescription_row_from_rusqlite(row))
    })?;

    let mut prescriptions = Vec::new();
    for row in rows {
        prescriptions.push(prescription_from_row(row??)?);
    }
    Ok(prescriptions)
}

/// Update the header fields. Scan columns are only moved by the scan flow.
pub fn update_prescription(conn: &Connection, p: &Prescription) -> Result<(), DatabaseError> {
    let n = conn.execute(
        "UPDATE prescriptions SET doctor_name = ?1, prescribed_on = ?2, valid_until = ?3, notes = ?4
         WHERE id = ?5 AND user_id = ?6",
        params![
            p.doctor_name,
            p.prescribed_on.map(|d| d.to_string()),
            p.valid_until.map(|d| d.to_string()),
            p.notes,
            p.id.to_string(),
            p.user_id.to_string(),
        ],
    )?;
    require_affected(n, "Prescription", &p.id)
}

/// Cascades to medications, schedules and logs.
pub fn delete_prescription(conn: &Connection, user_id: &Uuid, id: &Uuid) -> Result<(), DatabaseError> {
    let n = conn.execute(
        "DELETE FROM prescriptions WHERE id = ?1 AND user_id = ?2",
        params![id.to_string(), user_id.to_string()],
    )?;
    require_affected(n, "Prescription", id)
}

struct PrescriptionRow {
    id: String,
    user_id: String,
    doctor_name: Option<String>,
    prescribed_on: Option<String>,
    valid_until: Option<String>,
    notes: Option<String>,
    created_at: String,
    scan: ScanColumns,
}

fn prescription_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<PrescriptionRow, rusqlite::Error> {
    Ok(PrescriptionRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        doctor_name: row.get(2)?,
        prescribed_on: row.get(3)?,
        valid_until: row.get(4)?,
        notes: row.get(5)?,
        created_at: row.get(6)?,
        scan: ScanColumns::read(row, 7)?,
    })
}

fn prescription_from_row(row: PrescriptionRow) -> Result<Prescription, DatabaseError> {
    Ok(Prescription {
        id: parse_uuid(&row.id)?,
        user_id: parse_uuid(&row.user_id)?,
        doctor_name: row.doctor_name,
        prescribed_on: parse_opt_date(row.prescribed_on)?,
        valid_until: parse_opt_date(row.valid_until)?,
        notes: row.notes,
        scan: row.scan.into_fields()?,
        created_at: parse_datetime(&row.created_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::{get_medication, get_schedule, insert_log};
    use super::*;
    use crate::models::enums::{ExtractionStatus, LogStatus};
    use crate::models::MedicationLog;

    #[test]
    fn insert_and_get_manual_prescription() {
        let conn = crate::db::open_memory_database().unwrap();
        let user_id = make_user(&conn, "ana@example.com");
        let id = make_prescription(&conn, user_id);

        let p = get_prescription(&conn, &user_id, &id).unwrap().unwrap();
        assert_eq!(p.doctor_name.as_deref(), Some("Dr. Martin"));
        assert_eq!(p.scan.extraction_status, ExtractionStatus::Manual);
        assert!(p.scan.extracted_data.is_none());
    }

    #[test]
    fn prescriptions_are_scoped_to_owner() {
        let conn = crate::db::open_memory_database().unwrap();
        let owner = make_user(&conn, "ana@example.com");
        let other = make_user(&conn, "bob@example.com");
        let id = make_prescription(&conn, owner);

        assert!(get_prescription(&conn, &other, &id).unwrap().is_none());
        assert!(list_prescriptions(&conn, &other).unwrap().is_empty());
        assert!(matches!(
            delete_prescription(&conn, &other, &id),
            Err(DatabaseError::NotFound { .. })
        ));
    }

    #[test]
    fn list_orders_newest_first_undated_last() {
        let conn = crate::db::open_memory_database().unwrap();
        let user_id = make_user(&conn, "ana@example.com");
        let older = make_prescription(&conn, user_id);
        let newer = make_prescription(&conn, user_id);
        let undated = make_prescription(&conn, user_id);

        let mut p = get_prescription(&conn, &user_id, &newer).unwrap().unwrap();
        p.prescribed_on = Some(date("2024-06-01"));
        update_prescription(&conn, &p).unwrap();
        let mut p = get_prescription(&conn, &user_id, &undated).unwrap().unwrap();
        p.prescribed_on = None;
        update_prescription(&conn, &p).unwrap();

        let ids: Vec<Uuid> = list_prescriptions(&conn, &user_id)
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec![newer, older, undated]);
    }

    #[test]
    fn delete_cascades_to_medications_schedules_and_logs() {
        let conn = crate::db::open_memory_database().unwrap();
        let user_id = make_user(&conn, "ana@example.com");
        let prescription_id = make_prescription(&conn, user_id);
        let med_id = make_medication(&conn, prescription_id, "Metformin");
        let schedule_id = make_schedule(&conn, med_id, "08:00", WeekdaySet::ALL);
        insert_log(
            &conn,
            &MedicationLog {
                id: Uuid::new_v4(),
                schedule_id,
                medication_id: med_id,
                scheduled_for: date("2024-03-04"),
                status: LogStatus::Taken,
                logged_at: datetime("2024-03-04 08:05:00"),
                notes: None,
            },
        )
        .unwrap();
        let log_count = |conn: &Connection| -> i64 {
            conn.query_row("SELECT COUNT(*) FROM medication_logs", [], |row| row.get(0))
                .unwrap()
        };
        assert_eq!(log_count(&conn), 1);

        delete_prescription(&conn, &user_id, &prescription_id).unwrap();
        assert!(get_medication(&conn, &user_id, &med_id).unwrap().is_none());
        assert!(get_schedule(&conn, &user_id, &schedule_id).unwrap().is_none());
        assert_eq!(log_count(&conn), 0);
    }
}
