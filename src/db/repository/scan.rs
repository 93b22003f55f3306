use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{format_datetime, parse_datetime, parse_opt_datetime, parse_uuid};
use crate::db::DatabaseError;
use crate::models::enums::{ExtractionStatus, ScanKind};
use crate::models::{ScanFields, ScanRecord};

/// Scan columns, in the order `ScanColumns::read` expects them.
pub(crate) const SCAN_COLUMNS: &str =
    "source_file, source_mime, extraction_status, extracted_data, extraction_error, extracted_at";

/// Raw scan columns as stored, shared by prescriptions and biology reports.
pub(crate) struct ScanColumns {
    source_file: Option<String>,
    source_mime: Option<String>,
    extraction_status: String,
    extracted_data: Option<String>,
    extraction_error: Option<String>,
    extracted_at: Option<String>,
}

impl ScanColumns {
    pub(crate) fn read(row: &rusqlite::Row<'_>, offset: usize) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            source_file: row.get(offset)?,
            source_mime: row.get(offset + 1)?,
            extraction_status: row.get(offset + 2)?,
            extracted_data: row.get(offset + 3)?,
            extraction_error: row.get(offset + 4)?,
            extracted_at: row.get(offset + 5)?,
        })
    }

    pub(crate) fn into_fields(self) -> Result<ScanFields, DatabaseError> {
        let extracted_data = self
            .extracted_data
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(|e| DatabaseError::ConstraintViolation(format!("extracted_data: {e}")))?;

        Ok(ScanFields {
            source_file: self.source_file,
            source_mime: self.source_mime,
            extraction_status: ExtractionStatus::from_str(&self.extraction_status)?,
            extracted_data,
            extraction_error: self.extraction_error,
            extracted_at: parse_opt_datetime(self.extracted_at)?,
        })
    }
}

/// Scan state of a record regardless of owner (worker side).
pub fn get_scan_record(
    conn: &Connection,
    kind: ScanKind,
    id: &Uuid,
) -> Result<Option<ScanRecord>, DatabaseError> {
    let sql = format!(
        "SELECT id, user_id, created_at, {SCAN_COLUMNS} FROM {} WHERE id = ?1",
        kind.table()
    );
    let row = conn
        .query_row(&sql, params![id.to_string()], scan_row_from_rusqlite)
        .optional()?;
    row.map(|r| scan_record_from_row(kind, r)).transpose()
}

/// Scan state of a record owned by `user_id`.
pub fn get_scan_record_for_user(
    conn: &Connection,
    kind: ScanKind,
    user_id: &Uuid,
    id: &Uuid,
) -> Result<Option<ScanRecord>, DatabaseError> {
    Ok(get_scan_record(conn, kind, id)?.filter(|r| r.user_id == *user_id))
}

/// Compare-and-set move of `extraction_status`.
///
/// Returns `false` when the record is not in `from` (another actor got
/// there first). Moving back to `pending` or `processing` clears any
/// previous error.
pub fn transition_scan(
    conn: &Connection,
    kind: ScanKind,
    id: &Uuid,
    from: ExtractionStatus,
    to: ExtractionStatus,
) -> Result<bool, DatabaseError> {
    if !from.can_transition_to(to) {
        return Err(DatabaseError::ConstraintViolation(format!(
            "illegal scan transition {from} -> {to}"
        )));
    }
    let clear_error = matches!(to, ExtractionStatus::Pending | ExtractionStatus::Processing);
    let sql = format!(
        "UPDATE {} SET extraction_status = ?1,
            extraction_error = CASE WHEN ?2 THEN NULL ELSE extraction_error END
         WHERE id = ?3 AND extraction_status = ?4",
        kind.table()
    );
    let n = conn.execute(
        &sql,
        params![to.as_str(), clear_error, id.to_string(), from.as_str()],
    )?;
    Ok(n == 1)
}

/// `processing → extracted`, storing the validated payload.
pub fn mark_scan_extracted(
    conn: &Connection,
    kind: ScanKind,
    id: &Uuid,
    data: &serde_json::Value,
    at: &NaiveDateTime,
) -> Result<bool, DatabaseError> {
    let sql = format!(
        "UPDATE {} SET extraction_status = 'extracted', extracted_data = ?1,
            extracted_at = ?2, extraction_error = NULL
         WHERE id = ?3 AND extraction_status = 'processing'",
        kind.table()
    );
    let n = conn.execute(
        &sql,
        params![data.to_string(), format_datetime(at), id.to_string()],
    )?;
    Ok(n == 1)
}

/// `pending | processing → failed`, storing the reason.
pub fn mark_scan_failed(
    conn: &Connection,
    kind: ScanKind,
    id: &Uuid,
    error: &str,
) -> Result<bool, DatabaseError> {
    let sql = format!(
        "UPDATE {} SET extraction_status = 'failed', extraction_error = ?1
         WHERE id = ?2 AND extraction_status IN ('pending', 'processing')",
        kind.table()
    );
    let n = conn.execute(&sql, params![error, id.to_string()])?;
    Ok(n == 1)
}

/// `extracted → confirmed`, replacing the payload with the confirmed one.
pub fn mark_scan_confirmed(
    conn: &Connection,
    kind: ScanKind,
    id: &Uuid,
    data: &serde_json::Value,
) -> Result<bool, DatabaseError> {
    let sql = format!(
        "UPDATE {} SET extraction_status = 'confirmed', extracted_data = ?1
         WHERE id = ?2 AND extraction_status = 'extracted'",
        kind.table()
    );
    let n = conn.execute(&sql, params![data.to_string(), id.to_string()])?;
    Ok(n == 1)
}

/// Put records left in `processing` by a previous run back to `pending`.
pub fn reset_processing_scans(conn: &Connection) -> Result<usize, DatabaseError> {
    let mut total = 0;
    for kind in [ScanKind::Prescription, ScanKind::BiologyReport] {
        let sql = format!(
            "UPDATE {} SET extraction_status = 'pending' WHERE extraction_status = 'processing'",
            kind.table()
        );
        total += conn.execute(&sql, [])?;
    }
    Ok(total)
}

/// All `pending` records of both kinds, oldest first.
pub fn list_pending_scans(conn: &Connection) -> Result<Vec<ScanRecord>, DatabaseError> {
    let mut records = Vec::new();
    for kind in [ScanKind::Prescription, ScanKind::BiologyReport] {
        let sql = format!(
            "SELECT id, user_id, created_at, {SCAN_COLUMNS} FROM {}
             WHERE extraction_status = 'pending' ORDER BY created_at",
            kind.table()
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| Ok(scan_row_from_rusqlite(row)))?;
        for row in rows {
            records.push(scan_record_from_row(kind, row??)?);
        }
    }
    records.sort_by_key(|r| r.created_at);
    Ok(records)
}

struct ScanRow {
    id: String,
    user_id: String,
    created_at: String,
    scan: ScanColumns,
}

fn scan_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<ScanRow, rusqlite::Error> {
    Ok(ScanRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        created_at: row.get(2)?,
        scan: ScanColumns::read(row, 3)?,
    })
}

fn scan_record_from_row(kind: ScanKind, row: ScanRow) -> Result<ScanRecord, DatabaseError> {
    Ok(ScanRecord {
        kind,
        id: parse_uuid(&row.id)?,
        user_id: parse_uuid(&row.user_id)?,
        scan: row.scan.into_fields()?,
        created_at: parse_datetime(&row.created_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::{insert_biology_report, insert_prescription};
    use super::*;
    use crate::models::{BiologyReport, Prescription};

    fn pending_prescription(conn: &Connection, user_id: Uuid, created: &str) -> Uuid {
        let id = Uuid::new_v4();
        insert_prescription(
            conn,
            &Prescription {
                id,
                user_id,
                doctor_name: None,
                prescribed_on: None,
                valid_until: None,
                notes: None,
                scan: ScanFields::pending("uploads/a.jpg".into(), "image/jpeg".into()),
                created_at: datetime(created),
            },
        )
        .unwrap();
        id
    }

    #[test]
    fn happy_path_transitions() {
        let conn = crate::db::open_memory_database().unwrap();
        let user_id = make_user(&conn, "ana@example.com");
        let id = pending_prescription(&conn, user_id, "2024-01-01 10:00:00");
        let kind = ScanKind::Prescription;

        assert!(transition_scan(&conn, kind, &id, ExtractionStatus::Pending, ExtractionStatus::Processing).unwrap());
        let data = serde_json::json!({"medications": [{"name": "Metformin"}]});
        assert!(mark_scan_extracted(&conn, kind, &id, &data, &datetime("2024-01-01 10:01:00")).unwrap());

        let record = get_scan_record(&conn, kind, &id).unwrap().unwrap();
        assert_eq!(record.scan.extraction_status, ExtractionStatus::Extracted);
        assert_eq!(record.scan.extracted_data, Some(data.clone()));
        assert!(record.scan.extracted_at.is_some());

        assert!(mark_scan_confirmed(&conn, kind, &id, &data).unwrap());
        let record = get_scan_record(&conn, kind, &id).unwrap().unwrap();
        assert_eq!(record.scan.extraction_status, ExtractionStatus::Confirmed);
    }

    #[test]
    fn stale_compare_and_set_returns_false() {
        let conn = crate::db::open_memory_database().unwrap();
        let user_id = make_user(&conn, "ana@example.com");
        let id = pending_prescription(&conn, user_id, "2024-01-01 10:00:00");
        let kind = ScanKind::Prescription;

        assert!(transition_scan(&conn, kind, &id, ExtractionStatus::Pending, ExtractionStatus::Processing).unwrap());
        assert!(!transition_scan(&conn, kind, &id, ExtractionStatus::Pending, ExtractionStatus::Processing).unwrap());
        assert!(!mark_scan_confirmed(&conn, kind, &id, &serde_json::json!({})).unwrap());
    }

    #[test]
    fn illegal_transition_is_rejected_before_sql() {
        let conn = crate::db::open_memory_database().unwrap();
        let result = transition_scan(
            &conn,
            ScanKind::Prescription,
            &Uuid::new_v4(),
            ExtractionStatus::Confirmed,
            ExtractionStatus::Pending,
        );
        assert!(matches!(result, Err(DatabaseError::ConstraintViolation(_))));
    }

    #[test]
    fn failure_then_retry_clears_error() {
        let conn = crate::db::open_memory_database().unwrap();
        let user_id = make_user(&conn, "ana@example.com");
        let id = pending_prescription(&conn, user_id, "2024-01-01 10:00:00");
        let kind = ScanKind::Prescription;

        assert!(mark_scan_failed(&conn, kind, &id, "vision service unavailable").unwrap());
        let record = get_scan_record(&conn, kind, &id).unwrap().unwrap();
        assert_eq!(record.scan.extraction_error.as_deref(), Some("vision service unavailable"));

        assert!(transition_scan(&conn, kind, &id, ExtractionStatus::Failed, ExtractionStatus::Pending).unwrap());
        let record = get_scan_record(&conn, kind, &id).unwrap().unwrap();
        assert_eq!(record.scan.extraction_status, ExtractionStatus::Pending);
        assert!(record.scan.extraction_error.is_none());
    }

    #[test]
    fn recovery_resets_processing_and_lists_pending() {
        let conn = crate::db::open_memory_database().unwrap();
        let user_id = make_user(&conn, "ana@example.com");
        let first = pending_prescription(&conn, user_id, "2024-01-01 10:00:00");
        let second = pending_prescription(&conn, user_id, "2024-01-01 11:00:00");
        let report_id = Uuid::new_v4();
        insert_biology_report(
            &conn,
            &BiologyReport {
                id: report_id,
                user_id,
                lab_name: None,
                test_date: None,
                notes: None,
                scan: ScanFields::pending("uploads/b.png".into(), "image/png".into()),
                created_at: datetime("2024-01-01 10:30:00"),
            },
        )
        .unwrap();
        transition_scan(&conn, ScanKind::Prescription, &second, ExtractionStatus::Pending, ExtractionStatus::Processing).unwrap();

        assert_eq!(reset_processing_scans(&conn).unwrap(), 1);
        let pending = list_pending_scans(&conn).unwrap();
        let ids: Vec<Uuid> = pending.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![first, report_id, second]);
        assert_eq!(pending[1].kind, ScanKind::BiologyReport);
    }

    #[test]
    fn other_user_cannot_see_scan() {
        let conn = crate::db::open_memory_database().unwrap();
        let owner = make_user(&conn, "ana@example.com");
        let other = make_user(&conn, "bob@example.com");
        let id = pending_prescription(&conn, owner, "2024-01-01 10:00:00");

        assert!(get_scan_record_for_user(&conn, ScanKind::Prescription, &owner, &id).unwrap().is_some());
        assert!(get_scan_record_for_user(&conn, ScanKind::Prescription, &other, &id).unwrap().is_none());
    }
}
