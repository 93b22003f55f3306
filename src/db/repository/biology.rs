use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::scan::{ScanColumns, SCAN_COLUMNS};
use super::{format_datetime, parse_datetime, parse_opt_date, parse_uuid, require_affected};
use crate::db::DatabaseError;
use crate::models::enums::ResultFlag;
use crate::models::*;

pub fn insert_biology_report(conn: &Connection, r: &BiologyReport) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO biology_reports (id, user_id, lab_name, test_date, notes,
         source_file, source_mime, extraction_status, extracted_data, extraction_error, extracted_at,
         created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            r.id.to_string(),
            r.user_id.to_string(),
            r.lab_name,
            r.test_date.map(|d| d.to_string()),
            r.notes,
            r.scan.source_file,
            r.scan.source_mime,
            r.scan.extraction_status.as_str(),
            r.scan.extracted_data.as_ref().map(|v| v.to_string()),
            r.scan.extraction_error,
            r.scan.extracted_at.as_ref().map(format_datetime),
            format_datetime(&r.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_biology_report(
    conn: &Connection,
    user_id: &Uuid,
    id: &Uuid,
) -> Result<Option<BiologyReport>, DatabaseError> {
    let sql = format!(
        "SELECT id, user_id, lab_name, test_date, notes, created_at, {SCAN_COLUMNS}
         FROM biology_reports WHERE id = ?1 AND user_id = ?2"
    );
    let row = conn
        .query_row(
            &sql,
            params![id.to_string(), user_id.to_string()],
            report_row_from_rusqlite,
        )
        .optional()?;
    row.map(report_from_row).transpose()
}

/// Most recent test date first, undated reports last.
pub fn list_biology_reports(conn: &Connection, user_id: &Uuid) -> Result<Vec<BiologyReport>, DatabaseError> {
    let sql = format!(
        "SELECT id, user_id, lab_name, test_date, notes, created_at, {SCAN_COLUMNS}
         FROM biology_reports WHERE user_id = ?1
         ORDER BY test_date IS NULL, test_date DESC, created_at DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![user_id.to_string()], |row| Ok(report_row_from_rusqlite(row)))?;

    let mut reports = Vec::new();
    for row in rows {
        reports.push(report_from_row(row??)?);
    }
    Ok(reports)
}

pub fn update_biology_report(conn: &Connection, r: &BiologyReport) -> Result<(), DatabaseError> {
    let n = conn.execute(
        "UPDATE biology_reports SET lab_name = ?1, test_date = ?2, notes = ?3
         WHERE id = ?4 AND user_id = ?5",
        params![
            r.lab_name,
            r.test_date.map(|d| d.to_string()),
            r.notes,
            r.id.to_string(),
            r.user_id.to_string(),
        ],
    )?;
    require_affected(n, "BiologyReport", &r.id)
}

pub fn delete_biology_report(conn: &Connection, user_id: &Uuid, id: &Uuid) -> Result<(), DatabaseError> {
    let n = conn.execute(
        "DELETE FROM biology_reports WHERE id = ?1 AND user_id = ?2",
        params![id.to_string(), user_id.to_string()],
    )?;
    require_affected(n, "BiologyReport", id)
}

pub fn insert_test_result(conn: &Connection, t: &TestResult) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO test_results (id, biology_report_id, biomarker_id, value, unit,
         reference_min, reference_max, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            t.id.to_string(),
            t.biology_report_id.to_string(),
            t.biomarker_id.to_string(),
            t.value,
            t.unit,
            t.reference_min,
            t.reference_max,
            format_datetime(&t.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_test_result(
    conn: &Connection,
    user_id: &Uuid,
    id: &Uuid,
) -> Result<Option<TestResult>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT t.id, t.biology_report_id, t.biomarker_id, t.value, t.unit,
                t.reference_min, t.reference_max, t.created_at
             FROM test_results t JOIN biology_reports r ON r.id = t.biology_report_id
             WHERE t.id = ?1 AND r.user_id = ?2",
            params![id.to_string(), user_id.to_string()],
            result_row_from_rusqlite,
        )
        .optional()?;
    row.map(result_from_row).transpose()
}

/// Results of one report with biomarker names, alphabetical.
pub fn list_report_results(
    conn: &Connection,
    user_id: &Uuid,
    report_id: &Uuid,
) -> Result<Vec<TestResultDetail>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT t.id, t.biology_report_id, t.biomarker_id, t.value, t.unit,
            t.reference_min, t.reference_max, t.created_at, b.name
         FROM test_results t
         JOIN biology_reports r ON r.id = t.biology_report_id
         JOIN biomarkers b ON b.id = t.biomarker_id
         WHERE r.id = ?1 AND r.user_id = ?2
         ORDER BY b.name COLLATE NOCASE",
    )?;
    let rows = stmt.query_map(params![report_id.to_string(), user_id.to_string()], |row| {
        Ok(result_row_from_rusqlite(row).and_then(|r| Ok((r, row.get::<_, String>(8)?))))
    })?;

    let mut results = Vec::new();
    for row in rows {
        let (result_row, biomarker_name) = row??;
        let result = result_from_row(result_row)?;
        results.push(TestResultDetail {
            flag: result.flag(),
            result,
            biomarker_name,
        });
    }
    Ok(results)
}

pub fn update_test_result(conn: &Connection, user_id: &Uuid, t: &TestResult) -> Result<(), DatabaseError> {
    let n = conn.execute(
        "UPDATE test_results SET biomarker_id = ?1, value = ?2, unit = ?3,
            reference_min = ?4, reference_max = ?5
         WHERE id = ?6
           AND biology_report_id IN (SELECT id FROM biology_reports WHERE user_id = ?7)",
        params![
            t.biomarker_id.to_string(),
            t.value,
            t.unit,
            t.reference_min,
            t.reference_max,
            t.id.to_string(),
            user_id.to_string(),
        ],
    )?;
    require_affected(n, "TestResult", &t.id)
}

pub fn delete_test_result(conn: &Connection, user_id: &Uuid, id: &Uuid) -> Result<(), DatabaseError> {
    let n = conn.execute(
        "DELETE FROM test_results WHERE id = ?1
           AND biology_report_id IN (SELECT id FROM biology_reports WHERE user_id = ?2)",
        params![id.to_string(), user_id.to_string()],
    )?;
    require_affected(n, "TestResult", id)
}

/// A user's readings of one biomarker ordered by report date, undated last.
pub fn biomarker_history(
    conn: &Connection,
    user_id: &Uuid,
    biomarker_id: &Uuid,
) -> Result<Vec<BiomarkerReading>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT t.id, t.biology_report_id, r.test_date, t.value, t.unit,
            t.reference_min, t.reference_max
         FROM test_results t JOIN biology_reports r ON r.id = t.biology_report_id
         WHERE r.user_id = ?1 AND t.biomarker_id = ?2
         ORDER BY r.test_date IS NULL, r.test_date, t.created_at",
    )?;
    let rows = stmt.query_map(params![user_id.to_string(), biomarker_id.to_string()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<String>>(2)?,
            row.get::<_, f64>(3)?,
            row.get::<_, Option<String>>(4)?,
            row.get::<_, Option<f64>>(5)?,
            row.get::<_, Option<f64>>(6)?,
        ))
    })?;

    let mut readings = Vec::new();
    for row in rows {
        let (id, report_id, test_date, value, unit, min, max) = row?;
        readings.push(BiomarkerReading {
            test_result_id: parse_uuid(&id)?,
            biology_report_id: parse_uuid(&report_id)?,
            test_date: parse_opt_date(test_date)?,
            value,
            unit,
            flag: ResultFlag::classify(value, min, max),
        });
    }
    Ok(readings)
}

struct ReportRow {
    id: String,
    user_id: String,
    lab_name: Option<String>,
    test_date: Option<String>,
    notes: Option<String>,
    created_at: String,
    scan: ScanColumns,
}

fn report_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<ReportRow, rusqlite::Error> {
    Ok(ReportRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        lab_name: row.get(2)?,
        test_date: row.get(3)?,
        notes: row.get(4)?,
        created_at: row.get(5)?,
        scan: ScanColumns::read(row, 6)?,
    })
}

fn report_from_row(row: ReportRow) -> Result<BiologyReport, DatabaseError> {
    Ok(BiologyReport {
        id: parse_uuid(&row.id)?,
        user_id: parse_uuid(&row.user_id)?,
        lab_name: row.lab_name,
        test_date: parse_opt_date(row.test_date)?,
        notes: row.notes,
        scan: row.scan.into_fields()?,
        created_at: parse_datetime(&row.created_at)?,
    })
}

struct ResultRow {
    id: String,
    biology_report_id: String,
    biomarker_id: String,
    value: f64,
    unit: Option<String>,
    reference_min: Option<f64>,
    reference_max: Option<f64>,
    created_at: String,
}

fn result_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<ResultRow, rusqlite::Error> {
    Ok(ResultRow {
        id: row.get(0)?,
        biology_report_id: row.get(1)?,
        biomarker_id: row.get(2)?,
        value: row.get(3)?,
        unit: row.get(4)?,
        reference_min: row.get(5)?,
        reference_max: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn result_from_row(row: ResultRow) -> Result<TestResult, DatabaseError> {
    Ok(TestResult {
        id: parse_uuid(&row.id)?,
        biology_report_id: parse_uuid(&row.biology_report_id)?,
        biomarker_id: parse_uuid(&row.biomarker_id)?,
        value: row.value,
        unit: row.unit,
        reference_min: row.reference_min,
        reference_max: row.reference_max,
        created_at: parse_datetime(&row.created_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::super::list_biomarkers;
    use super::super::test_support::*;
    use super::*;

    fn biomarker_id(conn: &Connection, name: &str) -> Uuid {
        list_biomarkers(conn)
            .unwrap()
            .into_iter()
            .find(|b| b.name == name)
            .unwrap()
            .id
    }

    fn add_result(conn: &Connection, report_id: Uuid, biomarker_id: Uuid, value: f64) -> Uuid {
        let id = Uuid::new_v4();
        insert_test_result(
            conn,
            &TestResult {
                id,
                biology_report_id: report_id,
                biomarker_id,
                value,
                unit: Some("mg/dL".into()),
                reference_min: Some(70.0),
                reference_max: Some(99.0),
                created_at: datetime("2024-01-01 09:00:00"),
            },
        )
        .unwrap();
        id
    }

    #[test]
    fn report_results_carry_flag_and_name() {
        let conn = crate::db::open_memory_database().unwrap();
        let user_id = make_user(&conn, "ana@example.com");
        let report_id = make_report(&conn, user_id, "2024-02-10");
        let glucose = biomarker_id(&conn, "Glucose");
        add_result(&conn, report_id, glucose, 126.0);

        let results = list_report_results(&conn, &user_id, &report_id).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].biomarker_name, "Glucose");
        assert_eq!(results[0].flag, ResultFlag::High);
    }

    #[test]
    fn history_ordered_by_test_date() {
        let conn = crate::db::open_memory_database().unwrap();
        let user_id = make_user(&conn, "ana@example.com");
        let glucose = biomarker_id(&conn, "Glucose");
        let later = make_report(&conn, user_id, "2024-05-01");
        let earlier = make_report(&conn, user_id, "2024-01-15");
        add_result(&conn, later, glucose, 92.0);
        add_result(&conn, earlier, glucose, 64.0);

        let history = biomarker_history(&conn, &user_id, &glucose).unwrap();
        let values: Vec<f64> = history.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![64.0, 92.0]);
        assert_eq!(history[0].flag, ResultFlag::Low);
        assert_eq!(history[1].flag, ResultFlag::Normal);

        let other = make_user(&conn, "bob@example.com");
        assert!(biomarker_history(&conn, &other, &glucose).unwrap().is_empty());
    }

    #[test]
    fn result_update_and_delete_scoped() {
        let conn = crate::db::open_memory_database().unwrap();
        let owner = make_user(&conn, "ana@example.com");
        let other = make_user(&conn, "bob@example.com");
        let report_id = make_report(&conn, owner, "2024-02-10");
        let id = add_result(&conn, report_id, biomarker_id(&conn, "Glucose"), 90.0);

        let mut result = get_test_result(&conn, &owner, &id).unwrap().unwrap();
        assert!(get_test_result(&conn, &other, &id).unwrap().is_none());
        result.value = 101.5;
        assert!(update_test_result(&conn, &other, &result).is_err());
        update_test_result(&conn, &owner, &result).unwrap();
        assert_eq!(get_test_result(&conn, &owner, &id).unwrap().unwrap().value, 101.5);

        assert!(delete_test_result(&conn, &other, &id).is_err());
        delete_test_result(&conn, &owner, &id).unwrap();
    }

    #[test]
    fn report_delete_cascades_results() {
        let conn = crate::db::open_memory_database().unwrap();
        let user_id = make_user(&conn, "ana@example.com");
        let report_id = make_report(&conn, user_id, "2024-02-10");
        let id = add_result(&conn, report_id, biomarker_id(&conn, "Glucose"), 90.0);

        let mut report = get_biology_report(&conn, &user_id, &report_id).unwrap().unwrap();
        report.lab_name = Some("North Lab".into());
        update_biology_report(&conn, &report).unwrap();
        assert_eq!(list_biology_reports(&conn, &user_id).unwrap()[0].lab_name.as_deref(), Some("North Lab"));

        delete_biology_report(&conn, &user_id, &report_id).unwrap();
        assert!(get_test_result(&conn, &user_id, &id).unwrap().is_none());
    }
}
