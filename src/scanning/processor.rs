use std::path::Path;

use base64::Engine;
use chrono::NaiveDateTime;
use rusqlite::Connection;
use uuid::Uuid;

use super::matching::{best_match, MatchCandidate};
use super::parser::{parse_biology_report, parse_prescription};
use super::prompt::prompt_for;
use super::vision::VisionClient;
use super::ScanError;
use crate::db;
use crate::models::enums::{ExtractionStatus, ScanKind};
use crate::models::ScanRecord;

/// What a worker pass did with one scan.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    Extracted,
    /// Extraction failed; the message was stored on the record.
    Failed(String),
    /// The record was not `pending` (already taken, deleted or retried).
    Skipped,
}

/// Run extraction for one scan: claim it (`pending → processing`), send the
/// stored image to the vision model, parse, match against local tables and
/// store the result as `extracted`. Extraction errors end in `failed`; only
/// database errors while recording the outcome are returned.
pub fn process_scan(
    conn: &Connection,
    uploads_dir: &Path,
    vision: &dyn VisionClient,
    kind: ScanKind,
    id: Uuid,
    now: NaiveDateTime,
) -> Result<ScanOutcome, ScanError> {
    let _span = tracing::info_span!("scan_extraction", scan_id = %id, kind = %kind).entered();

    if !db::transition_scan(conn, kind, &id, ExtractionStatus::Pending, ExtractionStatus::Processing)? {
        tracing::debug!("Scan not pending, skipping");
        return Ok(ScanOutcome::Skipped);
    }

    let start = std::time::Instant::now();
    let result = db::get_scan_record(conn, kind, &id)?
        .ok_or(ScanError::NotFound)
        .and_then(|record| extract(conn, uploads_dir, vision, &record));

    match result {
        Ok(data) => {
            db::mark_scan_extracted(conn, kind, &id, &data, &now)?;
            tracing::info!(
                elapsed_ms = %start.elapsed().as_millis(),
                status = %ExtractionStatus::Extracted,
                "Scan extraction complete"
            );
            Ok(ScanOutcome::Extracted)
        }
        Err(e) => {
            let message = e.to_string();
            db::mark_scan_failed(conn, kind, &id, &message)?;
            tracing::warn!(error = %message, status = %ExtractionStatus::Failed, "Scan extraction failed");
            Ok(ScanOutcome::Failed(message))
        }
    }
}

fn extract(
    conn: &Connection,
    uploads_dir: &Path,
    vision: &dyn VisionClient,
    record: &ScanRecord,
) -> Result<serde_json::Value, ScanError> {
    let file = record
        .scan
        .source_file
        .as_deref()
        .ok_or_else(|| ScanError::InvalidPayload("scan has no source file".into()))?;
    let bytes = std::fs::read(uploads_dir.join(file))?;
    let image = base64::engine::general_purpose::STANDARD.encode(&bytes);

    let response = vision.extract(prompt_for(record.kind), &image)?;

    let value = match record.kind {
        ScanKind::Prescription => {
            let mut extracted = parse_prescription(&response)?;
            let candidates: Vec<MatchCandidate> =
                db::list_drugs(conn)?.iter().map(MatchCandidate::from_drug).collect();
            for med in &mut extracted.medications {
                if let Some(found) = best_match(&med.name, &candidates) {
                    med.drug_id = Some(found.id);
                    med.matched_name = Some(found.name.clone());
                }
            }
            serde_json::to_value(&extracted)
        }
        ScanKind::BiologyReport => {
            let mut extracted = parse_biology_report(&response)?;
            let candidates: Vec<MatchCandidate> = db::list_biomarkers(conn)?
                .iter()
                .map(MatchCandidate::from_biomarker)
                .collect();
            for result in &mut extracted.results {
                if let Some(found) = best_match(&result.name, &candidates) {
                    result.biomarker_id = Some(found.id);
                    result.matched_name = Some(found.name.clone());
                }
            }
            serde_json::to_value(&extracted)
        }
    };
    value.map_err(|e| ScanError::InvalidPayload(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::test_support::*;
    use crate::models::{BiologyReport, Prescription, ScanFields};
    use crate::scanning::vision::MockVisionClient;

    const PRESCRIPTION_ANSWER: &str = r#"```json
{"doctor_name": "Dr. Martin", "prescribed_on": "2024-03-01",
 "medications": [{"name": "Metformine 500", "dosage": "500 mg"},
                 {"name": "Unknownium", "dosage": "1 g"}]}
```"#;

    struct Fixture {
        conn: Connection,
        dir: tempfile::TempDir,
        user_id: Uuid,
    }

    fn fixture() -> Fixture {
        let conn = db::open_memory_database().unwrap();
        let user_id = make_user(&conn, "ana@example.com");
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("scan.jpg"), [0xFF, 0xD8, 0xFF, 0xE0]).unwrap();
        Fixture { conn, dir, user_id }
    }

    fn pending_prescription(f: &Fixture) -> Uuid {
        let id = Uuid::new_v4();
        db::insert_prescription(
            &f.conn,
            &Prescription {
                id,
                user_id: f.user_id,
                doctor_name: None,
                prescribed_on: None,
                valid_until: None,
                notes: None,
                scan: ScanFields::pending("scan.jpg".into(), "image/jpeg".into()),
                created_at: datetime("2024-03-01 10:00:00"),
            },
        )
        .unwrap();
        id
    }

    fn now() -> NaiveDateTime {
        datetime("2024-03-01 10:05:00")
    }

    #[test]
    fn prescription_extracted_and_matched() {
        let f = fixture();
        let id = pending_prescription(&f);
        let vision = MockVisionClient::new(PRESCRIPTION_ANSWER);

        let outcome = process_scan(&f.conn, f.dir.path(), &vision, ScanKind::Prescription, id, now()).unwrap();
        assert_eq!(outcome, ScanOutcome::Extracted);

        let record = db::get_scan_record(&f.conn, ScanKind::Prescription, &id).unwrap().unwrap();
        assert_eq!(record.scan.extraction_status, ExtractionStatus::Extracted);
        assert_eq!(record.scan.extracted_at, Some(now()));
        let data = record.scan.extracted_data.unwrap();
        assert_eq!(data["doctor_name"], "Dr. Martin");
        assert_eq!(data["medications"][0]["matched_name"], "Metformin");
        assert!(data["medications"][1]["drug_id"].is_null());
    }

    #[test]
    fn biology_report_results_matched_by_alias() {
        let f = fixture();
        let id = Uuid::new_v4();
        db::insert_biology_report(
            &f.conn,
            &BiologyReport {
                id,
                user_id: f.user_id,
                lab_name: None,
                test_date: None,
                notes: None,
                scan: ScanFields::pending("scan.jpg".into(), "image/jpeg".into()),
                created_at: datetime("2024-03-01 10:00:00"),
            },
        )
        .unwrap();
        let vision = MockVisionClient::new(
            r#"{"lab_name": "Labo", "results": [{"name": "Glycémie", "value": "0,95", "unit": "g/L"}]}"#,
        );

        let outcome = process_scan(&f.conn, f.dir.path(), &vision, ScanKind::BiologyReport, id, now()).unwrap();
        assert_eq!(outcome, ScanOutcome::Extracted);
        let data = db::get_scan_record(&f.conn, ScanKind::BiologyReport, &id)
            .unwrap()
            .unwrap()
            .scan
            .extracted_data
            .unwrap();
        assert_eq!(data["results"][0]["matched_name"], "Glucose");
    }

    #[test]
    fn vision_error_marks_failed() {
        let f = fixture();
        let id = pending_prescription(&f);
        let vision = MockVisionClient::failing(503, "model loading");

        let outcome = process_scan(&f.conn, f.dir.path(), &vision, ScanKind::Prescription, id, now()).unwrap();
        assert!(matches!(outcome, ScanOutcome::Failed(ref m) if m.contains("503")));

        let record = db::get_scan_record(&f.conn, ScanKind::Prescription, &id).unwrap().unwrap();
        assert_eq!(record.scan.extraction_status, ExtractionStatus::Failed);
        assert!(record.scan.extraction_error.unwrap().contains("model loading"));
    }

    #[test]
    fn empty_extraction_marks_failed() {
        let f = fixture();
        let id = pending_prescription(&f);
        let vision = MockVisionClient::new(r#"{"medications": []}"#);

        let outcome = process_scan(&f.conn, f.dir.path(), &vision, ScanKind::Prescription, id, now()).unwrap();
        assert!(matches!(outcome, ScanOutcome::Failed(_)));
    }

    #[test]
    fn missing_file_marks_failed() {
        let f = fixture();
        let id = pending_prescription(&f);
        std::fs::remove_file(f.dir.path().join("scan.jpg")).unwrap();
        let vision = MockVisionClient::new(PRESCRIPTION_ANSWER);

        let outcome = process_scan(&f.conn, f.dir.path(), &vision, ScanKind::Prescription, id, now()).unwrap();
        assert!(matches!(outcome, ScanOutcome::Failed(_)));
    }

    #[test]
    fn non_pending_scan_is_skipped() {
        let f = fixture();
        let id = pending_prescription(&f);
        let vision = MockVisionClient::new(PRESCRIPTION_ANSWER);
        process_scan(&f.conn, f.dir.path(), &vision, ScanKind::Prescription, id, now()).unwrap();

        let again = process_scan(&f.conn, f.dir.path(), &vision, ScanKind::Prescription, id, now()).unwrap();
        assert_eq!(again, ScanOutcome::Skipped);
        let unknown =
            process_scan(&f.conn, f.dir.path(), &vision, ScanKind::Prescription, Uuid::new_v4(), now()).unwrap();
        assert_eq!(unknown, ScanOutcome::Skipped);
    }
}
