use chrono::{Days, NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use super::types::{ExtractedBiologyReport, ExtractedPrescription};
use super::ScanError;
use crate::db::{self, DatabaseError};
use crate::models::enums::{ExtractionStatus, ScanKind};
use crate::models::{Medication, ScanRecord, TestResult};

/// Records created by a confirmation.
#[derive(Debug, Clone, Serialize)]
pub struct ConfirmOutcome {
    pub kind: ScanKind,
    pub id: Uuid,
    pub created: usize,
    /// Extracted test names with no matching biomarker; nothing was stored for them.
    pub skipped: Vec<String>,
}

fn owned_record(
    conn: &Connection,
    user_id: &Uuid,
    kind: ScanKind,
    id: &Uuid,
) -> Result<ScanRecord, ScanError> {
    db::get_scan_record_for_user(conn, kind, user_id, id)?.ok_or(ScanError::NotFound)
}

/// `extracted → confirmed`. `edits` replaces the extracted payload when
/// given. Header fields present in the payload overwrite the record's;
/// medications or test results are created from its entries. All or nothing.
pub fn confirm_scan(
    conn: &Connection,
    user_id: &Uuid,
    kind: ScanKind,
    id: &Uuid,
    edits: Option<Value>,
    now: NaiveDateTime,
) -> Result<ConfirmOutcome, ScanError> {
    let record = owned_record(conn, user_id, kind, id)?;
    if record.scan.extraction_status != ExtractionStatus::Extracted {
        return Err(ScanError::InvalidState {
            status: record.scan.extraction_status,
            action: "confirm",
        });
    }
    let payload = edits
        .or(record.scan.extracted_data)
        .ok_or_else(|| ScanError::InvalidPayload("no extracted data to confirm".into()))?;

    let tx = conn.unchecked_transaction().map_err(DatabaseError::from)?;
    let (created, skipped, confirmed) = match kind {
        ScanKind::Prescription => {
            let data: ExtractedPrescription = serde_json::from_value(payload)
                .map_err(|e| ScanError::InvalidPayload(e.to_string()))?;
            let created = apply_prescription(&tx, user_id, id, &data, now)?;
            (created, Vec::new(), to_value(&data)?)
        }
        ScanKind::BiologyReport => {
            let data: ExtractedBiologyReport = serde_json::from_value(payload)
                .map_err(|e| ScanError::InvalidPayload(e.to_string()))?;
            let (created, skipped) = apply_biology_report(&tx, user_id, id, &data, now)?;
            (created, skipped, to_value(&data)?)
        }
    };

    if !db::mark_scan_confirmed(&tx, kind, id, &confirmed)? {
        return Err(ScanError::InvalidState {
            status: ExtractionStatus::Confirmed,
            action: "confirm",
        });
    }
    tx.commit().map_err(DatabaseError::from)?;

    tracing::info!(scan_id = %id, kind = %kind, created, skipped = skipped.len(), "Scan confirmed");
    Ok(ConfirmOutcome {
        kind,
        id: *id,
        created,
        skipped,
    })
}

fn to_value<T: Serialize>(data: &T) -> Result<Value, ScanError> {
    serde_json::to_value(data).map_err(|e| ScanError::InvalidPayload(e.to_string()))
}

fn apply_prescription(
    conn: &Connection,
    user_id: &Uuid,
    id: &Uuid,
    data: &ExtractedPrescription,
    now: NaiveDateTime,
) -> Result<usize, ScanError> {
    if data.medications.iter().any(|m| m.name.trim().is_empty()) {
        return Err(ScanError::InvalidPayload("medication name cannot be empty".into()));
    }

    let mut prescription = db::get_prescription(conn, user_id, id)?.ok_or(ScanError::NotFound)?;
    if data.doctor_name.is_some() {
        prescription.doctor_name = data.doctor_name.clone();
    }
    if data.prescribed_on.is_some() {
        prescription.prescribed_on = data.prescribed_on;
    }
    if data.valid_until.is_some() {
        prescription.valid_until = data.valid_until;
    }
    db::update_prescription(conn, &prescription)?;

    for extracted in &data.medications {
        let drug_id = match extracted.drug_id {
            Some(drug_id) => db::get_drug(conn, &drug_id)?.map(|d| d.id),
            None => None,
        };
        let start_date = prescription.prescribed_on;
        db::insert_medication(
            conn,
            &Medication {
                id: Uuid::new_v4(),
                prescription_id: prescription.id,
                drug_id,
                name: extracted.name.trim().to_string(),
                dosage: extracted.dosage.clone(),
                form: extracted.form.clone(),
                instructions: extracted.instructions.clone(),
                start_date,
                end_date: start_date.zip(extracted.duration_days).and_then(course_end),
                active: true,
                created_at: now,
            },
        )?;
    }
    Ok(data.medications.len())
}

/// Last day of a course of `days` days starting on `start`.
fn course_end((start, days): (NaiveDate, u32)) -> Option<NaiveDate> {
    start.checked_add_days(Days::new(u64::from(days.max(1)) - 1))
}

fn apply_biology_report(
    conn: &Connection,
    user_id: &Uuid,
    id: &Uuid,
    data: &ExtractedBiologyReport,
    now: NaiveDateTime,
) -> Result<(usize, Vec<String>), ScanError> {
    let mut report = db::get_biology_report(conn, user_id, id)?.ok_or(ScanError::NotFound)?;
    if data.lab_name.is_some() {
        report.lab_name = data.lab_name.clone();
    }
    if data.test_date.is_some() {
        report.test_date = data.test_date;
    }
    db::update_biology_report(conn, &report)?;

    let mut created = 0;
    let mut skipped = Vec::new();
    for extracted in &data.results {
        if !extracted.value.is_finite() {
            return Err(ScanError::InvalidPayload(format!("invalid value for {}", extracted.name)));
        }
        let biomarker = match extracted.biomarker_id {
            Some(biomarker_id) => db::get_biomarker(conn, &biomarker_id)?,
            None => None,
        };
        let Some(biomarker) = biomarker else {
            skipped.push(extracted.name.clone());
            continue;
        };

        db::insert_test_result(
            conn,
            &TestResult {
                id: Uuid::new_v4(),
                biology_report_id: report.id,
                biomarker_id: biomarker.id,
                value: extracted.value,
                unit: extracted.unit.clone().or(biomarker.unit),
                reference_min: extracted.reference_min.or(biomarker.normal_min),
                reference_max: extracted.reference_max.or(biomarker.normal_max),
                created_at: now,
            },
        )?;
        created += 1;
    }
    Ok((created, skipped))
}

/// `failed → pending`. The caller re-enqueues the scan.
pub fn retry_scan(
    conn: &Connection,
    user_id: &Uuid,
    kind: ScanKind,
    id: &Uuid,
) -> Result<(), ScanError> {
    let record = owned_record(conn, user_id, kind, id)?;
    let status = record.scan.extraction_status;
    if status != ExtractionStatus::Failed
        || !db::transition_scan(conn, kind, id, ExtractionStatus::Failed, ExtractionStatus::Pending)?
    {
        return Err(ScanError::InvalidState {
            status,
            action: "retry",
        });
    }
    tracing::info!(scan_id = %id, kind = %kind, "Scan queued for retry");
    Ok(())
}
