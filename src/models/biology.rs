use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::ResultFlag;
use super::scan::ScanFields;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiologyReport {
    pub id: Uuid,
    pub user_id: Uuid,
    pub lab_name: Option<String>,
    pub test_date: Option<NaiveDate>,
    pub notes: Option<String>,
    #[serde(flatten)]
    pub scan: ScanFields,
    pub created_at: NaiveDateTime,
}

/// Reference entry for a measurable lab value (glucose, HbA1c, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Biomarker {
    pub id: Uuid,
    pub name: String,
    pub code: Option<String>,
    pub unit: Option<String>,
    pub normal_min: Option<f64>,
    pub normal_max: Option<f64>,
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub id: Uuid,
    pub biology_report_id: Uuid,
    pub biomarker_id: Uuid,
    pub value: f64,
    pub unit: Option<String>,
    pub reference_min: Option<f64>,
    pub reference_max: Option<f64>,
    pub created_at: NaiveDateTime,
}

impl TestResult {
    pub fn flag(&self) -> ResultFlag {
        ResultFlag::classify(self.value, self.reference_min, self.reference_max)
    }
}

/// A test result joined with its biomarker for display.
#[derive(Debug, Clone, Serialize)]
pub struct TestResultDetail {
    #[serde(flatten)]
    pub result: TestResult,
    pub biomarker_name: String,
    pub flag: ResultFlag,
}

/// One point of a biomarker's history across reports.
#[derive(Debug, Clone, Serialize)]
pub struct BiomarkerReading {
    pub test_result_id: Uuid,
    pub biology_report_id: Uuid,
    pub test_date: Option<NaiveDate>,
    pub value: f64,
    pub unit: Option<String>,
    pub flag: ResultFlag,
}
