use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What the vision model read off a prescription, after matching.
///
/// Stored as `extracted_data` and accepted back, possibly edited, on confirm.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedPrescription {
    #[serde(default)]
    pub doctor_name: Option<String>,
    #[serde(default)]
    pub prescribed_on: Option<NaiveDate>,
    #[serde(default)]
    pub valid_until: Option<NaiveDate>,
    #[serde(default)]
    pub medications: Vec<ExtractedMedication>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedMedication {
    pub name: String,
    #[serde(default)]
    pub dosage: Option<String>,
    #[serde(default)]
    pub form: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub duration_days: Option<u32>,
    /// Local drug the name was matched to.
    #[serde(default)]
    pub drug_id: Option<Uuid>,
    #[serde(default)]
    pub matched_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedBiologyReport {
    #[serde(default)]
    pub lab_name: Option<String>,
    #[serde(default)]
    pub test_date: Option<NaiveDate>,
    #[serde(default)]
    pub results: Vec<ExtractedTestResult>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedTestResult {
    pub name: String,
    pub value: f64,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub reference_min: Option<f64>,
    #[serde(default)]
    pub reference_max: Option<f64>,
    /// Reference biomarker the name was matched to.
    #[serde(default)]
    pub biomarker_id: Option<Uuid>,
    #[serde(default)]
    pub matched_name: Option<String>,
}
