//! Turns the vision model's free-form answer into validated extraction
//! payloads. Models drift from the requested schema, so keys have aliases,
//! numbers may arrive as strings with a decimal comma, and malformed items
//! are dropped rather than failing the whole document.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde_json::{Map, Value};

use super::types::{
    ExtractedBiologyReport, ExtractedMedication, ExtractedPrescription, ExtractedTestResult,
};
use super::ScanError;

static LEADING_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[<>≤≥=~]?\s*(-?\d+(?:[.,]\d+)?)").unwrap());

static RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(-?\d+(?:[.,]\d+)?)\s*(?:-|–|to|à)\s*(-?\d+(?:[.,]\d+)?)").unwrap()
});

/// Locate the JSON object in a model answer: a fenced ```json block when
/// present, otherwise the span from the first `{` to the last `}`.
pub fn extract_json(response: &str) -> Result<&str, ScanError> {
    if let Some(start) = response.find("```json") {
        let content_start = start + 7;
        let end = response[content_start..]
            .find("```")
            .ok_or_else(|| ScanError::MalformedResponse("Unclosed JSON block".into()))?;
        return Ok(response[content_start..content_start + end].trim());
    }

    match (response.find('{'), response.rfind('}')) {
        (Some(start), Some(end)) if start < end => Ok(&response[start..=end]),
        _ => Err(ScanError::MalformedResponse("No JSON object found".into())),
    }
}

fn parse_object(response: &str) -> Result<Map<String, Value>, ScanError> {
    let json = extract_json(response)?;
    match serde_json::from_str::<Value>(json) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ScanError::MalformedResponse("Expected a JSON object".into())),
        Err(e) => Err(ScanError::JsonParsing(e.to_string())),
    }
}

/// Parse and validate a prescription extraction. Fails with
/// `NothingExtracted` when no usable medication remains.
pub fn parse_prescription(response: &str) -> Result<ExtractedPrescription, ScanError> {
    let raw = parse_object(response)?;

    let medications: Vec<ExtractedMedication> = array_field(&raw, &["medications", "drugs", "items"])
        .iter()
        .filter_map(Value::as_object)
        .filter_map(parse_medication)
        .collect();

    if medications.is_empty() {
        return Err(ScanError::NothingExtracted);
    }

    Ok(ExtractedPrescription {
        doctor_name: string_field(&raw, &["doctor_name", "doctor", "prescriber"]),
        prescribed_on: date_field(&raw, &["prescribed_on", "prescription_date", "date"]),
        valid_until: date_field(&raw, &["valid_until", "expiry_date"]),
        medications,
    })
}

fn parse_medication(item: &Map<String, Value>) -> Option<ExtractedMedication> {
    let name = string_field(item, &["name", "drug", "medication"])?;
    Some(ExtractedMedication {
        name,
        dosage: string_field(item, &["dosage", "strength", "dose"]),
        form: string_field(item, &["form"]),
        instructions: string_field(item, &["instructions", "frequency", "posology"]),
        duration_days: number_field(item, &["duration_days", "duration"])
            .filter(|d| *d >= 1.0 && d.fract() == 0.0 && *d <= u32::MAX as f64)
            .map(|d| d as u32),
        drug_id: None,
        matched_name: None,
    })
}

/// Parse and validate a biology report extraction. Fails with
/// `NothingExtracted` when no result with a numeric value remains.
pub fn parse_biology_report(response: &str) -> Result<ExtractedBiologyReport, ScanError> {
    let raw = parse_object(response)?;

    let results: Vec<ExtractedTestResult> = array_field(&raw, &["results", "tests", "lab_results"])
        .iter()
        .filter_map(Value::as_object)
        .filter_map(parse_test_result)
        .collect();

    if results.is_empty() {
        return Err(ScanError::NothingExtracted);
    }

    Ok(ExtractedBiologyReport {
        lab_name: string_field(&raw, &["lab_name", "laboratory", "lab"]),
        test_date: date_field(&raw, &["test_date", "date", "collection_date"]),
        results,
    })
}

fn parse_test_result(item: &Map<String, Value>) -> Option<ExtractedTestResult> {
    let name = string_field(item, &["name", "test", "test_name"])?;
    let value = number_field(item, &["value", "result"])?;

    let mut reference_min = number_field(item, &["reference_min", "ref_min", "min"]);
    let mut reference_max = number_field(item, &["reference_max", "ref_max", "max"]);
    if reference_min.is_none() && reference_max.is_none() {
        if let Some((lo, hi)) = string_field(item, &["reference_range", "range"])
            .as_deref()
            .and_then(parse_range)
        {
            reference_min = Some(lo);
            reference_max = Some(hi);
        }
    }
    if let (Some(lo), Some(hi)) = (reference_min, reference_max) {
        if lo > hi {
            reference_min = Some(hi);
            reference_max = Some(lo);
        }
    }

    Some(ExtractedTestResult {
        name,
        value,
        unit: string_field(item, &["unit", "units"]),
        reference_min,
        reference_max,
        biomarker_id: None,
        matched_name: None,
    })
}

fn first<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| map.get(*k))
        .find(|v| !v.is_null())
}

fn array_field<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> &'a [Value] {
    first(map, keys)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Non-empty trimmed string; numbers are accepted and stringified.
fn string_field(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    let text = match first(map, keys)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty() && !text.eq_ignore_ascii_case("null")).then_some(text)
}

fn number_field(map: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    let number = match first(map, keys)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_number(s),
        _ => None,
    };
    number.filter(|n| n.is_finite())
}

fn date_field(map: &Map<String, Value>, keys: &[&str]) -> Option<NaiveDate> {
    first(map, keys)?.as_str().and_then(parse_date)
}

/// `"5,4"`, `"< 5.4 mmol/L"` and `"12"` all read as numbers.
pub fn parse_number(raw: &str) -> Option<f64> {
    let caps = LEADING_NUMBER.captures(raw.trim())?;
    caps[1].replace(',', ".").parse().ok()
}

/// `"4.0 - 6.0"` style reference ranges.
pub fn parse_range(raw: &str) -> Option<(f64, f64)> {
    let caps = RANGE.captures(raw)?;
    let lo = caps[1].replace(',', ".").parse().ok()?;
    let hi = caps[2].replace(',', ".").parse().ok()?;
    Some((lo, hi))
}

/// ISO dates, plus day-first `DD/MM/YYYY` as printed on European documents.
/// Anything else is dropped.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    ["%Y-%m-%d", "%d/%m/%Y", "%d.%m.%Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}
