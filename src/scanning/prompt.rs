use crate::models::enums::ScanKind;

const PRESCRIPTION_PROMPT: &str = r#"You are reading a photographed medical prescription.
Extract its content and answer with a single JSON object, no commentary:

{
  "doctor_name": "string or null",
  "prescribed_on": "YYYY-MM-DD or null",
  "valid_until": "YYYY-MM-DD or null",
  "medications": [
    {
      "name": "drug name as written",
      "dosage": "strength, e.g. 500 mg, or null",
      "form": "tablet, capsule, syrup... or null",
      "instructions": "how and when to take it, or null",
      "duration_days": number or null
    }
  ]
}

Rules:
- Copy drug names exactly as printed; do not translate or guess.
- Use null for anything you cannot read.
- Dates must be YYYY-MM-DD."#;

const BIOLOGY_REPORT_PROMPT: &str = r#"You are reading a photographed laboratory (biology) report.
Extract its content and answer with a single JSON object, no commentary:

{
  "lab_name": "string or null",
  "test_date": "YYYY-MM-DD or null",
  "results": [
    {
      "name": "test name as written",
      "value": number,
      "unit": "unit as written or null",
      "reference_min": number or null,
      "reference_max": number or null
    }
  ]
}

Rules:
- Only include tests with a numeric result.
- Use a dot as decimal separator.
- Use null for anything you cannot read.
- Dates must be YYYY-MM-DD."#;

/// Instruction sent with the document image for each scan kind.
pub fn prompt_for(kind: ScanKind) -> &'static str {
    match kind {
        ScanKind::Prescription => PRESCRIPTION_PROMPT,
        ScanKind::BiologyReport => BIOLOGY_REPORT_PROMPT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompts_describe_expected_keys() {
        let p = prompt_for(ScanKind::Prescription);
        assert!(p.contains("\"medications\""));
        assert!(p.contains("YYYY-MM-DD"));
        let b = prompt_for(ScanKind::BiologyReport);
        assert!(b.contains("\"results\""));
        assert!(b.contains("reference_min"));
    }
}
