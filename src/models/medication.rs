use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::scan::ScanFields;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prescription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub doctor_name: Option<String>,
    pub prescribed_on: Option<NaiveDate>,
    pub valid_until: Option<NaiveDate>,
    pub notes: Option<String>,
    #[serde(flatten)]
    pub scan: ScanFields,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Medication {
    pub id: Uuid,
    pub prescription_id: Uuid,
    pub drug_id: Option<Uuid>,
    pub name: String,
    pub dosage: Option<String>,
    pub form: Option<String>,
    pub instructions: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub active: bool,
    pub created_at: NaiveDateTime,
}

impl Medication {
    /// Whether the medication is being taken on `date` (active flag + date window).
    pub fn is_current_on(&self, date: NaiveDate) -> bool {
        self.active
            && self.start_date.map_or(true, |start| start <= date)
            && self.end_date.map_or(true, |end| end >= date)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Drug {
    pub id: Uuid,
    pub name: String,
    pub active_ingredient: Option<String>,
    pub form: Option<String>,
    pub strength: Option<String>,
    pub external_code: Option<String>,
    pub source: super::enums::DrugSource,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn med(start: Option<&str>, end: Option<&str>, active: bool) -> Medication {
        let parse = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();
        Medication {
            id: Uuid::new_v4(),
            prescription_id: Uuid::new_v4(),
            drug_id: None,
            name: "Metformin".into(),
            dosage: Some("500 mg".into()),
            form: None,
            instructions: None,
            start_date: start.map(parse),
            end_date: end.map(parse),
            active,
            created_at: NaiveDateTime::default(),
        }
    }

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn open_ended_medication_is_current() {
        assert!(med(None, None, true).is_current_on(day("2024-03-10")));
    }

    #[test]
    fn date_window_is_inclusive() {
        let m = med(Some("2024-03-01"), Some("2024-03-10"), true);
        assert!(m.is_current_on(day("2024-03-01")));
        assert!(m.is_current_on(day("2024-03-10")));
        assert!(!m.is_current_on(day("2024-02-29")));
        assert!(!m.is_current_on(day("2024-03-11")));
    }

    #[test]
    fn inactive_medication_is_never_current() {
        assert!(!med(None, None, false).is_current_on(day("2024-03-10")));
    }
}
