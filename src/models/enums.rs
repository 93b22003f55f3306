use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(ExtractionStatus {
    Manual => "manual",
    Pending => "pending",
    Processing => "processing",
    Extracted => "extracted",
    Confirmed => "confirmed",
    Failed => "failed",
});

impl ExtractionStatus {
    /// Allowed moves of the scan state machine.
    ///
    /// `manual` records never enter the scan flow; `confirmed` is terminal.
    pub fn can_transition_to(&self, next: ExtractionStatus) -> bool {
        use ExtractionStatus::*;
        matches!(
            (*self, next),
            (Pending, Processing)
                | (Pending, Failed)
                | (Processing, Extracted)
                | (Processing, Failed)
                | (Processing, Pending)
                | (Extracted, Confirmed)
                | (Failed, Pending)
        )
    }
}

str_enum!(LogStatus {
    Taken => "taken",
    Skipped => "skipped",
});

str_enum!(ResultFlag {
    Low => "low",
    Normal => "normal",
    High => "high",
});

impl ResultFlag {
    /// Classify a measured value against optional reference bounds.
    pub fn classify(value: f64, min: Option<f64>, max: Option<f64>) -> Self {
        match (min, max) {
            (Some(lo), _) if value < lo => ResultFlag::Low,
            (_, Some(hi)) if value > hi => ResultFlag::High,
            _ => ResultFlag::Normal,
        }
    }
}

str_enum!(ScanKind {
    Prescription => "prescription",
    BiologyReport => "biology_report",
});

impl ScanKind {
    /// Table holding the scan columns for this kind.
    pub(crate) fn table(&self) -> &'static str {
        match self {
            ScanKind::Prescription => "prescriptions",
            ScanKind::BiologyReport => "biology_reports",
        }
    }
}

str_enum!(DrugSource {
    Local => "local",
    Lookup => "lookup",
});
