//! Caller-supplied references and scan events.
//!
//! [`PatientRef`] and [`MedicationRef`] come from the patient and medication record systems; the
//! workflow reads them but never changes them.

use crate::barcode::{Barcode, BarcodeKind};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// The patient the medication is meant for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientRef {
    /// Wristband identifier, e.g. `PT12345`.
    pub id: String,
    pub display_name: String,
    pub date_of_birth: NaiveDate,
}

/// The scheduled medication being administered.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MedicationRef {
    /// Label identifier, e.g. `MA00001`.
    pub id: String,
    pub name: String,
    /// Dose as recorded on the medication record, e.g. `500 mg`.
    pub dose: String,
    /// Dose on the prescriber's order. `None` when the order carries no separate dose.
    #[serde(default)]
    pub ordered_dose: Option<String>,
    pub route: String,
    pub scheduled_time: DateTime<Utc>,
    /// Category tag used to select ancillary reading gates, e.g. `diabetic`.
    pub category: String,
    /// When this medication was last given, if known.
    #[serde(default)]
    pub last_administered_at: Option<DateTime<Utc>>,
}

/// How a scan reached the workflow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanSource {
    Scanner,
    Manual,
}

/// One fully decoded barcode.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanEvent {
    pub raw: String,
    pub barcode: Barcode,
    pub source: ScanSource,
    pub received_at: DateTime<Utc>,
}

impl ScanEvent {
    pub fn new(raw: impl Into<String>, source: ScanSource, received_at: DateTime<Utc>) -> Self {
        let raw = raw.into();
        let barcode = crate::barcode::classify(&raw);
        Self {
            raw,
            barcode,
            source,
            received_at,
        }
    }

    pub fn kind(&self) -> BarcodeKind {
        self.barcode.kind
    }

    pub fn value(&self) -> &str {
        &self.barcode.value
    }
}
