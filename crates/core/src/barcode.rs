//! Barcode classification.
//!
//! Wristband and label barcodes arrive as plain text. [`classify`] decides which family a code
//! belongs to using ordered rules; the first rule that matches wins:
//!
//! | Family     | Format                     | Example       |
//! |------------|----------------------------|---------------|
//! | patient    | `PT` + 5 digits            | `PT12345`     |
//! | patient    | legacy `PAT-` prefix       | `PAT-0042`    |
//! | medication | `M` + letter + 5 digits    | `MA00001`     |
//! | medication | legacy `MED` / `RX-` prefix| `RX-778`      |
//! | medication | 6 to 12 alphanumerics      | `ndc0123456`  |
//!
//! Anything else is [`BarcodeKind::Unknown`]. Unknown codes never satisfy a workflow step.

use crate::constants::{LEGACY_MEDICATION_PREFIXES, LEGACY_PATIENT_PREFIX};
use serde::{Deserialize, Serialize};

/// Barcode family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BarcodeKind {
    Patient,
    Medication,
    Unknown,
}

impl BarcodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BarcodeKind::Patient => "patient",
            BarcodeKind::Medication => "medication",
            BarcodeKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for BarcodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which rule matched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarcodeFormat {
    /// `PT` + 5 digits or `M` + letter + 5 digits.
    Standard,
    /// `PAT-`, `MED` or `RX-` prefix.
    Legacy,
    /// 6 to 12 alphanumerics.
    Generic,
    Unrecognised,
}

impl BarcodeFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            BarcodeFormat::Standard => "standard",
            BarcodeFormat::Legacy => "legacy",
            BarcodeFormat::Generic => "generic",
            BarcodeFormat::Unrecognised => "unrecognised",
        }
    }
}

/// A classified barcode value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Barcode {
    pub kind: BarcodeKind,
    pub format: BarcodeFormat,
    /// Scanned text with surrounding whitespace removed.
    pub value: String,
}

impl Barcode {
    pub fn is_patient(&self) -> bool {
        self.kind == BarcodeKind::Patient
    }

    pub fn is_medication(&self) -> bool {
        self.kind == BarcodeKind::Medication
    }
}

/// Classify raw scanned or typed text.
pub fn classify(raw: &str) -> Barcode {
    let value = raw.trim();
    let (kind, format) = classify_trimmed(value);
    Barcode {
        kind,
        format,
        value: value.to_string(),
    }
}

fn classify_trimmed(value: &str) -> (BarcodeKind, BarcodeFormat) {
    let bytes = value.as_bytes();

    if is_standard_patient(bytes) {
        return (BarcodeKind::Patient, BarcodeFormat::Standard);
    }
    if has_prefix_with_payload(value, LEGACY_PATIENT_PREFIX) {
        return (BarcodeKind::Patient, BarcodeFormat::Legacy);
    }

    if is_standard_medication(bytes) {
        return (BarcodeKind::Medication, BarcodeFormat::Standard);
    }
    if LEGACY_MEDICATION_PREFIXES
        .iter()
        .any(|p| has_prefix_with_payload(value, p))
    {
        return (BarcodeKind::Medication, BarcodeFormat::Legacy);
    }
    if is_generic_medication(bytes) {
        return (BarcodeKind::Medication, BarcodeFormat::Generic);
    }

    (BarcodeKind::Unknown, BarcodeFormat::Unrecognised)
}

// ^PT\d{5}$
fn is_standard_patient(bytes: &[u8]) -> bool {
    bytes.len() == 7 && bytes.starts_with(b"PT") && bytes[2..].iter().all(u8::is_ascii_digit)
}

// ^M[A-Z]\d{5}$
fn is_standard_medication(bytes: &[u8]) -> bool {
    bytes.len() == 7
        && bytes[0] == b'M'
        && bytes[1].is_ascii_uppercase()
        && bytes[2..].iter().all(u8::is_ascii_digit)
}

// ^[A-Z0-9]{6,12}$, case-insensitive
fn is_generic_medication(bytes: &[u8]) -> bool {
    (6..=12).contains(&bytes.len()) && bytes.iter().all(u8::is_ascii_alphanumeric)
}

fn has_prefix_with_payload(value: &str, prefix: &str) -> bool {
    value.len() > prefix.len() && value.starts_with(prefix)
}
