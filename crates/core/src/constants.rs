//! Constants used throughout the BCMA core crate.
//!
//! Defaults for the administration policy live here so that configuration, the validator and the
//! binaries agree on the same values.

/// Minutes before the scheduled time at which a dose may be given.
pub const DEFAULT_EARLY_WINDOW_MINUTES: i64 = 60;

/// Minutes after the scheduled time before a dose counts as overdue.
pub const DEFAULT_LATE_WINDOW_MINUTES: i64 = 60;

/// Widest window either side of the scheduled time that configuration may set.
pub const MAX_WINDOW_MINUTES: i64 = 24 * 60;

/// Identical scans arriving closer together than this are treated as one.
pub const DEFAULT_DEBOUNCE_MS: i64 = 300;

/// Keystroke that ends a keyboard-wedge scan.
pub const DEFAULT_SCAN_TERMINATOR: char = '\n';

/// Name of the built-in ancillary reading gate.
pub const GLUCOSE_GATE_NAME: &str = "glucose";

/// Unit the glucose gate bounds are expressed in.
pub const GLUCOSE_UNIT: &str = "mmol/L";

/// Medication category that triggers the glucose gate by default.
pub const DIABETIC_CATEGORY: &str = "diabetic";

/// Physiological bounds for a glucose reading, inclusive.
pub const GLUCOSE_MIN_MMOL_L: f64 = 1.0;
pub const GLUCOSE_MAX_MMOL_L: f64 = 35.0;

/// Longest raw scan the wedge buffer will accumulate before discarding input.
pub const MAX_SCAN_LENGTH: usize = 128;

/// Prefix used by legacy patient wristbands.
pub const LEGACY_PATIENT_PREFIX: &str = "PAT-";

/// Prefixes used by legacy medication labels.
pub const LEGACY_MEDICATION_PREFIXES: [&str; 2] = ["MED", "RX-"];

/// File extension for administration logs written by the file store.
pub const ADMINISTRATION_LOG_EXTENSION: &str = "yaml";
