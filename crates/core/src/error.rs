use crate::barcode::BarcodeKind;
use crate::rights::Right;
use crate::workflow::StateName;

/// Errors raised by a verification workflow.
///
/// Every variant is recoverable: the workflow that returned it is still usable and keeps all
/// scans, overrides and readings captured so far.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("expected a {expected} barcode but scanned a {found} barcode")]
    WrongBarcodeType {
        expected: BarcodeKind,
        found: BarcodeKind,
    },
    #[error("unrecognised barcode format: {0:?}")]
    UnknownBarcodeFormat(String),
    #[error("five-rights validation failed: {}", format_rights(.failed))]
    ValidationFailed { failed: Vec<Right> },
    #[error("{gate} reading {value} is outside {min}..={max} {unit}")]
    ReadingOutOfRange {
        gate: String,
        value: f64,
        min: f64,
        max: f64,
        unit: String,
    },
    #[error("override requires a justification")]
    MissingJustification,
    #[error("failed to persist administration log: {0}")]
    PersistenceFailure(#[source] StoreError),

    #[error("verifier name is required")]
    MissingVerifier,
    #[error("a {gate} reading is required before completion")]
    ReadingRequired { gate: String },
    #[error("no ancillary reading applies to medication category {category:?}")]
    ReadingNotApplicable { category: String },
    #[error("all five rights already pass; nothing to override")]
    NothingToOverride,
    #[error("{operation} is not allowed while {state}")]
    InvalidState {
        operation: &'static str,
        state: StateName,
    },
    #[error("workflow is complete")]
    WorkflowComplete,
}

fn format_rights(rights: &[Right]) -> String {
    rights
        .iter()
        .map(|r| r.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type WorkflowResult<T> = std::result::Result<T, WorkflowError>;

/// Errors raised by an [`crate::store::AdministrationStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to create store directory: {0}")]
    DirCreation(std::io::Error),
    #[error("failed to write administration log: {0}")]
    FileWrite(std::io::Error),
    #[error("failed to read administration log: {0}")]
    FileRead(std::io::Error),
    #[error("administration log {0} already exists")]
    AlreadyExists(uuid::Uuid),
    #[error("failed to serialize administration log: {0}")]
    YamlSerialization(serde_yaml::Error),
    #[error("failed to deserialize administration log: {0}")]
    YamlDeserialization(serde_yaml::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors raised while resolving [`crate::config::BcmaConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    InvalidInput(String),
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
