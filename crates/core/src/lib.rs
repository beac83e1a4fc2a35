//! # BCMA Core
//!
//! Barcode Medication Administration verification.
//!
//! This crate confirms that a medication is about to be given to the right patient, in the right
//! dose, by the right route and at the right time before an administration record is written:
//! - [`barcode`] classifies scanned text as a patient or medication barcode
//! - [`dispatcher`] turns scanner keystrokes into scan events and delivers them to a workflow
//! - [`workflow`] is the verification state machine
//! - [`rights`] computes the five-rights check map
//! - [`gate`] blocks completion until a required ancillary reading (e.g. glucose) is captured
//! - [`overrides`] records supervised bypasses of failed checks
//! - [`record`] and [`store`] build the administration log and hand it to persistence
//!
//! **No API concerns**: HTTP servers and CLIs belong in `api-rest` and `bcma-cli`.

pub mod barcode;
pub mod clock;
pub mod config;
pub mod constants;
pub mod dispatcher;
pub mod error;
pub mod gate;
pub mod model;
pub mod overrides;
pub mod record;
pub mod rights;
pub mod store;
pub mod workflow;

pub use barcode::{classify, Barcode, BarcodeFormat, BarcodeKind};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{BcmaConfig, TimeWindowPolicy};
pub use dispatcher::{PublishOutcome, ScanDispatcher, ScanSubscription};
pub use error::{
    ConfigError, ConfigResult, StoreError, StoreResult, WorkflowError, WorkflowResult,
};
pub use gate::{ConditionalReading, ReadingGate};
pub use model::{MedicationRef, PatientRef, ScanEvent, ScanSource};
pub use overrides::{OverrideEntry, OverrideRecord};
pub use record::{AdministrationLog, CompletionDetails};
pub use rights::{CheckMap, FiveRightsValidator, Right, RightsInput};
pub use store::{AdministrationStore, FileAdministrationStore, InMemoryAdministrationStore};
pub use workflow::{ScanOutcome, StateName, Verification, Workflow, WorkflowContext};

pub use bcma_types::{NonEmptyText, TextError};
