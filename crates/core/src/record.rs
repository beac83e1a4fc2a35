//! The administration log: the audit-of-record for a completed verification.

use crate::gate::ConditionalReading;
use crate::overrides::OverrideRecord;
use crate::rights::CheckMap;
use bcma_types::NonEmptyText;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Immutable record of one completed administration.
///
/// Built only by [`crate::workflow::Workflow::complete`] and never modified afterwards. Fields are
/// public for reading, but the struct is `#[non_exhaustive]`, so other crates cannot assemble one
/// that skipped the completion rules:
///
/// ```compile_fail
/// use bcma_core::AdministrationLog;
///
/// fn forge(log: AdministrationLog) -> AdministrationLog {
///     AdministrationLog { ..log }
/// }
/// ```
///
/// Logs read back from a store come through `Deserialize`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct AdministrationLog {
    pub id: Uuid,
    pub patient_id: String,
    pub medication_id: String,
    pub scanned_patient_id: String,
    pub scanned_medication_id: String,
    pub checks: CheckMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_record: Option<OverrideRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reading: Option<ConditionalReading>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<NonEmptyText>,
    /// Audit lines for anything that needed supervision, such as overrides.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub operator: NonEmptyText,
    pub verifier: NonEmptyText,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub witness: Option<NonEmptyText>,
    pub completed_at: DateTime<Utc>,
}

impl AdministrationLog {
    pub fn was_overridden(&self) -> bool {
        self.override_record.is_some()
    }
}

/// Sign-off supplied when completing a workflow.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompletionDetails {
    pub verifier: String,
    pub witness: Option<String>,
    pub notes: Option<String>,
}

impl CompletionDetails {
    pub fn new(verifier: impl Into<String>) -> Self {
        Self {
            verifier: verifier.into(),
            witness: None,
            notes: None,
        }
    }

    pub fn with_witness(mut self, witness: impl Into<String>) -> Self {
        self.witness = Some(witness.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}
