//! Request and response bodies.

use bcma_core::{
    Barcode, CheckMap, MedicationRef, PatientRef, PublishOutcome,
    ScanOutcome, Workflow,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorRes {
    /// Machine-readable error code, e.g. `wrong_barcode_type`.
    pub error: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ClassifyReq {
    pub raw: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ClassifyRes {
    /// `patient`, `medication` or `unknown`.
    pub kind: String,
    /// `standard`, `legacy`, `generic` or `unrecognised`.
    pub format: String,
    pub value: String,
}

impl From<Barcode> for ClassifyRes {
    fn from(barcode: Barcode) -> Self {
        Self {
            kind: barcode.kind.as_str().to_string(),
            format: barcode.format.as_str().to_string(),
            value: barcode.value,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PatientReq {
    pub id: String,
    pub display_name: String,
    /// `YYYY-MM-DD`
    #[schema(value_type = String)]
    pub date_of_birth: NaiveDate,
}

impl From<PatientReq> for PatientRef {
    fn from(req: PatientReq) -> Self {
        PatientRef {
            id: req.id,
            display_name: req.display_name,
            date_of_birth: req.date_of_birth,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MedicationReq {
    pub id: String,
    pub name: String,
    pub dose: String,
    #[serde(default)]
    pub ordered_dose: Option<String>,
    pub route: String,
    /// RFC 3339 timestamp.
    #[schema(value_type = String)]
    pub scheduled_time: DateTime<Utc>,
    pub category: String,
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub last_administered_at: Option<DateTime<Utc>>,
}

impl From<MedicationReq> for MedicationRef {
    fn from(req: MedicationReq) -> Self {
        MedicationRef {
            id: req.id,
            name: req.name,
            dose: req.dose,
            ordered_dose: req.ordered_dose,
            route: req.route,
            scheduled_time: req.scheduled_time,
            category: req.category,
            last_administered_at: req.last_administered_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateWorkflowReq {
    pub patient: PatientReq,
    pub medication: MedicationReq,
    pub operator: String,
    #[serde(default)]
    pub administering_route: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct ChecksDto {
    pub patient: bool,
    pub medication: bool,
    pub dose: bool,
    pub route: bool,
    pub time: bool,
}

impl From<&CheckMap> for ChecksDto {
    fn from(checks: &CheckMap) -> Self {
        Self {
            patient: checks.patient,
            medication: checks.medication,
            dose: checks.dose,
            route: checks.route,
            time: checks.time,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WorkflowStatusRes {
    pub id: String,
    /// `awaiting_patient_scan`, `awaiting_medication_scan`, `verifying` or `complete`.
    pub state: String,
    pub scanned_patient_id: Option<String>,
    pub scanned_medication_id: Option<String>,
    pub checks: Option<ChecksDto>,
    pub is_valid: bool,
    pub overridden: Vec<String>,
    /// Gate still blocking completion, e.g. `glucose`.
    pub pending_gate: Option<String>,
    pub reading: Option<f64>,
    pub record_id: Option<String>,
}

impl WorkflowStatusRes {
    pub fn from_workflow(id: Uuid, workflow: &Workflow) -> Self {
        let scanned_medication_id = workflow
            .verification()
            .map(|v| v.scanned_medication_id().to_string())
            .or_else(|| workflow.log().map(|l| l.scanned_medication_id.clone()));

        Self {
            id: id.simple().to_string(),
            state: workflow.state_name().as_str().to_string(),
            scanned_patient_id: workflow.scanned_patient_id().map(str::to_string),
            scanned_medication_id,
            checks: workflow.checks().map(ChecksDto::from),
            is_valid: workflow.is_valid(),
            overridden: workflow
                .override_record()
                .map(|r| {
                    r.overridden
                        .iter()
                        .map(|o| o.as_str().to_string())
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default(),
            pending_gate: workflow.pending_gate().map(|g| g.name().to_string()),
            reading: workflow.reading().map(|r| r.value),
            record_id: workflow.log().map(|l| l.id.simple().to_string()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateWorkflowRes {
    pub id: String,
    pub status: WorkflowStatusRes,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ScanReq {
    pub raw: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ManualEntryReq {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ScanRes {
    /// `delivered` or `debounced`. Always `delivered` for manual entry.
    pub dispatch: String,
    /// `patient_accepted`, `medication_accepted`, `duplicate_ignored` or `ignored`.
    pub outcome: Option<String>,
    pub status: WorkflowStatusRes,
}

pub fn dispatch_name(outcome: PublishOutcome) -> &'static str {
    match outcome {
        PublishOutcome::Delivered => "delivered",
        PublishOutcome::Debounced => "debounced",
        PublishOutcome::NoListener => "no_listener",
    }
}

pub fn outcome_name(outcome: &ScanOutcome) -> &'static str {
    match outcome {
        ScanOutcome::PatientAccepted => "patient_accepted",
        ScanOutcome::MedicationAccepted { .. } => "medication_accepted",
        ScanOutcome::DuplicateIgnored => "duplicate_ignored",
        ScanOutcome::Ignored => "ignored",
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OverrideReq {
    pub justification: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OverrideRes {
    /// Rights that were failing immediately before this override.
    pub overridden: Vec<String>,
    pub status: WorkflowStatusRes,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReadingReq {
    pub value: f64,
    /// Defaults to the time the request is handled.
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub captured_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CompleteReq {
    pub verifier: String,
    #[serde(default)]
    pub witness: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CompleteRes {
    pub status: WorkflowStatusRes,
    /// The stored administration log.
    #[schema(value_type = Object)]
    pub log: serde_json::Value,
}
