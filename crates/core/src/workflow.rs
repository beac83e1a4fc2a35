//! Verification state machine.
//!
//! A [`Workflow`] walks one medication pass through four states:
//!
//! ```text
//! AwaitingPatientScan ──patient──▶ AwaitingMedicationScan ──medication──▶ Verifying ──complete──▶ Complete
//! ```
//!
//! State lives in a single tagged union, so a stored medication id cannot exist before a patient
//! has been scanned and a log cannot exist before completion. Each variant owns exactly the data
//! captured up to that point.
//!
//! | State                   | Accepts                                   | Rejects                          |
//! |-------------------------|-------------------------------------------|----------------------------------|
//! | AwaitingPatientScan     | patient scan                              | medication, unknown scans        |
//! | AwaitingMedicationScan  | medication scan, same-patient re-scan     | other patient, unknown scans     |
//! | Verifying               | override, reading, revalidate, complete   | (scans are ignored)              |
//! | Complete                | nothing                                   | everything except scans (ignored)|
//!
//! Cancelling is done by dropping the workflow. Nothing from one instance is reused by another.

use crate::barcode::BarcodeKind;
use crate::clock::Clock;
use crate::config::BcmaConfig;
use crate::dispatcher::{ScanDispatcher, ScanSubscription};
use crate::error::{WorkflowError, WorkflowResult};
use crate::gate::{ConditionalReading, ReadingGate};
use crate::model::{MedicationRef, PatientRef, ScanEvent, ScanSource};
use crate::overrides::{apply_override, OverrideRecord};
use crate::record::{AdministrationLog, CompletionDetails};
use crate::rights::{CheckMap, FiveRightsValidator, Right, RightsInput};
use crate::store::AdministrationStore;
use bcma_types::NonEmptyText;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Everything the caller supplies when starting a medication pass.
#[derive(Clone, Debug)]
pub struct WorkflowContext {
    pub patient: PatientRef,
    pub medication: MedicationRef,
    /// Clinician performing the administration.
    pub operator: NonEmptyText,
    /// Route the dose will be given by. Defaults to the medication's ordered route.
    pub administering_route: Option<String>,
}

impl WorkflowContext {
    pub fn new(patient: PatientRef, medication: MedicationRef, operator: NonEmptyText) -> Self {
        Self {
            patient,
            medication,
            operator,
            administering_route: None,
        }
    }

    pub fn with_administering_route(mut self, route: impl Into<String>) -> Self {
        self.administering_route = Some(route.into());
        self
    }

    fn administering_route(&self) -> &str {
        self.administering_route
            .as_deref()
            .unwrap_or(&self.medication.route)
    }
}

/// Name of a workflow state, for diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateName {
    AwaitingPatientScan,
    AwaitingMedicationScan,
    Verifying,
    Complete,
}

impl StateName {
    /// Snake-case name, matching the serialised form.
    pub fn as_str(&self) -> &'static str {
        match self {
            StateName::AwaitingPatientScan => "awaiting_patient_scan",
            StateName::AwaitingMedicationScan => "awaiting_medication_scan",
            StateName::Verifying => "verifying",
            StateName::Complete => "complete",
        }
    }
}

impl std::fmt::Display for StateName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StateName::AwaitingPatientScan => "awaiting patient scan",
            StateName::AwaitingMedicationScan => "awaiting medication scan",
            StateName::Verifying => "verifying",
            StateName::Complete => "complete",
        };
        f.write_str(s)
    }
}

/// Data captured once both barcodes have been scanned.
#[derive(Clone, Debug)]
pub struct Verification {
    record_id: Uuid,
    scanned_patient_id: String,
    scanned_medication_id: String,
    checks: CheckMap,
    override_record: Option<OverrideRecord>,
    reading: Option<ConditionalReading>,
}

impl Verification {
    pub fn scanned_patient_id(&self) -> &str {
        &self.scanned_patient_id
    }

    pub fn scanned_medication_id(&self) -> &str {
        &self.scanned_medication_id
    }

    pub fn checks(&self) -> &CheckMap {
        &self.checks
    }

    pub fn override_record(&self) -> Option<&OverrideRecord> {
        self.override_record.as_ref()
    }

    pub fn reading(&self) -> Option<&ConditionalReading> {
        self.reading.as_ref()
    }
}

#[derive(Clone, Debug)]
enum VerificationState {
    AwaitingPatientScan,
    AwaitingMedicationScan { patient_id: String },
    Verifying(Verification),
    Complete(Box<AdministrationLog>),
}

impl VerificationState {
    fn name(&self) -> StateName {
        match self {
            VerificationState::AwaitingPatientScan => StateName::AwaitingPatientScan,
            VerificationState::AwaitingMedicationScan { .. } => StateName::AwaitingMedicationScan,
            VerificationState::Verifying(_) => StateName::Verifying,
            VerificationState::Complete(_) => StateName::Complete,
        }
    }
}

/// Result of handing a scan to the workflow.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScanOutcome {
    PatientAccepted,
    /// The medication was accepted and the five rights were checked.
    MedicationAccepted { checks: CheckMap },
    /// A repeat of the patient already scanned; nothing changed.
    DuplicateIgnored,
    /// The workflow is not taking scans in its current state.
    Ignored,
}

/// One BCMA verification run.
pub struct Workflow {
    context: WorkflowContext,
    config: Arc<BcmaConfig>,
    clock: Arc<dyn Clock>,
    subscription: Option<ScanSubscription>,
    state: VerificationState,
}

impl Workflow {
    pub fn new(context: WorkflowContext, config: Arc<BcmaConfig>, clock: Arc<dyn Clock>) -> Self {
        info!(
            patient = %context.patient.id,
            medication = %context.medication.id,
            operator = %context.operator,
            "verification workflow started"
        );
        Self {
            context,
            config,
            clock,
            subscription: None,
            state: VerificationState::AwaitingPatientScan,
        }
    }

    /// Create a workflow that receives scans from `dispatcher`.
    pub fn with_dispatcher(
        context: WorkflowContext,
        config: Arc<BcmaConfig>,
        clock: Arc<dyn Clock>,
        dispatcher: &mut ScanDispatcher,
    ) -> Self {
        let mut workflow = Self::new(context, config, clock);
        workflow.listen(dispatcher);
        workflow
    }

    /// Become the dispatcher's current listener.
    pub fn listen(&mut self, dispatcher: &mut ScanDispatcher) {
        self.subscription = Some(dispatcher.subscribe());
    }

    /// Process every scan queued on the subscription, in arrival order.
    pub fn pump(&mut self) -> Vec<WorkflowResult<ScanOutcome>> {
        let mut results = Vec::new();
        while let Some(event) = self.subscription.as_mut().and_then(ScanSubscription::try_next) {
            results.push(self.handle_scan(event));
        }
        results
    }

    /// Typed fallback for a barcode that will not scan. Classified exactly like a scan.
    pub fn manual_entry(&mut self, text: &str) -> WorkflowResult<ScanOutcome> {
        let event = ScanEvent::new(text, ScanSource::Manual, self.clock.now());
        self.handle_scan(event)
    }

    /// Apply one scan to the state machine.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::UnknownBarcodeFormat`] for unrecognised codes while a scan is expected.
    /// - [`WorkflowError::WrongBarcodeType`] for a scan of the other family.
    ///
    /// The state is unchanged whenever an error is returned.
    pub fn handle_scan(&mut self, event: ScanEvent) -> WorkflowResult<ScanOutcome> {
        let kind = event.kind();

        match &self.state {
            VerificationState::AwaitingPatientScan => match kind {
                BarcodeKind::Patient => {
                    info!(patient = event.value(), source = ?event.source, "patient scan accepted");
                    self.state = VerificationState::AwaitingMedicationScan {
                        patient_id: event.barcode.value,
                    };
                    Ok(ScanOutcome::PatientAccepted)
                }
                BarcodeKind::Medication => Err(reject(BarcodeKind::Patient, &event)),
                BarcodeKind::Unknown => Err(reject_unknown(&event)),
            },

            VerificationState::AwaitingMedicationScan { patient_id } => match kind {
                BarcodeKind::Medication => {
                    let patient_id = patient_id.clone();
                    let medication_id = event.barcode.value;
                    let checks = self.compute_checks(&patient_id, &medication_id);

                    if checks.is_valid() {
                        info!(medication = %medication_id, "medication scan accepted; all rights pass");
                    } else {
                        warn!(
                            medication = %medication_id,
                            failed = ?checks.failed(),
                            "medication scan accepted; rights failing"
                        );
                    }

                    self.state = VerificationState::Verifying(Verification {
                        record_id: Uuid::new_v4(),
                        scanned_patient_id: patient_id,
                        scanned_medication_id: medication_id,
                        checks,
                        override_record: None,
                        reading: None,
                    });
                    Ok(ScanOutcome::MedicationAccepted { checks })
                }
                BarcodeKind::Patient if event.value() == patient_id => {
                    debug!(patient = event.value(), "duplicate patient scan ignored");
                    Ok(ScanOutcome::DuplicateIgnored)
                }
                BarcodeKind::Patient => Err(reject(BarcodeKind::Medication, &event)),
                BarcodeKind::Unknown => Err(reject_unknown(&event)),
            },

            VerificationState::Verifying(_) | VerificationState::Complete(_) => {
                debug!(value = event.value(), state = %self.state.name(), "scan ignored");
                Ok(ScanOutcome::Ignored)
            }
        }
    }

    /// Supervised bypass of every currently failing right.
    ///
    /// Returns the rights that were failing immediately before the call.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::NothingToOverride`] if all rights already pass.
    /// - [`WorkflowError::MissingJustification`] if `justification` is blank.
    ///
    /// Nothing changes when an error is returned.
    pub fn override_checks(&mut self, justification: &str) -> WorkflowResult<Vec<Right>> {
        let now = self.clock.now();
        let verification = self.verification_mut("override")?;

        if verification.checks.is_valid() {
            return Err(WorkflowError::NothingToOverride);
        }
        let reason =
            NonEmptyText::new(justification).map_err(|_| WorkflowError::MissingJustification)?;

        let flipped = apply_override(
            &mut verification.checks,
            &mut verification.override_record,
            reason,
            now,
        );
        warn!(overridden = ?flipped, reason = justification.trim(), "five-rights override applied");
        Ok(flipped)
    }

    /// Record the ancillary reading the medication's category requires.
    ///
    /// A new reading replaces any earlier one.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::ReadingNotApplicable`] if no gate covers the medication's category.
    /// - [`WorkflowError::ReadingOutOfRange`] if the value falls outside the gate's bounds. The
    ///   value is not stored and any earlier reading is kept.
    pub fn record_reading(
        &mut self,
        value: f64,
        captured_at: DateTime<Utc>,
    ) -> WorkflowResult<ConditionalReading> {
        let state = self.state.name();
        let category = &self.context.medication.category;
        let gate = self.config.gate_for(category);

        let verification = match &mut self.state {
            VerificationState::Verifying(v) => v,
            VerificationState::Complete(_) => return Err(WorkflowError::WorkflowComplete),
            _ => {
                return Err(WorkflowError::InvalidState {
                    operation: "reading entry",
                    state,
                })
            }
        };

        let gate = gate.ok_or_else(|| WorkflowError::ReadingNotApplicable {
            category: category.clone(),
        })?;

        let reading = gate.accept(value, captured_at).inspect_err(|_| {
            warn!(gate = gate.name(), value, "reading rejected as out of range");
        })?;

        if verification.reading.is_some() {
            info!(gate = gate.name(), value, "reading replaced");
        } else {
            info!(gate = gate.name(), value, "reading recorded");
        }
        verification.reading = Some(reading.clone());
        Ok(reading)
    }

    /// Recompute the five rights at the current time.
    ///
    /// Rights that have already been overridden stay passed; any newly failing right can then be
    /// overridden in turn.
    pub fn revalidate(&mut self) -> WorkflowResult<CheckMap> {
        let state = self.state.name();
        let now = self.clock.now();
        let validator = FiveRightsValidator::new(self.config.time_window());
        let context = &self.context;

        match &mut self.state {
            VerificationState::Verifying(v) => {
                let input = RightsInput {
                    scanned_patient_id: &v.scanned_patient_id,
                    scanned_medication_id: &v.scanned_medication_id,
                    patient: &context.patient,
                    medication: &context.medication,
                    administering_route: context.administering_route(),
                };
                let mut checks = validator.validate(&input, now);
                if let Some(record) = &v.override_record {
                    for right in &record.overridden {
                        checks.set(*right, true);
                    }
                }
                if checks != v.checks {
                    info!(failed = ?checks.failed(), "revalidation changed five-rights outcome");
                }
                v.checks = checks;
                Ok(checks)
            }
            VerificationState::Complete(_) => Err(WorkflowError::WorkflowComplete),
            _ => Err(WorkflowError::InvalidState {
                operation: "revalidate",
                state,
            }),
        }
    }

    /// Build the administration log and hand it to `store`.
    ///
    /// The workflow moves to `Complete` only once the store acknowledges the write. On any error
    /// the workflow stays in `Verifying` with everything captured so far, so the caller can fix
    /// the problem (or retry the store) without re-scanning.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::ValidationFailed`] if any right is failing.
    /// - [`WorkflowError::ReadingRequired`] if the category's gate has no reading.
    /// - [`WorkflowError::MissingVerifier`] if the verifier name is blank.
    /// - [`WorkflowError::PersistenceFailure`] if the store rejected the write.
    pub fn complete(
        &mut self,
        details: CompletionDetails,
        store: &dyn AdministrationStore,
    ) -> WorkflowResult<AdministrationLog> {
        let now = self.clock.now();
        let gate = self
            .config
            .gate_for(&self.context.medication.category)
            .map(|g| g.name().to_string());
        let context = self.context.clone();
        let verification = self.verification_mut("complete")?;

        let failed = verification.checks.failed();
        if !failed.is_empty() {
            return Err(WorkflowError::ValidationFailed { failed });
        }
        if let Some(gate) = gate {
            if verification.reading.is_none() {
                return Err(WorkflowError::ReadingRequired { gate });
            }
        }
        let verifier =
            NonEmptyText::new(&details.verifier).map_err(|_| WorkflowError::MissingVerifier)?;

        let warnings: Vec<String> = verification
            .override_record
            .as_ref()
            .map(|r| r.audit_lines().collect())
            .unwrap_or_default();

        let log = AdministrationLog {
            id: verification.record_id,
            patient_id: context.patient.id,
            medication_id: context.medication.id,
            scanned_patient_id: verification.scanned_patient_id.clone(),
            scanned_medication_id: verification.scanned_medication_id.clone(),
            checks: verification.checks,
            override_record: verification.override_record.clone(),
            reading: verification.reading.clone(),
            notes: NonEmptyText::optional(details.notes),
            warnings,
            operator: context.operator,
            verifier,
            witness: NonEmptyText::optional(details.witness),
            completed_at: now,
        };

        if let Err(e) = store.persist(&log) {
            warn!(record = %log.id, error = %e, "administration log not persisted; still verifying");
            return Err(WorkflowError::PersistenceFailure(e));
        }

        info!(
            record = %log.id,
            overridden = log.was_overridden(),
            "administration recorded"
        );
        self.state = VerificationState::Complete(Box::new(log.clone()));
        Ok(log)
    }

    pub fn state_name(&self) -> StateName {
        self.state.name()
    }

    pub fn context(&self) -> &WorkflowContext {
        &self.context
    }

    pub fn scanned_patient_id(&self) -> Option<&str> {
        match &self.state {
            VerificationState::AwaitingPatientScan => None,
            VerificationState::AwaitingMedicationScan { patient_id } => Some(patient_id.as_str()),
            VerificationState::Verifying(v) => Some(v.scanned_patient_id.as_str()),
            VerificationState::Complete(log) => Some(log.scanned_patient_id.as_str()),
        }
    }

    pub fn verification(&self) -> Option<&Verification> {
        match &self.state {
            VerificationState::Verifying(v) => Some(v),
            _ => None,
        }
    }

    pub fn checks(&self) -> Option<&CheckMap> {
        match &self.state {
            VerificationState::Verifying(v) => Some(&v.checks),
            VerificationState::Complete(log) => Some(&log.checks),
            _ => None,
        }
    }

    /// `true` once every right passes, directly or by override.
    pub fn is_valid(&self) -> bool {
        self.checks().is_some_and(CheckMap::is_valid)
    }

    pub fn override_record(&self) -> Option<&OverrideRecord> {
        match &self.state {
            VerificationState::Verifying(v) => v.override_record.as_ref(),
            VerificationState::Complete(log) => log.override_record.as_ref(),
            _ => None,
        }
    }

    pub fn reading(&self) -> Option<&ConditionalReading> {
        match &self.state {
            VerificationState::Verifying(v) => v.reading.as_ref(),
            VerificationState::Complete(log) => log.reading.as_ref(),
            _ => None,
        }
    }

    /// The gate still blocking completion, if any.
    pub fn pending_gate(&self) -> Option<&ReadingGate> {
        if matches!(self.state, VerificationState::Complete(_)) || self.reading().is_some() {
            return None;
        }
        self.config.gate_for(&self.context.medication.category)
    }

    pub fn log(&self) -> Option<&AdministrationLog> {
        match &self.state {
            VerificationState::Complete(log) => Some(log.as_ref()),
            _ => None,
        }
    }

    fn compute_checks(&self, scanned_patient_id: &str, scanned_medication_id: &str) -> CheckMap {
        let input = RightsInput {
            scanned_patient_id,
            scanned_medication_id,
            patient: &self.context.patient,
            medication: &self.context.medication,
            administering_route: self.context.administering_route(),
        };
        FiveRightsValidator::new(self.config.time_window()).validate(&input, self.clock.now())
    }

    fn verification_mut(&mut self, operation: &'static str) -> WorkflowResult<&mut Verification> {
        match &mut self.state {
            VerificationState::Verifying(v) => Ok(v),
            VerificationState::Complete(_) => Err(WorkflowError::WorkflowComplete),
            other => Err(WorkflowError::InvalidState {
                operation,
                state: other.name(),
            }),
        }
    }
}

fn reject(expected: BarcodeKind, event: &ScanEvent) -> WorkflowError {
    warn!(
        expected = %expected,
        found = %event.kind(),
        value = event.value(),
        "scan rejected: wrong barcode type"
    );
    WorkflowError::WrongBarcodeType {
        expected,
        found: event.kind(),
    }
}

fn reject_unknown(event: &ScanEvent) -> WorkflowError {
    warn!(value = event.value(), "scan rejected: unknown barcode format");
    WorkflowError::UnknownBarcodeFormat(event.value().to_string())
}
