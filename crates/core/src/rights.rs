//! Five-rights validation.
//!
//! The validator answers five independent yes/no questions about a pending administration:
//! right patient, right medication, right dose, right route, right time. There is no partial
//! credit; the administration is valid only when all five pass.

use crate::config::TimeWindowPolicy;
use crate::model::{MedicationRef, PatientRef};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One of the five rights.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Right {
    Patient,
    Medication,
    Dose,
    Route,
    Time,
}

impl Right {
    /// All rights in check order.
    pub const ALL: [Right; 5] = [
        Right::Patient,
        Right::Medication,
        Right::Dose,
        Right::Route,
        Right::Time,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Right::Patient => "patient",
            Right::Medication => "medication",
            Right::Dose => "dose",
            Right::Route => "route",
            Right::Time => "time",
        }
    }
}

impl std::fmt::Display for Right {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pass/fail outcome for each right.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckMap {
    pub patient: bool,
    pub medication: bool,
    pub dose: bool,
    pub route: bool,
    pub time: bool,
}

impl CheckMap {
    pub fn all_passed() -> Self {
        Self {
            patient: true,
            medication: true,
            dose: true,
            route: true,
            time: true,
        }
    }

    pub fn get(&self, right: Right) -> bool {
        match right {
            Right::Patient => self.patient,
            Right::Medication => self.medication,
            Right::Dose => self.dose,
            Right::Route => self.route,
            Right::Time => self.time,
        }
    }

    pub(crate) fn set(&mut self, right: Right, passed: bool) {
        let slot = match right {
            Right::Patient => &mut self.patient,
            Right::Medication => &mut self.medication,
            Right::Dose => &mut self.dose,
            Right::Route => &mut self.route,
            Right::Time => &mut self.time,
        };
        *slot = passed;
    }

    pub fn is_valid(&self) -> bool {
        Right::ALL.iter().all(|r| self.get(*r))
    }

    /// Failed rights in check order.
    pub fn failed(&self) -> Vec<Right> {
        Right::ALL
            .iter()
            .copied()
            .filter(|r| !self.get(*r))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Right, bool)> + '_ {
        Right::ALL.iter().map(move |r| (*r, self.get(*r)))
    }
}

/// Everything the validator looks at.
#[derive(Clone, Copy, Debug)]
pub struct RightsInput<'a> {
    pub scanned_patient_id: &'a str,
    pub scanned_medication_id: &'a str,
    pub patient: &'a PatientRef,
    pub medication: &'a MedicationRef,
    /// Route the dose is about to be given by.
    pub administering_route: &'a str,
}

/// Computes a [`CheckMap`] for a pending administration.
#[derive(Clone, Copy, Debug, Default)]
pub struct FiveRightsValidator {
    policy: TimeWindowPolicy,
}

impl FiveRightsValidator {
    pub fn new(policy: TimeWindowPolicy) -> Self {
        Self { policy }
    }

    pub fn validate(&self, input: &RightsInput<'_>, now: DateTime<Utc>) -> CheckMap {
        CheckMap {
            patient: input.scanned_patient_id == input.patient.id,
            medication: input.scanned_medication_id == input.medication.id,
            dose: dose_matches(input.medication),
            route: route_matches(input.administering_route, &input.medication.route),
            time: self.time_matches(input.medication, now),
        }
    }

    fn time_matches(&self, medication: &MedicationRef, now: DateTime<Utc>) -> bool {
        let Some((start, end)) = self.policy.window(medication.scheduled_time) else {
            return false;
        };
        if now < start || now > end {
            return false;
        }

        // A prior administration inside this window means this scheduled instance was already given.
        match medication.last_administered_at {
            Some(given) => !(given >= start && given <= now),
            None => true,
        }
    }
}

/// Recorded dose agrees with the ordered dose after normalisation.
fn dose_matches(medication: &MedicationRef) -> bool {
    match medication.ordered_dose.as_deref() {
        None => true,
        Some(ordered) => normalise_dose(ordered) == normalise_dose(&medication.dose),
    }
}

fn normalise_dose(dose: &str) -> String {
    dose.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

fn route_matches(administering: &str, ordered: &str) -> bool {
    administering.trim().eq_ignore_ascii_case(ordered.trim())
}
