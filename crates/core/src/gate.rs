//! Ancillary reading gates.
//!
//! Some medication categories may only be given once a measurement has been taken; insulin for a
//! diabetic patient needs a current blood glucose, for example. A [`ReadingGate`] names the
//! measurement, the categories it covers and the physiologically plausible range a value must
//! fall within before it is accepted.

use crate::constants::{
    DIABETIC_CATEGORY, GLUCOSE_GATE_NAME, GLUCOSE_MAX_MMOL_L, GLUCOSE_MIN_MMOL_L, GLUCOSE_UNIT,
};
use crate::error::{ConfigError, ConfigResult, WorkflowError, WorkflowResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq)]
pub struct ReadingGate {
    name: String,
    unit: String,
    categories: Vec<String>,
    min: f64,
    max: f64,
}

impl ReadingGate {
    pub fn new(
        name: impl Into<String>,
        unit: impl Into<String>,
        categories: Vec<String>,
        min: f64,
        max: f64,
    ) -> ConfigResult<Self> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(ConfigError::InvalidInput(
                "reading gate name cannot be empty".into(),
            ));
        }
        if !(min.is_finite() && max.is_finite()) || min > max {
            return Err(ConfigError::InvalidInput(format!(
                "reading gate {name} has invalid bounds {min}..={max}"
            )));
        }

        let categories: Vec<String> = categories
            .into_iter()
            .map(|c| c.trim().to_ascii_lowercase())
            .filter(|c| !c.is_empty())
            .collect();
        if categories.is_empty() {
            return Err(ConfigError::InvalidInput(format!(
                "reading gate {name} must cover at least one category"
            )));
        }

        Ok(Self {
            name,
            unit: unit.into(),
            categories,
            min,
            max,
        })
    }

    /// Blood glucose gate in mmol/L covering `categories`.
    pub fn glucose(categories: Vec<String>) -> ConfigResult<Self> {
        Self::new(
            GLUCOSE_GATE_NAME,
            GLUCOSE_UNIT,
            categories,
            GLUCOSE_MIN_MMOL_L,
            GLUCOSE_MAX_MMOL_L,
        )
    }

    pub fn default_glucose() -> Self {
        Self {
            name: GLUCOSE_GATE_NAME.into(),
            unit: GLUCOSE_UNIT.into(),
            categories: vec![DIABETIC_CATEGORY.into()],
            min: GLUCOSE_MIN_MMOL_L,
            max: GLUCOSE_MAX_MMOL_L,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn bounds(&self) -> (f64, f64) {
        (self.min, self.max)
    }

    pub fn applies_to(&self, category: &str) -> bool {
        let category = category.trim();
        self.categories
            .iter()
            .any(|c| c.eq_ignore_ascii_case(category))
    }

    /// Accept `value` if it lies within the gate's bounds.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::ReadingOutOfRange`] for out-of-range and non-finite values.
    pub fn accept(&self, value: f64, captured_at: DateTime<Utc>) -> WorkflowResult<ConditionalReading> {
        if !value.is_finite() || value < self.min || value > self.max {
            return Err(WorkflowError::ReadingOutOfRange {
                gate: self.name.clone(),
                value,
                min: self.min,
                max: self.max,
                unit: self.unit.clone(),
            });
        }

        Ok(ConditionalReading {
            gate: self.name.clone(),
            value,
            unit: self.unit.clone(),
            captured_at,
        })
    }
}

/// An accepted ancillary measurement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConditionalReading {
    pub gate: String,
    pub value: f64,
    pub unit: String,
    pub captured_at: DateTime<Utc>,
}
