//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into workflows. Nothing in
//! the core reads process environment variables while a workflow is running; the binaries collect
//! values and hand them to [`BcmaConfig::from_env_lookup`].

use crate::constants::{
    DEFAULT_DEBOUNCE_MS, DEFAULT_EARLY_WINDOW_MINUTES, DEFAULT_LATE_WINDOW_MINUTES,
    DEFAULT_SCAN_TERMINATOR, DIABETIC_CATEGORY, MAX_WINDOW_MINUTES,
};
use crate::error::{ConfigError, ConfigResult};
use crate::gate::ReadingGate;
use chrono::{DateTime, Duration, Utc};

pub const ENV_EARLY_MINUTES: &str = "BCMA_EARLY_MINUTES";
pub const ENV_LATE_MINUTES: &str = "BCMA_LATE_MINUTES";
pub const ENV_DEBOUNCE_MS: &str = "BCMA_DEBOUNCE_MS";
pub const ENV_GLUCOSE_CATEGORIES: &str = "BCMA_GLUCOSE_CATEGORIES";

/// How far either side of the scheduled time a dose may be given.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeWindowPolicy {
    early: Duration,
    late: Duration,
}

impl TimeWindowPolicy {
    pub fn new(early: Duration, late: Duration) -> ConfigResult<Self> {
        if early < Duration::zero() || late < Duration::zero() {
            return Err(ConfigError::InvalidInput(
                "administration window bounds cannot be negative".into(),
            ));
        }
        let max = Duration::minutes(MAX_WINDOW_MINUTES);
        if early > max || late > max {
            return Err(ConfigError::InvalidInput(format!(
                "administration window bounds cannot exceed {MAX_WINDOW_MINUTES} minutes"
            )));
        }
        Ok(Self { early, late })
    }

    pub fn early(&self) -> Duration {
        self.early
    }

    pub fn late(&self) -> Duration {
        self.late
    }

    /// Inclusive `(start, end)` of the window around `scheduled`.
    ///
    /// `None` when either bound falls outside the representable time range; callers treat that
    /// as outside the window.
    pub fn window(&self, scheduled: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let start = scheduled.checked_sub_signed(self.early)?;
        let end = scheduled.checked_add_signed(self.late)?;
        Some((start, end))
    }
}

impl Default for TimeWindowPolicy {
    fn default() -> Self {
        Self {
            early: Duration::minutes(DEFAULT_EARLY_WINDOW_MINUTES),
            late: Duration::minutes(DEFAULT_LATE_WINDOW_MINUTES),
        }
    }
}

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct BcmaConfig {
    time_window: TimeWindowPolicy,
    gates: Vec<ReadingGate>,
    debounce: Duration,
    scan_terminator: char,
}

impl BcmaConfig {
    pub fn new(
        time_window: TimeWindowPolicy,
        gates: Vec<ReadingGate>,
        debounce: Duration,
        scan_terminator: char,
    ) -> ConfigResult<Self> {
        if debounce < Duration::zero() {
            return Err(ConfigError::InvalidInput(
                "debounce window cannot be negative".into(),
            ));
        }
        if scan_terminator == '\r' {
            // CR is always stripped from wedge input, so it can never end a scan.
            return Err(ConfigError::InvalidInput(
                "scan terminator cannot be a carriage return".into(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for gate in &gates {
            if !seen.insert(gate.name().to_ascii_lowercase()) {
                return Err(ConfigError::InvalidInput(format!(
                    "duplicate reading gate: {}",
                    gate.name()
                )));
            }
        }

        Ok(Self {
            time_window,
            gates,
            debounce,
            scan_terminator,
        })
    }

    /// Build a configuration from a key lookup, falling back to defaults for missing keys.
    ///
    /// Binaries pass `|k| std::env::var(k).ok()`; tests pass a map.
    pub fn from_env_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let early = window_minutes_from_env_value(
            ENV_EARLY_MINUTES,
            lookup(ENV_EARLY_MINUTES),
            DEFAULT_EARLY_WINDOW_MINUTES,
        )?;
        let late = window_minutes_from_env_value(
            ENV_LATE_MINUTES,
            lookup(ENV_LATE_MINUTES),
            DEFAULT_LATE_WINDOW_MINUTES,
        )?;
        let debounce_ms =
            i64_from_env_value(ENV_DEBOUNCE_MS, lookup(ENV_DEBOUNCE_MS), DEFAULT_DEBOUNCE_MS)?;
        let categories = categories_from_env_value(lookup(ENV_GLUCOSE_CATEGORIES));

        let time_window = TimeWindowPolicy::new(early, late)?;
        let gates = if categories.is_empty() {
            Vec::new()
        } else {
            vec![ReadingGate::glucose(categories)?]
        };

        Self::new(
            time_window,
            gates,
            Duration::milliseconds(debounce_ms),
            DEFAULT_SCAN_TERMINATOR,
        )
    }

    pub fn time_window(&self) -> TimeWindowPolicy {
        self.time_window
    }

    pub fn gates(&self) -> &[ReadingGate] {
        &self.gates
    }

    /// First configured gate covering `category`, if any.
    pub fn gate_for(&self, category: &str) -> Option<&ReadingGate> {
        self.gates.iter().find(|g| g.applies_to(category))
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    pub fn scan_terminator(&self) -> char {
        self.scan_terminator
    }
}

impl Default for BcmaConfig {
    fn default() -> Self {
        Self {
            time_window: TimeWindowPolicy::default(),
            gates: vec![ReadingGate::default_glucose()],
            debounce: Duration::milliseconds(DEFAULT_DEBOUNCE_MS),
            scan_terminator: DEFAULT_SCAN_TERMINATOR,
        }
    }
}

/// Parse an optional integer value, returning `default` when absent or blank.
pub fn i64_from_env_value(
    key: &'static str,
    value: Option<String>,
    default: i64,
) -> ConfigResult<i64> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    match value {
        None => Ok(default),
        Some(v) => v
            .parse::<i64>()
            .ok()
            .filter(|n| *n >= 0)
            .ok_or(ConfigError::InvalidValue { key, value: v }),
    }
}

/// Parse an optional window bound in minutes, rejecting anything above [`MAX_WINDOW_MINUTES`].
fn window_minutes_from_env_value(
    key: &'static str,
    value: Option<String>,
    default: i64,
) -> ConfigResult<Duration> {
    let minutes = i64_from_env_value(key, value, default)?;
    Duration::try_minutes(minutes)
        .filter(|d| *d <= Duration::minutes(MAX_WINDOW_MINUTES))
        .ok_or(ConfigError::InvalidValue {
            key,
            value: minutes.to_string(),
        })
}

/// Parse a comma-separated category list.
///
/// An absent value gives the default (`diabetic`); an explicitly empty value disables the gate.
pub fn categories_from_env_value(value: Option<String>) -> Vec<String> {
    match value {
        None => vec![DIABETIC_CATEGORY.to_string()],
        Some(v) => v
            .split(',')
            .map(|c| c.trim().to_ascii_lowercase())
            .filter(|c| !c.is_empty())
            .collect(),
    }
}
