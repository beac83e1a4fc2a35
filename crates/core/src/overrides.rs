//! Supervised overrides of failed rights.
//!
//! An override never hides the fact that a check failed. The failed rights are marked as passed so
//! the administration can proceed, and the record keeps the justification, which rights were
//! bypassed and when.

use crate::rights::{CheckMap, Right};
use bcma_types::NonEmptyText;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One accepted override call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideEntry {
    pub reason: NonEmptyText,
    /// Rights that were failing at the time of this call.
    pub rights: Vec<Right>,
    pub at: DateTime<Utc>,
}

/// Cumulative override evidence for one workflow run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideRecord {
    /// Justification given on the first override.
    pub justification: NonEmptyText,
    /// Every right overridden during the run, in the order first overridden.
    pub overridden: Vec<Right>,
    pub entries: Vec<OverrideEntry>,
}

impl OverrideRecord {
    pub fn is_overridden(&self, right: Right) -> bool {
        self.overridden.contains(&right)
    }

    pub fn audit_lines(&self) -> impl Iterator<Item = String> + '_ {
        self.entries.iter().map(|e| {
            let rights: Vec<&str> = e.rights.iter().map(Right::as_str).collect();
            format!("override: {}: {}", rights.join(", "), e.reason)
        })
    }
}

/// Flip every failed right in `checks` to passed and fold the call into `record`.
///
/// Returns the rights that were failing before the call. The caller guarantees at least one right
/// is failing.
pub(crate) fn apply_override(
    checks: &mut CheckMap,
    record: &mut Option<OverrideRecord>,
    reason: NonEmptyText,
    at: DateTime<Utc>,
) -> Vec<Right> {
    let failed = checks.failed();
    for right in &failed {
        checks.set(*right, true);
    }

    let entry = OverrideEntry {
        reason: reason.clone(),
        rights: failed.clone(),
        at,
    };

    match record {
        Some(existing) => {
            for right in &failed {
                if !existing.overridden.contains(right) {
                    existing.overridden.push(*right);
                }
            }
            existing.entries.push(entry);
        }
        None => {
            *record = Some(OverrideRecord {
                justification: reason,
                overridden: failed.clone(),
                entries: vec![entry],
            });
        }
    }

    failed
}
