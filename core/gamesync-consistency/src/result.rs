//! Check and repair outcomes.

use crate::rule::{ConsistencyViolation, Severity};
use gamesync_types::{GameState, Timestamp};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-rule evaluation figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleMetrics {
    pub rule_id: String,
    pub violations: usize,
    pub elapsed: Duration,
}

/// Aggregate figures for one check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyMetrics {
    pub rules_evaluated: usize,
    pub critical: usize,
    pub errors: usize,
    pub warnings: usize,
    pub infos: usize,
    pub fixable: usize,
    pub elapsed: Duration,
    /// Evaluation stopped at the violation cap.
    pub truncated: bool,
    /// Evaluation stopped at the time budget.
    pub timed_out: bool,
    pub rules: Vec<RuleMetrics>,
}

impl ConsistencyMetrics {
    pub fn total_violations(&self) -> usize {
        self.critical + self.errors + self.warnings + self.infos
    }

    pub(crate) fn count(&mut self, violation: &ConsistencyViolation) {
        match violation.severity {
            Severity::Critical => self.critical += 1,
            Severity::Error => self.errors += 1,
            Severity::Warning => self.warnings += 1,
            Severity::Info => self.infos += 1,
        }
        if violation.fixable {
            self.fixable += 1;
        }
    }
}

/// Outcome of a consistency check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyResult {
    /// No critical or error violations were found.
    pub is_valid: bool,
    pub violations: Vec<ConsistencyViolation>,
    pub metrics: ConsistencyMetrics,
    pub checked_at: Timestamp,
}

impl ConsistencyResult {
    pub fn fixable(&self) -> impl Iterator<Item = &ConsistencyViolation> {
        self.violations.iter().filter(|v| v.fixable)
    }

    pub fn at_severity(&self, severity: Severity) -> impl Iterator<Item = &ConsistencyViolation> {
        self.violations.iter().filter(move |v| v.severity == severity)
    }
}

/// Outcome of an auto-fix pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixResult {
    /// The repaired copy. The input snapshot is never modified.
    pub state: GameState,
    pub fixed: Vec<ConsistencyViolation>,
    pub remaining: Vec<ConsistencyViolation>,
    /// One message per failed fix attempt.
    pub errors: Vec<String>,
}

impl FixResult {
    pub fn all_fixed(&self) -> bool {
        self.remaining.is_empty()
    }
}
