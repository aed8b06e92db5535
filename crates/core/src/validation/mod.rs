//! Rule file validation.
//!
//! Turns raw rows into canonical [`RuleRecord`]s. The whole batch is rejected
//! at the first row with any violation; the error lists every violation found
//! in that row.

mod evaluator;
pub mod violation;

use std::collections::{HashMap, HashSet};
use std::fmt;

pub use evaluator::normalize_rule_id;
pub use violation::RuleViolation;

use crate::error::ValidationError;
use crate::rule_file::{read_rule_file, RawRuleRow};
use crate::rules::{RuleDuration, RuleMeasurement, RuleRecord, RuleType};
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Minimum duration configured for a rule type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinimumDuration {
    pub duration: u64,
    pub measurement: RuleMeasurement,
}

impl MinimumDuration {
    pub fn in_days(self) -> u64 {
        RuleDuration::Finite(self.duration).in_days(self.measurement)
    }

    /// Parse the `"<n> <UNIT>"` form, e.g. `"10 YEAR"`.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.split_whitespace();
        let duration = parts.next()?.parse().ok()?;
        let measurement = RuleMeasurement::from_name(parts.next()?)?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self {
            duration,
            measurement,
        })
    }
}

impl fmt::Display for MinimumDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.duration, self.measurement)
    }
}

/// Tenant-level validation settings beyond the fixed structural rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationPolicy {
    minimum_durations: HashMap<RuleType, MinimumDuration>,
}

impl ValidationPolicy {
    pub fn with_minimum(mut self, rule_type: RuleType, minimum: MinimumDuration) -> Self {
        self.minimum_durations.insert(rule_type, minimum);
        self
    }

    pub fn minimum_for(&self, rule_type: RuleType) -> Option<MinimumDuration> {
        self.minimum_durations.get(&rule_type).copied()
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Validate raw rows in file order, stamping accepted records with `now`.
pub fn validate_rules(
    rows: &[RawRuleRow],
    policy: &ValidationPolicy,
    now: Timestamp,
) -> Result<Vec<RuleRecord>, ValidationError> {
    let mut seen_ids = HashSet::with_capacity(rows.len());
    let mut records = Vec::with_capacity(rows.len());

    for row in rows {
        let checked = evaluator::evaluate_row(row, &mut seen_ids, policy).map_err(|violations| {
            ValidationError::InvalidRow {
                line: row.line,
                violations,
            }
        })?;
        records.push(RuleRecord {
            rule_id: checked.rule_id,
            rule_type: checked.rule_type,
            rule_value: checked.rule_value,
            rule_duration: checked.rule_duration,
            rule_measurement: checked.rule_measurement,
            rule_description: checked.rule_description,
            creation_date: now,
            update_date: now,
        });
    }

    Ok(records)
}

/// Read and validate a complete rule file.
pub fn validate_rule_file(
    content: &[u8],
    policy: &ValidationPolicy,
    now: Timestamp,
) -> Result<Vec<RuleRecord>, ValidationError> {
    let rows = read_rule_file(content)?;
    validate_rules(&rows, policy, now)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
