//! Per-row checks, pure logic.

use std::collections::HashSet;

use super::violation::RuleViolation;
use super::ValidationPolicy;
use crate::rule_file::RawRuleRow;
use crate::rules::{columns, RuleDuration, RuleMeasurement, RuleType};

/// A row that passed every check, not yet stamped with dates.
#[derive(Debug, Clone)]
pub(crate) struct CheckedRow {
    pub rule_id: String,
    pub rule_type: RuleType,
    pub rule_value: String,
    pub rule_duration: RuleDuration,
    pub rule_measurement: RuleMeasurement,
    pub rule_description: String,
}

/// Trim and strip quote characters from a rule identifier.
pub fn normalize_rule_id(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| !matches!(c, '"' | '\''))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Run every check against one row, collecting all violations found.
///
/// `seen_ids` accumulates normalized identifiers across the batch so that
/// later duplicates are reported.
pub(crate) fn evaluate_row(
    row: &RawRuleRow,
    seen_ids: &mut HashSet<String>,
    policy: &ValidationPolicy,
) -> Result<CheckedRow, Vec<RuleViolation>> {
    let mut violations = Vec::new();

    let rule_id = row.rule_id.as_deref().map(normalize_rule_id).unwrap_or_default();
    let rule_type_raw = non_empty(&row.rule_type);
    let rule_value = non_empty(&row.rule_value);
    let duration_raw = non_empty(&row.rule_duration);
    let measurement_raw = non_empty(&row.rule_measurement);

    let mut missing = Vec::new();
    if rule_id.is_empty() {
        missing.push(columns::RULE_ID);
    }
    if rule_type_raw.is_none() {
        missing.push(columns::RULE_TYPE);
    }
    if rule_value.is_none() {
        missing.push(columns::RULE_VALUE);
    }
    if duration_raw.is_none() {
        missing.push(columns::RULE_DURATION);
    }
    if row.rule_description.is_none() {
        missing.push(columns::RULE_DESCRIPTION);
    }
    if measurement_raw.is_none() {
        missing.push(columns::RULE_MEASUREMENT);
    }
    if !missing.is_empty() {
        violations.push(RuleViolation::MissingInformation { fields: missing });
    }

    let duration = duration_raw.and_then(|raw| {
        let parsed = RuleDuration::parse(raw);
        if parsed.is_none() {
            violations.push(RuleViolation::InvalidDuration {
                value: raw.to_string(),
            });
        }
        parsed
    });

    if !rule_id.is_empty() && !seen_ids.insert(rule_id.clone()) {
        violations.push(RuleViolation::DuplicateRuleId {
            rule_id: rule_id.clone(),
        });
    }

    let measurement = measurement_raw.and_then(|raw| {
        let parsed = RuleMeasurement::from_name(raw);
        if parsed.is_none() {
            violations.push(RuleViolation::UnknownMeasurement {
                value: raw.to_string(),
            });
        }
        parsed
    });

    let rule_type = rule_type_raw.and_then(|raw| {
        let parsed = RuleType::from_name(raw);
        if parsed.is_none() {
            violations.push(RuleViolation::UnknownRuleType {
                value: raw.to_string(),
            });
        }
        parsed
    });

    if let (Some(duration), Some(measurement)) = (duration, measurement) {
        let within_ceiling = match duration {
            RuleDuration::Finite(n) if n > measurement.ceiling() => {
                violations.push(RuleViolation::DurationExceedsLimit {
                    duration: n,
                    measurement,
                });
                false
            }
            _ => true,
        };

        if within_ceiling {
            if let Some(rule_type) = rule_type {
                if let Some(minimum) = policy.minimum_for(rule_type) {
                    if duration.in_days(measurement) < minimum.in_days() {
                        violations.push(RuleViolation::DurationBelowMinimum { rule_type, minimum });
                    }
                }
            }
        }
    }

    match (violations.is_empty(), rule_type, rule_value, duration, measurement) {
        (true, Some(rule_type), Some(rule_value), Some(rule_duration), Some(rule_measurement)) => {
            Ok(CheckedRow {
                rule_id,
                rule_type,
                rule_value: rule_value.to_string(),
                rule_duration,
                rule_measurement,
                rule_description: row.rule_description.clone().unwrap_or_default(),
            })
        }
        _ => Err(violations),
    }
}

fn non_empty(cell: &Option<String>) -> Option<&str> {
    cell.as_deref().map(str::trim).filter(|s| !s.is_empty())
}
