//! Row-level rule violations and their stable report codes.

use crate::rules::{RuleMeasurement, RuleType};
use crate::validation::MinimumDuration;

/// A single reason a rule row was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleViolation {
    #[error("Missing mandatory field(s): {}", .fields.join(", "))]
    MissingInformation { fields: Vec<&'static str> },

    #[error("Invalid rule duration '{value}': expected 'unlimited' or a non-negative integer")]
    InvalidDuration { value: String },

    #[error("Rule with Id {rule_id} already exists")]
    DuplicateRuleId { rule_id: String },

    #[error("Unknown rule measurement '{value}'")]
    UnknownMeasurement { value: String },

    #[error("Unknown rule type '{value}'")]
    UnknownRuleType { value: String },

    #[error("Rule duration {duration} {measurement} exceeds the limit of {} {measurement}", .measurement.ceiling())]
    DurationExceedsLimit {
        duration: u64,
        measurement: RuleMeasurement,
    },

    #[error("Rule duration is below the minimum of {minimum} configured for {rule_type}")]
    DurationBelowMinimum {
        rule_type: RuleType,
        minimum: MinimumDuration,
    },
}

impl RuleViolation {
    /// Stable code used in import reports.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingInformation { .. } => "STP_IMPORT_RULES_MISSING_INFORMATION",
            Self::InvalidDuration { .. } => "STP_IMPORT_RULES_WRONG_RULEDURATION",
            Self::DuplicateRuleId { .. } => "STP_IMPORT_RULES_RULEID_DUPLICATION",
            Self::UnknownMeasurement { .. } => "STP_IMPORT_RULES_WRONG_RULEMEASUREMENT",
            Self::UnknownRuleType { .. } => "STP_IMPORT_RULES_WRONG_RULETYPE_UNKNOWN",
            Self::DurationExceedsLimit { .. } => "STP_IMPORT_RULES_WRONG_TOTALDURATION",
            Self::DurationBelowMinimum { .. } => "STP_IMPORT_RULES_RULEDURATION_EXCEED",
        }
    }

    /// The offending value, as shown next to the code in import reports.
    pub fn additional_information(&self) -> String {
        match self {
            Self::MissingInformation { fields } => fields.join(", "),
            Self::InvalidDuration { value }
            | Self::UnknownMeasurement { value }
            | Self::UnknownRuleType { value } => value.clone(),
            Self::DuplicateRuleId { rule_id } => rule_id.clone(),
            Self::DurationExceedsLimit {
                duration,
                measurement,
            } => format!("{duration} {measurement}"),
            Self::DurationBelowMinimum { rule_type, minimum } => format!("{rule_type} {minimum}"),
        }
    }
}
