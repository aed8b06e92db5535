//! Row model for the `rules` table.

use rulesref_core::rules::{RuleDuration, RuleMeasurement, RuleRecord, RuleType};
use rulesref_core::types::{DbId, TenantId, Timestamp};
use sqlx::FromRow;

/// A stored rule. Enumerations are kept as their canonical strings.
#[derive(Debug, Clone, FromRow)]
pub struct RuleRow {
    pub id: DbId,
    pub tenant: TenantId,
    pub rule_id: String,
    pub rule_type: String,
    pub rule_value: String,
    pub rule_duration: String,
    pub rule_measurement: String,
    pub rule_description: String,
    pub creation_date: Timestamp,
    pub update_date: Timestamp,
}

/// A stored value that no longer parses into the domain model.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("rule {rule_id} has invalid {column} '{value}'")]
pub struct CorruptRow {
    pub rule_id: String,
    pub column: &'static str,
    pub value: String,
}

impl TryFrom<RuleRow> for RuleRecord {
    type Error = CorruptRow;

    fn try_from(row: RuleRow) -> Result<Self, Self::Error> {
        let corrupt = |column: &'static str, value: &str| CorruptRow {
            rule_id: row.rule_id.clone(),
            column,
            value: value.to_string(),
        };
        let rule_type =
            RuleType::from_name(&row.rule_type).ok_or_else(|| corrupt("rule_type", &row.rule_type))?;
        let rule_duration = RuleDuration::parse(&row.rule_duration)
            .ok_or_else(|| corrupt("rule_duration", &row.rule_duration))?;
        let rule_measurement = RuleMeasurement::from_name(&row.rule_measurement)
            .ok_or_else(|| corrupt("rule_measurement", &row.rule_measurement))?;

        Ok(RuleRecord {
            rule_id: row.rule_id,
            rule_type,
            rule_value: row.rule_value,
            rule_duration,
            rule_measurement,
            rule_description: row.rule_description,
            creation_date: row.creation_date,
            update_date: row.update_date,
        })
    }
}
