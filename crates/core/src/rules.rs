//! Rule referential model: rule records and their fixed enumerations.
//!
//! Enumeration lookups are case-insensitive and backed by a lowercase-keyed
//! map built once per process.

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Column names
// ---------------------------------------------------------------------------

/// Column names of the tabular rule file, in canonical order.
pub mod columns {
    pub const RULE_ID: &str = "RuleId";
    pub const RULE_TYPE: &str = "RuleType";
    pub const RULE_VALUE: &str = "RuleValue";
    pub const RULE_DURATION: &str = "RuleDuration";
    pub const RULE_DESCRIPTION: &str = "RuleDescription";
    pub const RULE_MEASUREMENT: &str = "RuleMeasurement";

    /// Every column a rule file must declare in its header.
    pub const ALL: &[&str] = &[
        RULE_ID,
        RULE_TYPE,
        RULE_VALUE,
        RULE_DURATION,
        RULE_DESCRIPTION,
        RULE_MEASUREMENT,
    ];
}

// ---------------------------------------------------------------------------
// Ceilings
// ---------------------------------------------------------------------------

/// Maximum duration expressed in years.
pub const YEAR_LIMIT: u64 = 999;

/// Maximum duration expressed in months.
pub const MONTH_LIMIT: u64 = YEAR_LIMIT * 12;

/// Maximum duration expressed in days.
pub const DAY_LIMIT: u64 = MONTH_LIMIT * 30;

/// Sentinel accepted (case-insensitive) in place of a numeric duration.
pub const UNLIMITED: &str = "unlimited";

// ---------------------------------------------------------------------------
// RuleType
// ---------------------------------------------------------------------------

/// Category of a retention rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RuleType {
    AppraisalRule,
    AccessRule,
    StorageRule,
    DisseminationRule,
    ClassificationRule,
    ReuseRule,
    HoldRule,
}

impl RuleType {
    pub const ALL: [RuleType; 7] = [
        Self::AppraisalRule,
        Self::AccessRule,
        Self::StorageRule,
        Self::DisseminationRule,
        Self::ClassificationRule,
        Self::ReuseRule,
        Self::HoldRule,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::AppraisalRule => "AppraisalRule",
            Self::AccessRule => "AccessRule",
            Self::StorageRule => "StorageRule",
            Self::DisseminationRule => "DisseminationRule",
            Self::ClassificationRule => "ClassificationRule",
            Self::ReuseRule => "ReuseRule",
            Self::HoldRule => "HoldRule",
        }
    }

    /// Case-insensitive lookup. Returns `None` for unknown names.
    pub fn from_name(name: &str) -> Option<Self> {
        static BY_NAME: LazyLock<HashMap<String, RuleType>> = LazyLock::new(|| {
            RuleType::ALL
                .iter()
                .map(|t| (t.as_str().to_lowercase(), *t))
                .collect()
        });
        BY_NAME.get(&name.trim().to_lowercase()).copied()
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// RuleMeasurement
// ---------------------------------------------------------------------------

/// Unit in which a rule duration is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleMeasurement {
    Day,
    Month,
    Year,
}

impl RuleMeasurement {
    pub const ALL: [RuleMeasurement; 3] = [Self::Day, Self::Month, Self::Year];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Day => "DAY",
            Self::Month => "MONTH",
            Self::Year => "YEAR",
        }
    }

    /// Case-insensitive lookup. Returns `None` for unknown names.
    pub fn from_name(name: &str) -> Option<Self> {
        static BY_NAME: LazyLock<HashMap<String, RuleMeasurement>> = LazyLock::new(|| {
            RuleMeasurement::ALL
                .iter()
                .map(|m| (m.as_str().to_lowercase(), *m))
                .collect()
        });
        BY_NAME.get(&name.trim().to_lowercase()).copied()
    }

    /// Largest numeric duration accepted for this unit.
    ///
    /// Bounded so that downstream date arithmetic cannot overflow.
    pub fn ceiling(self) -> u64 {
        match self {
            Self::Year => YEAR_LIMIT,
            Self::Month => MONTH_LIMIT,
            Self::Day => DAY_LIMIT,
        }
    }

    /// Approximate number of days in one unit (used for minimum-duration checks).
    pub fn days_per_unit(self) -> u64 {
        match self {
            Self::Year => 365,
            Self::Month => 30,
            Self::Day => 1,
        }
    }
}

impl fmt::Display for RuleMeasurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// RuleDuration
// ---------------------------------------------------------------------------

/// Either the `unlimited` sentinel or a non-negative count of measurement units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleDuration {
    Unlimited,
    Finite(u64),
}

impl RuleDuration {
    /// Parse a raw duration cell. `None` if it is neither `unlimited`
    /// (any casing) nor a non-negative integer.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case(UNLIMITED) {
            return Some(Self::Unlimited);
        }
        if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        raw.parse::<u64>().ok().map(Self::Finite)
    }

    /// Duration in days, saturating at `u64::MAX` for `unlimited`.
    pub fn in_days(self, measurement: RuleMeasurement) -> u64 {
        match self {
            Self::Unlimited => u64::MAX,
            Self::Finite(n) => n.saturating_mul(measurement.days_per_unit()),
        }
    }
}

impl fmt::Display for RuleDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unlimited => f.write_str(UNLIMITED),
            Self::Finite(n) => write!(f, "{n}"),
        }
    }
}

// Rule enums travel as their canonical strings in JSON and in the rule file.
macro_rules! string_serde {
    ($ty:ty, $parse:expr, $what:literal) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                $parse(&raw).ok_or_else(|| {
                    serde::de::Error::custom(format!(concat!("unknown ", $what, " '{}'"), raw))
                })
            }
        }
    };
}

string_serde!(RuleType, RuleType::from_name, "rule type");
string_serde!(RuleMeasurement, RuleMeasurement::from_name, "rule measurement");
string_serde!(RuleDuration, RuleDuration::parse, "rule duration");

// ---------------------------------------------------------------------------
// RuleRecord
// ---------------------------------------------------------------------------

/// One retention rule of the referential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RuleRecord {
    pub rule_id: String,
    pub rule_type: RuleType,
    pub rule_value: String,
    pub rule_duration: RuleDuration,
    pub rule_measurement: RuleMeasurement,
    pub rule_description: String,
    pub creation_date: Timestamp,
    pub update_date: Timestamp,
}

impl RuleRecord {
    /// Field-for-field equality on the imported fields, ignoring the
    /// system-assigned dates.
    pub fn same_content(&self, other: &RuleRecord) -> bool {
        self.rule_id == other.rule_id
            && self.rule_type == other.rule_type
            && self.rule_value == other.rule_value
            && self.rule_duration == other.rule_duration
            && self.rule_measurement == other.rule_measurement
            && self.rule_description == other.rule_description
    }

    /// Whether moving from `current` to `self` changes previously computed
    /// disposal dates (duration or measurement differ).
    pub fn is_unsafe_change_from(&self, current: &RuleRecord) -> bool {
        self.rule_duration != current.rule_duration
            || self.rule_measurement != current.rule_measurement
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_type_lookup_is_case_insensitive() {
        assert_eq!(RuleType::from_name("reuserule"), Some(RuleType::ReuseRule));
        assert_eq!(RuleType::from_name("APPRAISALRULE"), Some(RuleType::AppraisalRule));
        assert_eq!(RuleType::from_name(" HoldRule "), Some(RuleType::HoldRule));
        assert_eq!(RuleType::from_name("DestructionRule"), None);
    }

    #[test]
    fn measurement_lookup_is_case_insensitive() {
        assert_eq!(RuleMeasurement::from_name("year"), Some(RuleMeasurement::Year));
        assert_eq!(RuleMeasurement::from_name("Month"), Some(RuleMeasurement::Month));
        assert_eq!(RuleMeasurement::from_name("WEEK"), None);
    }

    #[test]
    fn ceilings_follow_measurement() {
        assert_eq!(RuleMeasurement::Year.ceiling(), 999);
        assert_eq!(RuleMeasurement::Month.ceiling(), 11_988);
        assert_eq!(RuleMeasurement::Day.ceiling(), 359_640);
    }

    #[test]
    fn duration_parsing() {
        assert_eq!(RuleDuration::parse("unlimited"), Some(RuleDuration::Unlimited));
        assert_eq!(RuleDuration::parse("UNLIMITED"), Some(RuleDuration::Unlimited));
        assert_eq!(RuleDuration::parse("0"), Some(RuleDuration::Finite(0)));
        assert_eq!(RuleDuration::parse("42"), Some(RuleDuration::Finite(42)));
        assert_eq!(RuleDuration::parse("-1"), None);
        assert_eq!(RuleDuration::parse("+3"), None);
        assert_eq!(RuleDuration::parse("3.5"), None);
        assert_eq!(RuleDuration::parse("forever"), None);
        assert_eq!(RuleDuration::parse(""), None);
        assert_eq!(RuleDuration::parse("99999999999999999999999"), None);
    }

    #[test]
    fn duration_in_days() {
        assert_eq!(RuleDuration::Finite(2).in_days(RuleMeasurement::Year), 730);
        assert_eq!(RuleDuration::Finite(2).in_days(RuleMeasurement::Month), 60);
        assert_eq!(RuleDuration::Unlimited.in_days(RuleMeasurement::Day), u64::MAX);
    }

    #[test]
    fn record_serializes_with_canonical_names() {
        let now = chrono::Utc::now();
        let record = RuleRecord {
            rule_id: "R1".into(),
            rule_type: RuleType::ReuseRule,
            rule_value: "v".into(),
            rule_duration: RuleDuration::Unlimited,
            rule_measurement: RuleMeasurement::Year,
            rule_description: String::new(),
            creation_date: now,
            update_date: now,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["RuleId"], "R1");
        assert_eq!(json["RuleType"], "ReuseRule");
        assert_eq!(json["RuleDuration"], "unlimited");
        assert_eq!(json["RuleMeasurement"], "YEAR");
    }

    #[test]
    fn unsafe_change_detection() {
        let now = chrono::Utc::now();
        let current = RuleRecord {
            rule_id: "R1".into(),
            rule_type: RuleType::AccessRule,
            rule_value: "v".into(),
            rule_duration: RuleDuration::Finite(3),
            rule_measurement: RuleMeasurement::Year,
            rule_description: "d".into(),
            creation_date: now,
            update_date: now,
        };
        let relabelled = RuleRecord {
            rule_description: "other".into(),
            ..current.clone()
        };
        let longer = RuleRecord {
            rule_duration: RuleDuration::Finite(5),
            ..current.clone()
        };
        assert!(!relabelled.is_unsafe_change_from(&current));
        assert!(!relabelled.same_content(&current));
        assert!(longer.is_unsafe_change_from(&current));
    }
}
