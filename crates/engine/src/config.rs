use rulesref_core::rules::RuleType;
use rulesref_core::validation::{MinimumDuration, ValidationPolicy};
use validator::Validate;

/// Configuration errors. Never panics on bad input.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },

    #[error("Invalid engine configuration: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Import engine configuration loaded from environment variables.
#[derive(Debug, Clone, Validate)]
pub struct EngineConfig {
    /// Storage strategy handed to object storage when securing files.
    #[validate(length(min = 1, max = 64))]
    pub storage_strategy: String,
    /// Per-rule-type minimum durations applied on top of the fixed checks.
    pub validation_policy: ValidationPolicy,
    /// Whether the submitted file is secured after a successful commit.
    pub secure_original_file: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            storage_strategy: "default".into(),
            validation_policy: ValidationPolicy::default(),
            secure_original_file: true,
        }
    }
}

impl EngineConfig {
    /// Load `.env` if present, then read the environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default   |
    /// |------------------------------|-----------|
    /// | `RULES_STORAGE_STRATEGY`     | `default` |
    /// | `RULES_MIN_DURATIONS`        | (none)    |
    /// | `RULES_SECURE_ORIGINAL_FILE` | `true`    |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let storage_strategy = lookup("RULES_STORAGE_STRATEGY")
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| "default".into());

        let validation_policy = match lookup("RULES_MIN_DURATIONS") {
            Some(raw) => parse_min_durations(&raw)?,
            None => ValidationPolicy::default(),
        };

        let secure_original_file = match lookup("RULES_SECURE_ORIGINAL_FILE") {
            Some(raw) => raw.trim().parse::<bool>().map_err(|_| ConfigError::Invalid {
                var: "RULES_SECURE_ORIGINAL_FILE",
                reason: format!("expected true or false, got '{raw}'"),
            })?,
            None => true,
        };

        let config = Self {
            storage_strategy,
            validation_policy,
            secure_original_file,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Parse `Type=N UNIT` entries separated by commas, e.g.
/// `AppraisalRule=1 YEAR, StorageRule=6 MONTH`.
pub fn parse_min_durations(raw: &str) -> Result<ValidationPolicy, ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid {
        var: "RULES_MIN_DURATIONS",
        reason,
    };

    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .try_fold(ValidationPolicy::default(), |policy, entry| {
            let (name, value) = entry
                .split_once('=')
                .ok_or_else(|| invalid(format!("'{entry}' is not Type=N UNIT")))?;
            let rule_type = RuleType::from_name(name)
                .ok_or_else(|| invalid(format!("unknown rule type '{}'", name.trim())))?;
            let minimum = MinimumDuration::parse(value)
                .ok_or_else(|| invalid(format!("'{}' is not N UNIT", value.trim())))?;
            Ok(policy.with_minimum(rule_type, minimum))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rulesref_core::rules::RuleMeasurement;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.storage_strategy, "default");
        assert!(config.secure_original_file);
        assert_eq!(config.validation_policy, ValidationPolicy::default());
    }

    #[test]
    fn reads_every_variable() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("RULES_STORAGE_STRATEGY", "archive-offer"),
            ("RULES_MIN_DURATIONS", "AppraisalRule=1 YEAR, storagerule=6 month"),
            ("RULES_SECURE_ORIGINAL_FILE", "false"),
        ]))
        .unwrap();
        assert_eq!(config.storage_strategy, "archive-offer");
        assert!(!config.secure_original_file);
        assert_eq!(
            config.validation_policy.minimum_for(RuleType::StorageRule),
            Some(MinimumDuration {
                duration: 6,
                measurement: RuleMeasurement::Month,
            })
        );
        assert_eq!(config.validation_policy.minimum_for(RuleType::HoldRule), None);
    }

    #[test]
    fn empty_strategy_fails_validation() {
        let err = EngineConfig::from_lookup(lookup(&[("RULES_STORAGE_STRATEGY", "  ")])).unwrap_err();
        assert_matches!(err, ConfigError::Validation(_));
    }

    #[test]
    fn bad_boolean_is_reported() {
        let err = EngineConfig::from_lookup(lookup(&[("RULES_SECURE_ORIGINAL_FILE", "yes")])).unwrap_err();
        assert_matches!(err, ConfigError::Invalid { var: "RULES_SECURE_ORIGINAL_FILE", .. });
    }

    #[test]
    fn bad_minimum_entries_are_reported() {
        assert!(parse_min_durations("AppraisalRule").is_err());
        assert!(parse_min_durations("FooRule=1 YEAR").is_err());
        assert!(parse_min_durations("AppraisalRule=1 WEEK").is_err());
        assert!(parse_min_durations(" , ").is_ok());
    }
}
