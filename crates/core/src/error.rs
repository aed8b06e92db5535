use crate::types::TenantId;
use crate::validation::RuleViolation;

/// Rejection of a submitted rule file. Never retried: the caller must fix the
/// file and resubmit.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// The file could not be read as a rule table (bad encoding, missing column, ...).
    #[error("Invalid rule file: {0}")]
    InvalidFile(String),

    /// A row violated one or more rules. Every violation found in that row is listed.
    #[error("Invalid rule at line {line}: {}", join_violations(.violations))]
    InvalidRow {
        line: usize,
        violations: Vec<RuleViolation>,
    },
}

impl ValidationError {
    /// Violations carried by this error (empty for structural failures).
    pub fn violations(&self) -> &[RuleViolation] {
        match self {
            Self::InvalidFile(_) => &[],
            Self::InvalidRow { violations, .. } => violations,
        }
    }
}

fn join_violations(violations: &[RuleViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// The requested import mode is not legal for the current state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PreconditionError {
    #[error("Rule referential of tenant {tenant} is not empty: bootstrap import refused")]
    ReferentialNotEmpty { tenant: TenantId },

    #[error("There is already a rule file import in progress for tenant {tenant}")]
    ImportInProgress { tenant: TenantId },
}

/// Failure reaching an external collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DependencyError {
    #[error("{service} unavailable: {message}")]
    Unavailable {
        service: &'static str,
        message: String,
    },

    #[error("{service} rejected the request: {message}")]
    Rejected {
        service: &'static str,
        message: String,
    },

    #[error("{service} timed out")]
    Timeout { service: &'static str },
}

impl DependencyError {
    pub fn unavailable(service: &'static str, message: impl Into<String>) -> Self {
        Self::Unavailable {
            service,
            message: message.into(),
        }
    }

    pub fn rejected(service: &'static str, message: impl Into<String>) -> Self {
        Self::Rejected {
            service,
            message: message.into(),
        }
    }

    /// Name of the collaborator that failed.
    pub fn service(&self) -> &'static str {
        match self {
            Self::Unavailable { service, .. }
            | Self::Rejected { service, .. }
            | Self::Timeout { service } => service,
        }
    }
}

/// The audit log could not answer a referential-state query.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Referential error: {0}")]
pub struct ReferentialError(pub String);

/// Everything an import can fail with.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ImportError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    /// Rules scheduled for deletion are still referenced by archive units.
    #[error("Rules still in use by archive units cannot be deleted: {}", .rule_ids.join(", "))]
    UsageConflict { rule_ids: Vec<String> },

    #[error(transparent)]
    Dependency(#[from] DependencyError),

    #[error(transparent)]
    Referential(#[from] ReferentialError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_conflict_lists_every_rule() {
        let err = ImportError::UsageConflict {
            rule_ids: vec!["R1".into(), "R7".into()],
        };
        assert_eq!(
            err.to_string(),
            "Rules still in use by archive units cannot be deleted: R1, R7"
        );
    }

    #[test]
    fn invalid_row_joins_violations() {
        let err = ValidationError::InvalidRow {
            line: 3,
            violations: vec![
                RuleViolation::DuplicateRuleId {
                    rule_id: "R1".into(),
                },
                RuleViolation::UnknownRuleType {
                    value: "Foo".into(),
                },
            ],
        };
        assert_eq!(
            err.to_string(),
            "Invalid rule at line 3: Rule with Id R1 already exists; Unknown rule type 'Foo'"
        );
    }

    #[test]
    fn dependency_error_reports_service() {
        let err = DependencyError::Timeout { service: "audit log" };
        assert_eq!(err.service(), "audit log");
        assert_eq!(err.to_string(), "audit log timed out");
    }
}
