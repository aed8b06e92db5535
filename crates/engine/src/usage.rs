use std::collections::HashMap;
use std::sync::Arc;

use rulesref_core::diff::RuleDiff;
use rulesref_core::error::DependencyError;
use rulesref_core::ports::ArchiveUnitStore;
use rulesref_core::types::TenantId;
use rulesref_core::usage::UsageReport;

/// Queries archive-unit references for the rules a diff deletes or updates.
pub struct UsageClassifier {
    units: Arc<dyn ArchiveUnitStore>,
}

impl UsageClassifier {
    pub fn new(units: Arc<dyn ArchiveUnitStore>) -> Self {
        Self { units }
    }

    /// One query per candidate rule, issued sequentially.
    pub async fn classify(
        &self,
        tenant: TenantId,
        diff: &RuleDiff,
    ) -> Result<UsageReport, DependencyError> {
        let mut counts = HashMap::new();
        for rule in diff.to_delete.iter().chain(&diff.to_update) {
            let units = self.units.count_units_referencing(tenant, rule).await?;
            if units > 0 {
                tracing::debug!(tenant, rule_id = %rule.rule_id, units, "Rule referenced by archive units");
            }
            counts.insert(rule.rule_id.clone(), units);
        }
        Ok(UsageReport::from_counts(diff, &counts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryArchiveUnitStore;
    use rulesref_core::diff::diff_rules;
    use rulesref_core::rules::{RuleDuration, RuleMeasurement, RuleRecord, RuleType};

    fn rule(id: &str, duration: u64) -> RuleRecord {
        let now = chrono::Utc::now();
        RuleRecord {
            rule_id: id.into(),
            rule_type: RuleType::DisseminationRule,
            rule_value: "v".into(),
            rule_duration: RuleDuration::Finite(duration),
            rule_measurement: RuleMeasurement::Day,
            rule_description: String::new(),
            creation_date: now,
            update_date: now,
        }
    }

    #[tokio::test]
    async fn classifies_deletions_and_updates() {
        let units = Arc::new(MemoryArchiveUnitStore::default());
        units.set_references(1, "R2", 3).await;
        units.set_references(1, "R3", 1).await;
        units.set_references(2, "R4", 1).await;
        let classifier = UsageClassifier::new(units);

        let current = vec![rule("R1", 1), rule("R2", 1), rule("R3", 1), rule("R4", 1)];
        let incoming = vec![rule("R1", 1), rule("R3", 9)];
        let diff = diff_rules(Some(&incoming), Some(&current));

        let report = classifier.classify(1, &diff).await.unwrap();
        assert_eq!(report.used_and_non_deletable, vec!["R2"]);
        assert_eq!(report.unused_and_deletable, vec!["R4"]);
        assert_eq!(report.used_and_updated, vec!["R3"]);
    }

    #[tokio::test]
    async fn store_failure_propagates() {
        let units = Arc::new(MemoryArchiveUnitStore::default());
        units.set_failing(true);
        let classifier = UsageClassifier::new(units);

        let current = vec![rule("R1", 1)];
        let diff = diff_rules(None, Some(&current));
        let err = classifier.classify(1, &diff).await.unwrap_err();
        assert_eq!(err.service(), "archive unit store");
    }

    #[tokio::test]
    async fn nothing_to_query_for_pure_inserts() {
        let units = Arc::new(MemoryArchiveUnitStore::default());
        units.set_failing(true);
        let classifier = UsageClassifier::new(units);

        let incoming = vec![rule("R1", 1)];
        let diff = diff_rules(Some(&incoming), None);
        assert_eq!(classifier.classify(1, &diff).await.unwrap(), UsageReport::default());
    }
}
