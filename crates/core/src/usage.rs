//! Usage-safety policy applied to a [`RuleDiff`].
//!
//! The policy is pure: it consumes reference counts gathered elsewhere and
//! decides which deletions are allowed and which updates need the
//! recomputation workflow.

use std::collections::{BTreeSet, HashMap};

use crate::diff::RuleDiff;

/// Classification of the rule ids touched by an import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageReport {
    /// Updated rules still referenced by archive units.
    pub used_and_updated: Vec<String>,
    /// Deleted rules that no archive unit references.
    pub unused_and_deletable: Vec<String>,
    /// Deleted rules that archive units still reference. Any entry blocks the import.
    pub used_and_non_deletable: Vec<String>,
}

impl UsageReport {
    /// Build the report from per-rule reference counts.
    ///
    /// Ids missing from `usage_counts` are treated as unreferenced.
    pub fn from_counts(diff: &RuleDiff, usage_counts: &HashMap<String, u64>) -> Self {
        let is_used = |id: &str| usage_counts.get(id).copied().unwrap_or(0) > 0;

        let mut report = Self::default();
        for record in &diff.to_delete {
            if is_used(&record.rule_id) {
                report.used_and_non_deletable.push(record.rule_id.clone());
            } else {
                report.unused_and_deletable.push(record.rule_id.clone());
            }
        }
        report.used_and_updated = diff
            .to_update
            .iter()
            .filter(|r| is_used(&r.rule_id))
            .map(|r| r.rule_id.clone())
            .collect();
        report
    }

    pub fn blocks_import(&self) -> bool {
        !self.used_and_non_deletable.is_empty()
    }
}

/// Rule ids whose change must be pushed to the archive-unit recomputation
/// workflow: every unsafe update plus every used-and-updated rule.
pub fn recomputation_rule_ids(diff: &RuleDiff, usage: &UsageReport) -> BTreeSet<String> {
    diff.to_update_unsafely
        .iter()
        .map(|r| r.rule_id.clone())
        .chain(usage.used_and_updated.iter().cloned())
        .collect()
}
