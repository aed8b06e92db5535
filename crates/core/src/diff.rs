//! Key-by-key comparison of an incoming rule batch against the current
//! referential.
//!
//! Pure: no I/O, deterministic for identical inputs. A missing side is
//! treated as empty.

use std::collections::{HashMap, HashSet};

use crate::rules::RuleRecord;

/// Outcome of [`diff_rules`].
///
/// `to_update_unsafely` is always a subset of `to_update`. Incoming-side
/// sequences keep batch order; `to_delete` keeps referential order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleDiff {
    pub to_insert: Vec<RuleRecord>,
    pub to_update: Vec<RuleRecord>,
    pub to_update_unsafely: Vec<RuleRecord>,
    pub to_delete: Vec<RuleRecord>,
}

impl RuleDiff {
    pub fn is_empty(&self) -> bool {
        self.to_insert.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }

    pub fn update_ids(&self) -> Vec<String> {
        ids(&self.to_update)
    }

    pub fn unsafe_update_ids(&self) -> Vec<String> {
        ids(&self.to_update_unsafely)
    }

    pub fn delete_ids(&self) -> Vec<String> {
        ids(&self.to_delete)
    }

    pub fn insert_ids(&self) -> Vec<String> {
        ids(&self.to_insert)
    }
}

fn ids(records: &[RuleRecord]) -> Vec<String> {
    records.iter().map(|r| r.rule_id.clone()).collect()
}

/// Compare `incoming` against `current`.
///
/// Updated records carry the incoming content with the current record's
/// creation date preserved.
pub fn diff_rules(incoming: Option<&[RuleRecord]>, current: Option<&[RuleRecord]>) -> RuleDiff {
    let incoming = incoming.unwrap_or_default();
    let current = current.unwrap_or_default();

    let current_by_id: HashMap<&str, &RuleRecord> =
        current.iter().map(|r| (r.rule_id.as_str(), r)).collect();
    let incoming_ids: HashSet<&str> = incoming.iter().map(|r| r.rule_id.as_str()).collect();

    let mut diff = RuleDiff::default();

    for record in incoming {
        match current_by_id.get(record.rule_id.as_str()) {
            None => diff.to_insert.push(record.clone()),
            Some(existing) if record.same_content(existing) => {}
            Some(existing) => {
                let updated = RuleRecord {
                    creation_date: existing.creation_date,
                    ..record.clone()
                };
                if updated.is_unsafe_change_from(existing) {
                    diff.to_update_unsafely.push(updated.clone());
                }
                diff.to_update.push(updated);
            }
        }
    }

    diff.to_delete = current
        .iter()
        .filter(|r| !incoming_ids.contains(r.rule_id.as_str()))
        .cloned()
        .collect();

    diff
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
