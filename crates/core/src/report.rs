//! Import report returned to the caller and archived with the referential.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::audit::{event_types, StatusCode};
use crate::diff::RuleDiff;
use crate::error::ValidationError;
use crate::types::{OperationId, Timestamp};
use crate::usage::UsageReport;

/// Summary of the import operation itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportOperation {
    pub ev_type: String,
    pub ev_id: OperationId,
    pub ev_date_time: Timestamp,
    pub outcome: StatusCode,
    pub out_messg: String,
}

/// One violation as listed in the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportError {
    pub code: String,
    pub message: String,
    pub additional_information: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImportReport {
    pub operation: ReportOperation,
    /// Keyed by `"line N"`, or `"file"` for structural failures.
    pub errors: BTreeMap<String, Vec<ReportError>>,
    pub used_file_rules_to_delete: Vec<String>,
    pub used_file_rules_to_update: Vec<String>,
    pub file_rules_deleted: Vec<String>,
    pub file_rules_updated: Vec<String>,
    pub file_rules_inserted: Vec<String>,
}

impl ImportReport {
    pub fn new(operation_id: OperationId, started_at: Timestamp) -> Self {
        Self {
            operation: ReportOperation {
                ev_type: event_types::STP_IMPORT_RULES.to_string(),
                ev_id: operation_id,
                ev_date_time: started_at,
                outcome: StatusCode::Started,
                out_messg: String::new(),
            },
            errors: BTreeMap::new(),
            used_file_rules_to_delete: Vec::new(),
            used_file_rules_to_update: Vec::new(),
            file_rules_deleted: Vec::new(),
            file_rules_updated: Vec::new(),
            file_rules_inserted: Vec::new(),
        }
    }

    /// Report of a dry-run check: same layout, evType `CHECK_RULES`.
    pub fn dry_run(operation_id: OperationId, started_at: Timestamp) -> Self {
        let mut report = Self::new(operation_id, started_at);
        report.operation.ev_type = event_types::CHECK_RULES.to_string();
        report
    }

    pub fn with_outcome(mut self, outcome: StatusCode, message: impl Into<String>) -> Self {
        self.operation.outcome = outcome;
        self.operation.out_messg = message.into();
        self
    }

    pub fn with_validation_error(mut self, error: &ValidationError) -> Self {
        match error {
            ValidationError::InvalidFile(reason) => {
                self.errors.insert(
                    "file".to_string(),
                    vec![ReportError {
                        code: "STP_IMPORT_RULES_INVALID_FILE".to_string(),
                        message: error.to_string(),
                        additional_information: reason.clone(),
                    }],
                );
            }
            ValidationError::InvalidRow { line, violations } => {
                let entries = violations
                    .iter()
                    .map(|v| ReportError {
                        code: v.code().to_string(),
                        message: v.to_string(),
                        additional_information: v.additional_information(),
                    })
                    .collect();
                self.errors.insert(format!("line {line}"), entries);
            }
        }
        self
    }

    /// Record what a reconciliation found. Mutation lists are only filled
    /// when the import is not blocked by usage.
    pub fn with_diff(mut self, diff: &RuleDiff, usage: &UsageReport) -> Self {
        self.used_file_rules_to_delete = usage.used_and_non_deletable.clone();
        self.used_file_rules_to_update = usage.used_and_updated.clone();
        if !usage.blocks_import() {
            self.file_rules_deleted = diff.delete_ids();
            self.file_rules_updated = diff.update_ids();
            self.file_rules_inserted = diff.insert_ids();
        }
        self
    }

    /// Record a bootstrap insertion.
    pub fn with_inserted(mut self, rule_ids: Vec<String>) -> Self {
        self.file_rules_inserted = rule_ids;
        self
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }
}
