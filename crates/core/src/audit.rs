//! Audit trail model: event types, outcome statuses, per-phase detail data,
//! the integrity hash chain, and phase ordering.
//!
//! This module has no I/O so both the storage layer and the engine can use it.

use serde::{Deserialize, Serialize};

use crate::hashing;
use crate::types::{OperationId, TenantId, Timestamp};

// ---------------------------------------------------------------------------
// Event type constants
// ---------------------------------------------------------------------------

/// Known event types recorded in the audit log.
pub mod event_types {
    /// Envelope of a rule file import.
    pub const STP_IMPORT_RULES: &str = "STP_IMPORT_RULES";
    /// Diff and usage validation outcome.
    pub const CHECK_RULES: &str = "CHECK_RULES";
    /// Referential mutation outcome.
    pub const COMMIT_RULES: &str = "COMMIT_RULES";
    /// Archive-unit recomputation workflow initiated after an import.
    pub const UPDATE_RULES_ARCHIVE_UNITS: &str = "UPDATE_RULES_ARCHIVE_UNITS";
    /// Snapshot of the committed referential, taken after every import.
    pub const STP_IMPORT_RULES_BACKUP: &str = "STP_IMPORT_RULES_BACKUP";
    /// Prefix of the per-extension securisation event type.
    pub const RULES_SECURISATION_PREFIX: &str = "RULES_SECURISATION";
}

/// Event type of the securisation of a file with the given extension,
/// e.g. `RULES_SECURISATION_CSV`.
pub fn securisation_event_type(extension: &str) -> String {
    format!(
        "{}_{}",
        event_types::RULES_SECURISATION_PREFIX,
        extension.trim_start_matches('.').to_uppercase()
    )
}

// ---------------------------------------------------------------------------
// Status codes
// ---------------------------------------------------------------------------

/// Outcome of a phase, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    Started,
    Ok,
    Warning,
    Ko,
    Fatal,
}

impl StatusCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "STARTED",
            Self::Ok => "OK",
            Self::Warning => "WARNING",
            Self::Ko => "KO",
            Self::Fatal => "FATAL",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "STARTED" => Some(Self::Started),
            "OK" => Some(Self::Ok),
            "WARNING" => Some(Self::Warning),
            "KO" => Some(Self::Ko),
            "FATAL" => Some(Self::Fatal),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Started)
    }

    /// OK or WARNING.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Ok | Self::Warning)
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Events and operations
// ---------------------------------------------------------------------------

/// One recorded phase transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: uuid::Uuid,
    pub operation_id: OperationId,
    pub tenant: TenantId,
    pub event_type: String,
    pub status: StatusCode,
    pub message: String,
    pub detail: Option<serde_json::Value>,
    pub created_at: Timestamp,
    pub integrity_hash: String,
}

impl AuditEvent {
    /// Canonical string fed to the integrity hash. Excludes the hash itself.
    pub fn canonical_data(&self) -> String {
        serde_json::json!({
            "event_id": self.event_id,
            "operation_id": self.operation_id,
            "tenant": self.tenant,
            "event_type": self.event_type,
            "status": self.status,
            "message": self.message,
            "detail": self.detail,
            "created_at": self.created_at.to_rfc3339(),
        })
        .to_string()
    }

    /// Whether this event closes an operation whose root has `root_type`.
    pub fn closes(&self, root_type: &str) -> bool {
        self.event_type == root_type && self.status.is_terminal()
    }
}

/// An operation as stored by the audit log: its events in append order,
/// the first one being the root (STARTED) event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditOperation {
    pub operation_id: OperationId,
    pub tenant: TenantId,
    pub event_type: String,
    pub events: Vec<AuditEvent>,
}

impl AuditOperation {
    pub fn last_event(&self) -> Option<&AuditEvent> {
        self.events.last()
    }

    /// Terminal status of the operation, if it has been closed.
    pub fn outcome(&self) -> Option<StatusCode> {
        self.events
            .iter()
            .rev()
            .find(|e| e.closes(&self.event_type))
            .map(|e| e.status)
    }

    pub fn event(&self, event_type: &str) -> Option<&AuditEvent> {
        self.events.iter().rev().find(|e| e.event_type == event_type)
    }
}

// ---------------------------------------------------------------------------
// Detail data
// ---------------------------------------------------------------------------

/// Detail data of `CHECK_RULES`. All three lists are always present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRulesDetail {
    pub deleted_rule_ids: Vec<String>,
    pub used_updated_rule_ids: Vec<String>,
    pub used_file_rules_to_delete: Vec<String>,
}

/// Detail data of `COMMIT_RULES`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRulesDetail {
    pub nb_deleted: usize,
    pub nb_updated: usize,
    pub nb_inserted: usize,
}

/// Detail data of the `STP_IMPORT_RULES` envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeDetail {
    pub file_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Detail data of a `RULES_SECURISATION_<EXT>` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurisationDetail {
    pub file_name: String,
    pub digest: String,
    pub digest_type: String,
}

/// Detail data of `STP_IMPORT_RULES_BACKUP`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupDetail {
    pub file_name: String,
    pub digest: String,
    pub version: i64,
    pub nb_rules: usize,
}

/// Detail data of `UPDATE_RULES_ARCHIVE_UNITS`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecomputationDetail {
    pub import_operation_id: OperationId,
    pub rule_ids: Vec<String>,
}

/// Serialize a detail struct into the event's JSON slot.
pub fn detail_value<T: Serialize>(detail: &T) -> Option<serde_json::Value> {
    serde_json::to_value(detail).ok()
}

// ---------------------------------------------------------------------------
// Integrity hash chain
// ---------------------------------------------------------------------------

/// Known seed value for the first event of an operation.
const CHAIN_SEED: &str = "RULES_AUDIT_CHAIN_SEED_V1";

/// Compute the SHA-256 integrity hash for an audit event.
///
/// `prev_hash` is the hash of the previous event of the same operation, or
/// `None` for its first event.
pub fn compute_integrity_hash(prev_hash: Option<&str>, entry_data: &str) -> String {
    let prev = prev_hash.unwrap_or(CHAIN_SEED);
    let combined = format!("{prev}|{entry_data}");
    hashing::sha256_hex(combined.as_bytes())
}

/// Index of the first event whose hash does not match its content and
/// predecessor, or `None` when the chain is intact.
pub fn verify_chain(events: &[AuditEvent]) -> Option<usize> {
    let mut prev: Option<&str> = None;
    for (index, event) in events.iter().enumerate() {
        if compute_integrity_hash(prev, &event.canonical_data()) != event.integrity_hash {
            return Some(index);
        }
        prev = Some(&event.integrity_hash);
    }
    None
}

// ---------------------------------------------------------------------------
// Phase ordering
// ---------------------------------------------------------------------------

/// Position of an operation in its phase state machine.
///
/// Import envelopes go `Opened -> Checked -> Committed -> Closed`; the check
/// and commit phases may be skipped only on failure paths. Other operations
/// go straight from `Opened` to `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationPhase {
    Opened,
    Checked { passed: bool },
    Committed,
    Closed,
}

/// An event that the current phase does not accept.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{event_type} {status} is not allowed in phase {phase:?}")]
pub struct PhaseViolation {
    pub phase: OperationPhase,
    pub event_type: String,
    pub status: StatusCode,
}

impl OperationPhase {
    /// Phase reached after appending `event_type`/`status` to an operation
    /// rooted at `root_type`.
    pub fn advance(
        self,
        root_type: &str,
        event_type: &str,
        status: StatusCode,
    ) -> Result<Self, PhaseViolation> {
        let closing = event_type == root_type && status.is_terminal();
        let is_import = root_type == event_types::STP_IMPORT_RULES;

        let next = match self {
            Self::Closed => None,
            _ if closing => Some(Self::Closed),
            Self::Opened if is_import && event_type == event_types::CHECK_RULES => {
                status.is_terminal().then_some(Self::Checked {
                    passed: status.is_success(),
                })
            }
            Self::Checked { passed: true } if event_type == event_types::COMMIT_RULES => {
                status.is_terminal().then_some(Self::Committed)
            }
            _ => None,
        };

        next.ok_or_else(|| PhaseViolation {
            phase: self,
            event_type: event_type.to_string(),
            status,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
