//! Audit Trail Manager: sole writer of import operations to the audit log.
//!
//! Writes are best-effort. A failed write is logged and counted against the
//! operation, never returned to the caller, so an audit outage cannot mask
//! the real outcome of an import. Each operation's events are hash-chained
//! and must follow the phase order enforced by [`OperationPhase`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::SubsecRound;
use rulesref_core::audit::{
    compute_integrity_hash, event_types, AuditEvent, OperationPhase, StatusCode,
};
use rulesref_core::error::ReferentialError;
use rulesref_core::ports::AuditLogService;
use rulesref_core::types::{OperationId, TenantId};

/// In-flight state of one operation.
#[derive(Debug)]
struct ChainState {
    tenant: TenantId,
    root_type: String,
    last_hash: Option<String>,
    phase: OperationPhase,
    write_failures: u32,
}

pub struct AuditTrailManager {
    log: Arc<dyn AuditLogService>,
    chains: Mutex<HashMap<OperationId, ChainState>>,
}

impl AuditTrailManager {
    pub fn new(log: Arc<dyn AuditLogService>) -> Self {
        Self {
            log,
            chains: Mutex::new(HashMap::new()),
        }
    }

    fn chains(&self) -> MutexGuard<'_, HashMap<OperationId, ChainState>> {
        // Entries stay consistent even if a holder panicked.
        self.chains.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Open an operation with its root STARTED event.
    pub async fn open(
        &self,
        operation_id: OperationId,
        tenant: TenantId,
        event_type: &str,
        message: &str,
        detail: Option<serde_json::Value>,
    ) {
        {
            let mut chains = self.chains();
            if chains.contains_key(&operation_id) {
                tracing::error!(%operation_id, event_type, "Audit operation already open");
                return;
            }
            chains.insert(
                operation_id,
                ChainState {
                    tenant,
                    root_type: event_type.to_string(),
                    last_hash: None,
                    phase: OperationPhase::Opened,
                    write_failures: 0,
                },
            );
        }

        let event = build_event(operation_id, tenant, event_type, StatusCode::Started, message, detail, None);
        let result = self.log.create(&event).await;
        self.settle(operation_id, &event, result);
    }

    /// Append a phase event (e.g. `CHECK_RULES`) to an open operation.
    pub async fn record(
        &self,
        operation_id: OperationId,
        event_type: &str,
        status: StatusCode,
        message: &str,
        detail: Option<serde_json::Value>,
    ) {
        let Some(event) = self.prepare(operation_id, event_type, status, message, detail) else {
            return;
        };
        let result = self.log.update(&event).await;
        self.settle(operation_id, &event, result);
    }

    /// Close an operation with its terminal status and stop tracking it.
    ///
    /// A KO close is escalated to FATAL when any audit write of the operation
    /// failed. Returns the status actually recorded.
    pub async fn close(
        &self,
        operation_id: OperationId,
        status: StatusCode,
        message: &str,
        detail: Option<serde_json::Value>,
    ) -> StatusCode {
        let (root_type, failed) = match self.chains().get(&operation_id) {
            Some(state) => (state.root_type.clone(), state.write_failures > 0),
            None => {
                tracing::error!(%operation_id, "Cannot close unknown audit operation");
                return status;
            }
        };
        let status = if status == StatusCode::Ko && failed {
            StatusCode::Fatal
        } else {
            status
        };

        if let Some(event) = self.prepare(operation_id, &root_type, status, message, detail) {
            let result = self.log.update(&event).await;
            self.settle(operation_id, &event, result);
        }
        self.chains().remove(&operation_id);
        status
    }

    /// Stop tracking an operation that another component will close.
    pub fn release(&self, operation_id: OperationId) {
        self.chains().remove(&operation_id);
    }

    /// Whether any audit write of the operation has failed so far.
    pub fn write_failed(&self, operation_id: OperationId) -> bool {
        self.chains()
            .get(&operation_id)
            .is_some_and(|state| state.write_failures > 0)
    }

    /// True when the tenant's most recent import was started but never closed.
    pub async fn is_import_in_progress(&self, tenant: TenantId) -> Result<bool, ReferentialError> {
        let latest = self
            .log
            .select_latest(event_types::STP_IMPORT_RULES, tenant)
            .await
            .map_err(|e| ReferentialError(format!("cannot read latest rule import: {e}")))?;

        let in_progress = latest
            .as_ref()
            .and_then(|op| op.last_event())
            .is_some_and(|last| !last.closes(event_types::STP_IMPORT_RULES));
        Ok(in_progress)
    }

    /// Check the phase order and build the next chained event.
    fn prepare(
        &self,
        operation_id: OperationId,
        event_type: &str,
        status: StatusCode,
        message: &str,
        detail: Option<serde_json::Value>,
    ) -> Option<AuditEvent> {
        let mut chains = self.chains();
        let Some(state) = chains.get_mut(&operation_id) else {
            tracing::error!(%operation_id, event_type, "Audit event for unknown operation dropped");
            return None;
        };

        match state.phase.advance(&state.root_type, event_type, status) {
            Ok(next) => state.phase = next,
            Err(violation) => {
                tracing::error!(%operation_id, error = %violation, "Out-of-order audit event dropped");
                return None;
            }
        }

        Some(build_event(
            operation_id,
            state.tenant,
            event_type,
            status,
            message,
            detail,
            state.last_hash.as_deref(),
        ))
    }

    /// Advance the chain on success, count the failure otherwise.
    fn settle(
        &self,
        operation_id: OperationId,
        event: &AuditEvent,
        result: Result<(), rulesref_core::error::DependencyError>,
    ) {
        let mut chains = self.chains();
        let Some(state) = chains.get_mut(&operation_id) else {
            return;
        };
        match result {
            Ok(()) => {
                tracing::debug!(
                    %operation_id,
                    event_type = %event.event_type,
                    status = %event.status,
                    "Audit event recorded",
                );
                state.last_hash = Some(event.integrity_hash.clone());
            }
            Err(e) => {
                tracing::error!(
                    %operation_id,
                    event_type = %event.event_type,
                    status = %event.status,
                    error = %e,
                    "Failed to write audit event",
                );
                state.write_failures += 1;
            }
        }
    }
}

fn build_event(
    operation_id: OperationId,
    tenant: TenantId,
    event_type: &str,
    status: StatusCode,
    message: &str,
    detail: Option<serde_json::Value>,
    prev_hash: Option<&str>,
) -> AuditEvent {
    let mut event = AuditEvent {
        event_id: uuid::Uuid::now_v7(),
        operation_id,
        tenant,
        event_type: event_type.to_string(),
        status,
        message: message.to_string(),
        detail,
        // Microsecond precision survives a round-trip through the database.
        created_at: chrono::Utc::now().trunc_subsecs(6),
        integrity_hash: String::new(),
    };
    event.integrity_hash = compute_integrity_hash(prev_hash, &event.canonical_data());
    event
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryAuditLog;
    use rulesref_core::audit::verify_chain;

    fn manager() -> (Arc<MemoryAuditLog>, AuditTrailManager) {
        let log = Arc::new(MemoryAuditLog::default());
        let manager = AuditTrailManager::new(log.clone());
        (log, manager)
    }

    #[tokio::test]
    async fn records_a_chained_operation() {
        let (log, audit) = manager();
        let op = uuid::Uuid::now_v7();
        audit.open(op, 1, event_types::STP_IMPORT_RULES, "start", None).await;
        audit.record(op, event_types::CHECK_RULES, StatusCode::Ok, "checked", None).await;
        audit.record(op, event_types::COMMIT_RULES, StatusCode::Ok, "committed", None).await;
        let status = audit.close(op, StatusCode::Ok, "done", None).await;
        assert_eq!(status, StatusCode::Ok);

        let stored = log.operation(op).await.unwrap();
        assert_eq!(stored.events.len(), 4);
        assert_eq!(verify_chain(&stored.events), None);
        assert_eq!(stored.outcome(), Some(StatusCode::Ok));
    }

    #[tokio::test]
    async fn out_of_order_event_is_not_written() {
        let (log, audit) = manager();
        let op = uuid::Uuid::now_v7();
        audit.open(op, 1, event_types::STP_IMPORT_RULES, "start", None).await;
        audit.record(op, event_types::COMMIT_RULES, StatusCode::Ok, "too early", None).await;

        let stored = log.operation(op).await.unwrap();
        assert_eq!(stored.events.len(), 1);
    }

    #[tokio::test]
    async fn failed_writes_are_swallowed_and_escalate_ko() {
        let (log, audit) = manager();
        let op = uuid::Uuid::now_v7();
        audit.open(op, 1, event_types::STP_IMPORT_RULES, "start", None).await;
        log.set_failing_writes(true);
        audit.record(op, event_types::CHECK_RULES, StatusCode::Ko, "rejected", None).await;
        assert!(audit.write_failed(op));

        log.set_failing_writes(false);
        let status = audit.close(op, StatusCode::Ko, "failed", None).await;
        assert_eq!(status, StatusCode::Fatal);

        let stored = log.operation(op).await.unwrap();
        assert_eq!(stored.outcome(), Some(StatusCode::Fatal));
        assert_eq!(verify_chain(&stored.events), None);
    }

    #[tokio::test]
    async fn in_progress_tracks_latest_import() {
        let (_log, audit) = manager();
        assert!(!audit.is_import_in_progress(1).await.unwrap());

        let op = uuid::Uuid::now_v7();
        audit.open(op, 1, event_types::STP_IMPORT_RULES, "start", None).await;
        assert!(audit.is_import_in_progress(1).await.unwrap());
        assert!(!audit.is_import_in_progress(2).await.unwrap());

        audit.record(op, event_types::CHECK_RULES, StatusCode::Ok, "checked", None).await;
        assert!(audit.is_import_in_progress(1).await.unwrap());

        audit.close(op, StatusCode::Ko, "failed", None).await;
        assert!(!audit.is_import_in_progress(1).await.unwrap());
    }

    #[tokio::test]
    async fn in_progress_query_failure_is_referential_error() {
        let (log, audit) = manager();
        log.set_failing_reads(true);
        let err = audit.is_import_in_progress(1).await.unwrap_err();
        assert!(err.to_string().contains("cannot read latest rule import"));
    }
}
