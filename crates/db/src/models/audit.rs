//! Row models for `audit_operations` and `audit_events`.
//!
//! Events are immutable once written; the table rejects UPDATE and DELETE.

use rulesref_core::audit::{AuditEvent, StatusCode};
use rulesref_core::types::{DbId, OperationId, TenantId, Timestamp};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct AuditOperationRow {
    pub operation_id: OperationId,
    pub tenant: TenantId,
    pub event_type: String,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, FromRow)]
pub struct AuditEventRow {
    pub id: DbId,
    pub event_id: uuid::Uuid,
    pub operation_id: OperationId,
    pub tenant: TenantId,
    pub event_type: String,
    pub status: String,
    pub message: String,
    pub detail: Option<serde_json::Value>,
    pub created_at: Timestamp,
    pub integrity_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("audit event {event_id} has unknown status '{status}'")]
pub struct UnknownStatus {
    pub event_id: uuid::Uuid,
    pub status: String,
}

impl TryFrom<AuditEventRow> for AuditEvent {
    type Error = UnknownStatus;

    fn try_from(row: AuditEventRow) -> Result<Self, Self::Error> {
        let status = StatusCode::from_name(&row.status).ok_or_else(|| UnknownStatus {
            event_id: row.event_id,
            status: row.status.clone(),
        })?;
        Ok(AuditEvent {
            event_id: row.event_id,
            operation_id: row.operation_id,
            tenant: row.tenant,
            event_type: row.event_type,
            status,
            message: row.message,
            detail: row.detail,
            created_at: row.created_at,
            integrity_hash: row.integrity_hash,
        })
    }
}
