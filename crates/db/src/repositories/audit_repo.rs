//! Repository for the `audit_operations` and `audit_events` tables.

use rulesref_core::audit::AuditEvent;
use rulesref_core::types::{OperationId, TenantId};
use sqlx::{PgConnection, PgPool};

use crate::models::audit::{AuditEventRow, AuditOperationRow};

/// Column list for `audit_events` SELECT queries.
const EVENT_COLUMNS: &str = "\
    id, event_id, operation_id, tenant, event_type, status, \
    message, detail, created_at, integrity_hash";

const OPERATION_COLUMNS: &str = "operation_id, tenant, event_type, created_at";

/// Append-only access to audit operations and their events.
pub struct AuditRepo;

impl AuditRepo {
    pub async fn insert_operation(
        conn: &mut PgConnection,
        root: &AuditEvent,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO audit_operations (operation_id, tenant, event_type, created_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(root.operation_id)
        .bind(root.tenant)
        .bind(&root.event_type)
        .bind(root.created_at)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn insert_event(conn: &mut PgConnection, event: &AuditEvent) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO audit_events \
                (event_id, operation_id, tenant, event_type, status, message, detail, created_at, integrity_hash) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(event.event_id)
        .bind(event.operation_id)
        .bind(event.tenant)
        .bind(&event.event_type)
        .bind(event.status.as_str())
        .bind(&event.message)
        .bind(&event.detail)
        .bind(event.created_at)
        .bind(&event.integrity_hash)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn find_operation(
        pool: &PgPool,
        operation_id: OperationId,
    ) -> Result<Option<AuditOperationRow>, sqlx::Error> {
        let query = format!("SELECT {OPERATION_COLUMNS} FROM audit_operations WHERE operation_id = $1");
        sqlx::query_as::<_, AuditOperationRow>(&query)
            .bind(operation_id)
            .fetch_optional(pool)
            .await
    }

    /// Most recent operation of the given type for a tenant.
    pub async fn find_latest_operation(
        pool: &PgPool,
        event_type: &str,
        tenant: TenantId,
    ) -> Result<Option<AuditOperationRow>, sqlx::Error> {
        let query = format!(
            "SELECT {OPERATION_COLUMNS} FROM audit_operations \
             WHERE tenant = $1 AND event_type = $2 \
             ORDER BY created_at DESC, operation_id DESC \
             LIMIT 1"
        );
        sqlx::query_as::<_, AuditOperationRow>(&query)
            .bind(tenant)
            .bind(event_type)
            .fetch_optional(pool)
            .await
    }

    /// Events of an operation in append order.
    pub async fn list_events(
        pool: &PgPool,
        operation_id: OperationId,
    ) -> Result<Vec<AuditEventRow>, sqlx::Error> {
        let query = format!(
            "SELECT {EVENT_COLUMNS} FROM audit_events WHERE operation_id = $1 ORDER BY id ASC"
        );
        sqlx::query_as::<_, AuditEventRow>(&query)
            .bind(operation_id)
            .fetch_all(pool)
            .await
    }
}
