//! PostgreSQL implementations of the referential store and audit log ports.

use async_trait::async_trait;
use rulesref_core::audit::{AuditEvent, AuditOperation};
use rulesref_core::diff::RuleDiff;
use rulesref_core::error::DependencyError;
use rulesref_core::ports::{AuditLogService, ReferentialStore, ReferentialVersion, RuleQuery};
use rulesref_core::rules::RuleRecord;
use rulesref_core::types::{OperationId, TenantId};

use crate::models::audit::AuditOperationRow;
use crate::models::rule::RuleRow;
use crate::repositories::{AuditRepo, RuleRepo};
use crate::DbPool;

const REFERENTIAL: &str = "referential store";
const AUDIT_LOG: &str = "audit log";

/// Map a database error onto the collaborator error taxonomy.
fn db_error(service: &'static str) -> impl Fn(sqlx::Error) -> DependencyError {
    move |err| match err {
        sqlx::Error::PoolTimedOut => DependencyError::Timeout { service },
        sqlx::Error::Database(db) => DependencyError::rejected(service, db.to_string()),
        other => DependencyError::unavailable(service, other.to_string()),
    }
}

fn to_records(rows: Vec<RuleRow>) -> Result<Vec<RuleRecord>, DependencyError> {
    rows.into_iter()
        .map(|row| {
            RuleRecord::try_from(row).map_err(|e| DependencyError::rejected(REFERENTIAL, e.to_string()))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Referential
// ---------------------------------------------------------------------------

/// Rule referential stored in the `rules` table.
///
/// Each mutation runs in one transaction together with the version bump.
#[derive(Clone)]
pub struct PgReferentialStore {
    pool: DbPool,
}

impl PgReferentialStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReferentialStore for PgReferentialStore {
    async fn is_empty(&self, tenant: TenantId) -> Result<bool, DependencyError> {
        RuleRepo::exists_any(&self.pool, tenant)
            .await
            .map(|any| !any)
            .map_err(db_error(REFERENTIAL))
    }

    async fn find_all(&self, tenant: TenantId) -> Result<Vec<RuleRecord>, DependencyError> {
        let rows = RuleRepo::list(&self.pool, tenant)
            .await
            .map_err(db_error(REFERENTIAL))?;
        to_records(rows)
    }

    async fn find_by_id(
        &self,
        tenant: TenantId,
        rule_id: &str,
    ) -> Result<Option<RuleRecord>, DependencyError> {
        let row = RuleRepo::find_by_rule_id(&self.pool, tenant, rule_id)
            .await
            .map_err(db_error(REFERENTIAL))?;
        Ok(to_records(row.into_iter().collect())?.pop())
    }

    async fn find_by_query(
        &self,
        tenant: TenantId,
        query: &RuleQuery,
    ) -> Result<Vec<RuleRecord>, DependencyError> {
        let rows = RuleRepo::find_by_query(&self.pool, tenant, query)
            .await
            .map_err(db_error(REFERENTIAL))?;
        to_records(rows)
    }

    async fn insert_batch(
        &self,
        tenant: TenantId,
        records: &[RuleRecord],
    ) -> Result<ReferentialVersion, DependencyError> {
        let map = db_error(REFERENTIAL);
        let mut tx = self.pool.begin().await.map_err(&map)?;
        RuleRepo::insert_many(&mut tx, tenant, records)
            .await
            .map_err(&map)?;
        let version = RuleRepo::bump_version(&mut tx, tenant).await.map_err(&map)?;
        tx.commit().await.map_err(&map)?;

        tracing::debug!(tenant, version, inserted = records.len(), "Rule batch inserted");
        Ok(version)
    }

    async fn apply_diff(
        &self,
        tenant: TenantId,
        diff: &RuleDiff,
    ) -> Result<ReferentialVersion, DependencyError> {
        let map = db_error(REFERENTIAL);
        let mut tx = self.pool.begin().await.map_err(&map)?;

        RuleRepo::delete_by_rule_ids(&mut tx, tenant, &diff.delete_ids())
            .await
            .map_err(&map)?;
        for record in &diff.to_update {
            let updated = RuleRepo::update(&mut tx, tenant, record).await.map_err(&map)?;
            if updated == 0 {
                return Err(DependencyError::rejected(
                    REFERENTIAL,
                    format!("rule {} vanished during update", record.rule_id),
                ));
            }
        }
        RuleRepo::insert_many(&mut tx, tenant, &diff.to_insert)
            .await
            .map_err(&map)?;
        let version = RuleRepo::bump_version(&mut tx, tenant).await.map_err(&map)?;
        tx.commit().await.map_err(&map)?;

        tracing::debug!(
            tenant,
            version,
            inserted = diff.to_insert.len(),
            updated = diff.to_update.len(),
            deleted = diff.to_delete.len(),
            "Rule diff applied",
        );
        Ok(version)
    }
}

// ---------------------------------------------------------------------------
// Audit log
// ---------------------------------------------------------------------------

/// Audit log stored in `audit_operations` / `audit_events`.
#[derive(Clone)]
pub struct PgAuditLog {
    pool: DbPool,
}

impl PgAuditLog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load(&self, row: AuditOperationRow) -> Result<AuditOperation, DependencyError> {
        let events = AuditRepo::list_events(&self.pool, row.operation_id)
            .await
            .map_err(db_error(AUDIT_LOG))?
            .into_iter()
            .map(|r| AuditEvent::try_from(r).map_err(|e| DependencyError::rejected(AUDIT_LOG, e.to_string())))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(AuditOperation {
            operation_id: row.operation_id,
            tenant: row.tenant,
            event_type: row.event_type,
            events,
        })
    }
}

#[async_trait]
impl AuditLogService for PgAuditLog {
    async fn create(&self, event: &AuditEvent) -> Result<(), DependencyError> {
        let map = db_error(AUDIT_LOG);
        let mut tx = self.pool.begin().await.map_err(&map)?;
        AuditRepo::insert_operation(&mut tx, event).await.map_err(&map)?;
        AuditRepo::insert_event(&mut tx, event).await.map_err(&map)?;
        tx.commit().await.map_err(&map)
    }

    async fn update(&self, event: &AuditEvent) -> Result<(), DependencyError> {
        let mut conn = self.pool.acquire().await.map_err(db_error(AUDIT_LOG))?;
        AuditRepo::insert_event(&mut conn, event)
            .await
            .map_err(db_error(AUDIT_LOG))
    }

    async fn select_latest(
        &self,
        event_type: &str,
        tenant: TenantId,
    ) -> Result<Option<AuditOperation>, DependencyError> {
        let row = AuditRepo::find_latest_operation(&self.pool, event_type, tenant)
            .await
            .map_err(db_error(AUDIT_LOG))?;
        match row {
            Some(row) => self.load(row).await.map(Some),
            None => Ok(None),
        }
    }

    async fn find_operation(
        &self,
        operation_id: OperationId,
    ) -> Result<Option<AuditOperation>, DependencyError> {
        let row = AuditRepo::find_operation(&self.pool, operation_id)
            .await
            .map_err(db_error(AUDIT_LOG))?;
        match row {
            Some(row) => self.load(row).await.map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_timeout_maps_to_timeout() {
        let err = db_error(AUDIT_LOG)(sqlx::Error::PoolTimedOut);
        assert_eq!(err, DependencyError::Timeout { service: AUDIT_LOG });
    }

    #[test]
    fn missing_row_maps_to_unavailable() {
        let err = db_error(REFERENTIAL)(sqlx::Error::RowNotFound);
        assert_eq!(err.service(), REFERENTIAL);
        assert!(matches!(err, DependencyError::Unavailable { .. }));
    }
}
