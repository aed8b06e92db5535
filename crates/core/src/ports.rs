//! Interfaces of the external collaborators the import engine talks to.
//!
//! Every collaborator is reached through one of these traits and injected as
//! an `Arc<dyn _>`, so tests can swap in in-memory fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::audit::{AuditEvent, AuditOperation};
use crate::diff::RuleDiff;
use crate::error::DependencyError;
use crate::rules::{RuleRecord, RuleType};
use crate::types::{OperationId, TenantId};

/// Monotonic referential version of a tenant, bumped on every mutation.
pub type ReferentialVersion = i64;

/// Storage category of a permanently stored object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataCategory {
    /// Securised rule files.
    Rules,
    /// Import reports.
    Report,
    /// Snapshots of a committed referential.
    Backup,
}

impl DataCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rules => "RULES",
            Self::Report => "REPORT",
            Self::Backup => "BACKUP",
        }
    }
}

/// Filter for [`ReferentialStore::find_by_query`]. Empty filters match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleQuery {
    pub rule_type: Option<RuleType>,
    pub rule_ids: Option<Vec<String>>,
}

impl RuleQuery {
    pub fn matches(&self, record: &RuleRecord) -> bool {
        self.rule_type.is_none_or(|t| t == record.rule_type)
            && self
                .rule_ids
                .as_ref()
                .is_none_or(|ids| ids.iter().any(|id| *id == record.rule_id))
    }
}

/// Archive units that reference rules.
#[async_trait]
pub trait ArchiveUnitStore: Send + Sync {
    /// Number of archive units of `tenant` referencing `rule`.
    async fn count_units_referencing(
        &self,
        tenant: TenantId,
        rule: &RuleRecord,
    ) -> Result<u64, DependencyError>;
}

/// Persisted rule referential.
#[async_trait]
pub trait ReferentialStore: Send + Sync {
    async fn is_empty(&self, tenant: TenantId) -> Result<bool, DependencyError>;

    /// Snapshot of the referential, in a stable order.
    async fn find_all(&self, tenant: TenantId) -> Result<Vec<RuleRecord>, DependencyError>;

    async fn find_by_id(
        &self,
        tenant: TenantId,
        rule_id: &str,
    ) -> Result<Option<RuleRecord>, DependencyError>;

    async fn find_by_query(
        &self,
        tenant: TenantId,
        query: &RuleQuery,
    ) -> Result<Vec<RuleRecord>, DependencyError>;

    /// Insert a whole batch atomically and return the new version.
    async fn insert_batch(
        &self,
        tenant: TenantId,
        records: &[RuleRecord],
    ) -> Result<ReferentialVersion, DependencyError>;

    /// Apply inserts, updates and deletes atomically and return the new version.
    async fn apply_diff(
        &self,
        tenant: TenantId,
        diff: &RuleDiff,
    ) -> Result<ReferentialVersion, DependencyError>;
}

/// Append-only audit log.
#[async_trait]
pub trait AuditLogService: Send + Sync {
    /// Create an operation from its root (STARTED) event.
    async fn create(&self, event: &AuditEvent) -> Result<(), DependencyError>;

    /// Append an event to an existing operation.
    async fn update(&self, event: &AuditEvent) -> Result<(), DependencyError>;

    /// Most recent operation of `event_type` for the tenant.
    async fn select_latest(
        &self,
        event_type: &str,
        tenant: TenantId,
    ) -> Result<Option<AuditOperation>, DependencyError>;

    async fn find_operation(
        &self,
        operation_id: OperationId,
    ) -> Result<Option<AuditOperation>, DependencyError>;
}

/// Temporary staging area.
#[async_trait]
pub trait WorkspaceService: Send + Sync {
    async fn create_container(&self, container: &str) -> Result<(), DependencyError>;

    async fn put_object(
        &self,
        container: &str,
        path: &str,
        content: Vec<u8>,
    ) -> Result<(), DependencyError>;

    async fn delete_container(&self, container: &str) -> Result<(), DependencyError>;
}

/// Request to move a staged object into permanent storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreRequest {
    pub tenant: TenantId,
    pub strategy: String,
    pub category: DataCategory,
    pub container: String,
    pub workspace_path: String,
    pub object_name: String,
    pub description: String,
}

/// Long-term object storage.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Copy a workspace object into permanent storage, returning the digest
    /// computed by the storage side.
    async fn store_from_workspace(&self, request: &StoreRequest) -> Result<String, DependencyError>;
}

/// Entry point of the archive-unit recomputation workflow.
#[async_trait]
pub trait RecomputationTrigger: Send + Sync {
    /// Start the workflow. Fire-and-forget: the workflow audits its own outcome.
    async fn initiate(
        &self,
        tenant: TenantId,
        operation_id: OperationId,
        request_id: &str,
    ) -> Result<(), DependencyError>;
}
