//! In-memory implementations of every collaborator port.
//!
//! Intended for tests and embedding. Each store can be switched into a
//! failing mode to exercise the engine's error paths.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rulesref_core::audit::{AuditEvent, AuditOperation};
use rulesref_core::diff::RuleDiff;
use rulesref_core::error::DependencyError;
use rulesref_core::hashing::sha256_hex;
use rulesref_core::ports::{
    ArchiveUnitStore, AuditLogService, DataCategory, ObjectStorage, RecomputationTrigger,
    ReferentialStore, ReferentialVersion, RuleQuery, StoreRequest, WorkspaceService,
};
use rulesref_core::rules::RuleRecord;
use rulesref_core::types::{OperationId, TenantId};
use tokio::sync::Mutex;

fn check(flag: &AtomicBool, service: &'static str) -> Result<(), DependencyError> {
    if flag.load(Ordering::SeqCst) {
        Err(DependencyError::unavailable(service, "injected failure"))
    } else {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Referential
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct TenantReferential {
    version: ReferentialVersion,
    rules: Vec<RuleRecord>,
}

#[derive(Debug, Default)]
pub struct MemoryReferentialStore {
    tenants: Mutex<HashMap<TenantId, TenantReferential>>,
    failing_reads: AtomicBool,
    failing_writes: AtomicBool,
}

impl MemoryReferentialStore {
    const SERVICE: &'static str = "referential store";

    pub fn set_failing_reads(&self, failing: bool) {
        self.failing_reads.store(failing, Ordering::SeqCst);
    }

    pub fn set_failing_writes(&self, failing: bool) {
        self.failing_writes.store(failing, Ordering::SeqCst);
    }

    pub async fn version(&self, tenant: TenantId) -> ReferentialVersion {
        self.tenants
            .lock()
            .await
            .get(&tenant)
            .map_or(0, |t| t.version)
    }

    /// Snapshot without failure injection.
    pub async fn rules(&self, tenant: TenantId) -> Vec<RuleRecord> {
        self.tenants
            .lock()
            .await
            .get(&tenant)
            .map(|t| t.rules.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ReferentialStore for MemoryReferentialStore {
    async fn is_empty(&self, tenant: TenantId) -> Result<bool, DependencyError> {
        check(&self.failing_reads, Self::SERVICE)?;
        Ok(self.rules(tenant).await.is_empty())
    }

    async fn find_all(&self, tenant: TenantId) -> Result<Vec<RuleRecord>, DependencyError> {
        check(&self.failing_reads, Self::SERVICE)?;
        Ok(self.rules(tenant).await)
    }

    async fn find_by_id(
        &self,
        tenant: TenantId,
        rule_id: &str,
    ) -> Result<Option<RuleRecord>, DependencyError> {
        check(&self.failing_reads, Self::SERVICE)?;
        Ok(self
            .rules(tenant)
            .await
            .into_iter()
            .find(|r| r.rule_id == rule_id))
    }

    async fn find_by_query(
        &self,
        tenant: TenantId,
        query: &RuleQuery,
    ) -> Result<Vec<RuleRecord>, DependencyError> {
        check(&self.failing_reads, Self::SERVICE)?;
        Ok(self
            .rules(tenant)
            .await
            .into_iter()
            .filter(|r| query.matches(r))
            .collect())
    }

    async fn insert_batch(
        &self,
        tenant: TenantId,
        records: &[RuleRecord],
    ) -> Result<ReferentialVersion, DependencyError> {
        check(&self.failing_writes, Self::SERVICE)?;
        let mut tenants = self.tenants.lock().await;
        let referential = tenants.entry(tenant).or_default();
        if let Some(dup) = records
            .iter()
            .find(|r| referential.rules.iter().any(|e| e.rule_id == r.rule_id))
        {
            return Err(DependencyError::rejected(
                Self::SERVICE,
                format!("rule {} already exists", dup.rule_id),
            ));
        }
        referential.rules.extend_from_slice(records);
        referential.version += 1;
        Ok(referential.version)
    }

    async fn apply_diff(
        &self,
        tenant: TenantId,
        diff: &RuleDiff,
    ) -> Result<ReferentialVersion, DependencyError> {
        check(&self.failing_writes, Self::SERVICE)?;
        let mut tenants = self.tenants.lock().await;
        let referential = tenants.entry(tenant).or_default();

        // Applied to a copy so a rejected diff leaves the referential untouched.
        let deleted = diff.delete_ids();
        let mut rules = referential.rules.clone();
        rules.retain(|r| !deleted.contains(&r.rule_id));
        for update in &diff.to_update {
            match rules.iter_mut().find(|r| r.rule_id == update.rule_id) {
                Some(existing) => *existing = update.clone(),
                None => {
                    return Err(DependencyError::rejected(
                        Self::SERVICE,
                        format!("rule {} vanished during update", update.rule_id),
                    ))
                }
            }
        }
        rules.extend_from_slice(&diff.to_insert);
        referential.rules = rules;
        referential.version += 1;
        Ok(referential.version)
    }
}

// ---------------------------------------------------------------------------
// Archive units
// ---------------------------------------------------------------------------

/// Archive-unit reference counts keyed by tenant and rule id.
#[derive(Debug, Default)]
pub struct MemoryArchiveUnitStore {
    references: Mutex<HashMap<(TenantId, String), u64>>,
    failing: AtomicBool,
}

impl MemoryArchiveUnitStore {
    pub async fn set_references(&self, tenant: TenantId, rule_id: &str, units: u64) {
        self.references
            .lock()
            .await
            .insert((tenant, rule_id.to_string()), units);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl ArchiveUnitStore for MemoryArchiveUnitStore {
    async fn count_units_referencing(
        &self,
        tenant: TenantId,
        rule: &RuleRecord,
    ) -> Result<u64, DependencyError> {
        check(&self.failing, "archive unit store")?;
        Ok(self
            .references
            .lock()
            .await
            .get(&(tenant, rule.rule_id.clone()))
            .copied()
            .unwrap_or(0))
    }
}

// ---------------------------------------------------------------------------
// Audit log
// ---------------------------------------------------------------------------

/// Audit log keeping operations in creation order.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    operations: Mutex<Vec<AuditOperation>>,
    failing_reads: AtomicBool,
    failing_writes: AtomicBool,
}

impl MemoryAuditLog {
    const SERVICE: &'static str = "audit log";

    pub fn set_failing_reads(&self, failing: bool) {
        self.failing_reads.store(failing, Ordering::SeqCst);
    }

    pub fn set_failing_writes(&self, failing: bool) {
        self.failing_writes.store(failing, Ordering::SeqCst);
    }

    pub async fn operation(&self, operation_id: OperationId) -> Option<AuditOperation> {
        self.operations
            .lock()
            .await
            .iter()
            .find(|op| op.operation_id == operation_id)
            .cloned()
    }

    pub async fn operations(&self) -> Vec<AuditOperation> {
        self.operations.lock().await.clone()
    }

    /// Operations of a given root event type, oldest first.
    pub async fn operations_of_type(&self, event_type: &str) -> Vec<AuditOperation> {
        self.operations
            .lock()
            .await
            .iter()
            .filter(|op| op.event_type == event_type)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AuditLogService for MemoryAuditLog {
    async fn create(&self, event: &AuditEvent) -> Result<(), DependencyError> {
        check(&self.failing_writes, Self::SERVICE)?;
        let mut operations = self.operations.lock().await;
        if operations.iter().any(|op| op.operation_id == event.operation_id) {
            return Err(DependencyError::rejected(
                Self::SERVICE,
                format!("operation {} already exists", event.operation_id),
            ));
        }
        operations.push(AuditOperation {
            operation_id: event.operation_id,
            tenant: event.tenant,
            event_type: event.event_type.clone(),
            events: vec![event.clone()],
        });
        Ok(())
    }

    async fn update(&self, event: &AuditEvent) -> Result<(), DependencyError> {
        check(&self.failing_writes, Self::SERVICE)?;
        let mut operations = self.operations.lock().await;
        let operation = operations
            .iter_mut()
            .find(|op| op.operation_id == event.operation_id)
            .ok_or_else(|| {
                DependencyError::rejected(
                    Self::SERVICE,
                    format!("operation {} does not exist", event.operation_id),
                )
            })?;
        operation.events.push(event.clone());
        Ok(())
    }

    async fn select_latest(
        &self,
        event_type: &str,
        tenant: TenantId,
    ) -> Result<Option<AuditOperation>, DependencyError> {
        check(&self.failing_reads, Self::SERVICE)?;
        Ok(self
            .operations
            .lock()
            .await
            .iter()
            .rev()
            .find(|op| op.tenant == tenant && op.event_type == event_type)
            .cloned())
    }

    async fn find_operation(
        &self,
        operation_id: OperationId,
    ) -> Result<Option<AuditOperation>, DependencyError> {
        check(&self.failing_reads, Self::SERVICE)?;
        Ok(self.operation(operation_id).await)
    }
}

// ---------------------------------------------------------------------------
// Workspace & object storage
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryWorkspace {
    containers: Mutex<BTreeMap<String, BTreeMap<String, Vec<u8>>>>,
    failing: AtomicBool,
}

impl MemoryWorkspace {
    const SERVICE: &'static str = "workspace";

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn containers(&self) -> Vec<String> {
        self.containers.lock().await.keys().cloned().collect()
    }

    pub async fn object(&self, container: &str, path: &str) -> Option<Vec<u8>> {
        self.containers
            .lock()
            .await
            .get(container)
            .and_then(|objects| objects.get(path))
            .cloned()
    }
}

#[async_trait]
impl WorkspaceService for MemoryWorkspace {
    async fn create_container(&self, container: &str) -> Result<(), DependencyError> {
        check(&self.failing, Self::SERVICE)?;
        self.containers
            .lock()
            .await
            .entry(container.to_string())
            .or_default();
        Ok(())
    }

    async fn put_object(
        &self,
        container: &str,
        path: &str,
        content: Vec<u8>,
    ) -> Result<(), DependencyError> {
        check(&self.failing, Self::SERVICE)?;
        let mut containers = self.containers.lock().await;
        let objects = containers.get_mut(container).ok_or_else(|| {
            DependencyError::rejected(Self::SERVICE, format!("no container {container}"))
        })?;
        objects.insert(path.to_string(), content);
        Ok(())
    }

    async fn delete_container(&self, container: &str) -> Result<(), DependencyError> {
        check(&self.failing, Self::SERVICE)?;
        self.containers.lock().await.remove(container);
        Ok(())
    }
}

/// An object held by [`MemoryObjectStorage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub tenant: TenantId,
    pub strategy: String,
    pub category: DataCategory,
    pub object_name: String,
    pub description: String,
    pub digest: String,
    pub content: Vec<u8>,
}

/// Permanent storage that copies objects out of a [`MemoryWorkspace`].
#[derive(Debug)]
pub struct MemoryObjectStorage {
    workspace: Arc<MemoryWorkspace>,
    objects: Mutex<Vec<StoredObject>>,
    failing: AtomicBool,
}

impl MemoryObjectStorage {
    pub fn new(workspace: Arc<MemoryWorkspace>) -> Self {
        Self {
            workspace,
            objects: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn objects(&self, category: DataCategory) -> Vec<StoredObject> {
        self.objects
            .lock()
            .await
            .iter()
            .filter(|o| o.category == category)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ObjectStorage for MemoryObjectStorage {
    async fn store_from_workspace(&self, request: &StoreRequest) -> Result<String, DependencyError> {
        check(&self.failing, "object storage")?;
        let content = self
            .workspace
            .object(&request.container, &request.workspace_path)
            .await
            .ok_or_else(|| {
                DependencyError::rejected(
                    "object storage",
                    format!("{}/{} not found in workspace", request.container, request.workspace_path),
                )
            })?;
        let digest = sha256_hex(&content);
        self.objects.lock().await.push(StoredObject {
            tenant: request.tenant,
            strategy: request.strategy.clone(),
            category: request.category,
            object_name: request.object_name.clone(),
            description: request.description.clone(),
            digest: digest.clone(),
            content,
        });
        Ok(digest)
    }
}

// ---------------------------------------------------------------------------
// Recomputation trigger
// ---------------------------------------------------------------------------

/// Records initiation calls instead of running a workflow.
#[derive(Debug, Default)]
pub struct MemoryRecomputationTrigger {
    initiated: Mutex<Vec<(TenantId, OperationId, String)>>,
    failing: AtomicBool,
}

impl MemoryRecomputationTrigger {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn initiated(&self) -> Vec<(TenantId, OperationId, String)> {
        self.initiated.lock().await.clone()
    }
}

#[async_trait]
impl RecomputationTrigger for MemoryRecomputationTrigger {
    async fn initiate(
        &self,
        tenant: TenantId,
        operation_id: OperationId,
        request_id: &str,
    ) -> Result<(), DependencyError> {
        check(&self.failing, "recomputation workflow")?;
        self.initiated
            .lock()
            .await
            .push((tenant, operation_id, request_id.to_string()));
        Ok(())
    }
}
