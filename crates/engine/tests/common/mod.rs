//! Shared fixture: an importer wired to in-memory collaborators.

#![allow(dead_code)]

use std::sync::Arc;

use rulesref_core::audit::{AuditOperation, StatusCode};
use rulesref_engine::memory::{
    MemoryArchiveUnitStore, MemoryAuditLog, MemoryObjectStorage, MemoryRecomputationTrigger,
    MemoryReferentialStore, MemoryWorkspace,
};
use rulesref_engine::{EngineConfig, EnginePorts, ImportRequest, RulesImporter};

pub const TENANT: i32 = 0;

pub const HEADER: &str = "RuleId,RuleType,RuleValue,RuleDuration,RuleDescription,RuleMeasurement\n";

pub struct Harness {
    pub referential: Arc<MemoryReferentialStore>,
    pub units: Arc<MemoryArchiveUnitStore>,
    pub audit_log: Arc<MemoryAuditLog>,
    pub workspace: Arc<MemoryWorkspace>,
    pub storage: Arc<MemoryObjectStorage>,
    pub trigger: Arc<MemoryRecomputationTrigger>,
    pub importer: RulesImporter,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let referential = Arc::new(MemoryReferentialStore::default());
        let units = Arc::new(MemoryArchiveUnitStore::default());
        let audit_log = Arc::new(MemoryAuditLog::default());
        let workspace = Arc::new(MemoryWorkspace::default());
        let storage = Arc::new(MemoryObjectStorage::new(workspace.clone()));
        let trigger = Arc::new(MemoryRecomputationTrigger::default());

        let importer = RulesImporter::new(
            EnginePorts {
                referential: referential.clone(),
                archive_units: units.clone(),
                audit_log: audit_log.clone(),
                workspace: workspace.clone(),
                storage: storage.clone(),
                recomputation: trigger.clone(),
            },
            config,
        );

        Self {
            referential,
            units,
            audit_log,
            workspace,
            storage,
            trigger,
            importer,
        }
    }

    pub async fn rule_ids(&self) -> Vec<String> {
        self.referential
            .rules(TENANT)
            .await
            .into_iter()
            .map(|r| r.rule_id)
            .collect()
    }

    pub async fn import_operations(&self) -> Vec<AuditOperation> {
        self.audit_log.operations_of_type("STP_IMPORT_RULES").await
    }

    pub async fn last_import(&self) -> AuditOperation {
        self.import_operations()
            .await
            .pop()
            .expect("an import operation was recorded")
    }
}

pub fn rule_file(rows: &[&str]) -> Vec<u8> {
    let mut file = HEADER.to_string();
    for row in rows {
        file.push_str(row);
        file.push('\n');
    }
    file.into_bytes()
}

pub fn request(rows: &[&str]) -> ImportRequest {
    ImportRequest {
        tenant: TENANT,
        file_name: "rules.csv".into(),
        content: rule_file(rows),
        request_id: "req-1".into(),
    }
}

/// `(event_type, status)` of every event of an operation.
pub fn phases(op: &AuditOperation) -> Vec<(String, StatusCode)> {
    op.events
        .iter()
        .map(|e| (e.event_type.clone(), e.status))
        .collect()
}
