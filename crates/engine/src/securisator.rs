//! Securisator: preserves submitted rule files, referential snapshots and
//! import reports in permanent storage, and stages recomputation inputs.

use std::sync::Arc;

use rulesref_core::audit::{
    detail_value, event_types, securisation_event_type, BackupDetail, SecurisationDetail,
    StatusCode,
};
use rulesref_core::backup::ReferentialBackup;
use rulesref_core::error::DependencyError;
use rulesref_core::naming;
use rulesref_core::ports::{
    DataCategory, ObjectStorage, ReferentialVersion, StoreRequest, WorkspaceService,
};
use rulesref_core::hashing::sha256_hex;
use rulesref_core::report::ImportReport;
use rulesref_core::types::{new_operation_id, OperationId, TenantId};

use crate::audit_trail::AuditTrailManager;

/// A rule file to preserve after a successful import.
#[derive(Debug, Clone)]
pub struct SecureRequest<'a> {
    pub tenant: TenantId,
    pub version: ReferentialVersion,
    pub content: &'a [u8],
    pub extension: &'a str,
    pub import_operation_id: OperationId,
    /// SHA-256 of `content`, computed when the file was received.
    pub digest: &'a str,
}

/// Where a secured file ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecuredFile {
    pub operation_id: OperationId,
    pub file_name: String,
    pub digest: String,
}

pub struct Securisator {
    workspace: Arc<dyn WorkspaceService>,
    storage: Arc<dyn ObjectStorage>,
    audit: Arc<AuditTrailManager>,
    strategy: String,
}

impl Securisator {
    pub fn new(
        workspace: Arc<dyn WorkspaceService>,
        storage: Arc<dyn ObjectStorage>,
        audit: Arc<AuditTrailManager>,
        strategy: impl Into<String>,
    ) -> Self {
        Self {
            workspace,
            storage,
            audit,
            strategy: strategy.into(),
        }
    }

    /// Stage the file in a workspace container, then move it to permanent
    /// storage under its versioned name. Audited as its own
    /// `RULES_SECURISATION_<EXT>` operation.
    ///
    /// The staging container is removed only on success; on failure it is
    /// left in place for diagnosis.
    pub async fn secure(&self, request: SecureRequest<'_>) -> Result<SecuredFile, DependencyError> {
        let operation_id = new_operation_id();
        let event_type = securisation_event_type(request.extension);
        let file_name = naming::securised_filename(
            request.tenant,
            request.version,
            chrono::Utc::now(),
            request.extension,
        );
        let detail = detail_value(&SecurisationDetail {
            file_name: file_name.clone(),
            digest: request.digest.to_string(),
            digest_type: "SHA-256".to_string(),
        });

        self.audit
            .open(
                operation_id,
                request.tenant,
                &event_type,
                &format!("Securing rule file of import {}", request.import_operation_id),
                None,
            )
            .await;

        let container = naming::securisation_container(operation_id);
        let stored = self
            .stage_and_store(
                &container,
                &file_name,
                request.content.to_vec(),
                StoreRequest {
                    tenant: request.tenant,
                    strategy: self.strategy.clone(),
                    category: DataCategory::Rules,
                    container: container.clone(),
                    workspace_path: file_name.clone(),
                    object_name: file_name.clone(),
                    description: format!("Rule file version {}", request.version),
                },
            )
            .await;

        match stored {
            Ok(storage_digest) => {
                if storage_digest != request.digest {
                    tracing::warn!(
                        %operation_id,
                        expected = request.digest,
                        actual = %storage_digest,
                        "Stored rule file digest differs from received digest",
                    );
                }
                if let Err(e) = self.workspace.delete_container(&container).await {
                    tracing::warn!(%operation_id, container = %container, error = %e, "Failed to clean up staging container");
                }
                self.audit
                    .close(operation_id, StatusCode::Ok, "Rule file secured", detail)
                    .await;
                tracing::info!(%operation_id, file_name = %file_name, "Rule file secured");
                Ok(SecuredFile {
                    operation_id,
                    file_name,
                    digest: request.digest.to_string(),
                })
            }
            Err(e) => {
                tracing::error!(%operation_id, error = %e, "Failed to secure rule file");
                self.audit
                    .close(operation_id, StatusCode::Ko, &e.to_string(), detail)
                    .await;
                Err(e)
            }
        }
    }

    /// Store a snapshot of the committed collection and its version.
    /// Audited as its own `STP_IMPORT_RULES_BACKUP` operation.
    pub async fn backup_collection(
        &self,
        backup: &ReferentialBackup,
    ) -> Result<SecuredFile, DependencyError> {
        let operation_id = new_operation_id();
        let file_name = naming::backup_filename(backup.tenant, backup.version, backup.taken_at);

        self.audit
            .open(
                operation_id,
                backup.tenant,
                event_types::STP_IMPORT_RULES_BACKUP,
                &format!("Backing up rule referential after import {}", backup.import_operation_id),
                None,
            )
            .await;

        let content = match backup.to_json_bytes() {
            Ok(content) => content,
            Err(e) => {
                let e = DependencyError::rejected("object storage", e.to_string());
                tracing::error!(%operation_id, error = %e, "Failed to serialize referential backup");
                self.audit
                    .close(operation_id, StatusCode::Ko, &e.to_string(), None)
                    .await;
                return Err(e);
            }
        };
        let digest = sha256_hex(&content);
        let detail = detail_value(&BackupDetail {
            file_name: file_name.clone(),
            digest: digest.clone(),
            version: backup.version,
            nb_rules: backup.rules.len(),
        });

        let container = naming::securisation_container(operation_id);
        let stored = self
            .stage_and_store(
                &container,
                &file_name,
                content,
                StoreRequest {
                    tenant: backup.tenant,
                    strategy: self.strategy.clone(),
                    category: DataCategory::Backup,
                    container: container.clone(),
                    workspace_path: file_name.clone(),
                    object_name: file_name.clone(),
                    description: format!("Rule referential version {}", backup.version),
                },
            )
            .await;

        match stored {
            Ok(_) => {
                if let Err(e) = self.workspace.delete_container(&container).await {
                    tracing::warn!(%operation_id, container = %container, error = %e, "Failed to clean up staging container");
                }
                self.audit
                    .close(operation_id, StatusCode::Ok, "Rule referential backed up", detail)
                    .await;
                tracing::info!(%operation_id, file_name = %file_name, rules = backup.rules.len(), "Rule referential backed up");
                Ok(SecuredFile {
                    operation_id,
                    file_name,
                    digest,
                })
            }
            Err(e) => {
                tracing::error!(%operation_id, error = %e, "Failed to back up rule referential");
                self.audit
                    .close(operation_id, StatusCode::Ko, &e.to_string(), detail)
                    .await;
                Err(e)
            }
        }
    }

    /// Copy the rules-to-apply artifact to the well-known location read by the
    /// recomputation workflow. Not audited.
    pub async fn stage_for_update_workflow(
        &self,
        content: Vec<u8>,
        container: &str,
    ) -> Result<(), DependencyError> {
        self.workspace.create_container(container).await?;
        self.workspace
            .put_object(container, naming::UPDATED_RULES_OBJECT, content)
            .await
    }

    /// Archive an import report. Failures are logged only.
    pub async fn store_report(&self, tenant: TenantId, report: &ImportReport) {
        let operation_id = report.operation.ev_id;
        let content = match report.to_json_bytes() {
            Ok(content) => content,
            Err(e) => {
                tracing::error!(%operation_id, error = %e, "Failed to serialize import report");
                return;
            }
        };

        let container = format!("report-{operation_id}");
        let object_name = naming::report_object_name(operation_id);
        let result = self
            .stage_and_store(
                &container,
                &object_name,
                content,
                StoreRequest {
                    tenant,
                    strategy: self.strategy.clone(),
                    category: DataCategory::Report,
                    container: container.clone(),
                    workspace_path: object_name.clone(),
                    object_name: object_name.clone(),
                    description: format!("Import report of operation {operation_id}"),
                },
            )
            .await;

        match result {
            Ok(_) => {
                if let Err(e) = self.workspace.delete_container(&container).await {
                    tracing::warn!(%operation_id, error = %e, "Failed to clean up report container");
                }
            }
            Err(e) => {
                tracing::error!(%operation_id, error = %e, "Failed to store import report");
            }
        }
    }

    async fn stage_and_store(
        &self,
        container: &str,
        path: &str,
        content: Vec<u8>,
        request: StoreRequest,
    ) -> Result<String, DependencyError> {
        self.workspace.create_container(container).await?;
        self.workspace.put_object(container, path, content).await?;
        self.storage.store_from_workspace(&request).await
    }
}
