//! Importer: sequences validation, diffing, usage checks, the referential
//! mutation, audit phases, securisation and the recomputation hand-off.
//!
//! Two mutating operations exist. [`RulesImporter::bootstrap_import`] loads a
//! first referential into an empty tenant; [`RulesImporter::reconcile_import`]
//! replaces an existing one after checking every change against archive-unit
//! usage. [`RulesImporter::check_import`] runs the same checks as a dry run.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use rulesref_core::audit::{
    detail_value, event_types, CheckRulesDetail, CommitRulesDetail, EnvelopeDetail,
    RecomputationDetail, StatusCode,
};
use rulesref_core::diff::{diff_rules, RuleDiff};
use rulesref_core::backup::ReferentialBackup;
use rulesref_core::error::{DependencyError, ImportError, PreconditionError};
use rulesref_core::hashing::sha256_hex;
use rulesref_core::ports::{
    ArchiveUnitStore, AuditLogService, ObjectStorage, RecomputationTrigger, ReferentialStore,
    ReferentialVersion, WorkspaceService,
};
use rulesref_core::report::ImportReport;
use rulesref_core::rules::RuleRecord;
use rulesref_core::types::{new_operation_id, OperationId, TenantId, Timestamp};
use rulesref_core::usage::{recomputation_rule_ids, UsageReport};
use rulesref_core::validation::validate_rule_file;

use crate::audit_trail::AuditTrailManager;
use crate::config::EngineConfig;
use crate::securisator::{SecureRequest, SecuredFile, Securisator};
use crate::usage::UsageClassifier;

const DEFAULT_EXTENSION: &str = "csv";

/// Every external collaborator the importer needs.
#[derive(Clone)]
pub struct EnginePorts {
    pub referential: Arc<dyn ReferentialStore>,
    pub archive_units: Arc<dyn ArchiveUnitStore>,
    pub audit_log: Arc<dyn AuditLogService>,
    pub workspace: Arc<dyn WorkspaceService>,
    pub storage: Arc<dyn ObjectStorage>,
    pub recomputation: Arc<dyn RecomputationTrigger>,
}

/// A submitted rule file.
#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub tenant: TenantId,
    pub file_name: String,
    pub content: Vec<u8>,
    /// Caller request id, forwarded to the recomputation workflow.
    pub request_id: String,
}

impl ImportRequest {
    fn extension(&self) -> &str {
        Path::new(&self.file_name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or(DEFAULT_EXTENSION)
    }
}

/// Initiation of the archive-unit recomputation workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecomputationOutcome {
    pub operation_id: OperationId,
    pub rule_ids: Vec<String>,
    /// `false` when staging or initiation failed and the operation was closed KO.
    pub initiated: bool,
}

/// Result of a committed import.
#[derive(Debug, Clone)]
pub struct ImportOutcome {
    pub operation_id: OperationId,
    /// OK, or WARNING when the rules were committed but the file could not be secured.
    pub status: StatusCode,
    pub version: ReferentialVersion,
    pub counts: CommitRulesDetail,
    pub report: ImportReport,
    pub secured_file: Option<SecuredFile>,
    /// Snapshot of the committed referential; `None` when it could not be stored.
    pub backup: Option<SecuredFile>,
    pub recomputation: Option<RecomputationOutcome>,
}

/// Per-call bookkeeping.
struct ImportRun {
    operation_id: OperationId,
    started_at: Timestamp,
    digest: String,
}

pub struct RulesImporter {
    referential: Arc<dyn ReferentialStore>,
    recomputation: Arc<dyn RecomputationTrigger>,
    audit: Arc<AuditTrailManager>,
    usage: UsageClassifier,
    securisator: Securisator,
    config: EngineConfig,
}

impl RulesImporter {
    pub fn new(ports: EnginePorts, config: EngineConfig) -> Self {
        let audit = Arc::new(AuditTrailManager::new(ports.audit_log));
        let securisator = Securisator::new(
            ports.workspace,
            ports.storage,
            audit.clone(),
            config.storage_strategy.clone(),
        );
        Self {
            referential: ports.referential,
            recomputation: ports.recomputation,
            usage: UsageClassifier::new(ports.archive_units),
            audit,
            securisator,
            config,
        }
    }

    pub fn audit_trail(&self) -> &AuditTrailManager {
        &self.audit
    }

    // -----------------------------------------------------------------------
    // Dry run
    // -----------------------------------------------------------------------

    /// Validate, diff and classify usage without writing anything: no audit
    /// operation, no referential change, no stored report.
    ///
    /// A rejected file or a blocking usage conflict is reported in the
    /// returned report with outcome KO. Only collaborator failures are
    /// returned as errors.
    pub async fn check_import(&self, request: ImportRequest) -> Result<ImportReport, ImportError> {
        let started_at = chrono::Utc::now();
        let report = ImportReport::dry_run(new_operation_id(), started_at);

        let records = match validate_rule_file(&request.content, &self.config.validation_policy, started_at) {
            Ok(records) => records,
            Err(e) => {
                tracing::info!(tenant = request.tenant, error = %e, "Rule file check rejected the file");
                let message = e.to_string();
                return Ok(report.with_validation_error(&e).with_outcome(StatusCode::Ko, message));
            }
        };

        let current = self.referential.find_all(request.tenant).await?;
        let diff = diff_rules(Some(&records), Some(&current));
        let usage = self.usage.classify(request.tenant, &diff).await?;
        let report = report.with_diff(&diff, &usage);

        let (status, message) = if usage.blocks_import() {
            let conflict = ImportError::UsageConflict {
                rule_ids: usage.used_and_non_deletable.clone(),
            };
            (StatusCode::Ko, conflict.to_string())
        } else {
            (StatusCode::Ok, "Rule file can be imported".to_string())
        };
        tracing::info!(
            tenant = request.tenant,
            %status,
            inserted = diff.to_insert.len(),
            updated = diff.to_update.len(),
            deleted = diff.to_delete.len(),
            "Rule file checked",
        );
        Ok(report.with_outcome(status, message))
    }

    // -----------------------------------------------------------------------
    // Bootstrap
    // -----------------------------------------------------------------------

    /// Load the first referential of a tenant. Refused when the referential
    /// already holds rules.
    pub async fn bootstrap_import(&self, request: ImportRequest) -> Result<ImportOutcome, ImportError> {
        self.ensure_no_import_in_progress(request.tenant).await?;
        let run = self.begin(&request).await;
        let report = ImportReport::new(run.operation_id, run.started_at);

        let (version, records) = match self.bootstrap_commit(&request, &run).await {
            Ok(committed) => committed,
            Err(e) => return Err(self.abort(&run, &request, report, e).await),
        };

        let counts = CommitRulesDetail {
            nb_inserted: records.len(),
            ..Default::default()
        };
        let report = report.with_inserted(records.iter().map(|r| r.rule_id.clone()).collect());
        Ok(self.finish(run, &request, version, counts, report, None).await)
    }

    async fn bootstrap_commit(
        &self,
        request: &ImportRequest,
        run: &ImportRun,
    ) -> Result<(ReferentialVersion, Vec<RuleRecord>), ImportError> {
        if !self.referential.is_empty(request.tenant).await? {
            return Err(PreconditionError::ReferentialNotEmpty {
                tenant: request.tenant,
            }
            .into());
        }
        let records = validate_rule_file(&request.content, &self.config.validation_policy, run.started_at)?;
        let version = self.referential.insert_batch(request.tenant, &records).await?;
        Ok((version, records))
    }

    // -----------------------------------------------------------------------
    // Reconcile
    // -----------------------------------------------------------------------

    /// Replace a tenant's referential with the submitted file.
    ///
    /// Deleting a rule still referenced by archive units rejects the whole
    /// import before anything is written.
    pub async fn reconcile_import(&self, request: ImportRequest) -> Result<ImportOutcome, ImportError> {
        self.ensure_no_import_in_progress(request.tenant).await?;
        let run = self.begin(&request).await;
        let report = ImportReport::new(run.operation_id, run.started_at);
        let operation_id = run.operation_id;

        let records = match validate_rule_file(
            &request.content,
            &self.config.validation_policy,
            run.started_at,
        ) {
            Ok(records) => records,
            Err(e) => return Err(self.abort(&run, &request, report, e.into()).await),
        };

        let current = match self.referential.find_all(request.tenant).await {
            Ok(current) => current,
            Err(e) => return Err(self.abort(&run, &request, report, e.into()).await),
        };
        let diff = diff_rules(Some(&records), Some(&current));

        let usage = match self.usage.classify(request.tenant, &diff).await {
            Ok(usage) => usage,
            Err(e) => {
                self.audit
                    .record(operation_id, event_types::CHECK_RULES, StatusCode::Ko, &e.to_string(), None)
                    .await;
                return Err(self.abort(&run, &request, report, e.into()).await);
            }
        };
        let report = report.with_diff(&diff, &usage);

        if usage.blocks_import() {
            let detail = CheckRulesDetail {
                deleted_rule_ids: usage.unused_and_deletable.clone(),
                used_updated_rule_ids: usage.used_and_updated.clone(),
                used_file_rules_to_delete: usage.used_and_non_deletable.clone(),
            };
            let error = ImportError::UsageConflict {
                rule_ids: usage.used_and_non_deletable.clone(),
            };
            self.audit
                .record(
                    operation_id,
                    event_types::CHECK_RULES,
                    StatusCode::Ko,
                    &error.to_string(),
                    detail_value(&detail),
                )
                .await;
            return Err(self.abort(&run, &request, report, error).await);
        }

        let detail = CheckRulesDetail {
            deleted_rule_ids: usage.unused_and_deletable.clone(),
            used_updated_rule_ids: usage.used_and_updated.clone(),
            used_file_rules_to_delete: Vec::new(),
        };
        self.audit
            .record(
                operation_id,
                event_types::CHECK_RULES,
                StatusCode::Ok,
                "Rule changes checked against archive unit usage",
                detail_value(&detail),
            )
            .await;

        let counts = CommitRulesDetail {
            nb_deleted: diff.to_delete.len(),
            nb_updated: diff.to_update.len(),
            nb_inserted: diff.to_insert.len(),
        };
        let version = match self.referential.apply_diff(request.tenant, &diff).await {
            Ok(version) => {
                self.audit
                    .record(
                        operation_id,
                        event_types::COMMIT_RULES,
                        StatusCode::Ok,
                        "Rule referential updated",
                        detail_value(&counts),
                    )
                    .await;
                version
            }
            Err(e) => {
                self.audit
                    .record(
                        operation_id,
                        event_types::COMMIT_RULES,
                        StatusCode::Ko,
                        &e.to_string(),
                        detail_value(&CommitRulesDetail::default()),
                    )
                    .await;
                return Err(self.abort(&run, &request, report, e.into()).await);
            }
        };

        tracing::info!(
            %operation_id,
            tenant = request.tenant,
            version,
            inserted = counts.nb_inserted,
            updated = counts.nb_updated,
            deleted = counts.nb_deleted,
            "Rule referential reconciled",
        );

        let recomputation = self
            .hand_off_recomputation(&run, &request, &diff, &usage)
            .await;
        Ok(self
            .finish(run, &request, version, counts, report, recomputation)
            .await)
    }

    /// Open `UPDATE_RULES_ARCHIVE_UNITS`, stage the affected rules and start
    /// the workflow. A failure closes that operation KO but leaves the import
    /// itself successful.
    async fn hand_off_recomputation(
        &self,
        run: &ImportRun,
        request: &ImportRequest,
        diff: &RuleDiff,
        usage: &UsageReport,
    ) -> Option<RecomputationOutcome> {
        let rule_ids: BTreeSet<String> = recomputation_rule_ids(diff, usage);
        if rule_ids.is_empty() {
            return None;
        }
        let rule_ids: Vec<String> = rule_ids.into_iter().collect();

        let update_id = new_operation_id();
        let detail = detail_value(&RecomputationDetail {
            import_operation_id: run.operation_id,
            rule_ids: rule_ids.clone(),
        });
        self.audit
            .open(
                update_id,
                request.tenant,
                event_types::UPDATE_RULES_ARCHIVE_UNITS,
                "Archive unit recomputation requested",
                detail,
            )
            .await;

        let affected: Vec<&RuleRecord> = diff
            .to_update
            .iter()
            .filter(|r| rule_ids.contains(&r.rule_id))
            .collect();

        let result = async {
            let artifact = serde_json::to_vec(&affected).map_err(|e| {
                DependencyError::rejected("recomputation workflow", e.to_string())
            })?;
            self.securisator
                .stage_for_update_workflow(artifact, &update_id.to_string())
                .await?;
            self.recomputation
                .initiate(request.tenant, update_id, &request.request_id)
                .await
        }
        .await;

        let initiated = match result {
            Ok(()) => {
                tracing::info!(%update_id, rules = rule_ids.len(), "Archive unit recomputation initiated");
                self.audit.release(update_id);
                true
            }
            Err(e) => {
                tracing::error!(%update_id, error = %e, "Archive unit recomputation could not be initiated");
                self.audit.close(update_id, StatusCode::Ko, &e.to_string(), None).await;
                false
            }
        };

        Some(RecomputationOutcome {
            operation_id: update_id,
            rule_ids,
            initiated,
        })
    }

    // -----------------------------------------------------------------------
    // Shared steps
    // -----------------------------------------------------------------------

    async fn ensure_no_import_in_progress(&self, tenant: TenantId) -> Result<(), ImportError> {
        if self.audit.is_import_in_progress(tenant).await? {
            tracing::warn!(tenant, "Rule import refused: another import is in progress");
            return Err(PreconditionError::ImportInProgress { tenant }.into());
        }
        Ok(())
    }

    async fn begin(&self, request: &ImportRequest) -> ImportRun {
        let run = ImportRun {
            operation_id: new_operation_id(),
            started_at: chrono::Utc::now(),
            digest: sha256_hex(&request.content),
        };
        tracing::info!(
            operation_id = %run.operation_id,
            tenant = request.tenant,
            file_name = %request.file_name,
            "Rule import started",
        );
        self.audit
            .open(
                run.operation_id,
                request.tenant,
                event_types::STP_IMPORT_RULES,
                "Rule file import started",
                detail_value(&EnvelopeDetail {
                    file_name: request.file_name.clone(),
                    error: None,
                }),
            )
            .await;
        run
    }

    /// Close the envelope KO (FATAL if audit writes failed), archive the
    /// report and hand the error back.
    async fn abort(
        &self,
        run: &ImportRun,
        request: &ImportRequest,
        report: ImportReport,
        error: ImportError,
    ) -> ImportError {
        let message = error.to_string();
        let status = self
            .audit
            .close(
                run.operation_id,
                StatusCode::Ko,
                &message,
                detail_value(&EnvelopeDetail {
                    file_name: request.file_name.clone(),
                    error: Some(message.clone()),
                }),
            )
            .await;
        tracing::warn!(
            operation_id = %run.operation_id,
            tenant = request.tenant,
            %status,
            error = %message,
            "Rule import failed",
        );

        let report = match &error {
            ImportError::Validation(e) => report.with_validation_error(e),
            _ => report,
        }
        .with_outcome(status, message);
        self.securisator.store_report(request.tenant, &report).await;
        error
    }

    /// Secure the file, back up the committed referential, close the
    /// envelope and archive the report.
    async fn finish(
        &self,
        run: ImportRun,
        request: &ImportRequest,
        version: ReferentialVersion,
        counts: CommitRulesDetail,
        report: ImportReport,
        recomputation: Option<RecomputationOutcome>,
    ) -> ImportOutcome {
        let secured_file = if self.config.secure_original_file {
            self.securisator
                .secure(SecureRequest {
                    tenant: request.tenant,
                    version,
                    content: &request.content,
                    extension: request.extension(),
                    import_operation_id: run.operation_id,
                    digest: &run.digest,
                })
                .await
                .ok()
        } else {
            None
        };
        let backup = self.backup(&run, request.tenant, version).await;

        let mut problems = Vec::new();
        if secured_file.is_none() && self.config.secure_original_file {
            problems.push("the original file could not be secured");
        }
        if backup.is_none() {
            problems.push("the referential could not be backed up");
        }
        let (status, message) = if problems.is_empty() {
            (StatusCode::Ok, "Rules imported".to_string())
        } else {
            (
                StatusCode::Warning,
                format!("Rules imported but {}", problems.join(" and ")),
            )
        };
        let status = self
            .audit
            .close(
                run.operation_id,
                status,
                &message,
                detail_value(&EnvelopeDetail {
                    file_name: request.file_name.clone(),
                    error: None,
                }),
            )
            .await;
        tracing::info!(operation_id = %run.operation_id, tenant = request.tenant, version, %status, "Rule import finished");

        let report = report.with_outcome(status, message);
        self.securisator.store_report(request.tenant, &report).await;

        ImportOutcome {
            operation_id: run.operation_id,
            status,
            version,
            counts,
            report,
            secured_file,
            backup,
            recomputation,
        }
    }

    /// Snapshot the referential as committed by this run. Failures are
    /// logged and leave the import committed.
    async fn backup(
        &self,
        run: &ImportRun,
        tenant: TenantId,
        version: ReferentialVersion,
    ) -> Option<SecuredFile> {
        let rules = match self.referential.find_all(tenant).await {
            Ok(rules) => rules,
            Err(e) => {
                tracing::error!(operation_id = %run.operation_id, tenant, error = %e, "Cannot read referential for backup");
                return None;
            }
        };
        let backup = ReferentialBackup {
            tenant,
            version,
            import_operation_id: run.operation_id,
            taken_at: chrono::Utc::now(),
            rules,
        };
        self.securisator.backup_collection(&backup).await.ok()
    }
}
