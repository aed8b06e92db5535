//! End-to-end tests of the reconciliation path.

mod common;

use assert_matches::assert_matches;
use common::{phases, request, Harness, TENANT};
use rulesref_core::audit::{event_types, verify_chain, StatusCode};
use rulesref_core::backup::ReferentialBackup;
use rulesref_core::error::{ImportError, ValidationError};
use rulesref_core::naming::UPDATED_RULES_OBJECT;
use rulesref_core::ports::DataCategory;
use rulesref_core::rules::RuleDuration;

const R1: &str = "R1,StorageRule,v,3,d,YEAR";
const R2: &str = "R2,AccessRule,w,10,d,DAY";

fn event(event_type: &str, status: StatusCode) -> (String, StatusCode) {
    (event_type.to_string(), status)
}

/// A harness whose referential already holds R1 and R2 at version 1.
async fn seeded() -> Harness {
    let h = Harness::new();
    h.importer
        .bootstrap_import(request(&[R1, R2]))
        .await
        .unwrap();
    h
}

#[tokio::test]
async fn duration_change_is_committed_and_recomputed() {
    let h = seeded().await;
    let outcome = h
        .importer
        .reconcile_import(request(&["R1,StorageRule,v,5,d,YEAR", R2]))
        .await
        .unwrap();

    assert_eq!(outcome.status, StatusCode::Ok);
    assert_eq!(outcome.version, 2);
    assert_eq!(outcome.counts.nb_updated, 1);
    assert_eq!(outcome.counts.nb_inserted, 0);
    assert_eq!(outcome.counts.nb_deleted, 0);
    assert_eq!(outcome.report.file_rules_updated, vec!["R1"]);

    let op = h.last_import().await;
    assert_eq!(
        phases(&op),
        vec![
            event(event_types::STP_IMPORT_RULES, StatusCode::Started),
            event(event_types::CHECK_RULES, StatusCode::Ok),
            event(event_types::COMMIT_RULES, StatusCode::Ok),
            event(event_types::STP_IMPORT_RULES, StatusCode::Ok),
        ]
    );
    let commit = op.event(event_types::COMMIT_RULES).unwrap();
    assert_eq!(commit.detail.as_ref().unwrap()["nbUpdated"], 1);

    let recomputation = outcome.recomputation.unwrap();
    assert!(recomputation.initiated);
    assert_eq!(recomputation.rule_ids, vec!["R1"]);
    assert_eq!(
        h.trigger.initiated().await,
        vec![(TENANT, recomputation.operation_id, "req-1".to_string())]
    );

    let artifact = h
        .workspace
        .object(&recomputation.operation_id.to_string(), UPDATED_RULES_OBJECT)
        .await
        .unwrap();
    let artifact: serde_json::Value = serde_json::from_slice(&artifact).unwrap();
    assert_eq!(artifact.as_array().unwrap().len(), 1);
    assert_eq!(artifact[0]["RuleId"], "R1");

    // Closed later by the workflow itself.
    let update_op = h.audit_log.operation(recomputation.operation_id).await.unwrap();
    assert_eq!(update_op.event_type, event_types::UPDATE_RULES_ARCHIVE_UNITS);
    assert_eq!(update_op.outcome(), None);
    assert_eq!(update_op.last_event().map(|e| e.status), Some(StatusCode::Started));
}

#[tokio::test]
async fn backup_holds_reconciled_collection() {
    let h = seeded().await;
    let outcome = h
        .importer
        .reconcile_import(request(&["R1,StorageRule,v,5,d,YEAR", "R3,ReuseRule,x,1,d,MONTH"]))
        .await
        .unwrap();
    assert_eq!(outcome.status, StatusCode::Ok);

    let backups = h.storage.objects(DataCategory::Backup).await;
    assert_eq!(backups.len(), 2);
    let snapshot = ReferentialBackup::from_json_bytes(&backups[1].content).unwrap();
    assert_eq!(snapshot.version, 2);
    let rules: Vec<_> = snapshot
        .rules
        .iter()
        .map(|r| (r.rule_id.as_str(), r.rule_duration))
        .collect();
    assert_eq!(
        rules,
        vec![("R1", RuleDuration::Finite(5)), ("R3", RuleDuration::Finite(1))]
    );
    assert_eq!(outcome.backup.unwrap().file_name, backups[1].object_name);
}

#[tokio::test]
async fn description_change_of_unused_rule_needs_no_recomputation() {
    let h = seeded().await;
    let outcome = h
        .importer
        .reconcile_import(request(&["R1,StorageRule,v,3,other,YEAR", R2]))
        .await
        .unwrap();
    assert_eq!(outcome.counts.nb_updated, 1);
    assert!(outcome.recomputation.is_none());
    assert!(h.trigger.initiated().await.is_empty());
}

#[tokio::test]
async fn used_rule_with_safe_change_is_still_recomputed() {
    let h = seeded().await;
    h.units.set_references(TENANT, "R2", 4).await;
    let outcome = h
        .importer
        .reconcile_import(request(&[R1, "R2,AccessRule,w,10,renamed,DAY"]))
        .await
        .unwrap();

    assert_eq!(outcome.report.used_file_rules_to_update, vec!["R2"]);
    assert_eq!(outcome.recomputation.unwrap().rule_ids, vec!["R2"]);

    let check = h.last_import().await.event(event_types::CHECK_RULES).cloned().unwrap();
    assert_eq!(check.detail.unwrap()["usedUpdatedRuleIds"][0], "R2");
}

#[tokio::test]
async fn creation_date_survives_update() {
    let h = seeded().await;
    let before = h.referential.rules(TENANT).await;
    h.importer
        .reconcile_import(request(&["R1,StorageRule,v,5,d,YEAR", R2]))
        .await
        .unwrap();
    let after = h.referential.rules(TENANT).await;

    let created = |rules: &[rulesref_core::rules::RuleRecord]| {
        rules.iter().find(|r| r.rule_id == "R1").unwrap().creation_date
    };
    assert_eq!(created(&before), created(&after));
}

#[tokio::test]
async fn deleting_a_referenced_rule_is_refused() {
    let h = seeded().await;
    h.units.set_references(TENANT, "R2", 1).await;

    let err = h
        .importer
        .reconcile_import(request(&[R1, "R3,ReuseRule,x,1,d,MONTH"]))
        .await
        .unwrap_err();
    assert_matches!(&err, ImportError::UsageConflict { rule_ids } if rule_ids == &["R2"]);

    let mut ids = h.rule_ids().await;
    ids.sort();
    assert_eq!(ids, vec!["R1", "R2"]);
    assert_eq!(h.referential.version(TENANT).await, 1);

    let op = h.last_import().await;
    assert_eq!(
        phases(&op),
        vec![
            event(event_types::STP_IMPORT_RULES, StatusCode::Started),
            event(event_types::CHECK_RULES, StatusCode::Ko),
            event(event_types::STP_IMPORT_RULES, StatusCode::Ko),
        ]
    );
    let check = op.event(event_types::CHECK_RULES).cloned().unwrap();
    assert_eq!(check.detail.unwrap()["usedFileRulesToDelete"][0], "R2");

    let reports = h.storage.objects(DataCategory::Report).await;
    let report: serde_json::Value =
        serde_json::from_slice(&reports.last().unwrap().content).unwrap();
    assert_eq!(report["UsedFileRulesToDelete"][0], "R2");
    assert_eq!(report["FileRulesInserted"].as_array().map(Vec::len), Some(0));

    // Only the seeding import was backed up.
    assert_eq!(h.storage.objects(DataCategory::Backup).await.len(), 1);
}

#[tokio::test]
async fn unreferenced_rule_is_deleted() {
    let h = seeded().await;
    let outcome = h
        .importer
        .reconcile_import(request(&[R1]))
        .await
        .unwrap();
    assert_eq!(outcome.counts.nb_deleted, 1);
    assert_eq!(h.rule_ids().await, vec!["R1"]);

    let check = h.last_import().await.event(event_types::CHECK_RULES).cloned().unwrap();
    assert_eq!(check.detail.unwrap()["deletedRuleIds"][0], "R2");
}

#[tokio::test]
async fn identical_file_still_bumps_version() {
    let h = seeded().await;
    let outcome = h
        .importer
        .reconcile_import(request(&[R1, R2]))
        .await
        .unwrap();
    assert_eq!(outcome.version, 2);
    assert_eq!(outcome.counts, Default::default());
    assert!(outcome.recomputation.is_none());
}

#[tokio::test]
async fn invalid_file_aborts_before_check() {
    let h = seeded().await;
    let err = h
        .importer
        .reconcile_import(request(&[R1, "R2,AccessRule,w,ten,d,DAY"]))
        .await
        .unwrap_err();
    assert_matches!(err, ImportError::Validation(ValidationError::InvalidRow { line: 3, .. }));

    let op = h.last_import().await;
    assert!(op.event(event_types::CHECK_RULES).is_none());
    assert_eq!(op.outcome(), Some(StatusCode::Ko));
}

#[tokio::test]
async fn usage_lookup_failure_is_recorded_as_check_ko() {
    let h = seeded().await;
    h.units.set_failing(true);
    let err = h
        .importer
        .reconcile_import(request(&[R1]))
        .await
        .unwrap_err();
    assert_matches!(err, ImportError::Dependency(_));

    let op = h.last_import().await;
    assert_eq!(
        op.event(event_types::CHECK_RULES).map(|e| e.status),
        Some(StatusCode::Ko)
    );
    assert_eq!(h.rule_ids().await.len(), 2);
}

#[tokio::test]
async fn commit_failure_closes_ko_with_zero_counts() {
    let h = seeded().await;
    h.referential.set_failing_writes(true);
    let err = h
        .importer
        .reconcile_import(request(&[R1]))
        .await
        .unwrap_err();
    assert_matches!(err, ImportError::Dependency(_));

    let op = h.last_import().await;
    assert_eq!(
        phases(&op),
        vec![
            event(event_types::STP_IMPORT_RULES, StatusCode::Started),
            event(event_types::CHECK_RULES, StatusCode::Ok),
            event(event_types::COMMIT_RULES, StatusCode::Ko),
            event(event_types::STP_IMPORT_RULES, StatusCode::Ko),
        ]
    );
    let commit = op.event(event_types::COMMIT_RULES).cloned().unwrap();
    assert_eq!(commit.detail.unwrap()["nbDeleted"], 0);
    assert_eq!(h.referential.version(TENANT).await, 1);
}

#[tokio::test]
async fn commit_failure_during_audit_outage_is_fatal() {
    let h = seeded().await;
    h.referential.set_failing_writes(true);
    h.audit_log.set_failing_writes(true);
    h.importer
        .reconcile_import(request(&[R1]))
        .await
        .unwrap_err();

    let reports = h.storage.objects(DataCategory::Report).await;
    let report: serde_json::Value =
        serde_json::from_slice(&reports.last().unwrap().content).unwrap();
    assert_eq!(report["Operation"]["outcome"], "FATAL");
}

#[tokio::test]
async fn recomputation_failure_keeps_import_successful() {
    let h = seeded().await;
    h.trigger.set_failing(true);
    let outcome = h
        .importer
        .reconcile_import(request(&["R1,StorageRule,v,5,d,YEAR", R2]))
        .await
        .unwrap();

    assert_eq!(outcome.status, StatusCode::Ok);
    let recomputation = outcome.recomputation.unwrap();
    assert!(!recomputation.initiated);
    let update_op = h.audit_log.operation(recomputation.operation_id).await.unwrap();
    assert_eq!(update_op.outcome(), Some(StatusCode::Ko));
}

#[tokio::test]
async fn storage_failure_after_commit_is_warning() {
    let h = seeded().await;
    h.storage.set_failing(true);
    let outcome = h
        .importer
        .reconcile_import(request(&[R1]))
        .await
        .unwrap();
    assert_eq!(outcome.status, StatusCode::Warning);
    assert_eq!(h.rule_ids().await, vec!["R1"]);
    assert_eq!(h.last_import().await.outcome(), Some(StatusCode::Warning));
}

#[tokio::test]
async fn second_import_is_refused_while_first_is_open() {
    let h = seeded().await;
    let stuck = uuid::Uuid::now_v7();
    h.importer
        .audit_trail()
        .open(stuck, TENANT, event_types::STP_IMPORT_RULES, "stuck", None)
        .await;

    let err = h
        .importer
        .reconcile_import(request(&[R1]))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("already a rule file import in progress"));
    assert_eq!(h.rule_ids().await.len(), 2);
}

#[tokio::test]
async fn every_operation_chain_verifies() {
    let h = seeded().await;
    h.importer
        .reconcile_import(request(&["R1,StorageRule,v,5,d,YEAR"]))
        .await
        .unwrap();

    for op in h.audit_log.operations().await {
        assert_eq!(verify_chain(&op.events), None, "{}", op.event_type);
    }
}
