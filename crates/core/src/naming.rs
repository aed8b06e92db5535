//! Naming conventions for objects written to storage.

use crate::types::{OperationId, TenantId, Timestamp};

/// Workspace path of the rules-to-apply artifact read by the recomputation
/// workflow.
pub const UPDATED_RULES_OBJECT: &str = "Processing/updatedRules.json";

/// Generate the permanent filename of a securised rule file.
///
/// Convention: `{tenant}_rules_v{version}_{YYYYMMDD_HHMMSS}.{ext}`
///
/// # Examples
///
/// ```
/// use rulesref_core::naming::securised_filename;
/// use chrono::TimeZone;
///
/// let at = chrono::Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 0).unwrap();
/// assert_eq!(securised_filename(2, 7, at, "csv"), "2_rules_v7_20240309_140500.csv");
/// ```
pub fn securised_filename(tenant: TenantId, version: i64, at: Timestamp, extension: &str) -> String {
    format!(
        "{tenant}_rules_v{version}_{}.{}",
        at.format("%Y%m%d_%H%M%S"),
        extension.trim_start_matches('.').to_lowercase()
    )
}

/// Permanent name of a referential snapshot:
/// `{tenant}_rules_backup_v{version}_{YYYYMMDD_HHMMSS}.json`.
pub fn backup_filename(tenant: TenantId, version: i64, at: Timestamp) -> String {
    format!("{tenant}_rules_backup_v{version}_{}.json", at.format("%Y%m%d_%H%M%S"))
}

/// Object name of the import report for an operation.
pub fn report_object_name(operation_id: OperationId) -> String {
    format!("{operation_id}.json")
}

/// Workspace container used while securising a file.
pub fn securisation_container(operation_id: OperationId) -> String {
    format!("securisation-{operation_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn filename_encodes_tenant_version_and_time() {
        let at = chrono::Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap();
        assert_eq!(securised_filename(0, 1, at, ".CSV"), "0_rules_v1_20231231_235959.csv");
    }

    #[test]
    fn backup_name_encodes_version() {
        let at = chrono::Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(backup_filename(7, 12, at), "7_rules_backup_v12_20240102_030405.json");
    }

    #[test]
    fn report_name_uses_operation_id() {
        assert_eq!(
            report_object_name(uuid::Uuid::nil()),
            "00000000-0000-0000-0000-000000000000.json"
        );
    }
}
