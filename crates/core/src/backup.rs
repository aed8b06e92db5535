//! Snapshot of a tenant's committed referential, archived after each import.

use serde::{Deserialize, Serialize};

use crate::ports::ReferentialVersion;
use crate::rules::RuleRecord;
use crate::types::{OperationId, TenantId, Timestamp};

/// The whole collection plus its version counter, as stored under
/// [`DataCategory::Backup`](crate::ports::DataCategory::Backup).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReferentialBackup {
    pub tenant: TenantId,
    pub version: ReferentialVersion,
    pub import_operation_id: OperationId,
    pub taken_at: Timestamp,
    pub rules: Vec<RuleRecord>,
}

impl ReferentialBackup {
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
