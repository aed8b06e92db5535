/// All database primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Tenant identifier. Referential contents and import state are scoped per tenant.
pub type TenantId = i32;

/// Identifier of an audited operation, minted once when an import starts.
pub type OperationId = uuid::Uuid;

/// Mint a new, time-ordered operation identifier.
pub fn new_operation_id() -> OperationId {
    uuid::Uuid::now_v7()
}
