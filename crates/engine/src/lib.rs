//! Rule referential import engine.
//!
//! [`RulesImporter`] is the entry point. Collaborators are injected through
//! [`EnginePorts`]; [`memory`] provides in-memory implementations and
//! [`postgres_stores`] the database-backed referential and audit log.

pub mod audit_trail;
pub mod config;
pub mod importer;
pub mod memory;
pub mod securisator;
pub mod telemetry;
pub mod usage;

use std::sync::Arc;

use rulesref_core::ports::{AuditLogService, ReferentialStore};
use rulesref_db::{DbPool, PgAuditLog, PgReferentialStore};

pub use audit_trail::AuditTrailManager;
pub use config::{ConfigError, EngineConfig};
pub use importer::{EnginePorts, ImportOutcome, ImportRequest, RecomputationOutcome, RulesImporter};
pub use securisator::{SecuredFile, Securisator};
pub use usage::UsageClassifier;

/// Referential store and audit log backed by the given pool.
pub fn postgres_stores(pool: DbPool) -> (Arc<dyn ReferentialStore>, Arc<dyn AuditLogService>) {
    (
        Arc::new(PgReferentialStore::new(pool.clone())),
        Arc::new(PgAuditLog::new(pool)),
    )
}
