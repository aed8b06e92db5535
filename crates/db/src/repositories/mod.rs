pub mod audit_repo;
pub mod rule_repo;

pub use audit_repo::AuditRepo;
pub use rule_repo::RuleRepo;
