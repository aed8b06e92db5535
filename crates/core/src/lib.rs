pub mod audit;
pub mod backup;
pub mod diff;
pub mod error;
pub mod hashing;
pub mod naming;
pub mod ports;
pub mod report;
pub mod rule_file;
pub mod rules;
pub mod types;
pub mod usage;
pub mod validation;
