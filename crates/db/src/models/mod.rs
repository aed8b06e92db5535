pub mod audit;
pub mod rule;
