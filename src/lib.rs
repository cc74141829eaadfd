pub mod api;
#[cfg(feature = "audit-log")]
pub mod audit;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod errors;
pub mod ops;
pub mod tamper;
pub mod timesource;
pub mod vault;
