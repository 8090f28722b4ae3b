//! Shared CSV ingestion domain primitives.
//!
//! This crate owns the row transform, the deployment naming contract, and the
//! error taxonomy. It intentionally excludes AWS SDK and Lambda runtime
//! concerns so both the function and the deploy tool can depend on it.

pub mod contract;
pub mod error;
pub mod record;
pub mod storage_keys;
