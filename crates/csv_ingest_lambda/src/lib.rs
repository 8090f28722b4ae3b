//! S3-triggered CSV ingestion function.
//!
//! This crate owns runtime integration details (the Lambda handler, batched
//! table writes, and storage adapters). Row transformation rules live in
//! `csv_ingest_core`.

pub mod adapters;
pub mod config;
pub mod handlers;
