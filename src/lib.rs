//! Contract event indexer for a decentralized storage network.
//!
//! Three independent loops share one PostgreSQL store: block ingestion with
//! reorg handling, submission finality tracking and time-bucketed statistics.
//! A read-only HTTP API serves the rollups.

pub mod api;
pub mod app;
pub mod domain;
pub mod infra;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
