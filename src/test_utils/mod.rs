//! Test doubles and log builders shared by unit tests, integration tests and benches.

pub mod logs;
pub mod mocks;

pub use mocks::{MockChainNode, MockConfig, MockFinalityOracle, MockIndexerStore};
