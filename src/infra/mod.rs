//! Infrastructure layer implementations.

pub mod chain;
pub mod database;

pub use chain::{EvmRpcClient, JsonRpcClient, RpcClientConfig, StorageNodeClient};
pub use database::{PostgresClient, PostgresConfig};
