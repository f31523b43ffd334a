//! Chain node and storage node clients.

pub mod evm;
pub mod rpc;
pub mod storage_node;

pub use evm::EvmRpcClient;
pub use rpc::{JsonRpcClient, RpcClientConfig};
pub use storage_node::StorageNodeClient;
