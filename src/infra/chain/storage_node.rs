//! Storage node client used as the finality oracle.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use crate::domain::{AppError, FileInfo, FinalityOracle};

use super::rpc::{JsonRpcClient, RpcClientConfig};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcFileInfo {
    finalized: bool,
    #[serde(default)]
    uploaded_seg_num: u64,
}

/// Queries `zgs_getFileInfoByTxSeq` on a storage node
pub struct StorageNodeClient {
    rpc: JsonRpcClient,
}

impl StorageNodeClient {
    pub fn new(url: &str, config: RpcClientConfig) -> Result<Self, AppError> {
        Ok(Self {
            rpc: JsonRpcClient::new(url, config)?,
        })
    }

    pub fn with_defaults(url: &str) -> Result<Self, AppError> {
        Self::new(url, RpcClientConfig::default())
    }
}

#[async_trait]
impl FinalityOracle for StorageNodeClient {
    #[instrument(skip(self))]
    async fn file_info(&self, submission_index: u64) -> Result<Option<FileInfo>, AppError> {
        Ok(self
            .rpc
            .call::<RpcFileInfo>("zgs_getFileInfoByTxSeq", json!([submission_index]))
            .await?
            .map(|info| FileInfo {
                finalized: info.finalized,
                uploaded_seg_num: info.uploaded_seg_num,
            }))
    }
}
