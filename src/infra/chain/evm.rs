//! EVM chain node client built on an `ethers` HTTP provider.

use std::future::Future;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ethers::providers::{Http, Middleware, Provider, ProviderError, RpcError};
use ethers::types::{Block, BlockNumber, Filter, H160, H256, Log, U64};
use serde_json::error::Category;
use tracing::{debug, instrument};

use crate::domain::{
    AppError, BlockHeader, ChainError, ChainNode, ConfigError, LogFilter, RawLog,
};

use super::rpc::{RpcClientConfig, with_retries};

/// Node messages for `eth_getLogs` spans or result sets the node will never serve
const RANGE_REJECTIONS: [&str; 6] = [
    "query returned more than",
    "block range",
    "range too large",
    "range is too large",
    "too many blocks",
    "response size",
];

fn invalid(message: String) -> AppError {
    AppError::Chain(ChainError::InvalidResponse(message))
}

fn provider_error(err: ProviderError) -> AppError {
    if let Some(rpc) = err.as_error_response() {
        return AppError::Chain(ChainError::Rpc {
            code: rpc.code,
            message: rpc.message.clone(),
        });
    }
    if let Some(serde) = err.as_serde_error() {
        // A body that is not JSON at all comes from a proxy or an overloaded node
        return match serde.classify() {
            Category::Syntax | Category::Eof | Category::Io => {
                AppError::Chain(ChainError::Connection(serde.to_string()))
            }
            Category::Data => invalid(serde.to_string()),
        };
    }
    AppError::Chain(ChainError::Connection(err.to_string()))
}

fn is_range_rejection(message: &str) -> bool {
    let message = message.to_lowercase();
    RANGE_REJECTIONS.iter().any(|hint| message.contains(hint))
}

fn hex_hash(hash: &H256) -> String {
    format!("{:#x}", hash)
}

impl TryFrom<Block<H256>> for BlockHeader {
    type Error = AppError;

    fn try_from(block: Block<H256>) -> Result<Self, Self::Error> {
        let number = block
            .number
            .ok_or_else(|| invalid("Block without a number".to_string()))?;
        let hash = block
            .hash
            .ok_or_else(|| invalid(format!("Block {} without a hash", number)))?;
        let timestamp = i64::try_from(block.timestamp)
            .ok()
            .and_then(|s| DateTime::<Utc>::from_timestamp(s, 0))
            .ok_or_else(|| invalid(format!("Invalid block timestamp {}", block.timestamp)))?;
        Ok(BlockHeader {
            number: number.as_u64(),
            hash: hex_hash(&hash),
            parent_hash: hex_hash(&block.parent_hash),
            timestamp,
        })
    }
}

impl TryFrom<Log> for RawLog {
    type Error = AppError;

    fn try_from(log: Log) -> Result<Self, Self::Error> {
        let missing = |field: &str| invalid(format!("Mined log without {}", field));
        let log_index = log.log_index.ok_or_else(|| missing("logIndex"))?;
        if log_index > u64::MAX.into() {
            return Err(invalid(format!("logIndex {} out of range", log_index)));
        }
        Ok(RawLog {
            address: format!("{:#x}", log.address),
            topics: log.topics.iter().map(|t| t.0).collect(),
            data: log.data.to_vec(),
            block_number: log.block_number.ok_or_else(|| missing("blockNumber"))?.as_u64(),
            block_hash: hex_hash(&log.block_hash.ok_or_else(|| missing("blockHash"))?),
            tx_hash: hex_hash(&log.transaction_hash.ok_or_else(|| missing("transactionHash"))?),
            log_index: log_index.as_u64(),
        })
    }
}

/// Chain node reached through a standard Ethereum JSON-RPC endpoint
pub struct EvmRpcClient {
    provider: Provider<Http>,
    config: RpcClientConfig,
}

impl EvmRpcClient {
    pub fn new(rpc_url: &str, config: RpcClientConfig) -> Result<Self, AppError> {
        let provider = Provider::<Http>::try_from(rpc_url).map_err(|e| {
            AppError::Config(ConfigError::InvalidValue {
                key: "CHAIN_RPC_URL".to_string(),
                message: e.to_string(),
            })
        })?;
        Ok(Self { provider, config })
    }

    pub fn with_defaults(rpc_url: &str) -> Result<Self, AppError> {
        Self::new(rpc_url, RpcClientConfig::default())
    }

    /// One provider request bounded by the configured timeout
    async fn request<T>(
        &self,
        method: &str,
        request: impl Future<Output = Result<T, ProviderError>>,
    ) -> Result<T, AppError> {
        tokio::time::timeout(self.config.timeout, request)
            .await
            .map_err(|_| {
                AppError::Chain(ChainError::Timeout(format!(
                    "{} after {:?}",
                    method, self.config.timeout
                )))
            })?
            .map_err(provider_error)
    }

    async fn block(&self, id: BlockNumber) -> Result<Option<BlockHeader>, AppError> {
        let method = "eth_getBlockByNumber";
        with_retries(&self.config, method, move || {
            self.request(method, self.provider.get_block(id))
        })
        .await?
        .map(BlockHeader::try_from)
        .transpose()
    }

    fn filter(filter: &LogFilter) -> Result<Filter, AppError> {
        let mut out = Filter::new()
            .from_block(filter.from_block)
            .to_block(filter.to_block);
        if !filter.addresses.is_empty() {
            let addresses = filter
                .addresses
                .iter()
                .map(|a| H160::from_str(a).map_err(|e| invalid(format!("{}: {}", a, e))))
                .collect::<Result<Vec<_>, _>>()?;
            out = out.address(addresses);
        }
        if !filter.topics.is_empty() {
            out = out.topic0(filter.topics.iter().map(|t| H256(*t)).collect::<Vec<_>>());
        }
        Ok(out)
    }
}

#[async_trait]
impl ChainNode for EvmRpcClient {
    #[instrument(skip(self))]
    async fn head_block(&self) -> Result<BlockHeader, AppError> {
        self.block(BlockNumber::Latest)
            .await?
            .ok_or_else(|| invalid("Node returned no latest block".to_string()))
    }

    #[instrument(skip(self))]
    async fn block_header(&self, number: u64) -> Result<Option<BlockHeader>, AppError> {
        self.block(BlockNumber::Number(U64::from(number))).await
    }

    #[instrument(skip(self, filter), fields(from = filter.from_block, to = filter.to_block))]
    async fn fetch_logs(&self, filter: &LogFilter) -> Result<Vec<RawLog>, AppError> {
        let query = &Self::filter(filter)?;
        let method = "eth_getLogs";
        let logs = with_retries(&self.config, method, move || async move {
            match self.request(method, self.provider.get_logs(query)).await {
                Err(AppError::Chain(ChainError::Rpc { message, .. }))
                    if is_range_rejection(&message) =>
                {
                    Err(AppError::Chain(ChainError::RangeTooLarge(message)))
                }
                other => other,
            }
        })
        .await?;

        let mut out = Vec::with_capacity(logs.len());
        for log in logs {
            if log.removed == Some(true) {
                debug!(tx_hash = ?log.transaction_hash, "Skipping removed log");
                continue;
            }
            out.push(RawLog::try_from(log)?);
        }
        out.sort_by_key(|l| (l.block_number, l.log_index));
        Ok(out)
    }
}
