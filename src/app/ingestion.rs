//! Block ingestion loop.
//!
//! One cycle reads the cursor, fetches the next block range from the node,
//! verifies its linkage to what is already stored, decodes and builds the
//! records and commits them together with the cursor advance.

use std::env;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info, instrument, warn};

use crate::domain::{
    AppError, BlockHeader, ChainError, ChainNode, ConfigError, EventKind, IndexerStore, LogFilter,
    RawLog, SyncCursor, build_range,
};

use super::reorg::ReorgRoller;
use super::worker::{Cycle, Tick, WorkerConfig};

/// Ingestion settings
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// First block to ingest
    pub start_block: u64,
    /// Maximum blocks per cycle
    pub batch_blocks: u64,
    /// Deepest reorg handled automatically, also the retention of the block view
    pub max_reorg_depth: u64,
    /// Concurrent header requests
    pub header_concurrency: usize,
    /// Contract addresses whose logs are ingested
    pub contracts: Vec<String>,
    pub worker: WorkerConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            start_block: 0,
            batch_blocks: 100,
            max_reorg_depth: 1000,
            header_concurrency: 8,
            contracts: Vec::new(),
            worker: WorkerConfig::new(true, 5, 10),
        }
    }
}

impl SyncConfig {
    /// Load from `SYNC_*` environment variables, contracts are left empty
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let parse = |key: &str, default: u64| {
            env::var(key)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(default)
        };
        let enabled = env::var("ENABLE_SYNC")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(true);

        Self {
            start_block: parse("SYNC_START_BLOCK", defaults.start_block),
            batch_blocks: parse("SYNC_BATCH_BLOCKS", defaults.batch_blocks).max(1),
            max_reorg_depth: parse("SYNC_MAX_REORG_DEPTH", defaults.max_reorg_depth),
            header_concurrency: parse(
                "SYNC_HEADER_CONCURRENCY",
                defaults.header_concurrency as u64,
            )
            .max(1) as usize,
            contracts: Vec::new(),
            worker: WorkerConfig::new(
                enabled,
                parse("SYNC_IDLE_SECS", 5),
                parse("SYNC_RETRY_SECS", 10),
            ),
        }
    }
}

/// Validate a `0x`-prefixed 20-byte contract address and normalize it to lowercase
pub fn parse_contract_address(key: &str, value: &str) -> Result<String, ConfigError> {
    let invalid = |message: &str| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("{}: {}", message, value),
    };
    let digits = value
        .strip_prefix("0x")
        .ok_or_else(|| invalid("address must start with 0x"))?;
    if digits.len() != 40 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid("address must be 20 hex-encoded bytes"));
    }
    Ok(value.to_lowercase())
}

/// What one ingestion cycle did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Head reached, nothing to fetch
    CaughtUp,
    /// Blocks `from..=to` committed
    Ingested { from: u64, to: u64, records: usize },
    /// The local view diverged and was rolled back to `ancestor`
    RolledBack {
        fork_point: u64,
        ancestor: Option<u64>,
    },
}

pub struct Syncer {
    store: Arc<dyn IndexerStore>,
    node: Arc<dyn ChainNode>,
    roller: ReorgRoller,
    config: SyncConfig,
}

impl Syncer {
    #[must_use]
    pub fn new(store: Arc<dyn IndexerStore>, node: Arc<dyn ChainNode>, config: SyncConfig) -> Self {
        let roller = ReorgRoller::new(
            Arc::clone(&store),
            Arc::clone(&node),
            config.start_block,
            config.max_reorg_depth,
        );
        Self {
            store,
            node,
            roller,
            config,
        }
    }

    /// Persisted cursor, or the genesis cursor before the first commit
    pub async fn cursor(&self) -> Result<SyncCursor, AppError> {
        Ok(self
            .store
            .load_cursor()
            .await?
            .unwrap_or_else(|| SyncCursor::genesis(self.config.start_block)))
    }

    /// Run one ingestion cycle
    #[instrument(skip(self))]
    pub async fn sync_once(&self) -> Result<SyncOutcome, AppError> {
        let cursor = self.cursor().await?;
        let head = self.node.head_block().await?;
        let from = cursor.next_block();

        if head.number < from {
            if let Some(number) = cursor.block_number {
                if head.number.saturating_add(self.config.max_reorg_depth) < number {
                    return Err(AppError::Consistency(format!(
                        "cursor {} is more than {} blocks ahead of node head {}",
                        number, self.config.max_reorg_depth, head.number
                    )));
                }
                if let Some(hash) = &cursor.block_hash {
                    let remote = self.node.block_header(number).await?;
                    if remote.as_ref().map(|h| &h.hash) != Some(hash) {
                        return self.roll_back(&cursor).await;
                    }
                }
            }
            return Ok(SyncOutcome::CaughtUp);
        }

        let to = head
            .number
            .min(from.saturating_add(self.config.batch_blocks.max(1) - 1));
        let mut headers = self.fetch_headers(from, to).await?;

        if let (Some(hash), Some(first)) = (&cursor.block_hash, headers.first())
            && first.parent_hash != *hash
        {
            return self.roll_back(&cursor).await;
        }

        let (to, logs) = self.fetch_logs(from, to).await?;
        headers.truncate((to - from + 1) as usize);
        let batch = build_range(headers, &logs)?;
        let records = batch.record_count();

        self.store
            .commit_range(&cursor, &batch, self.config.max_reorg_depth)
            .await?;

        info!(
            from,
            to,
            submissions = batch.submissions.len(),
            da_submissions = batch.da_submissions.len(),
            da_verifications = batch.da_verifications.len(),
            rewards = batch.rewards.len(),
            "Committed block range"
        );
        Ok(SyncOutcome::Ingested { from, to, records })
    }

    /// Logs for `from..=to`, halving the range while the node rejects it.
    /// Returns the upper bound actually covered.
    async fn fetch_logs(&self, from: u64, to: u64) -> Result<(u64, Vec<RawLog>), AppError> {
        let mut to = to;
        loop {
            let filter = LogFilter {
                from_block: from,
                to_block: to,
                addresses: self.config.contracts.clone(),
                topics: EventKind::ALL.iter().map(|k| k.topic()).collect(),
            };
            match self.node.fetch_logs(&filter).await {
                Ok(logs) => return Ok((to, logs)),
                Err(AppError::Chain(ChainError::RangeTooLarge(message))) if to > from => {
                    let narrowed = from + (to - from) / 2;
                    warn!(from, to, narrowed, error = %message, "Node rejected log range, narrowing");
                    to = narrowed;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn roll_back(&self, cursor: &SyncCursor) -> Result<SyncOutcome, AppError> {
        let rollback = self.roller.roll_back(cursor).await?;
        Ok(SyncOutcome::RolledBack {
            fork_point: rollback.fork_point,
            ancestor: rollback.ancestor.block_number,
        })
    }

    /// Headers `from..=to`, checked to be present and internally linked
    async fn fetch_headers(&self, from: u64, to: u64) -> Result<Vec<BlockHeader>, AppError> {
        let fetched: Vec<Option<BlockHeader>> = stream::iter(from..=to)
            .map(|number| self.node.block_header(number))
            .buffered(self.config.header_concurrency)
            .try_collect()
            .await?;
        debug!(from, to, "Fetched block headers");

        let mut headers: Vec<BlockHeader> = Vec::with_capacity(fetched.len());
        for (number, header) in (from..=to).zip(fetched) {
            let header = header.ok_or_else(|| {
                ChainError::Inconsistent(format!("block {} below head is missing", number))
            })?;
            if header.number != number {
                return Err(ChainError::Inconsistent(format!(
                    "requested block {}, node returned {}",
                    number, header.number
                ))
                .into());
            }
            if let Some(parent) = headers.last()
                && header.parent_hash != parent.hash
            {
                return Err(ChainError::Inconsistent(format!(
                    "block {} does not link to block {}",
                    number, parent.number
                ))
                .into());
            }
            headers.push(header);
        }
        Ok(headers)
    }
}

#[async_trait]
impl Cycle for Syncer {
    fn name(&self) -> &'static str {
        "sync"
    }

    async fn run_once(&self) -> Result<Tick, AppError> {
        match self.sync_once().await? {
            SyncOutcome::CaughtUp => Ok(Tick::Idle),
            _ => Ok(Tick::Progress),
        }
    }
}
