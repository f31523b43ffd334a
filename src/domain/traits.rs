//! Domain traits defining contracts for external systems.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};

use super::error::AppError;
use super::types::{
    AddressStat, BlockHeader, FileInfo, FinalityUpdate, IntervalType, LogFilter, MinerStat,
    PendingSubmission, RangeBatch, RawLog, RollbackSummary, StatQuery, StatWindow, SubmitStat,
    SyncCursor, WindowStats,
};

/// Remote chain node
#[async_trait]
pub trait ChainNode: Send + Sync {
    /// Check RPC connectivity
    async fn health_check(&self) -> Result<(), AppError> {
        self.head_block().await.map(|_| ())
    }

    /// Latest block of the canonical chain
    async fn head_block(&self) -> Result<BlockHeader, AppError>;

    /// Canonical block at `number`, `None` if the node does not have it
    async fn block_header(&self, number: u64) -> Result<Option<BlockHeader>, AppError>;

    /// Logs matching the filter over the inclusive block range
    async fn fetch_logs(&self, filter: &LogFilter) -> Result<Vec<RawLog>, AppError>;
}

/// Source of truth for submission finality (the storage node)
#[async_trait]
pub trait FinalityOracle: Send + Sync {
    /// File status by submission index, `None` if the node does not know it yet
    async fn file_info(&self, submission_index: u64) -> Result<Option<FileInfo>, AppError>;
}

/// Transactional persistence port.
///
/// Each mutating method runs in exactly one database transaction.
#[async_trait]
pub trait IndexerStore: Send + Sync {
    /// Check database connectivity
    async fn health_check(&self) -> Result<(), AppError>;

    // ------------------------------------------------------------------
    // Ingestion
    // ------------------------------------------------------------------

    /// Last persisted cursor, `None` before the first commit
    async fn load_cursor(&self) -> Result<Option<SyncCursor>, AppError>;

    /// Locally recorded canonical block at `number`
    async fn block(&self, number: u64) -> Result<Option<BlockHeader>, AppError>;

    /// Persist a block range and advance the cursor to its last header.
    ///
    /// Fails with `DatabaseError::CursorConflict` when the stored cursor no
    /// longer equals `expected`. Blocks more than `retain_blocks` below the
    /// new cursor are pruned.
    async fn commit_range(
        &self,
        expected: &SyncCursor,
        batch: &RangeBatch,
        retain_blocks: u64,
    ) -> Result<(), AppError>;

    /// Delete everything at or above `fork_point` and move the cursor to `ancestor`
    async fn rollback(
        &self,
        fork_point: u64,
        ancestor: &SyncCursor,
    ) -> Result<RollbackSummary, AppError>;

    // ------------------------------------------------------------------
    // Finality
    // ------------------------------------------------------------------

    /// Submissions below `Finalized` with index greater than `after`, ascending
    async fn pending_submissions(
        &self,
        after: Option<u64>,
        limit: i64,
    ) -> Result<Vec<PendingSubmission>, AppError>;

    /// Apply forward-only status updates; returns the number of rows changed
    async fn apply_finality(&self, updates: &[FinalityUpdate]) -> Result<u64, AppError>;

    // ------------------------------------------------------------------
    // Statistics
    // ------------------------------------------------------------------

    /// Earliest block time across submissions and rewards
    async fn earliest_record_time(&self) -> Result<Option<DateTime<Utc>>, AppError>;

    /// Start of the latest stored bucket of this interval type
    async fn latest_stat_time(
        &self,
        interval: IntervalType,
    ) -> Result<Option<DateTime<Utc>>, AppError>;

    /// Aggregate source rows over one window
    async fn compute_window(&self, window: &StatWindow) -> Result<WindowStats, AppError>;

    /// Insert or fully replace the rollups of one bucket.
    ///
    /// The cursor is read in the same transaction as the write. Returns
    /// `false` without writing when the bucket is no longer settled by
    /// `safety_margin`, e.g. after a rollback that raced the computation.
    async fn save_window(
        &self,
        stats: &WindowStats,
        safety_margin: TimeDelta,
    ) -> Result<bool, AppError>;

    // ------------------------------------------------------------------
    // Read side
    // ------------------------------------------------------------------

    async fn list_submit_stats(
        &self,
        query: &StatQuery,
    ) -> Result<(u64, Vec<SubmitStat>), AppError>;

    async fn list_address_stats(
        &self,
        query: &StatQuery,
    ) -> Result<(u64, Vec<AddressStat>), AppError>;

    async fn list_miner_stats(&self, query: &StatQuery) -> Result<(u64, Vec<MinerStat>), AppError>;

    async fn latest_submit_stat(
        &self,
        interval: IntervalType,
    ) -> Result<Option<SubmitStat>, AppError>;
}
