//! Reorg detection and rollback.
//!
//! The local `blocks` table is the indexer's view of the canonical chain.
//! When the node disagrees with it, the roller walks down from the cursor to
//! the highest block both sides agree on and deletes everything above it.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::domain::{AppError, ChainNode, IndexerStore, RollbackSummary, SyncCursor};

/// Outcome of one rollback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rollback {
    /// Lowest block number whose rows were deleted
    pub fork_point: u64,
    pub ancestor: SyncCursor,
    pub summary: RollbackSummary,
}

pub struct ReorgRoller {
    store: Arc<dyn IndexerStore>,
    node: Arc<dyn ChainNode>,
    genesis: SyncCursor,
    max_depth: u64,
}

impl ReorgRoller {
    #[must_use]
    pub fn new(
        store: Arc<dyn IndexerStore>,
        node: Arc<dyn ChainNode>,
        start_block: u64,
        max_depth: u64,
    ) -> Self {
        Self {
            store,
            node,
            genesis: SyncCursor::genesis(start_block),
            max_depth,
        }
    }

    /// Highest block at or below the cursor whose hash the node still agrees with.
    ///
    /// Walking below the configured start height yields the genesis cursor.
    /// Walking more than `max_depth` blocks, or finding a hole in the local
    /// view, is a consistency violation.
    #[instrument(skip(self, cursor), fields(cursor = ?cursor.block_number))]
    pub async fn find_common_ancestor(&self, cursor: &SyncCursor) -> Result<SyncCursor, AppError> {
        let Some(top) = cursor.block_number else {
            return Ok(self.genesis.clone());
        };
        let floor = top.saturating_sub(self.max_depth);
        let mut number = top;

        loop {
            if self.genesis.block_number.is_some_and(|g| number <= g) {
                return Ok(self.genesis.clone());
            }
            if number < floor {
                return Err(AppError::Consistency(format!(
                    "no common ancestor within {} blocks of {}",
                    self.max_depth, top
                )));
            }

            let local = self.store.block(number).await?.ok_or_else(|| {
                AppError::Consistency(format!("local block {} missing from canonical view", number))
            })?;
            let remote = self.node.block_header(number).await?;
            if remote.is_some_and(|r| r.hash == local.hash) {
                return Ok(SyncCursor::at(&local));
            }
            match number.checked_sub(1) {
                Some(below) => number = below,
                // Even block zero was replaced
                None => return Ok(self.genesis.clone()),
            }
        }
    }

    /// Locate the fork below `cursor` and delete everything above the ancestor
    pub async fn roll_back(&self, cursor: &SyncCursor) -> Result<Rollback, AppError> {
        let ancestor = self.find_common_ancestor(cursor).await?;
        let fork_point = ancestor.next_block();
        warn!(
            cursor = ?cursor.block_number,
            ancestor = ?ancestor.block_number,
            fork_point,
            "Chain reorganisation detected"
        );

        let summary = self.store.rollback(fork_point, &ancestor).await?;
        info!(
            fork_point,
            blocks = summary.blocks,
            submissions = summary.submissions,
            da_submissions = summary.da_submissions,
            da_unverified = summary.da_unverified,
            rewards = summary.rewards,
            rollups = summary.rollups,
            "Rolled back to common ancestor"
        );

        Ok(Rollback {
            fork_point,
            ancestor,
            summary,
        })
    }
}
