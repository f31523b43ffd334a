//! Mock implementations for testing.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::domain::{
    AddressStat, AddressSubmission, AppError, BlockHeader, ChainError, ChainNode, DaKey,
    DaSubmission, DatabaseError, FileInfo, FinalityOracle, FinalityUpdate, IndexerStore,
    IntervalType, LogFilter, MinerStat, PendingSubmission, RangeBatch, RawLog, Reward,
    RollbackSummary, SortOrder, StatQuery, StatWindow, SubmitStat, SubmitStatus, Submission,
    SyncCursor, WindowStats,
};

/// Configuration for mock behavior
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    pub should_fail: bool,
    pub error_message: Option<String>,
}

impl MockConfig {
    #[must_use]
    pub fn success() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            should_fail: true,
            error_message: Some(message.into()),
        }
    }

    fn message(&self) -> String {
        self.error_message
            .clone()
            .unwrap_or_else(|| "Mock error".to_string())
    }
}

// ============================================================================
// STORE
// ============================================================================

#[derive(Debug, Default, Clone)]
struct StoreState {
    cursor: Option<SyncCursor>,
    blocks: BTreeMap<u64, BlockHeader>,
    submissions: BTreeMap<u64, Submission>,
    address_submissions: BTreeMap<(String, u64), AddressSubmission>,
    da_submissions: BTreeMap<DaKey, DaSubmission>,
    rewards: BTreeMap<(u64, u64), Reward>,
    submit_stats: HashMap<(IntervalType, DateTime<Utc>), SubmitStat>,
    address_stats: HashMap<(IntervalType, DateTime<Utc>), AddressStat>,
    miner_stats: HashMap<(IntervalType, DateTime<Utc>), MinerStat>,
}

impl StoreState {
    fn insert_stats(&mut self, stats: WindowStats) {
        let key = (stats.submit.stat_type, stats.submit.stat_time);
        self.submit_stats.insert(key, stats.submit);
        self.address_stats.insert(key, stats.address);
        self.miner_stats.insert(key, stats.miner);
    }
}

/// In-memory store with the same transactional semantics as PostgreSQL
pub struct MockIndexerStore {
    state: Arc<Mutex<StoreState>>,
    config: MockConfig,
    is_healthy: AtomicBool,
    fail_writes: AtomicBool,
}

impl MockIndexerStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(MockConfig::success())
    }

    #[must_use]
    pub fn with_config(config: MockConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState::default())),
            config,
            is_healthy: AtomicBool::new(true),
            fail_writes: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_config(MockConfig::failure(message))
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.is_healthy.store(healthy, Ordering::Relaxed);
    }

    /// Make every mutating call fail with a transient error
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    pub fn cursor(&self) -> Option<SyncCursor> {
        self.state.lock().unwrap().cursor.clone()
    }

    pub fn set_cursor(&self, cursor: SyncCursor) {
        self.state.lock().unwrap().cursor = Some(cursor);
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.state
            .lock()
            .unwrap()
            .submissions
            .values()
            .cloned()
            .collect()
    }

    pub fn submission(&self, index: u64) -> Option<Submission> {
        self.state.lock().unwrap().submissions.get(&index).cloned()
    }

    pub fn address_submissions(&self) -> Vec<AddressSubmission> {
        self.state
            .lock()
            .unwrap()
            .address_submissions
            .values()
            .cloned()
            .collect()
    }

    pub fn da_submissions(&self) -> Vec<DaSubmission> {
        self.state
            .lock()
            .unwrap()
            .da_submissions
            .values()
            .cloned()
            .collect()
    }

    pub fn rewards(&self) -> Vec<Reward> {
        self.state.lock().unwrap().rewards.values().cloned().collect()
    }

    pub fn blocks(&self) -> Vec<BlockHeader> {
        self.state.lock().unwrap().blocks.values().cloned().collect()
    }

    pub fn submit_stats(&self, interval: IntervalType) -> Vec<SubmitStat> {
        let state = self.state.lock().unwrap();
        let mut stats: Vec<SubmitStat> = state
            .submit_stats
            .values()
            .filter(|s| s.stat_type == interval)
            .cloned()
            .collect();
        stats.sort_by_key(|s| s.stat_time);
        stats
    }

    /// Insert a submission directly, bypassing ingestion
    pub fn seed_submission(&self, submission: Submission) {
        let mut state = self.state.lock().unwrap();
        state.address_submissions.insert(
            (submission.sender.clone(), submission.submission_index),
            AddressSubmission::from(&submission),
        );
        state
            .submissions
            .insert(submission.submission_index, submission);
    }

    pub fn seed_reward(&self, reward: Reward) {
        self.state
            .lock()
            .unwrap()
            .rewards
            .insert((reward.block_number, reward.log_index), reward);
    }

    pub fn seed_stats(&self, stats: WindowStats) {
        self.state.lock().unwrap().insert_stats(stats);
    }

    fn check_should_fail(&self) -> Result<(), AppError> {
        if self.config.should_fail {
            return Err(AppError::Database(DatabaseError::Query(
                self.config.message(),
            )));
        }
        Ok(())
    }

    fn check_write(&self) -> Result<(), AppError> {
        self.check_should_fail()?;
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(AppError::Database(DatabaseError::Connection(
                "Mock write failure".to_string(),
            )));
        }
        Ok(())
    }
}

impl Default for MockIndexerStore {
    fn default() -> Self {
        Self::new()
    }
}

fn page<T: Clone>(
    rows: Vec<T>,
    query: &StatQuery,
    time: impl Fn(&T) -> DateTime<Utc>,
) -> (u64, Vec<T>) {
    let mut rows = rows;
    rows.sort_by_key(|r| time(r));
    if query.sort == SortOrder::Desc {
        rows.reverse();
    }
    let total = rows.len() as u64;
    let list = rows
        .into_iter()
        .skip(query.skip.max(0) as usize)
        .take(query.limit.max(0) as usize)
        .collect();
    (total, list)
}

#[async_trait]
impl IndexerStore for MockIndexerStore {
    async fn health_check(&self) -> Result<(), AppError> {
        if !self.is_healthy.load(Ordering::Relaxed) {
            return Err(AppError::Database(DatabaseError::Connection(
                "Unhealthy".to_string(),
            )));
        }
        self.check_should_fail()
    }

    async fn load_cursor(&self) -> Result<Option<SyncCursor>, AppError> {
        self.check_should_fail()?;
        Ok(self.cursor())
    }

    async fn block(&self, number: u64) -> Result<Option<BlockHeader>, AppError> {
        self.check_should_fail()?;
        Ok(self.state.lock().unwrap().blocks.get(&number).cloned())
    }

    async fn commit_range(
        &self,
        expected: &SyncCursor,
        batch: &RangeBatch,
        retain_blocks: u64,
    ) -> Result<(), AppError> {
        self.check_write()?;
        let last = batch
            .headers
            .last()
            .ok_or_else(|| AppError::Internal("Empty block range".to_string()))?;

        let mut guard = self.state.lock().unwrap();
        let matches = match &guard.cursor {
            Some(stored) => stored == expected,
            None => expected.block_hash.is_none(),
        };
        if !matches {
            return Err(AppError::Database(DatabaseError::CursorConflict(format!(
                "expected cursor at {:?}, found {:?}",
                expected.block_number,
                guard.cursor.as_ref().and_then(|c| c.block_number)
            ))));
        }

        // Stage on a copy so a failure leaves nothing behind
        let mut state = guard.clone();
        for header in &batch.headers {
            state.blocks.insert(header.number, header.clone());
        }
        for submission in &batch.submissions {
            state
                .submissions
                .entry(submission.submission_index)
                .or_insert_with(|| submission.clone());
        }
        for row in &batch.address_submissions {
            state
                .address_submissions
                .entry((row.sender.clone(), row.submission_index))
                .or_insert_with(|| row.clone());
        }
        for row in &batch.da_submissions {
            state
                .da_submissions
                .entry(row.key.clone())
                .or_insert_with(|| row.clone());
        }
        for verification in &batch.da_verifications {
            if let Some(row) = state.da_submissions.get_mut(&verification.key)
                && !row.verified
            {
                row.verified = true;
                row.block_number_verified = Some(verification.block_number);
                row.block_time_verified = Some(verification.block_time);
                row.tx_hash_verified = Some(verification.tx_hash.clone());
            }
        }
        for reward in &batch.rewards {
            state
                .rewards
                .entry((reward.block_number, reward.log_index))
                .or_insert_with(|| reward.clone());
        }
        let floor = last.number.saturating_sub(retain_blocks);
        state.blocks.retain(|number, _| *number >= floor);
        state.cursor = Some(SyncCursor::at(last));

        *guard = state;
        Ok(())
    }

    async fn rollback(
        &self,
        fork_point: u64,
        ancestor: &SyncCursor,
    ) -> Result<RollbackSummary, AppError> {
        self.check_write()?;
        let mut state = self.state.lock().unwrap();
        let mut summary = RollbackSummary::default();

        let before = state.blocks.len();
        state.blocks.retain(|n, _| *n < fork_point);
        summary.blocks = (before - state.blocks.len()) as u64;

        let before = state.submissions.len();
        state.submissions.retain(|_, s| s.block_number < fork_point);
        summary.submissions = (before - state.submissions.len()) as u64;
        state
            .address_submissions
            .retain(|_, s| s.block_number < fork_point);

        let before = state.da_submissions.len();
        state.da_submissions.retain(|_, d| d.block_number < fork_point);
        summary.da_submissions = (before - state.da_submissions.len()) as u64;
        for row in state.da_submissions.values_mut() {
            if row.block_number_verified.is_some_and(|n| n >= fork_point) {
                row.verified = false;
                row.block_number_verified = None;
                row.block_time_verified = None;
                row.tx_hash_verified = None;
                summary.da_unverified += 1;
            }
        }

        let before = state.rewards.len();
        state.rewards.retain(|_, r| r.block_number < fork_point);
        summary.rewards = (before - state.rewards.len()) as u64;

        let settled = |interval: IntervalType, stat_time: DateTime<Utc>| match ancestor.block_time {
            Some(time) => stat_time + interval.width() <= time,
            None => false,
        };
        let before = state.submit_stats.len();
        state.submit_stats.retain(|(i, t), _| settled(*i, *t));
        state.address_stats.retain(|(i, t), _| settled(*i, *t));
        state.miner_stats.retain(|(i, t), _| settled(*i, *t));
        summary.rollups = (before - state.submit_stats.len()) as u64;

        state.cursor = Some(ancestor.clone());
        Ok(summary)
    }

    async fn pending_submissions(
        &self,
        after: Option<u64>,
        limit: i64,
    ) -> Result<Vec<PendingSubmission>, AppError> {
        self.check_should_fail()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .submissions
            .values()
            .filter(|s| s.status < SubmitStatus::Finalized)
            .filter(|s| after.is_none_or(|a| s.submission_index > a))
            .take(limit.max(0) as usize)
            .map(|s| PendingSubmission {
                submission_index: s.submission_index,
                sender: s.sender.clone(),
                total_seg_num: s.total_seg_num,
                uploaded_seg_num: s.uploaded_seg_num,
                status: s.status,
            })
            .collect())
    }

    async fn apply_finality(&self, updates: &[FinalityUpdate]) -> Result<u64, AppError> {
        self.check_write()?;
        let mut state = self.state.lock().unwrap();
        let mut changed = 0;
        for update in updates {
            let Some(row) = state.submissions.get_mut(&update.submission_index) else {
                continue;
            };
            let status = row.status.max(update.status);
            let uploaded = row.uploaded_seg_num.max(update.uploaded_seg_num);
            if status != row.status || uploaded != row.uploaded_seg_num {
                row.status = status;
                row.uploaded_seg_num = uploaded;
                changed += 1;
            }
            if let Some(address_row) = state
                .address_submissions
                .get_mut(&(update.sender.clone(), update.submission_index))
            {
                address_row.status = address_row.status.max(update.status);
            }
        }
        Ok(changed)
    }

    async fn earliest_record_time(&self) -> Result<Option<DateTime<Utc>>, AppError> {
        self.check_should_fail()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .submissions
            .values()
            .map(|s| s.block_time)
            .chain(state.rewards.values().map(|r| r.block_time))
            .min())
    }

    async fn latest_stat_time(
        &self,
        interval: IntervalType,
    ) -> Result<Option<DateTime<Utc>>, AppError> {
        self.check_should_fail()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .submit_stats
            .keys()
            .filter(|(i, _)| *i == interval)
            .map(|(_, t)| *t)
            .max())
    }

    async fn compute_window(&self, window: &StatWindow) -> Result<WindowStats, AppError> {
        self.check_should_fail()?;
        let state = self.state.lock().unwrap();
        let (start, end) = (window.start, window.end());
        let in_window = |t: DateTime<Utc>| t >= start && t < end;

        let submits: Vec<&Submission> = state.submissions.values().collect();
        let current: Vec<&&Submission> = submits.iter().filter(|s| in_window(s.block_time)).collect();
        let before_end: Vec<&&Submission> = submits.iter().filter(|s| s.block_time < end).collect();

        let distinct = |rows: &[&&Submission], f: fn(&Submission) -> &str| -> u64 {
            rows.iter().map(|s| f(s)).collect::<HashSet<_>>().len() as u64
        };
        let submit = SubmitStat {
            stat_type: window.interval,
            stat_time: start,
            file_count: current.len() as u64,
            file_total: before_end.len() as u64,
            data_size: current.iter().map(|s| s.length).sum(),
            data_total: before_end.iter().map(|s| s.length).sum(),
            base_fee: current.iter().map(|s| &s.fee).sum(),
            base_fee_total: before_end.iter().map(|s| &s.fee).sum(),
            tx_count: distinct(&current, |s| &s.tx_hash),
            tx_total: distinct(&before_end, |s| &s.tx_hash),
            sender_count: distinct(&current, |s| &s.sender),
        };

        let mut first_seen: HashMap<&str, DateTime<Utc>> = HashMap::new();
        for row in state.address_submissions.values() {
            let entry = first_seen.entry(&row.sender).or_insert(row.block_time);
            *entry = (*entry).min(row.block_time);
        }
        let active: HashSet<&str> = state
            .address_submissions
            .values()
            .filter(|r| in_window(r.block_time))
            .map(|r| r.sender.as_str())
            .collect();
        let address = AddressStat {
            stat_type: window.interval,
            stat_time: start,
            addr_new: first_seen.values().filter(|t| in_window(**t)).count() as u64,
            addr_active: active.len() as u64,
            addr_total: first_seen.values().filter(|t| **t < end).count() as u64,
        };

        let mut miner_first: HashMap<&str, DateTime<Utc>> = HashMap::new();
        for reward in state.rewards.values() {
            let entry = miner_first.entry(&reward.miner).or_insert(reward.block_time);
            *entry = (*entry).min(reward.block_time);
        }
        let window_rewards: Vec<&Reward> = state
            .rewards
            .values()
            .filter(|r| in_window(r.block_time))
            .collect();
        let miner = MinerStat {
            stat_type: window.interval,
            stat_time: start,
            miner_new: miner_first.values().filter(|t| in_window(**t)).count() as u64,
            miner_active: window_rewards
                .iter()
                .map(|r| r.miner.as_str())
                .collect::<HashSet<_>>()
                .len() as u64,
            miner_total: miner_first.values().filter(|t| **t < end).count() as u64,
            reward_amount: window_rewards.iter().map(|r| &r.amount).sum(),
        };

        Ok(WindowStats {
            submit,
            address,
            miner,
        })
    }

    async fn save_window(
        &self,
        stats: &WindowStats,
        safety_margin: TimeDelta,
    ) -> Result<bool, AppError> {
        self.check_write()?;
        let mut state = self.state.lock().unwrap();
        if !stats.window().is_settled(state.cursor.as_ref(), safety_margin) {
            return Ok(false);
        }
        state.insert_stats(stats.clone());
        Ok(true)
    }

    async fn list_submit_stats(
        &self,
        query: &StatQuery,
    ) -> Result<(u64, Vec<SubmitStat>), AppError> {
        self.check_should_fail()?;
        let state = self.state.lock().unwrap();
        let rows = state
            .submit_stats
            .values()
            .filter(|s| query.matches(s.stat_type, s.stat_time))
            .cloned()
            .collect();
        Ok(page(rows, query, |s| s.stat_time))
    }

    async fn list_address_stats(
        &self,
        query: &StatQuery,
    ) -> Result<(u64, Vec<AddressStat>), AppError> {
        self.check_should_fail()?;
        let state = self.state.lock().unwrap();
        let rows = state
            .address_stats
            .values()
            .filter(|s| query.matches(s.stat_type, s.stat_time))
            .cloned()
            .collect();
        Ok(page(rows, query, |s| s.stat_time))
    }

    async fn list_miner_stats(&self, query: &StatQuery) -> Result<(u64, Vec<MinerStat>), AppError> {
        self.check_should_fail()?;
        let state = self.state.lock().unwrap();
        let rows = state
            .miner_stats
            .values()
            .filter(|s| query.matches(s.stat_type, s.stat_time))
            .cloned()
            .collect();
        Ok(page(rows, query, |s| s.stat_time))
    }

    async fn latest_submit_stat(
        &self,
        interval: IntervalType,
    ) -> Result<Option<SubmitStat>, AppError> {
        self.check_should_fail()?;
        Ok(self.submit_stats(interval).pop())
    }
}

// ============================================================================
// CHAIN NODE
// ============================================================================

#[derive(Debug, Default)]
struct ChainState {
    blocks: BTreeMap<u64, BlockHeader>,
    logs: Vec<RawLog>,
    fork: u64,
    max_log_range: Option<u64>,
}

/// Programmable chain: blocks are appended one at a time and can be
/// reorganised away from any height.
pub struct MockChainNode {
    state: Arc<Mutex<ChainState>>,
    config: MockConfig,
    is_failing: AtomicBool,
    genesis_time: DateTime<Utc>,
    block_interval: TimeDelta,
}

impl MockChainNode {
    /// Chain whose next block is `first_block`
    #[must_use]
    pub fn starting_at(first_block: u64) -> Self {
        let node = Self {
            state: Arc::new(Mutex::new(ChainState::default())),
            config: MockConfig::success(),
            is_failing: AtomicBool::new(false),
            genesis_time: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            block_interval: TimeDelta::seconds(12),
        };
        if first_block > 0 {
            // Parent of the first block, present on chain but below the start height
            node.state
                .lock()
                .unwrap()
                .blocks
                .insert(first_block - 1, node.make_header(first_block - 1, 0, None));
        }
        node
    }

    #[must_use]
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    #[must_use]
    pub fn with_block_interval(mut self, interval: TimeDelta) -> Self {
        self.block_interval = interval;
        self
    }

    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        let mut node = Self::new();
        node.config = MockConfig::failure(message);
        node
    }

    /// Reject log queries spanning more than `blocks` blocks
    pub fn set_max_log_range(&self, blocks: Option<u64>) {
        self.state.lock().unwrap().max_log_range = blocks;
    }

    /// Toggle transient connection failures
    pub fn set_failing(&self, failing: bool) {
        self.is_failing.store(failing, Ordering::Relaxed);
    }

    /// Timestamp of block `number` on this chain
    pub fn block_time(&self, number: u64) -> DateTime<Utc> {
        self.genesis_time + self.block_interval * number as i32
    }

    fn make_header(&self, number: u64, fork: u64, parent: Option<&BlockHeader>) -> BlockHeader {
        BlockHeader {
            number,
            hash: format!("0xf{}b{}", fork, number),
            parent_hash: parent
                .map(|p| p.hash.clone())
                .unwrap_or_else(|| format!("0xparent{}", number)),
            timestamp: self.block_time(number),
        }
    }

    /// Append one block carrying `logs` (positions are assigned here)
    pub fn push_block(&self, logs: Vec<RawLog>) -> BlockHeader {
        let mut state = self.state.lock().unwrap();
        let parent = state.blocks.values().next_back().cloned();
        let number = parent.as_ref().map(|p| p.number + 1).unwrap_or(0);
        let header = self.make_header(number, state.fork, parent.as_ref());
        for (i, log) in logs.into_iter().enumerate() {
            state.logs.push(crate::test_utils::logs::at_block(
                log,
                number,
                &header.hash,
                i as u64,
            ));
        }
        state.blocks.insert(number, header.clone());
        header
    }

    /// Append `count` empty blocks
    pub fn push_empty_blocks(&self, count: u64) -> Option<BlockHeader> {
        (0..count).map(|_| self.push_block(vec![])).last()
    }

    /// Drop every block from `number` upwards; later pushes get new hashes
    pub fn reorg_from(&self, number: u64) {
        let mut state = self.state.lock().unwrap();
        state.blocks.retain(|n, _| *n < number);
        state.logs.retain(|l| l.block_number < number);
        state.fork += 1;
    }

    pub fn head_number(&self) -> Option<u64> {
        self.state
            .lock()
            .unwrap()
            .blocks
            .keys()
            .next_back()
            .copied()
    }

    fn check_should_fail(&self) -> Result<(), AppError> {
        if self.config.should_fail {
            return Err(AppError::Chain(ChainError::Rpc {
                code: -32000,
                message: self.config.message(),
            }));
        }
        if self.is_failing.load(Ordering::Relaxed) {
            return Err(AppError::Chain(ChainError::Connection(
                "Mock node unreachable".to_string(),
            )));
        }
        Ok(())
    }
}

impl Default for MockChainNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChainNode for MockChainNode {
    async fn head_block(&self) -> Result<BlockHeader, AppError> {
        self.check_should_fail()?;
        self.state
            .lock()
            .unwrap()
            .blocks
            .values()
            .next_back()
            .cloned()
            .ok_or(AppError::Chain(ChainError::BlockNotFound(0)))
    }

    async fn block_header(&self, number: u64) -> Result<Option<BlockHeader>, AppError> {
        self.check_should_fail()?;
        Ok(self.state.lock().unwrap().blocks.get(&number).cloned())
    }

    async fn fetch_logs(&self, filter: &LogFilter) -> Result<Vec<RawLog>, AppError> {
        self.check_should_fail()?;
        let state = self.state.lock().unwrap();
        let span = filter.to_block.saturating_sub(filter.from_block) + 1;
        if state.max_log_range.is_some_and(|max| span > max) {
            return Err(AppError::Chain(ChainError::RangeTooLarge(format!(
                "block range {} exceeds the limit",
                span
            ))));
        }
        Ok(state
            .logs
            .iter()
            .filter(|l| l.block_number >= filter.from_block && l.block_number <= filter.to_block)
            .filter(|l| filter.addresses.is_empty() || filter.addresses.contains(&l.address))
            .filter(|l| {
                filter.topics.is_empty()
                    || l.topics.first().is_some_and(|t| filter.topics.contains(t))
            })
            .cloned()
            .collect())
    }
}

// ============================================================================
// FINALITY ORACLE
// ============================================================================

/// Storage node stub answering from a map
pub struct MockFinalityOracle {
    files: Arc<Mutex<HashMap<u64, FileInfo>>>,
    queried: Arc<Mutex<Vec<u64>>>,
    failing_at: Mutex<Option<u64>>,
    config: MockConfig,
}

impl MockFinalityOracle {
    #[must_use]
    pub fn new() -> Self {
        Self {
            files: Arc::new(Mutex::new(HashMap::new())),
            queried: Arc::new(Mutex::new(Vec::new())),
            failing_at: Mutex::new(None),
            config: MockConfig::success(),
        }
    }

    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            config: MockConfig::failure(message),
            ..Self::new()
        }
    }

    pub fn set(&self, submission_index: u64, info: FileInfo) {
        self.files.lock().unwrap().insert(submission_index, info);
    }

    pub fn finalize(&self, submission_index: u64) {
        self.set(
            submission_index,
            FileInfo {
                finalized: true,
                uploaded_seg_num: 0,
            },
        );
    }

    /// Fail with a connection error when this index is queried
    pub fn fail_at(&self, submission_index: Option<u64>) {
        *self.failing_at.lock().unwrap() = submission_index;
    }

    /// Submission indexes queried so far, in order
    pub fn queried(&self) -> Vec<u64> {
        self.queried.lock().unwrap().clone()
    }
}

impl Default for MockFinalityOracle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FinalityOracle for MockFinalityOracle {
    async fn file_info(&self, submission_index: u64) -> Result<Option<FileInfo>, AppError> {
        if self.config.should_fail {
            return Err(AppError::Chain(ChainError::Connection(self.config.message())));
        }
        self.queried.lock().unwrap().push(submission_index);
        if *self.failing_at.lock().unwrap() == Some(submission_index) {
            return Err(AppError::Chain(ChainError::Timeout(format!(
                "file info for {}",
                submission_index
            ))));
        }
        Ok(self.files.lock().unwrap().get(&submission_index).copied())
    }
}
