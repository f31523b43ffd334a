//! Statistics aggregator: rolls settled time buckets into stat rows.

use std::env;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info, instrument};

use crate::domain::{AppError, IndexerStore, IntervalType, StatWindow};

use super::worker::{Cycle, Tick, WorkerConfig};

#[derive(Debug, Clone)]
pub struct StatConfig {
    /// Interval types rolled up, in order
    pub intervals: Vec<IntervalType>,
    /// Distance kept between a bucket's end and the latest ingested block time
    pub safety_margin: TimeDelta,
    /// Buckets written per interval type and cycle
    pub max_buckets_per_cycle: usize,
    pub worker: WorkerConfig,
}

impl Default for StatConfig {
    fn default() -> Self {
        Self {
            intervals: IntervalType::ALL.to_vec(),
            safety_margin: TimeDelta::seconds(600),
            max_buckets_per_cycle: 168,
            worker: WorkerConfig::new(true, 60, 10),
        }
    }
}

impl StatConfig {
    #[must_use]
    pub fn from_env() -> Self {
        let parse = |key: &str, default: u64| {
            env::var(key)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(default)
        };
        Self {
            intervals: IntervalType::ALL.to_vec(),
            safety_margin: TimeDelta::seconds(
                i64::try_from(parse("STAT_SAFETY_MARGIN_SECS", 600)).unwrap_or(600),
            ),
            max_buckets_per_cycle: parse("STAT_MAX_BUCKETS_PER_CYCLE", 168).max(1) as usize,
            worker: WorkerConfig::new(
                env::var("ENABLE_STATS")
                    .map(|v| v == "true" || v == "1")
                    .unwrap_or(true),
                parse("STAT_POLL_SECS", 60),
                parse("STAT_RETRY_SECS", 10),
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOutcome {
    /// No bucket has fully settled since the last run
    NotSettled,
    Rolled { buckets: usize },
}

pub struct StatAggregator {
    store: Arc<dyn IndexerStore>,
    config: StatConfig,
}

impl StatAggregator {
    #[must_use]
    pub fn new(store: Arc<dyn IndexerStore>, config: StatConfig) -> Self {
        Self { store, config }
    }

    /// Latest instant a bucket may end at to be eligible
    async fn horizon(&self) -> Result<Option<DateTime<Utc>>, AppError> {
        Ok(self
            .store
            .load_cursor()
            .await?
            .and_then(|c| c.block_time)
            .map(|t| t - self.config.safety_margin))
    }

    /// Roll up every newly settled bucket, up to the per-cycle cap
    #[instrument(skip(self))]
    pub async fn aggregate_once(&self) -> Result<AggregateOutcome, AppError> {
        let Some(horizon) = self.horizon().await? else {
            return Ok(AggregateOutcome::NotSettled);
        };

        let mut buckets = 0;
        for interval in &self.config.intervals {
            let Some(mut window) = self.next_window(*interval).await? else {
                continue;
            };
            let mut written = 0;
            while written < self.config.max_buckets_per_cycle && window.end() <= horizon {
                if !self.roll_window(&window).await? {
                    break;
                }
                written += 1;
                window = window.next();
            }
            buckets += written;
        }

        if buckets == 0 {
            Ok(AggregateOutcome::NotSettled)
        } else {
            Ok(AggregateOutcome::Rolled { buckets })
        }
    }

    /// Bucket after the latest stored one, or the one holding the earliest record
    async fn next_window(&self, interval: IntervalType) -> Result<Option<StatWindow>, AppError> {
        if let Some(start) = self.store.latest_stat_time(interval).await? {
            return Ok(Some(StatWindow { interval, start }.next()));
        }
        Ok(self
            .store
            .earliest_record_time()
            .await?
            .map(|t| StatWindow::containing(interval, t)))
    }

    /// Recompute and replace the settled buckets starting in `[from, to)`
    #[instrument(skip(self))]
    pub async fn recompute(
        &self,
        interval: IntervalType,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<usize, AppError> {
        let Some(horizon) = self.horizon().await? else {
            return Ok(0);
        };
        let mut window = StatWindow::containing(interval, from);
        let mut written = 0;
        while window.start < to && window.end() <= horizon {
            if !self.roll_window(&window).await? {
                break;
            }
            written += 1;
            window = window.next();
        }
        info!(%interval, %from, %to, buckets = written, "Recomputed rollups");
        Ok(written)
    }

    /// Compute and store one bucket; `false` when the store found it no longer settled
    async fn roll_window(&self, window: &StatWindow) -> Result<bool, AppError> {
        let stats = self.store.compute_window(window).await?;
        if !self
            .store
            .save_window(&stats, self.config.safety_margin)
            .await?
        {
            info!(
                interval = %window.interval,
                stat_time = %window.start,
                "Cursor moved back during rollup, bucket left for a later cycle"
            );
            return Ok(false);
        }
        debug!(
            interval = %window.interval,
            stat_time = %window.start,
            files = stats.submit.file_count,
            active_addresses = stats.address.addr_active,
            active_miners = stats.miner.miner_active,
            "Rollup written"
        );
        Ok(true)
    }
}

#[async_trait]
impl Cycle for StatAggregator {
    fn name(&self) -> &'static str {
        "stats"
    }

    async fn run_once(&self) -> Result<Tick, AppError> {
        match self.aggregate_once().await? {
            AggregateOutcome::NotSettled => Ok(Tick::Idle),
            AggregateOutcome::Rolled { buckets } => {
                info!(buckets, "Rollups written");
                Ok(Tick::Progress)
            }
        }
    }
}
