//! PostgreSQL database client implementation.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::domain::{
    AddressStat, AppError, BlockHeader, DatabaseError, FinalityUpdate, IndexerStore, IntervalType,
    MinerStat, PendingSubmission, RangeBatch, RollbackSummary, SortOrder, StatQuery, StatWindow,
    SubmitStat, SubmitStatus, SyncCursor, WindowStats,
};

/// PostgreSQL connection pool configuration
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 2,
            acquire_timeout: Duration::from_secs(3),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(1800),
        }
    }
}

fn query_error(e: sqlx::Error) -> AppError {
    AppError::Database(DatabaseError::from(e))
}

/// u64 to a BIGINT column
fn to_db(value: u64, field: &str) -> Result<i64, AppError> {
    i64::try_from(value).map_err(|_| {
        AppError::Database(DatabaseError::Query(format!(
            "{} value {} exceeds BIGINT range",
            field, value
        )))
    })
}

fn get_u64(row: &PgRow, column: &str) -> Result<u64, AppError> {
    let value: i64 = row.try_get(column).map_err(query_error)?;
    u64::try_from(value).map_err(|_| {
        AppError::Database(DatabaseError::Query(format!(
            "negative value {} in column {}",
            value, column
        )))
    })
}

fn get_opt_u64(row: &PgRow, column: &str) -> Result<Option<u64>, AppError> {
    let value: Option<i64> = row.try_get(column).map_err(query_error)?;
    value
        .map(|v| {
            u64::try_from(v).map_err(|_| {
                AppError::Database(DatabaseError::Query(format!(
                    "negative value {} in column {}",
                    v, column
                )))
            })
        })
        .transpose()
}

fn get_parsed<T: std::str::FromStr<Err = String>>(row: &PgRow, column: &str) -> Result<T, AppError> {
    let value: String = row.try_get(column).map_err(query_error)?;
    value
        .parse()
        .map_err(|e: String| AppError::Database(DatabaseError::Query(e)))
}

fn get_status(row: &PgRow) -> Result<SubmitStatus, AppError> {
    let value: i16 = row.try_get("status").map_err(query_error)?;
    SubmitStatus::from_i16(value).ok_or_else(|| {
        AppError::Database(DatabaseError::Query(format!("invalid status {}", value)))
    })
}

const SUBMIT_STAT_COLUMNS: &str = "stat_type, stat_time, file_count, file_total, data_size, \
     data_total, base_fee::TEXT AS base_fee, base_fee_total::TEXT AS base_fee_total, tx_count, \
     tx_total, sender_count";

const ADDRESS_STAT_COLUMNS: &str = "stat_type, stat_time, addr_new, addr_active, addr_total";

const MINER_STAT_COLUMNS: &str = "stat_type, stat_time, miner_new, miner_active, miner_total, \
     reward_amount::TEXT AS reward_amount";

fn columns(table: &str) -> &'static str {
    match table {
        "submit_stats" => SUBMIT_STAT_COLUMNS,
        "miner_stats" => MINER_STAT_COLUMNS,
        _ => ADDRESS_STAT_COLUMNS,
    }
}

fn order(sort: SortOrder) -> &'static str {
    match sort {
        SortOrder::Asc => "ASC",
        SortOrder::Desc => "DESC",
    }
}

/// PostgreSQL database client with connection pooling
pub struct PostgresClient {
    pool: PgPool,
}

impl PostgresClient {
    /// Create a new PostgreSQL client with custom configuration
    pub async fn new(database_url: &str, config: PostgresConfig) -> Result<Self, AppError> {
        info!("Connecting to PostgreSQL...");
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .max_lifetime(config.max_lifetime)
            .connect(database_url)
            .await
            .map_err(|e| AppError::Database(DatabaseError::Connection(e.to_string())))?;
        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Create a new PostgreSQL client with default configuration
    pub async fn with_defaults(database_url: &str) -> Result<Self, AppError> {
        Self::new(database_url, PostgresConfig::default()).await
    }

    /// Run database migrations using sqlx migrate
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::Database(DatabaseError::Migration(e.to_string())))?;
        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying connection pool (for testing)
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_cursor(row: &PgRow) -> Result<SyncCursor, AppError> {
        Ok(SyncCursor {
            block_number: get_opt_u64(row, "block_number")?,
            block_hash: row.try_get("block_hash").map_err(query_error)?,
            block_time: row.try_get("block_time").map_err(query_error)?,
        })
    }

    fn row_to_submit_stat(row: &PgRow) -> Result<SubmitStat, AppError> {
        Ok(SubmitStat {
            stat_type: get_parsed(row, "stat_type")?,
            stat_time: row.try_get("stat_time").map_err(query_error)?,
            file_count: get_u64(row, "file_count")?,
            file_total: get_u64(row, "file_total")?,
            data_size: get_u64(row, "data_size")?,
            data_total: get_u64(row, "data_total")?,
            base_fee: get_parsed(row, "base_fee")?,
            base_fee_total: get_parsed(row, "base_fee_total")?,
            tx_count: get_u64(row, "tx_count")?,
            tx_total: get_u64(row, "tx_total")?,
            sender_count: get_u64(row, "sender_count")?,
        })
    }

    fn row_to_address_stat(row: &PgRow) -> Result<AddressStat, AppError> {
        Ok(AddressStat {
            stat_type: get_parsed(row, "stat_type")?,
            stat_time: row.try_get("stat_time").map_err(query_error)?,
            addr_new: get_u64(row, "addr_new")?,
            addr_active: get_u64(row, "addr_active")?,
            addr_total: get_u64(row, "addr_total")?,
        })
    }

    fn row_to_miner_stat(row: &PgRow) -> Result<MinerStat, AppError> {
        Ok(MinerStat {
            stat_type: get_parsed(row, "stat_type")?,
            stat_time: row.try_get("stat_time").map_err(query_error)?,
            miner_new: get_u64(row, "miner_new")?,
            miner_active: get_u64(row, "miner_active")?,
            miner_total: get_u64(row, "miner_total")?,
            reward_amount: get_parsed(row, "reward_amount")?,
        })
    }

    async fn write_cursor(
        tx: &mut Transaction<'_, Postgres>,
        cursor: &SyncCursor,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO sync_info (id, block_number, block_hash, block_time, updated_at)
            VALUES (1, $1, $2, $3, NOW())
            ON CONFLICT (id) DO UPDATE SET
                block_number = EXCLUDED.block_number,
                block_hash = EXCLUDED.block_hash,
                block_time = EXCLUDED.block_time,
                updated_at = NOW()
            "#,
        )
        .bind(
            cursor
                .block_number
                .map(|n| to_db(n, "block_number"))
                .transpose()?,
        )
        .bind(&cursor.block_hash)
        .bind(cursor.block_time)
        .execute(&mut **tx)
        .await
        .map_err(query_error)?;
        Ok(())
    }

    /// Run a statement bound to a single block number
    async fn execute_from(
        tx: &mut Transaction<'_, Postgres>,
        sql: &str,
        block_number: i64,
    ) -> Result<u64, AppError> {
        Ok(sqlx::query(sql)
            .bind(block_number)
            .execute(&mut **tx)
            .await
            .map_err(query_error)?
            .rows_affected())
    }

    /// Count and page one stats table
    async fn list_stats(&self, table: &str, query: &StatQuery) -> Result<(u64, Vec<PgRow>), AppError> {
        let filter = "stat_type = $1 \
             AND ($2::TIMESTAMPTZ IS NULL OR stat_time >= $2) \
             AND ($3::TIMESTAMPTZ IS NULL OR stat_time <= $3)";

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM {} WHERE {}",
            table, filter
        ))
        .bind(query.interval.as_str())
        .bind(query.min_time())
        .bind(query.max_time())
        .fetch_one(&self.pool)
        .await
        .map_err(query_error)?;

        let rows = sqlx::query(&format!(
            "SELECT {columns} FROM {table} WHERE {filter} ORDER BY stat_time {order} OFFSET $4 LIMIT $5",
            columns = columns(table),
            table = table,
            filter = filter,
            order = order(query.sort),
        ))
        .bind(query.interval.as_str())
        .bind(query.min_time())
        .bind(query.max_time())
        .bind(query.skip)
        .bind(query.limit)
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;

        Ok((u64::try_from(total).unwrap_or(0), rows))
    }
}

#[async_trait]
impl IndexerStore for PostgresClient {
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(DatabaseError::Connection(e.to_string())))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn load_cursor(&self) -> Result<Option<SyncCursor>, AppError> {
        let row = sqlx::query(
            "SELECT block_number, block_hash, block_time FROM sync_info WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;

        row.as_ref().map(Self::row_to_cursor).transpose()
    }

    #[instrument(skip(self))]
    async fn block(&self, number: u64) -> Result<Option<BlockHeader>, AppError> {
        let row = sqlx::query(
            "SELECT block_number, block_hash, parent_hash, block_time FROM blocks WHERE block_number = $1",
        )
        .bind(to_db(number, "block_number")?)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;

        row.map(|row| {
            Ok(BlockHeader {
                number: get_u64(&row, "block_number")?,
                hash: row.try_get("block_hash").map_err(query_error)?,
                parent_hash: row.try_get("parent_hash").map_err(query_error)?,
                timestamp: row.try_get("block_time").map_err(query_error)?,
            })
        })
        .transpose()
    }

    #[instrument(skip(self, expected, batch), fields(from = ?batch.headers.first().map(|h| h.number), to = ?batch.headers.last().map(|h| h.number)))]
    async fn commit_range(
        &self,
        expected: &SyncCursor,
        batch: &RangeBatch,
        retain_blocks: u64,
    ) -> Result<(), AppError> {
        let last = batch
            .headers
            .last()
            .ok_or_else(|| AppError::Internal("Empty block range".to_string()))?;

        let mut tx = self.pool.begin().await.map_err(query_error)?;

        let stored = sqlx::query(
            "SELECT block_number, block_hash, block_time FROM sync_info WHERE id = 1 FOR UPDATE",
        )
        .fetch_optional(&mut *tx)
        .await
        .map_err(query_error)?
        .as_ref()
        .map(Self::row_to_cursor)
        .transpose()?;

        let matches = match &stored {
            Some(stored) => stored == expected,
            None => expected.block_hash.is_none(),
        };
        if !matches {
            return Err(AppError::Database(DatabaseError::CursorConflict(format!(
                "expected cursor at {:?}, found {:?}",
                expected.block_number,
                stored.and_then(|c| c.block_number)
            ))));
        }

        for header in &batch.headers {
            sqlx::query(
                r#"
                INSERT INTO blocks (block_number, block_hash, parent_hash, block_time)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (block_number) DO UPDATE SET
                    block_hash = EXCLUDED.block_hash,
                    parent_hash = EXCLUDED.parent_hash,
                    block_time = EXCLUDED.block_time
                "#,
            )
            .bind(to_db(header.number, "block_number")?)
            .bind(&header.hash)
            .bind(&header.parent_hash)
            .bind(header.timestamp)
            .execute(&mut *tx)
            .await
            .map_err(query_error)?;
        }

        for s in &batch.submissions {
            sqlx::query(
                r#"
                INSERT INTO submits (
                    submission_index, root_hash, sender, length, block_number, block_time,
                    tx_hash, total_seg_num, uploaded_seg_num, status, fee, extra
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11::NUMERIC, $12)
                ON CONFLICT (submission_index) DO NOTHING
                "#,
            )
            .bind(to_db(s.submission_index, "submission_index")?)
            .bind(&s.root_hash)
            .bind(&s.sender)
            .bind(to_db(s.length, "length")?)
            .bind(to_db(s.block_number, "block_number")?)
            .bind(s.block_time)
            .bind(&s.tx_hash)
            .bind(to_db(s.total_seg_num, "total_seg_num")?)
            .bind(to_db(s.uploaded_seg_num, "uploaded_seg_num")?)
            .bind(s.status.as_i16())
            .bind(s.fee.to_string())
            .bind(&s.extra)
            .execute(&mut *tx)
            .await
            .map_err(query_error)?;
        }

        for a in &batch.address_submissions {
            sqlx::query(
                r#"
                INSERT INTO address_submits (
                    sender, submission_index, root_hash, length, block_number, block_time,
                    tx_hash, status, fee
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9::NUMERIC)
                ON CONFLICT (sender, submission_index) DO NOTHING
                "#,
            )
            .bind(&a.sender)
            .bind(to_db(a.submission_index, "submission_index")?)
            .bind(&a.root_hash)
            .bind(to_db(a.length, "length")?)
            .bind(to_db(a.block_number, "block_number")?)
            .bind(a.block_time)
            .bind(&a.tx_hash)
            .bind(a.status.as_i16())
            .bind(a.fee.to_string())
            .execute(&mut *tx)
            .await
            .map_err(query_error)?;
        }

        for d in &batch.da_submissions {
            sqlx::query(
                r#"
                INSERT INTO da_submits (
                    epoch, quorum_id, root_hash, verified, block_number, block_time, tx_hash
                )
                VALUES ($1, $2, $3, FALSE, $4, $5, $6)
                ON CONFLICT (epoch, quorum_id, root_hash) DO NOTHING
                "#,
            )
            .bind(to_db(d.key.epoch, "epoch")?)
            .bind(to_db(d.key.quorum_id, "quorum_id")?)
            .bind(&d.key.root_hash)
            .bind(to_db(d.block_number, "block_number")?)
            .bind(d.block_time)
            .bind(&d.tx_hash)
            .execute(&mut *tx)
            .await
            .map_err(query_error)?;
        }

        for v in &batch.da_verifications {
            let result = sqlx::query(
                r#"
                UPDATE da_submits SET
                    verified = TRUE,
                    block_number_verified = $4,
                    block_time_verified = $5,
                    tx_hash_verified = $6
                WHERE epoch = $1 AND quorum_id = $2 AND root_hash = $3 AND NOT verified
                "#,
            )
            .bind(to_db(v.key.epoch, "epoch")?)
            .bind(to_db(v.key.quorum_id, "quorum_id")?)
            .bind(&v.key.root_hash)
            .bind(to_db(v.block_number, "block_number")?)
            .bind(v.block_time)
            .bind(&v.tx_hash)
            .execute(&mut *tx)
            .await
            .map_err(query_error)?;
            if result.rows_affected() == 0 {
                debug!(
                    epoch = v.key.epoch,
                    quorum_id = v.key.quorum_id,
                    root = %v.key.root_hash,
                    "Verification without an unverified upload"
                );
            }
        }

        for r in &batch.rewards {
            sqlx::query(
                r#"
                INSERT INTO rewards (
                    block_number, log_index, pricing_index, miner, amount, block_time, tx_hash
                )
                VALUES ($1, $2, $3, $4, $5::NUMERIC, $6, $7)
                ON CONFLICT (block_number, log_index) DO NOTHING
                "#,
            )
            .bind(to_db(r.block_number, "block_number")?)
            .bind(to_db(r.log_index, "log_index")?)
            .bind(to_db(r.pricing_index, "pricing_index")?)
            .bind(&r.miner)
            .bind(r.amount.to_string())
            .bind(r.block_time)
            .bind(&r.tx_hash)
            .execute(&mut *tx)
            .await
            .map_err(query_error)?;
        }

        sqlx::query("DELETE FROM blocks WHERE block_number < $1")
            .bind(to_db(last.number.saturating_sub(retain_blocks), "block_number")?)
            .execute(&mut *tx)
            .await
            .map_err(query_error)?;

        Self::write_cursor(&mut tx, &SyncCursor::at(last)).await?;
        tx.commit().await.map_err(query_error)?;
        Ok(())
    }

    #[instrument(skip(self, ancestor), fields(ancestor = ancestor.block_number))]
    async fn rollback(
        &self,
        fork_point: u64,
        ancestor: &SyncCursor,
    ) -> Result<RollbackSummary, AppError> {
        let fork = to_db(fork_point, "fork_point")?;
        let mut tx = self.pool.begin().await.map_err(query_error)?;
        let mut summary = RollbackSummary::default();

        // Serializes with save_window, which holds the cursor FOR SHARE
        sqlx::query("SELECT id FROM sync_info WHERE id = 1 FOR UPDATE")
            .execute(&mut *tx)
            .await
            .map_err(query_error)?;

        summary.blocks =
            Self::execute_from(&mut tx, "DELETE FROM blocks WHERE block_number >= $1", fork).await?;
        summary.submissions =
            Self::execute_from(&mut tx, "DELETE FROM submits WHERE block_number >= $1", fork)
                .await?;
        Self::execute_from(
            &mut tx,
            "DELETE FROM address_submits WHERE block_number >= $1",
            fork,
        )
        .await?;
        summary.da_submissions =
            Self::execute_from(&mut tx, "DELETE FROM da_submits WHERE block_number >= $1", fork)
                .await?;
        summary.da_unverified = Self::execute_from(
            &mut tx,
            r#"
            UPDATE da_submits SET
                verified = FALSE,
                block_number_verified = NULL,
                block_time_verified = NULL,
                tx_hash_verified = NULL
            WHERE block_number_verified >= $1
            "#,
            fork,
        )
        .await?;
        summary.rewards =
            Self::execute_from(&mut tx, "DELETE FROM rewards WHERE block_number >= $1", fork)
                .await?;

        // Buckets ending after the ancestor may include rolled back rows
        for interval in IntervalType::ALL {
            let after = ancestor.block_time.map(|t| t - interval.width());
            for table in ["submit_stats", "address_stats", "miner_stats"] {
                let removed = sqlx::query(&format!(
                    "DELETE FROM {} WHERE stat_type = $1 AND ($2::TIMESTAMPTZ IS NULL OR stat_time > $2)",
                    table
                ))
                .bind(interval.as_str())
                .bind(after)
                .execute(&mut *tx)
                .await
                .map_err(query_error)?
                .rows_affected();
                if table == "submit_stats" {
                    summary.rollups += removed;
                }
            }
        }

        Self::write_cursor(&mut tx, ancestor).await?;
        tx.commit().await.map_err(query_error)?;
        Ok(summary)
    }

    #[instrument(skip(self))]
    async fn pending_submissions(
        &self,
        after: Option<u64>,
        limit: i64,
    ) -> Result<Vec<PendingSubmission>, AppError> {
        let after = after.map(|a| to_db(a, "submission_index")).transpose()?;
        let rows = sqlx::query(
            r#"
            SELECT submission_index, sender, total_seg_num, uploaded_seg_num, status
            FROM submits
            WHERE status < $1 AND ($2::BIGINT IS NULL OR submission_index > $2)
            ORDER BY submission_index ASC
            LIMIT $3
            "#,
        )
        .bind(SubmitStatus::Finalized.as_i16())
        .bind(after)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;

        rows.iter()
            .map(|row| {
                Ok(PendingSubmission {
                    submission_index: get_u64(row, "submission_index")?,
                    sender: row.try_get("sender").map_err(query_error)?,
                    total_seg_num: get_u64(row, "total_seg_num")?,
                    uploaded_seg_num: get_u64(row, "uploaded_seg_num")?,
                    status: get_status(row)?,
                })
            })
            .collect()
    }

    #[instrument(skip(self, updates), fields(count = updates.len()))]
    async fn apply_finality(&self, updates: &[FinalityUpdate]) -> Result<u64, AppError> {
        let mut tx = self.pool.begin().await.map_err(query_error)?;
        let mut changed = 0;

        for update in updates {
            let index = to_db(update.submission_index, "submission_index")?;
            let uploaded = to_db(update.uploaded_seg_num, "uploaded_seg_num")?;
            changed += sqlx::query(
                r#"
                UPDATE submits SET
                    status = GREATEST(status, $2),
                    uploaded_seg_num = GREATEST(uploaded_seg_num, $3)
                WHERE submission_index = $1 AND (status < $2 OR uploaded_seg_num < $3)
                "#,
            )
            .bind(index)
            .bind(update.status.as_i16())
            .bind(uploaded)
            .execute(&mut *tx)
            .await
            .map_err(query_error)?
            .rows_affected();

            sqlx::query(
                r#"
                UPDATE address_submits SET status = GREATEST(status, $3)
                WHERE sender = $1 AND submission_index = $2
                "#,
            )
            .bind(&update.sender)
            .bind(index)
            .bind(update.status.as_i16())
            .execute(&mut *tx)
            .await
            .map_err(query_error)?;
        }

        tx.commit().await.map_err(query_error)?;
        Ok(changed)
    }

    #[instrument(skip(self))]
    async fn earliest_record_time(&self) -> Result<Option<DateTime<Utc>>, AppError> {
        sqlx::query_scalar(
            r#"
            SELECT LEAST(
                (SELECT MIN(block_time) FROM submits),
                (SELECT MIN(block_time) FROM rewards)
            )
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(query_error)
    }

    #[instrument(skip(self))]
    async fn latest_stat_time(
        &self,
        interval: IntervalType,
    ) -> Result<Option<DateTime<Utc>>, AppError> {
        sqlx::query_scalar("SELECT MAX(stat_time) FROM submit_stats WHERE stat_type = $1")
            .bind(interval.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(query_error)
    }

    #[instrument(skip(self))]
    async fn compute_window(&self, window: &StatWindow) -> Result<WindowStats, AppError> {
        let (start, end) = (window.start, window.end());

        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE block_time >= $1) AS file_count,
                COUNT(*) AS file_total,
                COALESCE(SUM(length) FILTER (WHERE block_time >= $1), 0)::BIGINT AS data_size,
                COALESCE(SUM(length), 0)::BIGINT AS data_total,
                COALESCE(SUM(fee) FILTER (WHERE block_time >= $1), 0)::TEXT AS base_fee,
                COALESCE(SUM(fee), 0)::TEXT AS base_fee_total,
                COUNT(DISTINCT tx_hash) FILTER (WHERE block_time >= $1) AS tx_count,
                COUNT(DISTINCT tx_hash) AS tx_total,
                COUNT(DISTINCT sender) FILTER (WHERE block_time >= $1) AS sender_count
            FROM submits
            WHERE block_time < $2
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await
        .map_err(query_error)?;

        let submit = SubmitStat {
            stat_type: window.interval,
            stat_time: start,
            file_count: get_u64(&row, "file_count")?,
            file_total: get_u64(&row, "file_total")?,
            data_size: get_u64(&row, "data_size")?,
            data_total: get_u64(&row, "data_total")?,
            base_fee: get_parsed(&row, "base_fee")?,
            base_fee_total: get_parsed(&row, "base_fee_total")?,
            tx_count: get_u64(&row, "tx_count")?,
            tx_total: get_u64(&row, "tx_total")?,
            sender_count: get_u64(&row, "sender_count")?,
        };

        let row = sqlx::query(
            r#"
            WITH firsts AS (
                SELECT sender, MIN(block_time) AS first_time
                FROM address_submits
                WHERE block_time < $2
                GROUP BY sender
            )
            SELECT
                (SELECT COUNT(*) FROM firsts WHERE first_time >= $1) AS addr_new,
                (SELECT COUNT(DISTINCT sender) FROM address_submits
                    WHERE block_time >= $1 AND block_time < $2) AS addr_active,
                (SELECT COUNT(*) FROM firsts) AS addr_total
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await
        .map_err(query_error)?;

        let address = AddressStat {
            stat_type: window.interval,
            stat_time: start,
            addr_new: get_u64(&row, "addr_new")?,
            addr_active: get_u64(&row, "addr_active")?,
            addr_total: get_u64(&row, "addr_total")?,
        };

        let row = sqlx::query(
            r#"
            WITH firsts AS (
                SELECT miner, MIN(block_time) AS first_time
                FROM rewards
                WHERE block_time < $2
                GROUP BY miner
            )
            SELECT
                (SELECT COUNT(*) FROM firsts WHERE first_time >= $1) AS miner_new,
                (SELECT COUNT(DISTINCT miner) FROM rewards
                    WHERE block_time >= $1 AND block_time < $2) AS miner_active,
                (SELECT COUNT(*) FROM firsts) AS miner_total,
                (SELECT COALESCE(SUM(amount), 0)::TEXT FROM rewards
                    WHERE block_time >= $1 AND block_time < $2) AS reward_amount
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await
        .map_err(query_error)?;

        let miner = MinerStat {
            stat_type: window.interval,
            stat_time: start,
            miner_new: get_u64(&row, "miner_new")?,
            miner_active: get_u64(&row, "miner_active")?,
            miner_total: get_u64(&row, "miner_total")?,
            reward_amount: get_parsed(&row, "reward_amount")?,
        };

        Ok(WindowStats {
            submit,
            address,
            miner,
        })
    }

    #[instrument(skip(self, stats), fields(interval = %stats.submit.stat_type, stat_time = %stats.submit.stat_time))]
    async fn save_window(
        &self,
        stats: &WindowStats,
        safety_margin: TimeDelta,
    ) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await.map_err(query_error)?;

        // Held until commit; rollback takes this row FOR UPDATE before deleting stats
        let cursor = sqlx::query(
            "SELECT block_number, block_hash, block_time FROM sync_info WHERE id = 1 FOR SHARE",
        )
        .fetch_optional(&mut *tx)
        .await
        .map_err(query_error)?
        .as_ref()
        .map(Self::row_to_cursor)
        .transpose()?;
        if !stats.window().is_settled(cursor.as_ref(), safety_margin) {
            debug!("Bucket no longer settled, skipping write");
            return Ok(false);
        }

        let s = &stats.submit;

        sqlx::query(
            r#"
            INSERT INTO submit_stats (
                stat_type, stat_time, file_count, file_total, data_size, data_total,
                base_fee, base_fee_total, tx_count, tx_total, sender_count
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7::NUMERIC, $8::NUMERIC, $9, $10, $11)
            ON CONFLICT (stat_type, stat_time) DO UPDATE SET
                file_count = EXCLUDED.file_count,
                file_total = EXCLUDED.file_total,
                data_size = EXCLUDED.data_size,
                data_total = EXCLUDED.data_total,
                base_fee = EXCLUDED.base_fee,
                base_fee_total = EXCLUDED.base_fee_total,
                tx_count = EXCLUDED.tx_count,
                tx_total = EXCLUDED.tx_total,
                sender_count = EXCLUDED.sender_count
            "#,
        )
        .bind(s.stat_type.as_str())
        .bind(s.stat_time)
        .bind(to_db(s.file_count, "file_count")?)
        .bind(to_db(s.file_total, "file_total")?)
        .bind(to_db(s.data_size, "data_size")?)
        .bind(to_db(s.data_total, "data_total")?)
        .bind(s.base_fee.to_string())
        .bind(s.base_fee_total.to_string())
        .bind(to_db(s.tx_count, "tx_count")?)
        .bind(to_db(s.tx_total, "tx_total")?)
        .bind(to_db(s.sender_count, "sender_count")?)
        .execute(&mut *tx)
        .await
        .map_err(query_error)?;

        let a = &stats.address;
        sqlx::query(
            r#"
            INSERT INTO address_stats (stat_type, stat_time, addr_new, addr_active, addr_total)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (stat_type, stat_time) DO UPDATE SET
                addr_new = EXCLUDED.addr_new,
                addr_active = EXCLUDED.addr_active,
                addr_total = EXCLUDED.addr_total
            "#,
        )
        .bind(a.stat_type.as_str())
        .bind(a.stat_time)
        .bind(to_db(a.addr_new, "addr_new")?)
        .bind(to_db(a.addr_active, "addr_active")?)
        .bind(to_db(a.addr_total, "addr_total")?)
        .execute(&mut *tx)
        .await
        .map_err(query_error)?;

        let m = &stats.miner;
        sqlx::query(
            r#"
            INSERT INTO miner_stats (
                stat_type, stat_time, miner_new, miner_active, miner_total, reward_amount
            )
            VALUES ($1, $2, $3, $4, $5, $6::NUMERIC)
            ON CONFLICT (stat_type, stat_time) DO UPDATE SET
                miner_new = EXCLUDED.miner_new,
                miner_active = EXCLUDED.miner_active,
                miner_total = EXCLUDED.miner_total,
                reward_amount = EXCLUDED.reward_amount
            "#,
        )
        .bind(m.stat_type.as_str())
        .bind(m.stat_time)
        .bind(to_db(m.miner_new, "miner_new")?)
        .bind(to_db(m.miner_active, "miner_active")?)
        .bind(to_db(m.miner_total, "miner_total")?)
        .bind(m.reward_amount.to_string())
        .execute(&mut *tx)
        .await
        .map_err(query_error)?;

        tx.commit().await.map_err(query_error)?;
        Ok(true)
    }

    #[instrument(skip(self))]
    async fn list_submit_stats(
        &self,
        query: &StatQuery,
    ) -> Result<(u64, Vec<SubmitStat>), AppError> {
        let (total, rows) = self.list_stats("submit_stats", query).await?;
        let list = rows
            .iter()
            .map(Self::row_to_submit_stat)
            .collect::<Result<_, _>>()?;
        Ok((total, list))
    }

    #[instrument(skip(self))]
    async fn list_address_stats(
        &self,
        query: &StatQuery,
    ) -> Result<(u64, Vec<AddressStat>), AppError> {
        let (total, rows) = self.list_stats("address_stats", query).await?;
        let list = rows
            .iter()
            .map(Self::row_to_address_stat)
            .collect::<Result<_, _>>()?;
        Ok((total, list))
    }

    #[instrument(skip(self))]
    async fn list_miner_stats(&self, query: &StatQuery) -> Result<(u64, Vec<MinerStat>), AppError> {
        let (total, rows) = self.list_stats("miner_stats", query).await?;
        let list = rows
            .iter()
            .map(Self::row_to_miner_stat)
            .collect::<Result<_, _>>()?;
        Ok((total, list))
    }

    #[instrument(skip(self))]
    async fn latest_submit_stat(
        &self,
        interval: IntervalType,
    ) -> Result<Option<SubmitStat>, AppError> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM submit_stats
            WHERE stat_type = $1
            ORDER BY stat_time DESC
            LIMIT 1
            "#,
            SUBMIT_STAT_COLUMNS
        ))
        .bind(interval.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;

        row.as_ref().map(Self::row_to_submit_stat).transpose()
    }
}
