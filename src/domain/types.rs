//! Domain types: chain primitives, indexed records and statistic rollups.

use std::fmt;
use std::ops::Add;
use std::str::FromStr;

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use ethers::types::U256;
use num_bigint::BigUint;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use utoipa::ToSchema;
use validator::Validate;

// ============================================================================
// CHAIN PRIMITIVES
// ============================================================================

/// A 32-byte log topic
pub type Topic = [u8; 32];

/// Block header fields the indexer relies on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub number: u64,
    pub hash: String,
    pub parent_hash: String,
    pub timestamp: DateTime<Utc>,
}

/// Raw contract log as returned by the node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLog {
    pub address: String,
    pub topics: Vec<Topic>,
    pub data: Vec<u8>,
    pub block_number: u64,
    pub block_hash: String,
    pub tx_hash: String,
    pub log_index: u64,
}

/// Log query over an inclusive block range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    pub from_block: u64,
    pub to_block: u64,
    pub addresses: Vec<String>,
    /// Accepted values for `topics[0]`
    pub topics: Vec<Topic>,
}

/// Durable marker of ingestion progress.
///
/// `block_number` is the last block consumed, `None` when nothing has been.
/// `block_hash` is `None` only for the genesis cursor, i.e. before the first
/// block at the configured start height has been ingested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SyncCursor {
    pub block_number: Option<u64>,
    pub block_hash: Option<String>,
    pub block_time: Option<DateTime<Utc>>,
}

impl SyncCursor {
    /// Cursor positioned just below the first block to ingest
    #[must_use]
    pub fn genesis(start_block: u64) -> Self {
        Self {
            block_number: start_block.checked_sub(1),
            block_hash: None,
            block_time: None,
        }
    }

    #[must_use]
    pub fn at(header: &BlockHeader) -> Self {
        Self {
            block_number: Some(header.number),
            block_hash: Some(header.hash.clone()),
            block_time: Some(header.timestamp),
        }
    }

    #[must_use]
    pub fn next_block(&self) -> u64 {
        self.block_number.map_or(0, |n| n + 1)
    }
}

// ============================================================================
// AMOUNTS
// ============================================================================

/// Arbitrary-precision token amount, serialized as a decimal string
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(pub BigUint);

impl Amount {
    #[must_use]
    pub fn zero() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_be_bytes(bytes: &[u8]) -> Self {
        Self(BigUint::from_bytes_be(bytes))
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Self(BigUint::from(value))
    }
}

impl From<U256> for Amount {
    fn from(value: U256) -> Self {
        let mut bytes = [0u8; 32];
        value.to_big_endian(&mut bytes);
        Self::from_be_bytes(&bytes)
    }
}

impl Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Self) -> Self::Output {
        Amount(self.0 + rhs.0)
    }
}

impl<'a> std::iter::Sum<&'a Amount> for Amount {
    fn sum<I: Iterator<Item = &'a Amount>>(iter: I) -> Self {
        iter.fold(Amount::zero(), |acc, x| acc + x.clone())
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Amount {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // NUMERIC sums come back as e.g. "1200" or "1200.0" depending on scale
        let integral = s.split('.').next().unwrap_or(s);
        BigUint::from_str(integral)
            .map(Amount)
            .map_err(|e| format!("Invalid amount '{}': {}", s, e))
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// SUBMISSIONS
// ============================================================================

/// Upload lifecycle of a submission. Ordering follows lifecycle progress.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default, Hash, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum SubmitStatus {
    #[default]
    NotUploaded,
    Uploading,
    Uploaded,
    Finalized,
}

impl SubmitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotUploaded => "not_uploaded",
            Self::Uploading => "uploading",
            Self::Uploaded => "uploaded",
            Self::Finalized => "finalized",
        }
    }

    /// Column encoding
    pub fn as_i16(&self) -> i16 {
        match self {
            Self::NotUploaded => 0,
            Self::Uploading => 1,
            Self::Uploaded => 2,
            Self::Finalized => 3,
        }
    }

    pub fn from_i16(value: i16) -> Option<Self> {
        match value {
            0 => Some(Self::NotUploaded),
            1 => Some(Self::Uploading),
            2 => Some(Self::Uploaded),
            3 => Some(Self::Finalized),
            _ => None,
        }
    }
}

impl FromStr for SubmitStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_uploaded" => Ok(Self::NotUploaded),
            "uploading" => Ok(Self::Uploading),
            "uploaded" => Ok(Self::Uploaded),
            "finalized" => Ok(Self::Finalized),
            _ => Err(format!("Invalid submit status: {}", s)),
        }
    }
}

impl fmt::Display for SubmitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One flow submission observed on chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub submission_index: u64,
    pub root_hash: String,
    pub sender: String,
    pub length: u64,
    pub block_number: u64,
    pub block_time: DateTime<Utc>,
    pub tx_hash: String,
    pub total_seg_num: u64,
    pub uploaded_seg_num: u64,
    pub status: SubmitStatus,
    pub fee: Amount,
    /// JSON encoding of event fields without a dedicated column
    pub extra: String,
}

/// Per-sender view of a submission used for address statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressSubmission {
    pub sender: String,
    pub submission_index: u64,
    pub root_hash: String,
    pub length: u64,
    pub block_number: u64,
    pub block_time: DateTime<Utc>,
    pub tx_hash: String,
    pub status: SubmitStatus,
    pub fee: Amount,
}

impl From<&Submission> for AddressSubmission {
    fn from(s: &Submission) -> Self {
        Self {
            sender: s.sender.clone(),
            submission_index: s.submission_index,
            root_hash: s.root_hash.clone(),
            length: s.length,
            block_number: s.block_number,
            block_time: s.block_time,
            tx_hash: s.tx_hash.clone(),
            status: s.status,
            fee: s.fee.clone(),
        }
    }
}

/// Composite key of a data availability submission
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DaKey {
    pub epoch: u64,
    pub quorum_id: u64,
    pub root_hash: String,
}

/// Data availability submission, created unverified by a data upload log and
/// completed in place by a later commitment verification log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaSubmission {
    pub key: DaKey,
    pub verified: bool,
    pub block_number: u64,
    pub block_time: DateTime<Utc>,
    pub tx_hash: String,
    pub block_number_verified: Option<u64>,
    pub block_time_verified: Option<DateTime<Utc>>,
    pub tx_hash_verified: Option<String>,
}

/// The verification half of a data availability submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaVerification {
    pub key: DaKey,
    pub block_number: u64,
    pub block_time: DateTime<Utc>,
    pub tx_hash: String,
}

/// Mining reward paid to a storage miner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reward {
    pub block_number: u64,
    pub log_index: u64,
    pub pricing_index: u64,
    pub miner: String,
    pub amount: Amount,
    pub block_time: DateTime<Utc>,
    pub tx_hash: String,
}

/// Everything derived from one fetched block range, committed atomically
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeBatch {
    pub headers: Vec<BlockHeader>,
    pub submissions: Vec<Submission>,
    pub address_submissions: Vec<AddressSubmission>,
    pub da_submissions: Vec<DaSubmission>,
    pub da_verifications: Vec<DaVerification>,
    pub rewards: Vec<Reward>,
}

impl RangeBatch {
    /// Number of event-derived records (headers excluded)
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.submissions.len()
            + self.da_submissions.len()
            + self.da_verifications.len()
            + self.rewards.len()
    }
}

/// Rows removed by a rollback
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RollbackSummary {
    pub blocks: u64,
    pub submissions: u64,
    pub da_submissions: u64,
    pub da_unverified: u64,
    pub rewards: u64,
    pub rollups: u64,
}

impl RollbackSummary {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// ============================================================================
// FINALITY
// ============================================================================

/// Storage node view of a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub finalized: bool,
    pub uploaded_seg_num: u64,
}

impl FileInfo {
    /// Lifecycle status implied by this info for a file of `total_seg_num` segments
    #[must_use]
    pub fn status(&self, total_seg_num: u64) -> SubmitStatus {
        if self.finalized {
            SubmitStatus::Finalized
        } else if self.uploaded_seg_num >= total_seg_num && total_seg_num > 0 {
            SubmitStatus::Uploaded
        } else if self.uploaded_seg_num > 0 {
            SubmitStatus::Uploading
        } else {
            SubmitStatus::NotUploaded
        }
    }
}

/// Submission not yet finalized, as seen by the finality tracker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSubmission {
    pub submission_index: u64,
    pub sender: String,
    pub total_seg_num: u64,
    pub uploaded_seg_num: u64,
    pub status: SubmitStatus,
}

/// Forward-only status change for one submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalityUpdate {
    pub submission_index: u64,
    pub sender: String,
    pub status: SubmitStatus,
    pub uploaded_seg_num: u64,
}

// ============================================================================
// STATISTICS
// ============================================================================

/// Width of a statistics bucket
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum IntervalType {
    Hour,
    #[default]
    Day,
}

impl IntervalType {
    pub const ALL: [IntervalType; 2] = [IntervalType::Hour, IntervalType::Day];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hour => "hour",
            Self::Day => "day",
        }
    }

    #[must_use]
    pub fn width(&self) -> TimeDelta {
        match self {
            Self::Hour => TimeDelta::hours(1),
            Self::Day => TimeDelta::days(1),
        }
    }

    /// Start of the UTC-aligned bucket containing `time`
    #[must_use]
    pub fn bucket_start(&self, time: DateTime<Utc>) -> DateTime<Utc> {
        time.duration_trunc(self.width()).unwrap_or(time)
    }
}

impl FromStr for IntervalType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hour" => Ok(Self::Hour),
            "day" => Ok(Self::Day),
            _ => Err(format!("Invalid interval type: {}", s)),
        }
    }
}

impl fmt::Display for IntervalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Half-open time window `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatWindow {
    pub interval: IntervalType,
    pub start: DateTime<Utc>,
}

impl StatWindow {
    #[must_use]
    pub fn containing(interval: IntervalType, time: DateTime<Utc>) -> Self {
        Self {
            interval,
            start: interval.bucket_start(time),
        }
    }

    #[must_use]
    pub fn end(&self) -> DateTime<Utc> {
        self.start + self.interval.width()
    }

    #[must_use]
    pub fn next(&self) -> Self {
        Self {
            interval: self.interval,
            start: self.end(),
        }
    }

    /// Whether the window ends at least `margin` before the cursor's block time
    #[must_use]
    pub fn is_settled(&self, cursor: Option<&SyncCursor>, margin: TimeDelta) -> bool {
        cursor
            .and_then(|c| c.block_time)
            .is_some_and(|t| self.end() <= t - margin)
    }
}

/// Submission rollup for one bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitStat {
    pub stat_type: IntervalType,
    pub stat_time: DateTime<Utc>,
    pub file_count: u64,
    pub file_total: u64,
    pub data_size: u64,
    pub data_total: u64,
    pub base_fee: Amount,
    pub base_fee_total: Amount,
    pub tx_count: u64,
    pub tx_total: u64,
    pub sender_count: u64,
}

/// Address activity rollup for one bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressStat {
    pub stat_type: IntervalType,
    pub stat_time: DateTime<Utc>,
    pub addr_new: u64,
    pub addr_active: u64,
    pub addr_total: u64,
}

/// Miner activity rollup for one bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinerStat {
    pub stat_type: IntervalType,
    pub stat_time: DateTime<Utc>,
    pub miner_new: u64,
    pub miner_active: u64,
    pub miner_total: u64,
    pub reward_amount: Amount,
}

/// All rollups for one bucket, written together
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowStats {
    pub submit: SubmitStat,
    pub address: AddressStat,
    pub miner: MinerStat,
}

impl WindowStats {
    #[must_use]
    pub fn window(&self) -> StatWindow {
        StatWindow {
            interval: self.submit.stat_type,
            start: self.submit.stat_time,
        }
    }
}

/// Sort order for stat listings
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Query for a page of rollups
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct StatQuery {
    #[serde(default)]
    pub interval: IntervalType,
    /// Lower bound on bucket start (unix seconds, inclusive)
    pub min_timestamp: Option<i64>,
    /// Upper bound on bucket start (unix seconds, inclusive)
    pub max_timestamp: Option<i64>,
    #[serde(default)]
    pub sort: SortOrder,
    #[serde(default)]
    #[validate(range(min = 0, message = "Skip must not be negative"))]
    pub skip: i64,
    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 2000, message = "Limit must be between 1 and 2000"))]
    #[schema(example = 10)]
    pub limit: i64,
}

fn default_limit() -> i64 {
    10
}

impl Default for StatQuery {
    fn default() -> Self {
        Self {
            interval: IntervalType::default(),
            min_timestamp: None,
            max_timestamp: None,
            sort: SortOrder::default(),
            skip: 0,
            limit: default_limit(),
        }
    }
}

impl StatQuery {
    #[must_use]
    pub fn min_time(&self) -> Option<DateTime<Utc>> {
        self.min_timestamp
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
    }

    #[must_use]
    pub fn max_time(&self) -> Option<DateTime<Utc>> {
        self.max_timestamp
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
    }

    /// Whether a bucket start passes the time bounds
    #[must_use]
    pub fn matches(&self, stat_type: IntervalType, stat_time: DateTime<Utc>) -> bool {
        stat_type == self.interval
            && self.min_time().is_none_or(|min| stat_time >= min)
            && self.max_time().is_none_or(|max| stat_time <= max)
    }
}

// ============================================================================
// API RESPONSES
// ============================================================================

/// Health status enum
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub database: HealthStatus,
    pub chain: HealthStatus,
    pub timestamp: DateTime<Utc>,
    #[schema(example = "0.1.0")]
    pub version: String,
}

impl HealthResponse {
    #[must_use]
    pub fn new(database: HealthStatus, chain: HealthStatus) -> Self {
        // A lagging node only stalls ingestion, the read API keeps serving
        let status = match (&database, &chain) {
            (HealthStatus::Healthy, HealthStatus::Healthy) => HealthStatus::Healthy,
            (HealthStatus::Unhealthy, _) => HealthStatus::Unhealthy,
            _ => HealthStatus::Degraded,
        };
        Self {
            status,
            database,
            chain,
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Page of projected rollups
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StatPage<T> {
    pub total: u64,
    pub list: Vec<T>,
}

/// Storage volume per bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StorageStatItem {
    pub stat_time: DateTime<Utc>,
    pub file_count: u64,
    pub file_total: u64,
    pub data_size: u64,
    pub data_total: u64,
}

impl From<&SubmitStat> for StorageStatItem {
    fn from(s: &SubmitStat) -> Self {
        Self {
            stat_time: s.stat_time,
            file_count: s.file_count,
            file_total: s.file_total,
            data_size: s.data_size,
            data_total: s.data_total,
        }
    }
}

/// Transaction volume per bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TxStatItem {
    pub stat_time: DateTime<Utc>,
    pub tx_count: u64,
    pub tx_total: u64,
}

impl From<&SubmitStat> for TxStatItem {
    fn from(s: &SubmitStat) -> Self {
        Self {
            stat_time: s.stat_time,
            tx_count: s.tx_count,
            tx_total: s.tx_total,
        }
    }
}

/// Storage fees per bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FeeStatItem {
    pub stat_time: DateTime<Utc>,
    #[schema(value_type = String, example = "1200000000")]
    pub storage_fee: Amount,
    #[schema(value_type = String)]
    pub storage_fee_total: Amount,
}

impl From<&SubmitStat> for FeeStatItem {
    fn from(s: &SubmitStat) -> Self {
        Self {
            stat_time: s.stat_time,
            storage_fee: s.base_fee.clone(),
            storage_fee_total: s.base_fee_total.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AddressStatItem {
    pub stat_time: DateTime<Utc>,
    pub address_new: u64,
    pub address_active: u64,
    pub address_total: u64,
}

impl From<&AddressStat> for AddressStatItem {
    fn from(s: &AddressStat) -> Self {
        Self {
            stat_time: s.stat_time,
            address_new: s.addr_new,
            address_active: s.addr_active,
            address_total: s.addr_total,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MinerStatItem {
    pub stat_time: DateTime<Utc>,
    pub miner_new: u64,
    pub miner_active: u64,
    pub miner_total: u64,
    #[schema(value_type = String)]
    pub reward_amount: Amount,
}

impl From<&MinerStat> for MinerStatItem {
    fn from(s: &MinerStat) -> Self {
        Self {
            stat_time: s.stat_time,
            miner_new: s.miner_new,
            miner_active: s.miner_active,
            miner_total: s.miner_total,
            reward_amount: s.reward_amount.clone(),
        }
    }
}

/// Ingestion progress plus the cumulative storage fee of the latest day
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Summary {
    pub sync: SyncCursor,
    /// `None` until the first daily rollup is written
    #[schema(value_type = Option<String>)]
    pub storage_fee_total: Option<Amount>,
}

/// Error response structure
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

/// Error detail structure
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    #[schema(example = "validation_error")]
    pub r#type: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_submit_status_ordering_and_encoding() {
        assert!(SubmitStatus::NotUploaded < SubmitStatus::Uploading);
        assert!(SubmitStatus::Uploading < SubmitStatus::Uploaded);
        assert!(SubmitStatus::Uploaded < SubmitStatus::Finalized);

        for status in [
            SubmitStatus::NotUploaded,
            SubmitStatus::Uploading,
            SubmitStatus::Uploaded,
            SubmitStatus::Finalized,
        ] {
            assert_eq!(SubmitStatus::from_i16(status.as_i16()), Some(status));
            assert_eq!(SubmitStatus::from_str(status.as_str()).unwrap(), status);
        }
        assert_eq!(SubmitStatus::from_i16(7), None);
        assert!(SubmitStatus::from_str("lost").is_err());
    }

    #[test]
    fn test_file_info_status() {
        let info = |finalized, uploaded_seg_num| FileInfo {
            finalized,
            uploaded_seg_num,
        };
        assert_eq!(info(false, 0).status(4), SubmitStatus::NotUploaded);
        assert_eq!(info(false, 2).status(4), SubmitStatus::Uploading);
        assert_eq!(info(false, 4).status(4), SubmitStatus::Uploaded);
        assert_eq!(info(true, 0).status(4), SubmitStatus::Finalized);
        assert_eq!(info(false, 0).status(0), SubmitStatus::NotUploaded);
    }

    #[test]
    fn test_interval_bucket_alignment() {
        let t = Utc.with_ymd_and_hms(2024, 3, 5, 14, 37, 12).unwrap();
        assert_eq!(
            IntervalType::Hour.bucket_start(t),
            Utc.with_ymd_and_hms(2024, 3, 5, 14, 0, 0).unwrap()
        );
        assert_eq!(
            IntervalType::Day.bucket_start(t),
            Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap()
        );

        let window = StatWindow::containing(IntervalType::Day, t);
        assert_eq!(
            window.end(),
            Utc.with_ymd_and_hms(2024, 3, 6, 0, 0, 0).unwrap()
        );
        assert_eq!(window.next().start, window.end());
    }

    #[test]
    fn test_amount_serializes_as_decimal_string() {
        let amount = Amount::from_be_bytes(&[0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
        let json = serde_json::to_string(&amount).unwrap();
        assert_eq!(json, "\"18446744073709551616\"");
        let back: Amount = serde_json::from_str(&json).unwrap();
        assert_eq!(back, amount);
        assert_eq!(Amount::from_str("1200.0").unwrap(), Amount::from(1200));
    }

    #[test]
    fn test_stat_query_bounds() {
        let query = StatQuery {
            min_timestamp: Some(1_700_000_000),
            max_timestamp: Some(1_700_086_400),
            ..Default::default()
        };
        let inside = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        let after = DateTime::<Utc>::from_timestamp(1_700_090_000, 0).unwrap();
        assert!(query.matches(IntervalType::Day, inside));
        assert!(!query.matches(IntervalType::Day, after));
        assert!(!query.matches(IntervalType::Hour, inside));
        assert!(query.validate().is_ok());

        let bad = StatQuery {
            limit: 0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_genesis_cursor() {
        let cursor = SyncCursor::genesis(100);
        assert_eq!(cursor.block_number, Some(99));
        assert_eq!(cursor.next_block(), 100);
        assert!(cursor.block_hash.is_none());

        // Nothing below block zero, so block zero itself is next
        let zero = SyncCursor::genesis(0);
        assert_eq!(zero.block_number, None);
        assert_eq!(zero.next_block(), 0);
    }
}
