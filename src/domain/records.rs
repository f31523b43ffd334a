//! Record building: typed events plus block metadata become persistable rows.
//!
//! Every function here is a pure function of its inputs so that replaying a
//! block range after a crash yields exactly the same rows.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::error::{AppError, ChainError, DecodeError};
use super::events::{ContractEvent, DaEvent, RewardEvent, SubmitEvent, decode_log};
use super::types::{
    AddressSubmission, Amount, BlockHeader, DaKey, DaSubmission, DaVerification, RangeBatch,
    RawLog, Reward, SubmitStatus, Submission,
};

/// Size of one storage segment in bytes (256 chunks of 1 KiB)
pub const SEGMENT_SIZE: u64 = 256 * 1024;

/// Number of segments needed to hold `length` bytes
#[must_use]
pub fn segment_count(length: u64) -> u64 {
    if length == 0 {
        0
    } else {
        (length - 1) / SEGMENT_SIZE + 1
    }
}

/// Where a log was emitted
#[derive(Debug, Clone, Copy)]
pub struct LogMeta<'a> {
    pub block_number: u64,
    pub block_time: DateTime<Utc>,
    pub tx_hash: &'a str,
    pub log_index: u64,
}

#[derive(Serialize)]
struct SubmitExtra<'a> {
    identity: &'a str,
    start_pos: u64,
    length: u64,
    root: &'a str,
    fee: &'a Amount,
}

pub fn build_submission(event: &SubmitEvent, meta: &LogMeta<'_>) -> Result<Submission, DecodeError> {
    let extra = serde_json::to_string(&SubmitExtra {
        identity: &event.identity,
        start_pos: event.start_pos,
        length: event.length,
        root: &event.root,
        fee: &event.fee,
    })
    .map_err(|e| DecodeError::Extra(e.to_string()))?;

    Ok(Submission {
        submission_index: event.submission_index,
        root_hash: event.root.clone(),
        sender: event.sender.clone(),
        length: event.length,
        block_number: meta.block_number,
        block_time: meta.block_time,
        tx_hash: meta.tx_hash.to_string(),
        total_seg_num: segment_count(event.length),
        uploaded_seg_num: 0,
        status: SubmitStatus::NotUploaded,
        fee: event.fee.clone(),
        extra,
    })
}

fn da_key(event: &DaEvent) -> DaKey {
    DaKey {
        epoch: event.epoch,
        quorum_id: event.quorum_id,
        root_hash: event.data_root.clone(),
    }
}

#[must_use]
pub fn build_da_submission(event: &DaEvent, meta: &LogMeta<'_>) -> DaSubmission {
    DaSubmission {
        key: da_key(event),
        verified: false,
        block_number: meta.block_number,
        block_time: meta.block_time,
        tx_hash: meta.tx_hash.to_string(),
        block_number_verified: None,
        block_time_verified: None,
        tx_hash_verified: None,
    }
}

#[must_use]
pub fn build_da_verification(event: &DaEvent, meta: &LogMeta<'_>) -> DaVerification {
    DaVerification {
        key: da_key(event),
        block_number: meta.block_number,
        block_time: meta.block_time,
        tx_hash: meta.tx_hash.to_string(),
    }
}

#[must_use]
pub fn build_reward(event: &RewardEvent, meta: &LogMeta<'_>) -> Reward {
    Reward {
        block_number: meta.block_number,
        log_index: meta.log_index,
        pricing_index: event.pricing_index,
        miner: event.beneficiary.clone(),
        amount: event.amount.clone(),
        block_time: meta.block_time,
        tx_hash: meta.tx_hash.to_string(),
    }
}

/// Decode and build every log of a fetched range.
///
/// `headers` must be the contiguous headers of the range. Logs are processed
/// in (block, log index) order; a log whose block hash disagrees with the
/// header at its height means the node reorganised mid-fetch.
pub fn build_range(headers: Vec<BlockHeader>, logs: &[RawLog]) -> Result<RangeBatch, AppError> {
    let by_number: HashMap<u64, &BlockHeader> = headers.iter().map(|h| (h.number, h)).collect();

    let mut ordered: Vec<&RawLog> = logs.iter().collect();
    ordered.sort_by_key(|log| (log.block_number, log.log_index));

    let mut batch = RangeBatch::default();
    for log in ordered {
        let header = by_number.get(&log.block_number).ok_or_else(|| {
            ChainError::Inconsistent(format!(
                "log at block {} outside fetched range",
                log.block_number
            ))
        })?;
        if header.hash != log.block_hash {
            return Err(ChainError::Inconsistent(format!(
                "log block hash {} differs from header {} at block {}",
                log.block_hash, header.hash, log.block_number
            ))
            .into());
        }

        let meta = LogMeta {
            block_number: log.block_number,
            block_time: header.timestamp,
            tx_hash: &log.tx_hash,
            log_index: log.log_index,
        };
        match decode_log(log)? {
            ContractEvent::Submit(event) => {
                let submission = build_submission(&event, &meta)?;
                batch
                    .address_submissions
                    .push(AddressSubmission::from(&submission));
                batch.submissions.push(submission);
            }
            ContractEvent::DataUpload(event) => {
                batch.da_submissions.push(build_da_submission(&event, &meta));
            }
            ContractEvent::CommitmentVerified(event) => {
                batch
                    .da_verifications
                    .push(build_da_verification(&event, &meta));
            }
            ContractEvent::NewReward(event) => batch.rewards.push(build_reward(&event, &meta)),
        }
    }
    batch.headers = headers;
    Ok(batch)
}
