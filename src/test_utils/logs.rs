//! Builders for ABI-encoded contract logs.

use ethers::abi::{Token, encode};
use ethers::types::{H160, H256, U256};

use crate::domain::events::{EventKind, to_hex};
use crate::domain::{RawLog, Topic};

/// Contract address used by the builders
pub const TEST_CONTRACT: &str = "0x00000000000000000000000000000000000000f1";

pub fn uint(value: u64) -> Token {
    Token::Uint(U256::from(value))
}

pub fn bytes32(byte: u8) -> Token {
    Token::FixedBytes(vec![byte; 32])
}

pub fn address_token(byte: u8) -> Token {
    Token::Address(H160::repeat_byte(byte))
}

/// Hex address matching `address_token(byte)`
pub fn address(byte: u8) -> String {
    to_hex(H160::repeat_byte(byte).as_bytes())
}

/// An indexed parameter as it appears in a topic
pub fn topic(token: Token) -> Topic {
    H256::from_slice(&encode(&[token])).0
}

pub fn raw_log(topics: Vec<Topic>, data: Vec<Token>) -> RawLog {
    RawLog {
        address: TEST_CONTRACT.to_string(),
        topics,
        data: encode(&data),
        block_number: 100,
        block_hash: "0xb100".to_string(),
        tx_hash: "0xt100".to_string(),
        log_index: 0,
    }
}

/// `Submit` log from sender `0xaa..aa`
pub fn submit_log(index: u64, length: u64, fee: u64) -> RawLog {
    submit_log_from(0xaa, index, length, fee)
}

pub fn submit_log_from(sender: u8, index: u64, length: u64, fee: u64) -> RawLog {
    raw_log(
        vec![
            EventKind::Submit.topic(),
            topic(address_token(sender)),
            topic(bytes32(0x11)),
        ],
        vec![uint(index), uint(0), uint(length), bytes32(0x22), uint(fee)],
    )
}

pub fn data_upload_log(epoch: u64, quorum_id: u64, root: u8) -> RawLog {
    raw_log(
        vec![EventKind::DataUpload.topic()],
        vec![uint(epoch), uint(quorum_id), bytes32(root)],
    )
}

pub fn commitment_verified_log(epoch: u64, quorum_id: u64, root: u8) -> RawLog {
    raw_log(
        vec![EventKind::CommitmentVerified.topic()],
        vec![uint(epoch), uint(quorum_id), bytes32(root)],
    )
}

pub fn reward_log(pricing_index: u64, miner: u8, amount: u64) -> RawLog {
    raw_log(
        vec![
            EventKind::NewReward.topic(),
            topic(uint(pricing_index)),
            topic(address_token(miner)),
        ],
        vec![uint(amount)],
    )
}

/// Place a log in a block
pub fn at_block(mut log: RawLog, block_number: u64, block_hash: &str, log_index: u64) -> RawLog {
    log.block_number = block_number;
    log.block_hash = block_hash.to_string();
    log.tx_hash = format!("0x{:064x}", block_number * 1000 + log_index);
    log.log_index = log_index;
    log
}
