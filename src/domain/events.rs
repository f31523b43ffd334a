//! Contract event decoding.
//!
//! Events are identified by `topics[0] = keccak256(signature)`. Indexed fields
//! live in the remaining topics, everything else is ABI-encoded in `data`.

use std::sync::LazyLock;

use ethers::abi::{self, ParamType, Token};
use ethers::types::U256;

use super::error::DecodeError;
use super::types::{Amount, RawLog, Topic};

/// Contract events the indexer understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Submit,
    DataUpload,
    CommitmentVerified,
    NewReward,
}

static TOPICS: LazyLock<[(EventKind, Topic); 4]> = LazyLock::new(|| {
    EventKind::ALL.map(|kind| (kind, abi::long_signature(kind.name(), &kind.inputs()).0))
});

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::Submit,
        EventKind::DataUpload,
        EventKind::CommitmentVerified,
        EventKind::NewReward,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Submit => "Submit",
            Self::DataUpload => "DataUpload",
            Self::CommitmentVerified => "ErasureCommitmentVerified",
            Self::NewReward => "NewReward",
        }
    }

    pub fn signature(&self) -> &'static str {
        match self {
            Self::Submit => "Submit(address,bytes32,uint256,uint256,uint256,bytes32,uint256)",
            Self::DataUpload => "DataUpload(uint256,uint256,bytes32)",
            Self::CommitmentVerified => "ErasureCommitmentVerified(uint256,uint256,bytes32)",
            Self::NewReward => "NewReward(uint256,address,uint256)",
        }
    }

    /// Parameters carried in `topics[1..]`
    fn indexed_params(&self) -> Vec<ParamType> {
        match self {
            Self::Submit => vec![ParamType::Address, ParamType::FixedBytes(32)],
            Self::NewReward => vec![ParamType::Uint(256), ParamType::Address],
            Self::DataUpload | Self::CommitmentVerified => vec![],
        }
    }

    /// Parameters ABI-encoded in `data`
    fn data_params(&self) -> Vec<ParamType> {
        match self {
            Self::Submit => vec![
                ParamType::Uint(256),
                ParamType::Uint(256),
                ParamType::Uint(256),
                ParamType::FixedBytes(32),
                ParamType::Uint(256),
            ],
            Self::DataUpload | Self::CommitmentVerified => vec![
                ParamType::Uint(256),
                ParamType::Uint(256),
                ParamType::FixedBytes(32),
            ],
            Self::NewReward => vec![ParamType::Uint(256)],
        }
    }

    /// All inputs in declaration order; every event declares its indexed fields first
    fn inputs(&self) -> Vec<ParamType> {
        let mut inputs = self.indexed_params();
        inputs.extend(self.data_params());
        inputs
    }

    #[must_use]
    pub fn topic(&self) -> Topic {
        TOPICS[*self as usize].1
    }

    #[must_use]
    pub fn from_topic(topic: &Topic) -> Option<Self> {
        TOPICS
            .iter()
            .find(|(_, t)| t == topic)
            .map(|(kind, _)| *kind)
    }

    /// Topic count including the signature topic
    fn topic_count(&self) -> usize {
        self.indexed_params().len() + 1
    }

    /// Exact `data` length; every data parameter is a static 32-byte word
    fn data_len(&self) -> usize {
        self.data_params().len() * 32
    }
}

/// Lowercase `0x`-prefixed hex
#[must_use]
pub fn to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Parse `0x`-prefixed hex into a 32-byte word
pub fn parse_topic(value: &str) -> Result<Topic, DecodeError> {
    let bytes = hex::decode(value.trim_start_matches("0x"))
        .map_err(|e| DecodeError::InvalidHex(format!("{}: {}", value, e)))?;
    bytes
        .try_into()
        .map_err(|_| DecodeError::InvalidHex(format!("{} is not 32 bytes", value)))
}

/// Flow contract `Submit` event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitEvent {
    pub sender: String,
    pub identity: String,
    pub submission_index: u64,
    pub start_pos: u64,
    pub length: u64,
    pub root: String,
    pub fee: Amount,
}

/// `DataUpload` or `ErasureCommitmentVerified` payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaEvent {
    pub epoch: u64,
    pub quorum_id: u64,
    pub data_root: String,
}

/// Mine contract `NewReward` event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardEvent {
    pub pricing_index: u64,
    pub beneficiary: String,
    pub amount: Amount,
}

/// A decoded log
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractEvent {
    Submit(SubmitEvent),
    DataUpload(DaEvent),
    CommitmentVerified(DaEvent),
    NewReward(RewardEvent),
}

/// Decode one raw log into a typed event.
///
/// Pure and deterministic: the same log always yields the same event.
pub fn decode_log(log: &RawLog) -> Result<ContractEvent, DecodeError> {
    let signature = log.topics.first().ok_or(DecodeError::NoTopics)?;
    let kind = EventKind::from_topic(signature)
        .ok_or_else(|| DecodeError::UnknownSignature(to_hex(signature)))?;

    if log.topics.len() != kind.topic_count() {
        return Err(DecodeError::MissingTopics {
            expected: kind.topic_count(),
            found: log.topics.len(),
        });
    }
    if log.data.len() != kind.data_len() {
        return Err(DecodeError::InvalidDataLength {
            expected: kind.data_len(),
            found: log.data.len(),
        });
    }

    let mut tokens = Vec::with_capacity(kind.inputs().len());
    for (param, topic) in kind.indexed_params().into_iter().zip(&log.topics[1..]) {
        tokens.extend(abi::decode(&[param], topic).map_err(abi_error)?);
    }
    tokens.extend(abi::decode(&kind.data_params(), &log.data).map_err(abi_error)?);

    let mut fields = Fields(tokens.into_iter());
    let event = match kind {
        EventKind::Submit => ContractEvent::Submit(SubmitEvent {
            sender: fields.address("sender")?,
            identity: fields.bytes32("identity")?,
            submission_index: fields.u64("submissionIndex")?,
            start_pos: fields.u64("startPos")?,
            length: fields.u64("length")?,
            root: fields.bytes32("root")?,
            fee: fields.amount("fee")?,
        }),
        EventKind::DataUpload => ContractEvent::DataUpload(da_event(&mut fields)?),
        EventKind::CommitmentVerified => ContractEvent::CommitmentVerified(da_event(&mut fields)?),
        EventKind::NewReward => ContractEvent::NewReward(RewardEvent {
            pricing_index: fields.u64("pricingIndex")?,
            beneficiary: fields.address("beneficiary")?,
            amount: fields.amount("amount")?,
        }),
    };
    Ok(event)
}

fn abi_error(err: abi::Error) -> DecodeError {
    DecodeError::Abi(err.to_string())
}

fn da_event(fields: &mut Fields) -> Result<DaEvent, DecodeError> {
    Ok(DaEvent {
        epoch: fields.u64("epoch")?,
        quorum_id: fields.u64("quorumId")?,
        data_root: fields.bytes32("dataRoot")?,
    })
}

/// Decoded tokens consumed in declaration order
struct Fields(std::vec::IntoIter<Token>);

impl Fields {
    fn next(&mut self, field: &'static str) -> Result<Token, DecodeError> {
        self.0
            .next()
            .ok_or_else(|| DecodeError::Abi(format!("missing field {}", field)))
    }

    fn mismatch(field: &'static str, token: &Token) -> DecodeError {
        DecodeError::Abi(format!("unexpected token for {}: {:?}", field, token))
    }

    fn uint(&mut self, field: &'static str) -> Result<U256, DecodeError> {
        match self.next(field)? {
            Token::Uint(value) => Ok(value),
            other => Err(Self::mismatch(field, &other)),
        }
    }

    /// Integer that must fit the signed 64-bit database columns
    fn u64(&mut self, field: &'static str) -> Result<u64, DecodeError> {
        let value = self.uint(field)?;
        if value > U256::from(i64::MAX as u64) {
            return Err(DecodeError::Overflow(field));
        }
        Ok(value.as_u64())
    }

    fn amount(&mut self, field: &'static str) -> Result<Amount, DecodeError> {
        self.uint(field).map(Amount::from)
    }

    fn bytes32(&mut self, field: &'static str) -> Result<String, DecodeError> {
        match self.next(field)? {
            Token::FixedBytes(bytes) => Ok(to_hex(&bytes)),
            other => Err(Self::mismatch(field, &other)),
        }
    }

    fn address(&mut self, field: &'static str) -> Result<String, DecodeError> {
        match self.next(field)? {
            Token::Address(address) => Ok(to_hex(address.as_bytes())),
            other => Err(Self::mismatch(field, &other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::logs::*;
    use ethers::utils::keccak256;

    #[test]
    fn test_topic_matches_known_keccak() {
        let transfer = abi::long_signature(
            "Transfer",
            &[ParamType::Address, ParamType::Address, ParamType::Uint(256)],
        );
        assert_eq!(
            to_hex(transfer.as_bytes()),
            "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
        );
    }

    #[test]
    fn test_topics_match_signatures() {
        for kind in EventKind::ALL {
            assert_eq!(kind.topic(), keccak256(kind.signature().as_bytes()), "{:?}", kind);
        }
    }

    #[test]
    fn test_topics_are_distinct() {
        let topics: std::collections::HashSet<_> =
            EventKind::ALL.iter().map(|k| k.topic()).collect();
        assert_eq!(topics.len(), EventKind::ALL.len());
        for kind in EventKind::ALL {
            assert_eq!(EventKind::from_topic(&kind.topic()), Some(kind));
        }
    }

    #[test]
    fn test_decode_submit() {
        let event = decode_log(&submit_log(42, 1024, 7)).unwrap();
        let ContractEvent::Submit(submit) = event else {
            panic!("expected submit event");
        };
        assert_eq!(submit.submission_index, 42);
        assert_eq!(submit.length, 1024);
        assert_eq!(submit.fee, Amount::from(7));
        assert_eq!(submit.sender, address(0xaa));
        assert_eq!(submit.identity, format!("0x{}", "11".repeat(32)));
        assert_eq!(submit.root, format!("0x{}", "22".repeat(32)));
    }

    #[test]
    fn test_decode_da_events() {
        let data = vec![uint(3), uint(1), bytes32(0x33)];
        let upload =
            decode_log(&raw_log(vec![EventKind::DataUpload.topic()], data.clone())).unwrap();
        let verified =
            decode_log(&raw_log(vec![EventKind::CommitmentVerified.topic()], data)).unwrap();

        let expected = DaEvent {
            epoch: 3,
            quorum_id: 1,
            data_root: format!("0x{}", "33".repeat(32)),
        };
        assert_eq!(upload, ContractEvent::DataUpload(expected.clone()));
        assert_eq!(verified, ContractEvent::CommitmentVerified(expected));
    }

    #[test]
    fn test_decode_reward_keeps_full_precision() {
        let amount = U256::one() << 248;
        let log = raw_log(
            vec![
                EventKind::NewReward.topic(),
                topic(uint(9)),
                topic(address_token(0xbb)),
            ],
            vec![Token::Uint(amount)],
        );
        let ContractEvent::NewReward(reward) = decode_log(&log).unwrap() else {
            panic!("expected reward event");
        };
        assert_eq!(reward.pricing_index, 9);
        assert_eq!(reward.beneficiary, address(0xbb));
        assert_eq!(reward.amount, Amount::from(amount));
        assert_eq!(reward.amount.0.bits(), 249);
    }

    #[test]
    fn test_decode_rejects_unknown_signature() {
        let log = raw_log(vec![topic(bytes32(0x99))], vec![]);
        assert!(matches!(
            decode_log(&log),
            Err(DecodeError::UnknownSignature(_))
        ));
        let no_topics = raw_log(vec![], vec![]);
        assert_eq!(decode_log(&no_topics), Err(DecodeError::NoTopics));
    }

    #[test]
    fn test_decode_rejects_malformed_payload() {
        let mut log = submit_log(1, 1, 1);
        log.data.truncate(64);
        assert_eq!(
            decode_log(&log),
            Err(DecodeError::InvalidDataLength {
                expected: 160,
                found: 64
            })
        );

        let mut log = submit_log(1, 1, 1);
        log.data.extend([0u8; 32]);
        assert!(matches!(
            decode_log(&log),
            Err(DecodeError::InvalidDataLength { expected: 160, .. })
        ));

        let mut log = submit_log(1, 1, 1);
        log.topics.pop();
        assert_eq!(
            decode_log(&log),
            Err(DecodeError::MissingTopics {
                expected: 3,
                found: 2
            })
        );
    }

    #[test]
    fn test_decode_rejects_oversized_integer() {
        let log = raw_log(
            vec![EventKind::DataUpload.topic()],
            vec![Token::Uint(U256::MAX), uint(1), bytes32(0x33)],
        );
        assert_eq!(decode_log(&log), Err(DecodeError::Overflow("epoch")));

        // One past the largest BIGINT
        let log = raw_log(
            vec![EventKind::DataUpload.topic()],
            vec![uint(1), uint(i64::MAX as u64 + 1), bytes32(0x33)],
        );
        assert_eq!(decode_log(&log), Err(DecodeError::Overflow("quorumId")));
    }

    #[test]
    fn test_parse_topic() {
        let topic = EventKind::Submit.topic();
        assert_eq!(parse_topic(&to_hex(&topic)).unwrap(), topic);
        assert!(parse_topic("0x1234").is_err());
        assert!(parse_topic("0xzz").is_err());
    }
}
