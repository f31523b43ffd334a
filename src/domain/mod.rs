//! Domain layer containing core types, the event decoder, the record builder,
//! port traits and error definitions.

pub mod error;
pub mod events;
pub mod records;
pub mod traits;
pub mod types;

pub use error::{
    AppError, ChainError, ConfigError, DatabaseError, DecodeError, ValidationError,
};
pub use events::{ContractEvent, EventKind, decode_log};
pub use records::{SEGMENT_SIZE, build_range, segment_count};
pub use traits::{ChainNode, FinalityOracle, IndexerStore};
pub use types::{
    AddressStat, AddressStatItem, AddressSubmission, Amount, BlockHeader, DaKey, DaSubmission,
    DaVerification, ErrorDetail, ErrorResponse, FeeStatItem, FileInfo, FinalityUpdate,
    HealthResponse, HealthStatus, IntervalType, LogFilter, MinerStat, MinerStatItem,
    PendingSubmission, RangeBatch, RawLog, Reward, RollbackSummary, SortOrder, StatPage,
    StatQuery, StatWindow, StorageStatItem, SubmitStat, SubmitStatus, Submission, Summary,
    SyncCursor, Topic, TxStatItem, WindowStats,
};
