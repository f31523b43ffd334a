//! Error taxonomy for the indexer.
//!
//! Errors are grouped by the subsystem that produced them. The loops only
//! need two questions answered: can the cycle be retried after a back-off
//! (`is_transient`), and must the loop stop (`is_fatal`).

use thiserror::Error;

/// Top-level application error
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The local view can no longer be reconciled with the node.
    #[error("Consistency violation: {0}")]
    Consistency(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Network, timeout and storage failures that a later cycle may not hit.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Database(e) => e.is_transient(),
            Self::Chain(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Errors after which a loop must stop instead of diverging silently.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Consistency(_) | Self::Config(_))
    }
}

/// Persistence failures
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate record: {0}")]
    Duplicate(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    /// The cursor moved between the start of a cycle and its commit.
    #[error("Sync cursor conflict: {0}")]
    CursorConflict(String),
}

impl DatabaseError {
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Query(_) | Self::CursorConflict(_)
        )
    }
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Self::NotFound(err.to_string()),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Self::Connection(err.to_string())
            }
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                Self::Duplicate(db_err.message().to_string())
            }
            _ => Self::Query(err.to_string()),
        }
    }
}

/// Chain node and storage node failures
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The node refuses the log query for its block span or result size.
    #[error("Log query range rejected: {0}")]
    RangeTooLarge(String),

    #[error("Block {0} not found")]
    BlockNotFound(u64),

    /// The node served data that does not link up, usually a reorg racing the fetch.
    #[error("Inconsistent chain data: {0}")]
    Inconsistent(String),
}

impl ChainError {
    #[must_use]
    pub fn is_transient(&self) -> bool {
        // RPC-level errors are usually rate limits or a lagging node
        !matches!(self, Self::InvalidResponse(_) | Self::RangeTooLarge(_))
    }
}

/// Failure to turn a raw log into a typed event
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Unknown event signature: {0}")]
    UnknownSignature(String),

    #[error("Log has no topics")]
    NoTopics,

    #[error("Expected {expected} topics, found {found}")]
    MissingTopics { expected: usize, found: usize },

    #[error("Expected {expected} bytes of data, found {found}")]
    InvalidDataLength { expected: usize, found: usize },

    #[error("Field {0} does not fit in a 63-bit integer")]
    Overflow(&'static str),

    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    #[error("Malformed ABI payload: {0}")]
    Abi(String),

    #[error("Failed to encode extension payload: {0}")]
    Extra(String),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Request validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Validation failed: {0}")]
    Multiple(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(AppError::Chain(ChainError::Timeout("t".into())).is_transient());
        assert!(AppError::Chain(ChainError::Inconsistent("x".into())).is_transient());
        assert!(AppError::Database(DatabaseError::Connection("c".into())).is_transient());
        assert!(AppError::Database(DatabaseError::CursorConflict("c".into())).is_transient());
        assert!(!AppError::Chain(ChainError::InvalidResponse("bad".into())).is_transient());
        assert!(!AppError::Chain(ChainError::RangeTooLarge("10000".into())).is_transient());
        assert!(!AppError::Decode(DecodeError::NoTopics).is_transient());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(AppError::Consistency("cursor ahead of node".into()).is_fatal());
        assert!(
            AppError::Config(ConfigError::MissingEnvVar("DATABASE_URL".into())).is_fatal()
        );
        assert!(!AppError::Decode(DecodeError::NoTopics).is_fatal());
        assert!(!AppError::Chain(ChainError::Timeout("t".into())).is_fatal());
    }

    #[test]
    fn test_error_display() {
        let err = AppError::Decode(DecodeError::MissingTopics {
            expected: 3,
            found: 1,
        });
        assert_eq!(err.to_string(), "Decode error: Expected 3 topics, found 1");
    }
}
