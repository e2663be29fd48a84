//! Storage error types

use canon_primitives::H256;
use canon_types::DecodeError;
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// RocksDB error
    #[error("rocksdb error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    /// Stored bytes failed to decode
    #[error("corrupt record under {key}: {source}")]
    Decode {
        /// Printable key
        key: String,
        /// Decoder failure
        source: DecodeError,
    },

    /// No state snapshot stored under this root
    #[error("missing state for root {0}")]
    MissingState(H256),

    /// Database not open
    #[error("database not open")]
    NotOpen,

    /// Database already open
    #[error("database already open")]
    AlreadyOpen,

    /// Column family missing from the database
    #[error("invalid column family: {0}")]
    InvalidColumnFamily(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
