//! Chain and transaction error types

use canon_consensus::ConsensusError;
use canon_crypto::CryptoError;
use canon_primitives::{BlockNumber, Gas, H256, U256};
use canon_storage::StorageError;
use canon_types::DecodeError;
use canon_vm::VmError;
use std::fmt;
use thiserror::Error;

/// Which gas limit a transaction ran into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GasScope {
    /// The model's per-transaction cap
    Transaction,
    /// The block's remaining gas pool
    Block,
}

impl fmt::Display for GasScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GasScope::Transaction => f.write_str("transaction"),
            GasScope::Block => f.write_str("block"),
        }
    }
}

/// Reasons a transaction is dropped from a block.
///
/// None of these abort block processing; the transaction is skipped and
/// the block carries on (a [`GasScope::Block`] failure also skips every
/// later transaction).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TxError {
    /// Sender could not be recovered
    #[error("invalid signature: {0}")]
    InvalidSignature(#[from] CryptoError),

    /// Consensus model refused the sender
    #[error("permission denied: {0}")]
    PermissionDenied(ConsensusError),

    /// Nonce does not match the sender account
    #[error("nonce mismatch: expected {expected}, got {got}")]
    NonceMismatch {
        /// Account nonce
        expected: u64,
        /// Transaction nonce
        got: u64,
    },

    /// Gas limit below the intrinsic cost
    #[error("intrinsic gas too low: required {required}, provided {provided}")]
    IntrinsicGasTooLow {
        /// Intrinsic cost
        required: Gas,
        /// Transaction gas limit
        provided: Gas,
    },

    /// Gas limit over a cap
    #[error("{scope} gas limit exceeded: requested {requested}, available {available}")]
    GasLimitExceeded {
        /// Which limit
        scope: GasScope,
        /// Gas the transaction asked for
        requested: Gas,
        /// Gas the limit allows
        available: Gas,
    },

    /// Sender cannot cover `gas_limit * gas_price + value`
    #[error("insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        /// Up-front cost
        required: U256,
        /// Sender balance
        available: U256,
    },

    /// Code execution failed; the transaction is kept with a failed receipt
    #[error("execution failed: {0}")]
    Execution(VmError),
}

impl TxError {
    /// Whether the block gas pool ran dry, ending transaction processing
    pub fn exhausts_block(&self) -> bool {
        matches!(
            self,
            TxError::GasLimitExceeded {
                scope: GasScope::Block,
                ..
            }
        )
    }
}

/// Chain validation and storage errors
#[derive(Debug, Error)]
pub enum ChainError {
    /// First block's parent is not stored
    #[error("unknown parent {parent} of block {hash}")]
    ParentUnknown {
        /// Block whose parent is missing
        hash: H256,
        /// Missing parent
        parent: H256,
    },

    /// A block does not link to its predecessor in the candidate chain
    #[error("chain broken at #{number}: expected parent {expected}, got {got}")]
    ChainBroken {
        /// Number of the offending block
        number: BlockNumber,
        /// Hash of the preceding candidate block
        expected: H256,
        /// Parent hash the block carries
        got: H256,
    },

    /// Block failed structural, execution or commitment checks
    #[error("block {hash} invalid: {reason}")]
    ValidationFailed {
        /// Offending block
        hash: H256,
        /// What failed
        reason: String,
    },

    /// Candidate does not outweigh the canonical chain
    #[error("total difficulty too low: {td} <= {canonical}")]
    TotalDifficultyTooLow {
        /// Candidate total difficulty
        td: U256,
        /// Canonical total difficulty
        canonical: U256,
    },

    /// Consensus model refused the block
    #[error("block {hash} not permitted: {source}")]
    PermissionDenied {
        /// Offending block
        hash: H256,
        /// Model decision
        source: ConsensusError,
    },

    /// A locally produced block failed validation
    #[error("local block {hash} rejected: {source}")]
    LocalBlockRejected {
        /// Produced block
        hash: H256,
        /// Underlying failure
        source: Box<ChainError>,
    },

    /// Consensus model failure outside block validation
    #[error("consensus error: {0}")]
    Consensus(#[from] ConsensusError),

    /// Storage error
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Decode error
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
}

/// Result type for chain operations
pub type ChainResult<T> = Result<T, ChainError>;

impl ChainError {
    /// Build a [`ChainError::ValidationFailed`]
    pub fn invalid(hash: H256, reason: impl Into<String>) -> Self {
        ChainError::ValidationFailed {
            hash,
            reason: reason.into(),
        }
    }

    /// Classify a model rejection of block `hash`
    pub fn from_consensus(hash: H256, err: ConsensusError) -> Self {
        if err.is_permission() {
            ChainError::PermissionDenied { hash, source: err }
        } else {
            ChainError::invalid(hash, err.to_string())
        }
    }

    /// Whether the block pool should discard everything it holds.
    ///
    /// Structural and consensus rejections mean a peer served bad data.
    /// A light chain, a missing parent and local storage trouble leave the
    /// pooled blocks worth keeping.
    pub fn is_fatal_for_pool(&self) -> bool {
        match self {
            ChainError::ChainBroken { .. }
            | ChainError::ValidationFailed { .. }
            | ChainError::PermissionDenied { .. }
            | ChainError::LocalBlockRejected { .. } => true,
            ChainError::ParentUnknown { .. }
            | ChainError::TotalDifficultyTooLow { .. }
            | ChainError::Consensus(_)
            | ChainError::Storage(_)
            | ChainError::Decode(_) => false,
        }
    }
}
