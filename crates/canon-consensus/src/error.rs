//! Consensus error types

use crate::model::Role;
use canon_primitives::{Address, H256, U256};
use thiserror::Error;

/// Consensus errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsensusError {
    /// Address lacks a role
    #[error("permission denied: {address} may not {role}")]
    PermissionDenied {
        /// Offending address
        address: Address,
        /// Role that was checked
        role: Role,
    },

    /// Header difficulty differs from what the model computes
    #[error("invalid difficulty: expected {expected}, got {got}")]
    InvalidDifficulty {
        /// Computed difficulty
        expected: U256,
        /// Difficulty in the header
        got: U256,
    },

    /// Proof-of-work seal does not meet the difficulty target
    #[error("invalid seal for block {0}")]
    InvalidSeal(H256),

    /// Nonce search gave up
    #[error("no valid nonce found within {0} attempts")]
    SealNotFound(u64),

    /// A consensus program failed or returned a malformed result
    #[error("consensus program at {address} failed: {reason}")]
    Program {
        /// Program account
        address: Address,
        /// Failure reason
        reason: String,
    },

    /// Unknown registry tunable
    #[error("unknown registry key: {0}")]
    UnknownKey(String),

    /// Model name that matches no variant
    #[error("unknown consensus model: {0}")]
    UnknownModel(String),

    /// Block rejected by the model for another reason
    #[error("block rejected: {0}")]
    BlockRejected(String),
}

/// Result type for consensus operations
pub type ConsensusResult<T> = Result<T, ConsensusError>;

impl ConsensusError {
    /// Whether this is a permission failure rather than a rule violation
    pub fn is_permission(&self) -> bool {
        matches!(self, ConsensusError::PermissionDenied { .. })
    }
}
