//! Parsing errors for primitive types

use thiserror::Error;

/// Primitive parsing error
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PrimitiveError {
    /// Input is not valid hex
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    /// Input has the wrong byte length
    #[error("invalid length: expected {expected} bytes, got {got}")]
    InvalidLength {
        /// Required length
        expected: usize,
        /// Supplied length
        got: usize,
    },
}
