//! Execution errors reported by a code executor

use thiserror::Error;

/// Execution failure; the caller reverts state changes but still charges gas
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VmError {
    /// Gas budget exhausted
    #[error("out of gas")]
    OutOfGas,

    /// Code signalled a revert
    #[error("execution reverted")]
    Reverted,

    /// State write attempted during a static call
    #[error("state modification in static context")]
    StaticViolation,

    /// Code could not be executed
    #[error("invalid code: {0}")]
    InvalidCode(String),

    /// Any other executor-specific failure
    #[error("execution failed: {0}")]
    Other(String),
}
