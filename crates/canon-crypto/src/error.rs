//! Cryptographic errors

use thiserror::Error;

/// Cryptographic operation error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Signing failed
    #[error("signing failed: {0}")]
    SigningFailed(String),

    /// Signature bytes do not form a valid signature
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// `v` is not 27 or 28
    #[error("invalid recovery id: {0}")]
    InvalidRecoveryId(u8),

    /// Public key recovery failed
    #[error("public key recovery failed: {0}")]
    RecoveryFailed(String),

    /// Private key bytes out of range
    #[error("invalid private key")]
    InvalidPrivateKey,
}
