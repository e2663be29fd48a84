//! # canon-crypto
//!
//! - Keccak-256 hashing
//! - secp256k1 recoverable signatures (low-s)
//! - Address derivation from public keys

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod hash;
mod signature;

pub use error::CryptoError;
pub use hash::{keccak256, keccak256_concat};
pub use signature::{
    private_key_from_seed, public_key_to_address, recover_address, recover_public_key, sign,
    PrivateKey, PublicKey, Signature,
};
