//! 256-bit hash type

use crate::{copy_fixed, decode_fixed, PrimitiveError};
use primitive_types::U256;
use std::fmt;

/// 256-bit hash (32 bytes)
///
/// Ordered bytewise so it can key sorted maps; the world state relies on
/// that ordering for a deterministic commitment.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct H256([u8; 32]);

impl H256 {
    /// Size in bytes
    pub const LEN: usize = 32;

    /// Zero hash
    pub const ZERO: H256 = H256([0u8; 32]);

    /// Create from bytes
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        H256(bytes)
    }

    /// Create from slice
    pub fn from_slice(slice: &[u8]) -> Result<Self, PrimitiveError> {
        copy_fixed(slice).map(H256)
    }

    /// Parse from hex string, with or without `0x`
    pub fn from_hex(s: &str) -> Result<Self, PrimitiveError> {
        decode_fixed(s).map(H256)
    }

    /// Big-endian word holding `value` in the low 8 bytes
    pub fn from_low_u64_be(value: u64) -> Self {
        let mut bytes = [0u8; 32];
        bytes[24..].copy_from_slice(&value.to_be_bytes());
        H256(bytes)
    }

    /// Big-endian word encoding of a `U256`
    pub fn from_u256(value: U256) -> Self {
        let mut bytes = [0u8; 32];
        value.to_big_endian(&mut bytes);
        H256(bytes)
    }

    /// Interpret as a big-endian `U256`
    pub fn to_u256(&self) -> U256 {
        U256::from_big_endian(&self.0)
    }

    /// Get as bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Check if zero
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Convert to `0x`-prefixed hex
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Short form used in log lines (first 4 bytes)
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Debug for H256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "H256({})", self.to_hex())
    }
}

impl fmt::Display for H256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<[u8; 32]> for H256 {
    fn from(bytes: [u8; 32]) -> Self {
        H256(bytes)
    }
}

impl AsRef<[u8]> for H256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(feature = "rlp")]
mod rlp_impl {
    use super::*;
    use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};

    impl Encodable for H256 {
        fn rlp_append(&self, s: &mut RlpStream) {
            s.encoder().encode_value(&self.0);
        }
    }

    impl Decodable for H256 {
        fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
            rlp.decoder().decode_value(|bytes| {
                copy_fixed(bytes)
                    .map(H256)
                    .map_err(|_| DecoderError::RlpInvalidLength)
            })
        }
    }
}

#[cfg(feature = "serde")]
mod serde_impl {
    use super::*;
    use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

    impl Serialize for H256 {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.serialize_str(&self.to_hex())
        }
    }

    impl<'de> Deserialize<'de> for H256 {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            let s = String::deserialize(deserializer)?;
            H256::from_hex(&s).map_err(de::Error::custom)
        }
    }
}
