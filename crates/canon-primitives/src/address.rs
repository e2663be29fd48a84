//! 20-byte account address

use crate::{copy_fixed, decode_fixed, PrimitiveError, H256};
use std::fmt;

/// Account address (20 bytes)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Address([u8; 20]);

impl Address {
    /// Size in bytes
    pub const LEN: usize = 20;

    /// Zero address
    pub const ZERO: Address = Address([0u8; 20]);

    /// Create from bytes
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Address(bytes)
    }

    /// Create from slice
    pub fn from_slice(slice: &[u8]) -> Result<Self, PrimitiveError> {
        copy_fixed(slice).map(Address)
    }

    /// Parse from hex string, with or without `0x`
    pub fn from_hex(s: &str) -> Result<Self, PrimitiveError> {
        decode_fixed(s).map(Address)
    }

    /// Address stored in the low 20 bytes of a storage word
    pub fn from_word(word: &H256) -> Self {
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&word.as_bytes()[12..]);
        Address(bytes)
    }

    /// Address whose last 8 bytes hold `value`; handy for reserved accounts
    pub fn from_low_u64_be(value: u64) -> Self {
        let mut bytes = [0u8; 20];
        bytes[12..].copy_from_slice(&value.to_be_bytes());
        Address(bytes)
    }

    /// Get as bytes
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Check if zero
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// Convert to `0x`-prefixed hex
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<[u8; 20]> for Address {
    fn from(bytes: [u8; 20]) -> Self {
        Address(bytes)
    }
}

impl From<Address> for H256 {
    fn from(addr: Address) -> Self {
        let mut bytes = [0u8; 32];
        bytes[12..].copy_from_slice(&addr.0);
        H256::from_bytes(bytes)
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(feature = "rlp")]
mod rlp_impl {
    use super::*;
    use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};

    impl Encodable for Address {
        fn rlp_append(&self, s: &mut RlpStream) {
            s.encoder().encode_value(&self.0);
        }
    }

    impl Decodable for Address {
        fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
            rlp.decoder().decode_value(|bytes| {
                copy_fixed(bytes)
                    .map(Address)
                    .map_err(|_| DecoderError::RlpInvalidLength)
            })
        }
    }
}

#[cfg(feature = "serde")]
mod serde_impl {
    use super::*;
    use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

    impl Serialize for Address {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.serialize_str(&self.to_hex())
        }
    }

    impl<'de> Deserialize<'de> for Address {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            let s = String::deserialize(deserializer)?;
            Address::from_hex(&s).map_err(de::Error::custom)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_from_hex() {
        let addr = Address::from_hex("0x742d35Cc6634C0532925a3b844Bc9e7595f0aB3d").unwrap();
        let addr2 = Address::from_hex("742d35cc6634c0532925a3b844bc9e7595f0ab3d").unwrap();
        assert_eq!(addr, addr2);
        assert_eq!(addr.to_hex(), "0x742d35cc6634c0532925a3b844bc9e7595f0ab3d");
    }

    #[test]
    fn test_address_invalid_length() {
        let result = Address::from_hex("0x1234");
        assert_eq!(
            result,
            Err(PrimitiveError::InvalidLength { expected: 20, got: 2 })
        );
    }

    #[test]
    fn test_address_zero() {
        assert!(Address::ZERO.is_zero());
        assert!(!Address::from_low_u64_be(1).is_zero());
    }

    #[test]
    fn test_address_low_u64() {
        let addr = Address::from_low_u64_be(0x100);
        assert_eq!(addr.as_bytes()[18], 0x01);
        assert_eq!(addr.as_bytes()[19], 0x00);
    }

    #[test]
    fn test_address_debug() {
        let addr = Address::from_bytes([0x11; 20]);
        assert!(format!("{:?}", addr).starts_with("Address(0x1111"));
    }
}
