//! Recoverable ECDSA signatures over secp256k1

use crate::{keccak256, CryptoError};
use canon_primitives::{Address, H256};
use k256::ecdsa::{RecoveryId, Signature as K256Signature, SigningKey, VerifyingKey};

/// Public key
pub type PublicKey = VerifyingKey;

/// Private key
pub type PrivateKey = SigningKey;

/// ECDSA signature with recovery id
///
/// `v` uses the 27/28 convention of legacy transactions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Signature {
    /// Recovery id plus 27
    pub v: u8,
    /// r component
    pub r: H256,
    /// s component, always in the lower half of the curve order
    pub s: H256,
}

impl Signature {
    /// Recovery id (0 or 1)
    pub fn recovery_id(&self) -> Result<RecoveryId, CryptoError> {
        match self.v {
            27 | 28 => RecoveryId::from_byte(self.v - 27)
                .ok_or(CryptoError::InvalidRecoveryId(self.v)),
            other => Err(CryptoError::InvalidRecoveryId(other)),
        }
    }

    fn to_k256(self) -> Result<K256Signature, CryptoError> {
        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(self.r.as_bytes());
        bytes[32..].copy_from_slice(self.s.as_bytes());
        K256Signature::from_slice(&bytes).map_err(|e| CryptoError::InvalidSignature(e.to_string()))
    }
}

/// Sign a 32-byte message hash, normalizing to low-s
pub fn sign(message_hash: &H256, private_key: &PrivateKey) -> Result<Signature, CryptoError> {
    let (mut signature, mut recovery_id) = private_key
        .sign_prehash_recoverable(message_hash.as_bytes())
        .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;

    if let Some(normalized) = signature.normalize_s() {
        signature = normalized;
        recovery_id = RecoveryId::new(!recovery_id.is_y_odd(), recovery_id.is_x_reduced());
    }

    let bytes = signature.to_bytes();
    Ok(Signature {
        v: recovery_id.to_byte() + 27,
        r: H256::from_slice(&bytes[..32]).map_err(|e| CryptoError::SigningFailed(e.to_string()))?,
        s: H256::from_slice(&bytes[32..]).map_err(|e| CryptoError::SigningFailed(e.to_string()))?,
    })
}

/// Recover the signer's public key
pub fn recover_public_key(
    message_hash: &H256,
    signature: &Signature,
) -> Result<PublicKey, CryptoError> {
    let sig = signature.to_k256()?;
    if sig.normalize_s().is_some() {
        return Err(CryptoError::InvalidSignature("high s value".into()));
    }
    VerifyingKey::recover_from_prehash(message_hash.as_bytes(), &sig, signature.recovery_id()?)
        .map_err(|e| CryptoError::RecoveryFailed(e.to_string()))
}

/// Recover the signer's address
pub fn recover_address(message_hash: &H256, signature: &Signature) -> Result<Address, CryptoError> {
    recover_public_key(message_hash, signature).map(|key| public_key_to_address(&key))
}

/// Derive the account address: last 20 bytes of keccak of the uncompressed key
pub fn public_key_to_address(public_key: &PublicKey) -> Address {
    let encoded = public_key.to_encoded_point(false);
    let hash = keccak256(&encoded.as_bytes()[1..]);
    Address::from_word(&hash)
}

/// Deterministic key derived from an arbitrary seed
///
/// Used for development accounts and tests; never for real funds.
pub fn private_key_from_seed(seed: &[u8]) -> Result<PrivateKey, CryptoError> {
    let mut material = keccak256(seed);
    // keccak output lands outside the scalar field with negligible probability
    for _ in 0..4 {
        if let Ok(key) = SigningKey::from_slice(material.as_bytes()) {
            return Ok(key);
        }
        material = keccak256(material.as_bytes());
    }
    Err(CryptoError::InvalidPrivateKey)
}
