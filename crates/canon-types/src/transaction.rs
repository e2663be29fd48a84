//! Transaction types

use bytes::Bytes;
use canon_crypto::{keccak256, recover_address, sign, CryptoError, PrivateKey, Signature};
use canon_primitives::{Address, Gas, Nonce, H256, U256};
use rlp::RlpStream;

/// Unsigned transaction message
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Transaction {
    /// Sender nonce
    pub nonce: Nonce,
    /// Price paid per unit of gas
    pub gas_price: U256,
    /// Gas limit for this transaction
    pub gas_limit: Gas,
    /// Recipient, or `None` for contract creation
    pub to: Option<Address>,
    /// Value transferred
    pub value: U256,
    /// Call data or init code
    pub data: Bytes,
}

impl Transaction {
    /// Hash the sender signs: keccak256 of the RLP of the six message fields
    pub fn signing_hash(&self) -> H256 {
        let mut s = RlpStream::new_list(6);
        self.append_message(&mut s);
        keccak256(&s.out())
    }

    /// Sign with `key`
    pub fn sign(self, key: &PrivateKey) -> Result<SignedTransaction, CryptoError> {
        let signature = sign(&self.signing_hash(), key)?;
        Ok(SignedTransaction {
            tx: self,
            signature,
        })
    }

    /// Whether this transaction deploys a contract
    pub fn is_create(&self) -> bool {
        self.to.is_none()
    }

    pub(crate) fn append_message(&self, s: &mut RlpStream) {
        s.append(&self.nonce);
        s.append(&self.gas_price);
        s.append(&self.gas_limit);
        match &self.to {
            Some(to) => s.append(to),
            None => s.append_empty_data(),
        };
        s.append(&self.value);
        s.append(&self.data.to_vec());
    }
}

/// Signed transaction
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedTransaction {
    /// The signed message
    pub tx: Transaction,
    /// Sender signature over [`Transaction::signing_hash`]
    pub signature: Signature,
}

impl SignedTransaction {
    /// Transaction hash: keccak256 of the signed RLP
    pub fn hash(&self) -> H256 {
        keccak256(&rlp::encode(self))
    }

    /// Recover the sender address from the signature
    pub fn sender(&self) -> Result<Address, CryptoError> {
        recover_address(&self.tx.signing_hash(), &self.signature)
    }

    /// Sender nonce
    pub fn nonce(&self) -> Nonce {
        self.tx.nonce
    }

    /// Gas limit
    pub fn gas_limit(&self) -> Gas {
        self.tx.gas_limit
    }

    /// Gas price
    pub fn gas_price(&self) -> U256 {
        self.tx.gas_price
    }

    /// Recipient
    pub fn to(&self) -> Option<Address> {
        self.tx.to
    }

    /// Value
    pub fn value(&self) -> U256 {
        self.tx.value
    }

    /// Payload
    pub fn data(&self) -> &Bytes {
        &self.tx.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canon_crypto::{private_key_from_seed, public_key_to_address};

    fn transfer(nonce: u64) -> Transaction {
        Transaction {
            nonce,
            gas_price: U256::from(1u64),
            gas_limit: 21_000,
            to: Some(Address::from_low_u64_be(0xbeef)),
            value: U256::from(1_000u64),
            data: Bytes::new(),
        }
    }

    #[test]
    fn test_sender_recovery() {
        let key = private_key_from_seed(b"alice").unwrap();
        let expected = public_key_to_address(key.verifying_key());
        let signed = transfer(0).sign(&key).unwrap();
        assert_eq!(signed.sender().unwrap(), expected);
    }

    #[test]
    fn test_tampered_transaction_changes_sender() {
        let key = private_key_from_seed(b"alice").unwrap();
        let expected = public_key_to_address(key.verifying_key());
        let mut signed = transfer(0).sign(&key).unwrap();
        signed.tx.value = U256::from(2_000u64);
        assert!(signed.sender().map(|a| a != expected).unwrap_or(true));
    }

    #[test]
    fn test_hash_covers_signature_and_nonce() {
        let key = private_key_from_seed(b"alice").unwrap();
        let a = transfer(0).sign(&key).unwrap();
        let b = transfer(1).sign(&key).unwrap();
        assert_ne!(a.hash(), b.hash());
        assert_ne!(a.hash(), a.tx.signing_hash());
    }

    #[test]
    fn test_create_detection() {
        let mut tx = transfer(0);
        assert!(!tx.is_create());
        tx.to = None;
        assert!(tx.is_create());
    }
}
