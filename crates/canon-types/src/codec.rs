//! Canonical RLP encoding for chain types.
//!
//! Every persisted or hashed structure goes through these impls, so the
//! field order here is the wire format:
//!
//! - header: the 13 unsealed fields followed by `nonce`
//! - block: `[header, [tx..], [uncle..]]`
//! - signed transaction: `[nonce, gas_price, gas_limit, to, value, data, v, r, s]`
//! - receipt: `[success, post_state, cumulative_gas, gas_used, bloom, [log..], contract]`
//! - block info: `[number, hash, parent_hash, total_difficulty]`

use bytes::Bytes;
use canon_crypto::Signature;
use canon_primitives::H256;
use rlp::{Decodable, Encodable, Rlp, RlpStream};

use crate::block::{Block, BlockBody, BlockHeader, Bloom};
use crate::info::BlockInfo;
use crate::receipt::{Log, Receipt};
use crate::transaction::{SignedTransaction, Transaction};

pub use rlp::DecoderError as DecodeError;

/// Encode any chain type to bytes
pub fn encode<T: Encodable>(value: &T) -> Vec<u8> {
    rlp::encode(value).to_vec()
}

/// Decode any chain type from bytes
pub fn decode<T: Decodable>(bytes: &[u8]) -> Result<T, DecodeError> {
    rlp::decode(bytes)
}

fn expect_list(rlp: &Rlp, len: usize) -> Result<(), DecodeError> {
    if !rlp.is_list() {
        return Err(DecodeError::RlpExpectedToBeList);
    }
    if rlp.item_count()? != len {
        return Err(DecodeError::RlpIncorrectListLen);
    }
    Ok(())
}

fn bytes_at(rlp: &Rlp, index: usize) -> Result<Bytes, DecodeError> {
    let raw: Vec<u8> = rlp.val_at(index)?;
    Ok(Bytes::from(raw))
}

// ============================================================================
// Bloom
// ============================================================================

impl Encodable for Bloom {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.encoder().encode_value(&self.0);
    }
}

impl Decodable for Bloom {
    fn decode(rlp: &Rlp) -> Result<Self, DecodeError> {
        rlp.decoder().decode_value(|bytes| {
            if bytes.len() != 256 {
                return Err(DecodeError::RlpInvalidLength);
            }
            let mut out = [0u8; 256];
            out.copy_from_slice(bytes);
            Ok(Bloom(out))
        })
    }
}

// ============================================================================
// Header and block
// ============================================================================

impl Encodable for BlockHeader {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(14);
        self.append_unsealed(s);
        s.append(&self.nonce);
    }
}

impl Decodable for BlockHeader {
    fn decode(rlp: &Rlp) -> Result<Self, DecodeError> {
        expect_list(rlp, 14)?;
        Ok(BlockHeader {
            parent_hash: rlp.val_at(0)?,
            uncles_hash: rlp.val_at(1)?,
            coinbase: rlp.val_at(2)?,
            state_root: rlp.val_at(3)?,
            transactions_root: rlp.val_at(4)?,
            receipts_root: rlp.val_at(5)?,
            logs_bloom: rlp.val_at(6)?,
            difficulty: rlp.val_at(7)?,
            number: rlp.val_at(8)?,
            gas_limit: rlp.val_at(9)?,
            gas_used: rlp.val_at(10)?,
            timestamp: rlp.val_at(11)?,
            extra_data: bytes_at(rlp, 12)?,
            nonce: rlp.val_at(13)?,
        })
    }
}

impl Encodable for Block {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(3);
        s.append(&self.header);
        s.append_list::<SignedTransaction, _>(&self.body.transactions);
        s.append_list::<BlockHeader, _>(&self.body.uncles);
    }
}

impl Decodable for Block {
    fn decode(rlp: &Rlp) -> Result<Self, DecodeError> {
        expect_list(rlp, 3)?;
        Ok(Block {
            header: rlp.val_at(0)?,
            body: BlockBody {
                transactions: rlp.list_at(1)?,
                uncles: rlp.list_at(2)?,
            },
        })
    }
}

// ============================================================================
// Transactions
// ============================================================================

impl Encodable for SignedTransaction {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(9);
        self.tx.append_message(s);
        s.append(&self.signature.v);
        s.append(&self.signature.r);
        s.append(&self.signature.s);
    }
}

impl Decodable for SignedTransaction {
    fn decode(rlp: &Rlp) -> Result<Self, DecodeError> {
        expect_list(rlp, 9)?;
        let to_item = rlp.at(3)?;
        let to = if to_item.is_empty() {
            None
        } else {
            Some(to_item.as_val()?)
        };
        Ok(SignedTransaction {
            tx: Transaction {
                nonce: rlp.val_at(0)?,
                gas_price: rlp.val_at(1)?,
                gas_limit: rlp.val_at(2)?,
                to,
                value: rlp.val_at(4)?,
                data: bytes_at(rlp, 5)?,
            },
            signature: Signature {
                v: rlp.val_at(6)?,
                r: rlp.val_at(7)?,
                s: rlp.val_at(8)?,
            },
        })
    }
}

// ============================================================================
// Receipts
// ============================================================================

impl Encodable for Log {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(3);
        s.append(&self.address);
        s.append_list::<H256, _>(&self.topics);
        s.append(&self.data.to_vec());
    }
}

impl Decodable for Log {
    fn decode(rlp: &Rlp) -> Result<Self, DecodeError> {
        expect_list(rlp, 3)?;
        Ok(Log {
            address: rlp.val_at(0)?,
            topics: rlp.list_at(1)?,
            data: bytes_at(rlp, 2)?,
        })
    }
}

impl Encodable for Receipt {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(7);
        s.append(&u8::from(self.success));
        s.append(&self.post_state);
        s.append(&self.cumulative_gas_used);
        s.append(&self.gas_used);
        s.append(&self.logs_bloom);
        s.append_list::<Log, _>(&self.logs);
        match &self.contract_address {
            Some(addr) => s.append(addr),
            None => s.append_empty_data(),
        };
    }
}

impl Decodable for Receipt {
    fn decode(rlp: &Rlp) -> Result<Self, DecodeError> {
        expect_list(rlp, 7)?;
        let status: u8 = rlp.val_at(0)?;
        let contract_item = rlp.at(6)?;
        let contract_address = if contract_item.is_empty() {
            None
        } else {
            Some(contract_item.as_val()?)
        };
        Ok(Receipt {
            success: status != 0,
            post_state: rlp.val_at(1)?,
            cumulative_gas_used: rlp.val_at(2)?,
            gas_used: rlp.val_at(3)?,
            logs_bloom: rlp.val_at(4)?,
            logs: rlp.list_at(5)?,
            contract_address,
        })
    }
}

// ============================================================================
// Block info
// ============================================================================

impl Encodable for BlockInfo {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(4);
        s.append(&self.number);
        s.append(&self.hash);
        s.append(&self.parent_hash);
        s.append(&self.total_difficulty);
    }
}

impl Decodable for BlockInfo {
    fn decode(rlp: &Rlp) -> Result<Self, DecodeError> {
        expect_list(rlp, 4)?;
        Ok(BlockInfo {
            number: rlp.val_at(0)?,
            hash: rlp.val_at(1)?,
            parent_hash: rlp.val_at(2)?,
            total_difficulty: rlp.val_at(3)?,
        })
    }
}
