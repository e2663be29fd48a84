//! Block types

use bytes::Bytes;
use canon_crypto::keccak256;
use canon_primitives::{Address, BlockNumber, Gas, H256, U256};
use rlp::RlpStream;

use crate::receipt::Receipt;
use crate::transaction::SignedTransaction;

/// keccak256(rlp([])): root of an empty transaction, receipt or uncle list
pub const EMPTY_LIST_HASH: H256 = H256::from_bytes([
    0x1d, 0xcc, 0x4d, 0xe8, 0xde, 0xc7, 0x5d, 0x7a,
    0xab, 0x85, 0xb5, 0x67, 0xb6, 0xcc, 0xd4, 0x1a,
    0xd3, 0x12, 0x45, 0x1b, 0x94, 0x8a, 0x74, 0x13,
    0xf0, 0xa1, 0x42, 0xfd, 0x40, 0xd4, 0x93, 0x47,
]);

/// Block header
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockHeader {
    /// Parent block hash
    pub parent_hash: H256,
    /// Hash of the RLP uncle list
    pub uncles_hash: H256,
    /// Miner address, credited with the block reward and fees
    pub coinbase: Address,
    /// World-state root after executing the block
    pub state_root: H256,
    /// Hash of the RLP transaction list
    pub transactions_root: H256,
    /// Hash of the RLP receipt list
    pub receipts_root: H256,
    /// Union of all receipt blooms
    pub logs_bloom: Bloom,
    /// Difficulty assigned by the consensus model
    pub difficulty: U256,
    /// Block number (height)
    pub number: BlockNumber,
    /// Gas limit for the block
    pub gas_limit: Gas,
    /// Gas used by all applied transactions
    pub gas_used: Gas,
    /// Block timestamp (Unix seconds)
    pub timestamp: u64,
    /// Free-form extra data
    pub extra_data: Bytes,
    /// Seal nonce (proof of work)
    pub nonce: u64,
}

impl Default for BlockHeader {
    fn default() -> Self {
        Self {
            parent_hash: H256::ZERO,
            uncles_hash: EMPTY_LIST_HASH,
            coinbase: Address::ZERO,
            state_root: H256::ZERO,
            transactions_root: EMPTY_LIST_HASH,
            receipts_root: EMPTY_LIST_HASH,
            logs_bloom: Bloom::ZERO,
            difficulty: U256::zero(),
            number: 0,
            gas_limit: 0,
            gas_used: 0,
            timestamp: 0,
            extra_data: Bytes::new(),
            nonce: 0,
        }
    }
}

impl BlockHeader {
    /// Block hash: keccak256 of the RLP-encoded header
    pub fn hash(&self) -> H256 {
        keccak256(&rlp::encode(self))
    }

    /// Hash of every field except the seal nonce; the proof-of-work input
    pub fn seal_hash(&self) -> H256 {
        let mut s = RlpStream::new_list(13);
        self.append_unsealed(&mut s);
        keccak256(&s.out())
    }

    /// Check whether this is a genesis header
    pub fn is_genesis(&self) -> bool {
        self.number == 0 && self.parent_hash.is_zero()
    }

    pub(crate) fn append_unsealed(&self, s: &mut RlpStream) {
        s.append(&self.parent_hash);
        s.append(&self.uncles_hash);
        s.append(&self.coinbase);
        s.append(&self.state_root);
        s.append(&self.transactions_root);
        s.append(&self.receipts_root);
        s.append(&self.logs_bloom);
        s.append(&self.difficulty);
        s.append(&self.number);
        s.append(&self.gas_limit);
        s.append(&self.gas_used);
        s.append(&self.timestamp);
        s.append(&self.extra_data.to_vec());
    }
}

/// Block body: ordered transactions and uncle headers
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct BlockBody {
    /// Transactions in execution order
    pub transactions: Vec<SignedTransaction>,
    /// Uncle headers credited by this block
    pub uncles: Vec<BlockHeader>,
}

/// Complete block (header + body)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    /// Block header
    pub header: BlockHeader,
    /// Block body
    pub body: BlockBody,
}

impl Block {
    /// Create a block from header and body
    pub fn new(header: BlockHeader, body: BlockBody) -> Self {
        Self { header, body }
    }

    /// Block hash
    pub fn hash(&self) -> H256 {
        self.header.hash()
    }

    /// Block number
    pub fn number(&self) -> BlockNumber {
        self.header.number
    }

    /// Parent hash
    pub fn parent_hash(&self) -> H256 {
        self.header.parent_hash
    }

    /// Difficulty weight this block adds to total difficulty: its own
    /// difficulty plus the difficulty of every included uncle
    pub fn difficulty_weight(&self) -> U256 {
        self.body
            .uncles
            .iter()
            .fold(self.header.difficulty, |acc, uncle| acc.saturating_add(uncle.difficulty))
    }

    /// Recompute the body commitments into the header
    pub fn seal_body(&mut self) {
        self.header.transactions_root = transactions_root(&self.body.transactions);
        self.header.uncles_hash = uncles_hash(&self.body.uncles);
    }

    /// Check that the header commits to this body
    pub fn body_matches_header(&self) -> bool {
        self.header.transactions_root == transactions_root(&self.body.transactions)
            && self.header.uncles_hash == uncles_hash(&self.body.uncles)
    }
}

/// Commitment to an ordered transaction list
pub fn transactions_root(transactions: &[SignedTransaction]) -> H256 {
    keccak256(&rlp::encode_list::<SignedTransaction, _>(transactions))
}

/// Commitment to an ordered uncle list
pub fn uncles_hash(uncles: &[BlockHeader]) -> H256 {
    keccak256(&rlp::encode_list::<BlockHeader, _>(uncles))
}

/// Commitment to an ordered receipt list
pub fn receipts_root(receipts: &[Receipt]) -> H256 {
    keccak256(&rlp::encode_list::<Receipt, _>(receipts))
}

/// 2048-bit log bloom filter
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Bloom(pub [u8; 256]);

impl Default for Bloom {
    fn default() -> Self {
        Self::ZERO
    }
}

impl std::fmt::Debug for Bloom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            write!(f, "Bloom(empty)")
        } else {
            write!(f, "Bloom({}..)", hex::encode(&self.0[..8]))
        }
    }
}

impl Bloom {
    /// Empty bloom
    pub const ZERO: Bloom = Bloom([0u8; 256]);

    /// Check if no bits are set
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// Set the three bits selected by keccak256(input)
    pub fn accrue(&mut self, input: &[u8]) {
        for (byte_index, mask) in Self::bit_positions(input) {
            self.0[byte_index] |= mask;
        }
    }

    /// Check if the bloom might contain the input
    pub fn contains(&self, input: &[u8]) -> bool {
        Self::bit_positions(input)
            .into_iter()
            .all(|(byte_index, mask)| self.0[byte_index] & mask != 0)
    }

    /// Merge another bloom into this one
    pub fn accrue_bloom(&mut self, other: &Bloom) {
        for (dst, src) in self.0.iter_mut().zip(other.0.iter()) {
            *dst |= src;
        }
    }

    fn bit_positions(input: &[u8]) -> [(usize, u8); 3] {
        let hash = keccak256(input);
        let h = hash.as_bytes();
        let mut out = [(0usize, 0u8); 3];
        for (i, slot) in out.iter_mut().enumerate() {
            let bit = ((h[i * 2] as usize) << 8 | h[i * 2 + 1] as usize) & 0x7FF;
            *slot = (255 - bit / 8, 1u8 << (bit % 8));
        }
        out
    }
}
