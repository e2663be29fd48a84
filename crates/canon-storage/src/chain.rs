//! Typed chain records on top of a [`KeyValueStore`]

use crate::error::{StorageError, StorageResult};
use crate::kv::{Column, KeyValueStore, WriteBatch};
use crate::state::WorldState;
use canon_primitives::{BlockNumber, H256, U256};
use canon_types::{decode, encode, Block, BlockInfo, Receipt};
use rlp::Decodable;
use std::sync::Arc;

/// Key layout of the chain column
pub mod keys {
    use canon_primitives::{BlockNumber, H256};

    /// Encoded head block
    pub const LAST_BLOCK: &[u8] = b"LastBlock";

    /// Encoded total difficulty of the head
    pub const LAST_TD: &[u8] = b"LTD";

    /// Block body and header, keyed by hash
    pub fn block(hash: &H256) -> Vec<u8> {
        hash.as_bytes().to_vec()
    }

    /// `hash ++ "Info"`
    pub fn info(hash: &H256) -> Vec<u8> {
        [hash.as_bytes().as_slice(), b"Info"].concat()
    }

    /// `hash ++ "Receipts"`
    pub fn receipts(hash: &H256) -> Vec<u8> {
        [hash.as_bytes().as_slice(), b"Receipts"].concat()
    }

    /// `"n" ++ big-endian number`: canonical hash at a height
    pub fn canonical(number: BlockNumber) -> Vec<u8> {
        [b"n".as_slice(), &number.to_be_bytes()].concat()
    }
}

/// Typed access to persisted chain data
#[derive(Clone)]
pub struct ChainStore {
    kv: Arc<dyn KeyValueStore>,
}

impl ChainStore {
    /// Wrap a key-value store
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    fn read<T: Decodable>(&self, column: Column, key: &[u8]) -> StorageResult<Option<T>> {
        match self.kv.get(column, key)? {
            Some(bytes) => decode(&bytes).map(Some).map_err(|source| StorageError::Decode {
                key: String::from_utf8_lossy(key).into_owned(),
                source,
            }),
            None => Ok(None),
        }
    }

    /// Head block
    pub fn head_block(&self) -> StorageResult<Option<Block>> {
        self.read(Column::Chain, keys::LAST_BLOCK)
    }

    /// Total difficulty of the head
    pub fn head_total_difficulty(&self) -> StorageResult<Option<U256>> {
        self.read(Column::Chain, keys::LAST_TD)
    }

    /// Block by hash
    pub fn block(&self, hash: &H256) -> StorageResult<Option<Block>> {
        self.read(Column::Chain, &keys::block(hash))
    }

    /// Check whether a block is stored
    pub fn has_block(&self, hash: &H256) -> StorageResult<bool> {
        self.kv.contains(Column::Chain, &keys::block(hash))
    }

    /// Info record by hash
    pub fn block_info(&self, hash: &H256) -> StorageResult<Option<BlockInfo>> {
        self.read(Column::Chain, &keys::info(hash))
    }

    /// Receipts of a stored block
    pub fn receipts(&self, hash: &H256) -> StorageResult<Option<Vec<Receipt>>> {
        match self.kv.get(Column::Chain, &keys::receipts(hash))? {
            Some(bytes) => rlp::Rlp::new(&bytes)
                .as_list::<Receipt>()
                .map(Some)
                .map_err(|source| StorageError::Decode {
                    key: format!("{}Receipts", hash),
                    source,
                }),
            None => Ok(None),
        }
    }

    /// Canonical block hash at `number`
    pub fn canonical_hash(&self, number: BlockNumber) -> StorageResult<Option<H256>> {
        self.read(Column::Chain, &keys::canonical(number))
    }

    /// State snapshot committed under `root`
    pub fn state(&self, root: &H256) -> StorageResult<WorldState> {
        let bytes = self
            .kv
            .get(Column::State, root.as_bytes())?
            .ok_or(StorageError::MissingState(*root))?;
        WorldState::decode(&bytes).map_err(|source| StorageError::Decode {
            key: root.to_hex(),
            source,
        })
    }

    /// Check whether a state snapshot exists
    pub fn has_state(&self, root: &H256) -> StorageResult<bool> {
        self.kv.contains(Column::State, root.as_bytes())
    }

    /// Start a batch of chain writes
    pub fn batch(&self) -> ChainBatch {
        ChainBatch {
            inner: WriteBatch::new(),
        }
    }

    /// Apply a batch atomically
    pub fn commit(&self, batch: ChainBatch) -> StorageResult<()> {
        self.kv.write(batch.inner)
    }
}

/// Typed write batch for [`ChainStore`]
pub struct ChainBatch {
    inner: WriteBatch,
}

impl ChainBatch {
    /// Store a block under its hash
    pub fn put_block(&mut self, block: &Block) -> &mut Self {
        self.inner
            .put(Column::Chain, &keys::block(&block.hash()), &encode(block));
        self
    }

    /// Store an info record
    pub fn put_info(&mut self, info: &BlockInfo) -> &mut Self {
        self.inner
            .put(Column::Chain, &keys::info(&info.hash), &encode(info));
        self
    }

    /// Store a block's receipts
    pub fn put_receipts(&mut self, hash: &H256, receipts: &[Receipt]) -> &mut Self {
        self.inner.put(
            Column::Chain,
            &keys::receipts(hash),
            &rlp::encode_list::<Receipt, _>(receipts),
        );
        self
    }

    /// Store a state snapshot under its root
    pub fn put_state(&mut self, state: &WorldState) -> &mut Self {
        self.inner
            .put(Column::State, state.root().as_bytes(), &state.encode());
        self
    }

    /// Point the canonical index at `hash` for `number`
    pub fn set_canonical(&mut self, number: BlockNumber, hash: &H256) -> &mut Self {
        self.inner
            .put(Column::Chain, &keys::canonical(number), &encode(hash));
        self
    }

    /// Remove the canonical index entry for `number`
    pub fn clear_canonical(&mut self, number: BlockNumber) -> &mut Self {
        self.inner.delete(Column::Chain, &keys::canonical(number));
        self
    }

    /// Move the head pointers
    pub fn set_head(&mut self, block: &Block, total_difficulty: U256) -> &mut Self {
        self.inner
            .put(Column::Chain, keys::LAST_TD, &encode(&total_difficulty));
        self.inner.put(Column::Chain, keys::LAST_BLOCK, &encode(block));
        self
    }

    /// Number of queued writes
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Check if nothing is queued
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStore;
    use crate::traits::StateWriter;
    use canon_primitives::Address;
    use canon_types::{BlockBody, BlockHeader};

    fn store() -> ChainStore {
        ChainStore::new(Arc::new(MemoryStore::new()))
    }

    fn block(number: u64, parent: H256) -> Block {
        Block::new(
            BlockHeader {
                number,
                parent_hash: parent,
                difficulty: U256::from(10u64),
                timestamp: number,
                ..Default::default()
            },
            BlockBody::default(),
        )
    }

    #[test]
    fn test_sentinel_keys() {
        let hash = H256::from_bytes([0xab; 32]);
        let info_key = keys::info(&hash);
        assert_eq!(info_key.len(), 36);
        assert_eq!(&info_key[32..], b"Info");
        assert_eq!(keys::LAST_BLOCK, b"LastBlock");
        assert_eq!(keys::LAST_TD, b"LTD");
        assert_eq!(keys::canonical(1), vec![b'n', 0, 0, 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn test_empty_store() {
        let store = store();
        assert!(store.head_block().unwrap().is_none());
        assert!(store.head_total_difficulty().unwrap().is_none());
        assert!(store.canonical_hash(0).unwrap().is_none());
        assert!(matches!(
            store.state(&H256::ZERO),
            Err(StorageError::MissingState(_))
        ));
    }

    #[test]
    fn test_batch_commit_roundtrip() {
        let store = store();
        let genesis = block(0, H256::ZERO);
        let hash = genesis.hash();
        let info = BlockInfo::for_block(&genesis, U256::from(10u64));
        let mut state = WorldState::new();
        state.add_balance(&Address::from_low_u64_be(1), U256::from(1u64));

        let mut batch = store.batch();
        batch
            .put_block(&genesis)
            .put_info(&info)
            .put_state(&state)
            .put_receipts(&hash, &[])
            .set_canonical(0, &hash)
            .set_head(&genesis, U256::from(10u64));
        assert_eq!(batch.len(), 7);
        store.commit(batch).unwrap();

        assert_eq!(store.head_block().unwrap(), Some(genesis.clone()));
        assert_eq!(store.head_total_difficulty().unwrap(), Some(U256::from(10u64)));
        assert_eq!(store.block(&hash).unwrap(), Some(genesis));
        assert_eq!(store.block_info(&hash).unwrap(), Some(info));
        assert_eq!(store.canonical_hash(0).unwrap(), Some(hash));
        assert_eq!(store.receipts(&hash).unwrap(), Some(vec![]));
        assert_eq!(store.state(&state.root()).unwrap(), state);
        assert!(store.has_block(&hash).unwrap());
        assert!(store.has_state(&state.root()).unwrap());
    }

    #[test]
    fn test_clear_canonical() {
        let store = store();
        let b = block(1, H256::ZERO);
        let mut batch = store.batch();
        batch.set_canonical(1, &b.hash());
        store.commit(batch).unwrap();

        let mut batch = store.batch();
        batch.clear_canonical(1);
        store.commit(batch).unwrap();
        assert!(store.canonical_hash(1).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_record_reports_key() {
        let kv = Arc::new(MemoryStore::new());
        kv.put(Column::Chain, keys::LAST_TD, &[0xff, 0xff]).unwrap();
        let store = ChainStore::new(kv);
        match store.head_total_difficulty() {
            Err(StorageError::Decode { key, .. }) => assert_eq!(key, "LTD"),
            other => panic!("expected decode error, got {:?}", other),
        }
    }
}
