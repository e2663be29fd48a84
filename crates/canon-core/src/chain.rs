//! Canonical chain management and total-difficulty fork choice

use crate::error::{ChainError, ChainResult};
use crate::genesis::Genesis;
use crate::processor::{BlockProcessor, ChainReader};
use canon_consensus::ConsensusModel;
use canon_primitives::{Address, BlockNumber, H256, U256};
use canon_storage::{ChainStore, KeyValueStore, WorldState};
use canon_types::{Block, BlockBody, BlockHeader, BlockInfo, Receipt};
use canon_vm::CodeExecutor;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// One validated block of a candidate chain
#[derive(Debug, Clone)]
pub struct ChainLink {
    /// The block
    pub block: Block,
    /// Total difficulty through this block
    pub total_difficulty: U256,
    state: WorldState,
    receipts: Vec<Receipt>,
}

impl ChainLink {
    /// State after this block
    pub fn state(&self) -> &WorldState {
        &self.state
    }

    /// Receipts of this block
    pub fn receipts(&self) -> &[Receipt] {
        &self.receipts
    }
}

/// Output of [`ChainManager::test_chain`]: the candidate blocks with their
/// post states, ready to be committed
#[derive(Debug, Clone, Default)]
pub struct ValidatedChain {
    links: Vec<ChainLink>,
}

impl ValidatedChain {
    /// Validated blocks, oldest first
    pub fn links(&self) -> &[ChainLink] {
        &self.links
    }

    /// Number of blocks
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Check if there are no blocks
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Newest block
    pub fn head(&self) -> Option<&ChainLink> {
        self.links.last()
    }

    /// Total difficulty at the newest block
    pub fn total_difficulty(&self) -> U256 {
        self.head().map(|l| l.total_difficulty).unwrap_or_default()
    }

    /// Hashes of every block
    pub fn hashes(&self) -> Vec<H256> {
        self.links.iter().map(|l| l.block.hash()).collect()
    }
}

#[derive(Debug, Clone)]
struct Head {
    block: Block,
    total_difficulty: U256,
}

/// Candidate blocks validated so far, with their post states by root
#[derive(Default)]
struct Pending {
    blocks: HashMap<H256, Block>,
    states: HashMap<H256, WorldState>,
}

/// Block and state lookups that also see the pending candidate blocks
struct ChainView<'a> {
    store: &'a ChainStore,
    pending: &'a Pending,
}

impl ChainReader for ChainView<'_> {
    fn block(&self, hash: &H256) -> ChainResult<Option<Block>> {
        if let Some(block) = self.pending.blocks.get(hash) {
            return Ok(Some(block.clone()));
        }
        Ok(self.store.block(hash)?)
    }

    fn state(&self, root: &H256) -> ChainResult<Option<WorldState>> {
        if let Some(state) = self.pending.states.get(root) {
            return Ok(Some(state.clone()));
        }
        ChainReader::state(self.store, root)
    }
}

/// Owns the canonical chain.
///
/// Candidate chains are validated against copies of stored state and only
/// committed if their total difficulty strictly exceeds the current head.
/// `process_lock` serializes validate-and-commit so two candidates can't
/// both pass the difficulty check against the same head.
pub struct ChainManager {
    store: ChainStore,
    processor: BlockProcessor,
    head: RwLock<Head>,
    process_lock: Mutex<()>,
    working: RwLock<HashMap<H256, Block>>,
    genesis_hash: H256,
}

impl ChainManager {
    /// Open the chain held in `kv`, writing `genesis` first if it is empty
    pub fn new(
        kv: Arc<dyn KeyValueStore>,
        genesis: &Genesis,
        model: Arc<dyn ConsensusModel>,
        executor: Arc<dyn CodeExecutor>,
    ) -> ChainResult<Self> {
        let store = ChainStore::new(kv);
        let genesis_hash = genesis.hash();

        let head = match store.head_block()? {
            Some(block) => {
                let stored_genesis = store.canonical_hash(0)?;
                if stored_genesis != Some(genesis_hash) {
                    return Err(ChainError::invalid(
                        genesis_hash,
                        "store was initialized with a different genesis",
                    ));
                }
                let total_difficulty = store.head_total_difficulty()?.unwrap_or_default();
                tracing::info!(
                    number = block.number(),
                    hash = %block.hash(),
                    td = %total_difficulty,
                    "resuming chain"
                );
                Head {
                    block,
                    total_difficulty,
                }
            }
            None => {
                genesis.apply(&store)?;
                Head {
                    block: genesis.block.clone(),
                    total_difficulty: U256::zero(),
                }
            }
        };

        Ok(Self {
            store,
            processor: BlockProcessor::new(model, executor),
            head: RwLock::new(head),
            process_lock: Mutex::new(()),
            working: RwLock::new(HashMap::new()),
            genesis_hash,
        })
    }

    /// Consensus model in use
    pub fn model(&self) -> &Arc<dyn ConsensusModel> {
        self.processor.model()
    }

    /// Underlying store
    pub fn store(&self) -> &ChainStore {
        &self.store
    }

    /// Genesis hash
    pub fn genesis_hash(&self) -> H256 {
        self.genesis_hash
    }

    // ==================== Queries ====================

    /// Head block
    pub fn current_block(&self) -> Block {
        self.head.read().block.clone()
    }

    /// Total difficulty of the head
    pub fn total_difficulty(&self) -> U256 {
        self.head.read().total_difficulty
    }

    /// Block by hash: stored blocks first, then the chain under test
    pub fn get_block(&self, hash: &H256) -> ChainResult<Option<Block>> {
        if let Some(block) = self.store.block(hash)? {
            return Ok(Some(block));
        }
        Ok(self.working.read().get(hash).cloned())
    }

    /// Info record of a stored block
    pub fn get_block_info(&self, hash: &H256) -> ChainResult<Option<BlockInfo>> {
        Ok(self.store.block_info(hash)?)
    }

    /// Whether a block is stored, canonical or not
    pub fn has_block(&self, hash: &H256) -> ChainResult<bool> {
        Ok(self.store.has_block(hash)?)
    }

    /// Whether a block is on the canonical chain
    pub fn is_canonical(&self, hash: &H256) -> ChainResult<bool> {
        match self.store.block_info(hash)? {
            Some(info) => Ok(self.store.canonical_hash(info.number)? == Some(*hash)),
            None => Ok(false),
        }
    }

    /// Canonical hash at `number`
    pub fn canonical_hash(&self, number: BlockNumber) -> ChainResult<Option<H256>> {
        Ok(self.store.canonical_hash(number)?)
    }

    /// Up to `max` blocks walking parent links back from `hash`, newest
    /// first
    pub fn canonical_ancestors(&self, hash: &H256, max: usize) -> ChainResult<Vec<Block>> {
        let mut blocks = Vec::with_capacity(max);
        let mut cursor = *hash;
        while blocks.len() < max {
            let Some(block) = self.get_block(&cursor)? else {
                break;
            };
            let genesis = block.header.is_genesis();
            cursor = block.parent_hash();
            blocks.push(block);
            if genesis {
                break;
            }
        }
        Ok(blocks)
    }

    /// State committed under `root`
    pub fn state_at(&self, root: &H256) -> ChainResult<WorldState> {
        Ok(self.store.state(root)?)
    }

    /// State at the head
    pub fn current_state(&self) -> ChainResult<WorldState> {
        let root = self.head.read().block.header.state_root;
        self.state_at(&root)
    }

    /// Receipts of a stored block
    pub fn receipts(&self, hash: &H256) -> ChainResult<Option<Vec<Receipt>>> {
        Ok(self.store.receipts(hash)?)
    }

    // ==================== Production ====================

    /// Skeleton of the next block on the head, stamped with the current time
    pub fn new_block(&self, coinbase: Address) -> ChainResult<Block> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        self.new_block_at(coinbase, now)
    }

    /// Skeleton of the next block on the head with timestamp at least
    /// `timestamp`
    pub fn new_block_at(&self, coinbase: Address, timestamp: u64) -> ChainResult<Block> {
        let parent = self.current_block();
        let parent_state = self.state_at(&parent.header.state_root)?;

        let mut header = BlockHeader {
            parent_hash: parent.hash(),
            coinbase,
            state_root: parent.header.state_root,
            number: parent.number() + 1,
            gas_limit: parent.header.gas_limit,
            timestamp: timestamp.max(parent.header.timestamp + 1),
            ..Default::default()
        };
        header.difficulty = self
            .model()
            .difficulty(&header, &parent.header, &parent_state)?;
        Ok(Block::new(header, BlockBody::default()))
    }

    /// Execute a template on its parent state and fill in its commitments
    pub fn finalize_block(&self, template: Block) -> ChainResult<Block> {
        let parent = self
            .store
            .block(&template.parent_hash())?
            .ok_or(ChainError::ParentUnknown {
                hash: template.hash(),
                parent: template.parent_hash(),
            })?;
        let parent_state = self.state_at(&parent.header.state_root)?;
        let pending = Pending::default();
        let view = ChainView {
            store: &self.store,
            pending: &pending,
        };
        let (block, outcome) = self.processor.finalize(template, &parent_state, &view)?;
        tracing::debug!(
            number = block.number(),
            txs = block.body.transactions.len(),
            dropped = outcome.dropped.len(),
            "block finalized"
        );
        Ok(block)
    }

    /// Validate and commit a block produced by this node.
    ///
    /// A heavier chain arriving first surfaces as
    /// [`ChainError::TotalDifficultyTooLow`]; any other failure means the
    /// producer built an invalid block and comes back as
    /// [`ChainError::LocalBlockRejected`].
    pub fn insert_local_block(&self, block: Block) -> ChainResult<BlockInfo> {
        let hash = block.hash();
        match self.process_chain(std::slice::from_ref(&block)) {
            Ok(info) => Ok(info),
            Err(err @ ChainError::TotalDifficultyTooLow { .. }) => Err(err),
            Err(err) => {
                tracing::error!(%hash, number = block.number(), error = %err, "local block rejected");
                Err(ChainError::LocalBlockRejected {
                    hash,
                    source: Box::new(err),
                })
            }
        }
    }

    // ==================== Import ====================

    /// Validate a candidate chain without committing it
    pub fn test_chain(&self, blocks: &[Block]) -> ChainResult<ValidatedChain> {
        let _guard = self.process_lock.lock();
        self.test_chain_locked(blocks)
    }

    /// Commit a validated chain and move the head to its last block
    pub fn insert_chain(&self, chain: ValidatedChain) -> ChainResult<BlockInfo> {
        let _guard = self.process_lock.lock();
        self.insert_chain_locked(chain)
    }

    /// Validate and, if heavier than the canonical chain, commit `blocks`
    pub fn process_chain(&self, blocks: &[Block]) -> ChainResult<BlockInfo> {
        let _guard = self.process_lock.lock();
        let chain = self.test_chain_locked(blocks)?;
        self.insert_chain_locked(chain)
    }

    fn test_chain_locked(&self, blocks: &[Block]) -> ChainResult<ValidatedChain> {
        *self.working.write() = blocks.iter().map(|b| (b.hash(), b.clone())).collect();
        let result = self.validate(blocks);
        self.working.write().clear();
        result
    }

    fn validate(&self, blocks: &[Block]) -> ChainResult<ValidatedChain> {
        let first = blocks
            .first()
            .ok_or_else(|| ChainError::invalid(H256::ZERO, "empty chain"))?;

        let missing_parent = || ChainError::ParentUnknown {
            hash: first.hash(),
            parent: first.parent_hash(),
        };
        let parent = self.store.block(&first.parent_hash())?.ok_or_else(missing_parent)?;
        let parent_info = self
            .store
            .block_info(&first.parent_hash())?
            .ok_or_else(missing_parent)?;

        let mut parent_header = parent.header;
        let mut state = self.store.state(&parent_header.state_root)?;
        let mut td = parent_info.total_difficulty;
        let mut pending = Pending::default();
        let mut links = Vec::with_capacity(blocks.len());

        for block in blocks {
            let hash = block.hash();
            let expected = parent_header.hash();
            if block.parent_hash() != expected {
                return Err(ChainError::ChainBroken {
                    number: block.number(),
                    expected,
                    got: block.parent_hash(),
                });
            }

            let view = ChainView {
                store: &self.store,
                pending: &pending,
            };
            let outcome = self.processor.process(block, &parent_header, &state, &view)?;

            td = td.saturating_add(block.difficulty_weight());
            state = outcome.state;
            links.push(ChainLink {
                block: block.clone(),
                total_difficulty: td,
                state: state.clone(),
                receipts: outcome.receipts,
            });
            parent_header = block.header.clone();
            pending.states.insert(parent_header.state_root, state.clone());
            pending.blocks.insert(hash, block.clone());
        }

        let canonical = self.total_difficulty();
        if td <= canonical {
            return Err(ChainError::TotalDifficultyTooLow { td, canonical });
        }
        Ok(ValidatedChain { links })
    }

    fn insert_chain_locked(&self, chain: ValidatedChain) -> ChainResult<BlockInfo> {
        let Some(new_head) = chain.head() else {
            return Err(ChainError::invalid(H256::ZERO, "empty chain"));
        };
        let old_head = self.head.read().clone();
        // The head may have moved since the chain was tested
        if new_head.total_difficulty <= old_head.total_difficulty {
            return Err(ChainError::TotalDifficultyTooLow {
                td: new_head.total_difficulty,
                canonical: old_head.total_difficulty,
            });
        }

        let mut batch = self.store.batch();
        let mut parents = HashMap::new();
        for link in chain.links() {
            let hash = link.block.hash();
            parents.insert(hash, link.block.parent_hash());
            batch
                .put_state(&link.state)
                .put_block(&link.block)
                .put_info(&BlockInfo::for_block(&link.block, link.total_difficulty))
                .put_receipts(&hash, &link.receipts);
        }

        // Rewrite the canonical index back to where the new chain joins it
        let head_block = &new_head.block;
        let mut hash = head_block.hash();
        let mut number = head_block.number();
        loop {
            if self.store.canonical_hash(number)? == Some(hash) {
                break;
            }
            batch.set_canonical(number, &hash);
            if number == 0 {
                break;
            }
            hash = match parents.get(&hash) {
                Some(parent) => *parent,
                None => self
                    .store
                    .block_info(&hash)?
                    .map(|info| info.parent_hash)
                    .ok_or(ChainError::ParentUnknown {
                        hash,
                        parent: H256::ZERO,
                    })?,
            };
            number -= 1;
        }
        let fork_point = number;
        for stale in head_block.number() + 1..=old_head.block.number() {
            batch.clear_canonical(stale);
        }

        batch.set_head(head_block, new_head.total_difficulty);
        self.store.commit(batch)?;

        let info = BlockInfo::for_block(head_block, new_head.total_difficulty);
        *self.head.write() = Head {
            block: head_block.clone(),
            total_difficulty: new_head.total_difficulty,
        };

        let old_number = old_head.block.number();
        if fork_point < old_number {
            tracing::info!(
                fork_point,
                depth = old_number - fork_point,
                old_head = %old_head.block.hash(),
                "chain reorganized"
            );
        }
        tracing::info!(
            number = info.number,
            hash = %info.hash,
            td = %info.total_difficulty,
            blocks = chain.len(),
            "new chain head"
        );
        Ok(info)
    }
}
