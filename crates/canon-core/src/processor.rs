//! Validating and executing whole blocks

use crate::error::{ChainError, ChainResult, TxError};
use crate::transition::{GasPool, StateTransition};
use canon_consensus::ConsensusModel;
use canon_primitives::{Gas, H256, U256};
use canon_storage::{ChainStore, StateWriter, WorldState};
use canon_types::{receipts_root, Block, BlockHeader, Bloom, Receipt};
use canon_vm::CodeExecutor;
use std::collections::HashSet;
use std::sync::Arc;

/// Reward paid to the coinbase of every block: 1.5 ether
pub const BLOCK_REWARD: U256 = U256([1_500_000_000_000_000_000, 0, 0, 0]);

/// Uncles older than this many generations are stale
pub const MAX_UNCLE_DEPTH: u64 = 6;

/// Uncles a block may include
pub const MAX_UNCLES: usize = 2;

/// Gas limit moves at most `parent / GAS_LIMIT_BOUND_DIVISOR` per block
pub const GAS_LIMIT_BOUND_DIVISOR: u64 = 1024;

/// Longest allowed `extra_data`
pub const MAX_EXTRA_DATA: usize = 32;

/// Block and state lookup used for uncle checks
pub trait ChainReader {
    /// Block by hash, from storage or the chain under test
    fn block(&self, hash: &H256) -> ChainResult<Option<Block>>;

    /// State snapshot committed under `root`
    fn state(&self, root: &H256) -> ChainResult<Option<WorldState>>;
}

impl ChainReader for ChainStore {
    fn block(&self, hash: &H256) -> ChainResult<Option<Block>> {
        Ok(ChainStore::block(self, hash)?)
    }

    fn state(&self, root: &H256) -> ChainResult<Option<WorldState>> {
        if !self.has_state(root)? {
            return Ok(None);
        }
        Ok(Some(ChainStore::state(self, root)?))
    }
}

/// Result of executing a block body
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    /// State after transactions and rewards
    pub state: WorldState,
    /// One receipt per applied transaction
    pub receipts: Vec<Receipt>,
    /// Gas used by applied transactions
    pub gas_used: Gas,
    /// Union of receipt blooms
    pub logs_bloom: Bloom,
    /// Transactions skipped, with the reason
    pub dropped: Vec<(H256, TxError)>,
}

impl ProcessOutcome {
    /// Root of the resulting state
    pub fn state_root(&self) -> H256 {
        self.state.root()
    }

    /// Root of the receipts
    pub fn receipts_root(&self) -> H256 {
        receipts_root(&self.receipts)
    }
}

/// Runs the full validation pipeline for one block against its parent's
/// state
#[derive(Clone)]
pub struct BlockProcessor {
    model: Arc<dyn ConsensusModel>,
    executor: Arc<dyn CodeExecutor>,
}

impl BlockProcessor {
    /// Create a processor
    pub fn new(model: Arc<dyn ConsensusModel>, executor: Arc<dyn CodeExecutor>) -> Self {
        Self { model, executor }
    }

    /// Consensus model in use
    pub fn model(&self) -> &Arc<dyn ConsensusModel> {
        &self.model
    }

    /// Validate `block` on top of `parent` and return the post state.
    ///
    /// `parent_state` is only read; execution happens on a copy.
    pub fn process(
        &self,
        block: &Block,
        parent: &BlockHeader,
        parent_state: &WorldState,
        chain: &dyn ChainReader,
    ) -> ChainResult<ProcessOutcome> {
        let hash = block.hash();
        self.check_structure(block, parent)?;
        self.check_consensus(block, parent, parent_state)?;
        self.check_uncles(block, chain)?;

        let outcome = self.execute(block, parent_state.clone());

        let header = &block.header;
        if outcome.gas_used != header.gas_used {
            return Err(ChainError::invalid(
                hash,
                format!("gas used {} != header {}", outcome.gas_used, header.gas_used),
            ));
        }
        if outcome.receipts_root() != header.receipts_root {
            return Err(ChainError::invalid(hash, "receipts root mismatch"));
        }
        if outcome.logs_bloom != header.logs_bloom {
            return Err(ChainError::invalid(hash, "logs bloom mismatch"));
        }
        let state_root = outcome.state_root();
        if state_root != header.state_root {
            return Err(ChainError::invalid(
                hash,
                format!("state root {} != header {}", state_root, header.state_root),
            ));
        }

        tracing::debug!(
            number = header.number,
            %hash,
            txs = outcome.receipts.len(),
            dropped = outcome.dropped.len(),
            "block processed"
        );
        Ok(outcome)
    }

    /// Fill in the execution results of a block template.
    ///
    /// Dropped transactions are removed from the body, then the commitments
    /// are recomputed and the model seals the header.
    pub fn finalize(
        &self,
        template: Block,
        parent_state: &WorldState,
        chain: &dyn ChainReader,
    ) -> ChainResult<(Block, ProcessOutcome)> {
        let mut block = template;
        self.check_uncles(&block, chain)?;

        let outcome = self.execute(&block, parent_state.clone());
        if !outcome.dropped.is_empty() {
            let dropped: HashSet<H256> = outcome.dropped.iter().map(|(hash, _)| *hash).collect();
            block
                .body
                .transactions
                .retain(|tx| !dropped.contains(&tx.hash()));
        }

        block.header.gas_used = outcome.gas_used;
        block.header.state_root = outcome.state_root();
        block.header.receipts_root = outcome.receipts_root();
        block.header.logs_bloom = outcome.logs_bloom;
        block.seal_body();
        self.model.seal(&mut block.header)?;
        Ok((block, outcome))
    }

    fn check_structure(&self, block: &Block, parent: &BlockHeader) -> ChainResult<()> {
        let hash = block.hash();
        check_header(&block.header, parent).map_err(|reason| ChainError::invalid(hash, reason))?;
        if !block.body_matches_header() {
            return Err(ChainError::invalid(hash, "body does not match header roots"));
        }
        Ok(())
    }

    fn check_consensus(
        &self,
        block: &Block,
        parent: &BlockHeader,
        parent_state: &WorldState,
    ) -> ChainResult<()> {
        let hash = block.hash();
        let expected = self
            .model
            .difficulty(&block.header, parent, parent_state)
            .map_err(|err| ChainError::from_consensus(hash, err))?;
        if expected != block.header.difficulty {
            return Err(ChainError::invalid(
                hash,
                format!("difficulty {} != expected {}", block.header.difficulty, expected),
            ));
        }
        self.model
            .validate_block(block, parent, parent_state)
            .map_err(|err| ChainError::from_consensus(hash, err))
    }

    /// Uncles must be distinct, recent, not ancestors, not credited before,
    /// children of a known ancestor, and valid headers in their own right:
    /// their difficulty counts towards total difficulty.
    fn check_uncles(&self, block: &Block, chain: &dyn ChainReader) -> ChainResult<()> {
        let uncles = &block.body.uncles;
        if uncles.is_empty() {
            return Ok(());
        }
        let hash = block.hash();
        if uncles.len() > MAX_UNCLES {
            return Err(ChainError::invalid(hash, "too many uncles"));
        }

        // Ancestors within reach and the uncles they already credited
        let mut ancestors = HashSet::new();
        let mut credited = HashSet::new();
        let mut cursor = block.parent_hash();
        for _ in 0..=MAX_UNCLE_DEPTH {
            let Some(ancestor) = chain.block(&cursor)? else {
                break;
            };
            ancestors.insert(cursor);
            credited.extend(ancestor.body.uncles.iter().map(BlockHeader::hash));
            if ancestor.header.is_genesis() {
                break;
            }
            cursor = ancestor.parent_hash();
        }

        let mut seen = HashSet::new();
        for uncle in uncles {
            let uncle_hash = uncle.hash();
            if !seen.insert(uncle_hash) {
                return Err(ChainError::invalid(hash, format!("duplicate uncle {}", uncle_hash)));
            }
            if uncle.number >= block.number()
                || block.number() - uncle.number > MAX_UNCLE_DEPTH
            {
                return Err(ChainError::invalid(hash, format!("stale uncle {}", uncle_hash)));
            }
            if ancestors.contains(&uncle_hash) {
                return Err(ChainError::invalid(hash, format!("uncle {} is an ancestor", uncle_hash)));
            }
            if credited.contains(&uncle_hash) {
                return Err(ChainError::invalid(
                    hash,
                    format!("uncle {} already included", uncle_hash),
                ));
            }
            if !ancestors.contains(&uncle.parent_hash) {
                return Err(ChainError::invalid(
                    hash,
                    format!("uncle {} has unknown parent {}", uncle_hash, uncle.parent_hash),
                ));
            }
            self.check_uncle_header(hash, uncle, chain)?;
        }
        Ok(())
    }

    fn check_uncle_header(
        &self,
        hash: H256,
        uncle: &BlockHeader,
        chain: &dyn ChainReader,
    ) -> ChainResult<()> {
        let uncle_hash = uncle.hash();
        let bad_uncle = |reason: String| ChainError::invalid(hash, format!("uncle {}: {}", uncle_hash, reason));

        let parent = chain
            .block(&uncle.parent_hash)?
            .ok_or_else(|| bad_uncle(format!("unknown parent {}", uncle.parent_hash)))?
            .header;
        check_header(uncle, &parent).map_err(bad_uncle)?;

        let parent_state = chain
            .state(&parent.state_root)?
            .ok_or_else(|| bad_uncle(format!("parent state {} unavailable", parent.state_root)))?;
        let expected = self
            .model
            .difficulty(uncle, &parent, &parent_state)
            .map_err(|err| ChainError::from_consensus(hash, err))?;
        if expected != uncle.difficulty {
            return Err(bad_uncle(format!(
                "difficulty {} != expected {}",
                uncle.difficulty, expected
            )));
        }
        self.model
            .verify_header(uncle)
            .map_err(|err| ChainError::from_consensus(hash, err))
    }

    /// Apply transactions and rewards to `state`
    fn execute(&self, block: &Block, mut state: WorldState) -> ProcessOutcome {
        let header = &block.header;
        let transition = StateTransition::new(self.model.as_ref(), self.executor.as_ref(), header);
        let mut gas_pool = GasPool::new(header.gas_limit);
        let mut receipts = Vec::with_capacity(block.body.transactions.len());
        let mut dropped = Vec::new();
        let mut gas_used: Gas = 0;
        let mut logs_bloom = Bloom::ZERO;

        let mut txs = block.body.transactions.iter();
        for tx in txs.by_ref() {
            match transition.apply(tx, &mut state, &mut gas_pool, gas_used) {
                Ok(receipt) => {
                    gas_used = receipt.cumulative_gas_used;
                    logs_bloom.accrue_bloom(&receipt.logs_bloom);
                    receipts.push(receipt);
                }
                Err(err) => {
                    tracing::debug!(tx = %tx.hash(), error = %err, "transaction dropped");
                    let exhausted = err.exhausts_block();
                    dropped.push((tx.hash(), err));
                    if exhausted {
                        break;
                    }
                }
            }
        }
        // Everything after an exhausted gas pool is dropped with the same reason
        for tx in txs {
            dropped.push((
                tx.hash(),
                TxError::GasLimitExceeded {
                    scope: crate::error::GasScope::Block,
                    requested: tx.gas_limit(),
                    available: gas_pool.remaining(),
                },
            ));
        }

        apply_rewards(header, &block.body.uncles, &mut state);

        ProcessOutcome {
            state,
            receipts,
            gas_used,
            logs_bloom,
            dropped,
        }
    }
}

/// Header rules shared by blocks and uncles
fn check_header(header: &BlockHeader, parent: &BlockHeader) -> Result<(), String> {
    if header.number != parent.number + 1 {
        return Err(format!(
            "number {} does not follow parent {}",
            header.number, parent.number
        ));
    }
    if header.timestamp <= parent.timestamp {
        return Err("timestamp not after parent".into());
    }
    if header.gas_used > header.gas_limit {
        return Err("gas used above gas limit".into());
    }
    let bound = parent.gas_limit / GAS_LIMIT_BOUND_DIVISOR;
    if header.gas_limit.abs_diff(parent.gas_limit) > bound {
        return Err(format!(
            "gas limit {} too far from parent {}",
            header.gas_limit, parent.gas_limit
        ));
    }
    if header.extra_data.len() > MAX_EXTRA_DATA {
        return Err("extra data too long".into());
    }
    Ok(())
}

/// Credit the block and uncle rewards
fn apply_rewards(header: &BlockHeader, uncles: &[BlockHeader], state: &mut WorldState) {
    let inclusion = BLOCK_REWARD / U256::from(32u64);
    let uncle_reward = BLOCK_REWARD * U256::from(15u64) / U256::from(16u64);

    let mut reward = BLOCK_REWARD;
    for uncle in uncles {
        reward = reward.saturating_add(inclusion);
        state.add_balance(&uncle.coinbase, uncle_reward);
    }
    state.add_balance(&header.coinbase, reward);
}
