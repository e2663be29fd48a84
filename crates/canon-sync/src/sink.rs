//! The chain the block pool feeds

use canon_core::{ChainManager, ChainResult};
use canon_primitives::{H256, U256};
use canon_types::{Block, BlockInfo};

/// Chain operations the block pool relies on
pub trait ChainSink: Send + Sync {
    /// Whether the block is stored, canonical or not
    fn has_block(&self, hash: &H256) -> ChainResult<bool>;

    /// Whether the block is on the canonical chain
    fn is_canonical(&self, hash: &H256) -> ChainResult<bool>;

    /// Total difficulty of the canonical head
    fn total_difficulty(&self) -> U256;

    /// Validate and, if heavier, commit a candidate chain
    fn process_chain(&self, blocks: &[Block]) -> ChainResult<BlockInfo>;
}

impl ChainSink for ChainManager {
    fn has_block(&self, hash: &H256) -> ChainResult<bool> {
        ChainManager::has_block(self, hash)
    }

    fn is_canonical(&self, hash: &H256) -> ChainResult<bool> {
        ChainManager::is_canonical(self, hash)
    }

    fn total_difficulty(&self) -> U256 {
        ChainManager::total_difficulty(self)
    }

    fn process_chain(&self, blocks: &[Block]) -> ChainResult<BlockInfo> {
        ChainManager::process_chain(self, blocks)
    }
}
