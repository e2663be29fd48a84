//! Per-block metadata record

use canon_primitives::{BlockNumber, H256, U256};

use crate::block::Block;

/// Stored beside every committed block so total difficulty never has to be
/// recomputed by walking history
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockInfo {
    /// Block number
    pub number: BlockNumber,
    /// Block hash
    pub hash: H256,
    /// Parent hash
    pub parent_hash: H256,
    /// Total difficulty from genesis through this block
    pub total_difficulty: U256,
}

impl BlockInfo {
    /// Record for `block` given its total difficulty
    pub fn for_block(block: &Block, total_difficulty: U256) -> Self {
        Self {
            number: block.number(),
            hash: block.hash(),
            parent_hash: block.parent_hash(),
            total_difficulty,
        }
    }
}
