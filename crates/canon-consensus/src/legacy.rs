//! Proof-of-work compatibility model: frontier difficulty retargeting and
//! keccak seal verification. Permissions are not consulted.

use crate::error::{ConsensusError, ConsensusResult};
use crate::model::{ConsensusModel, ModelConfig, ModelKind, Role};
use canon_crypto::keccak256_concat;
use canon_primitives::{Address, Gas, U256};
use canon_storage::StateReader;
use canon_types::{Block, BlockHeader};

/// Lowest difficulty the retarget can produce
pub const MINIMUM_DIFFICULTY: u64 = 131_072;

/// Blocks faster than this raise difficulty
pub const DURATION_LIMIT: u64 = 13;

/// Retarget step is `parent / DIFFICULTY_BOUND_DIVISOR`
pub const DIFFICULTY_BOUND_DIVISOR: u64 = 2048;

/// Blocks per difficulty-bomb period
pub const EXP_DIFF_PERIOD: u64 = 100_000;

/// Nonces tried by [`LegacyModel::mine_nonce`] before giving up
pub const MAX_SEAL_ATTEMPTS: u64 = 1 << 32;

/// Frontier-style proof of work
#[derive(Debug, Clone)]
pub struct LegacyModel {
    max_gas_per_tx: Gas,
}

impl LegacyModel {
    /// Create from configuration
    pub fn new(config: &ModelConfig) -> Self {
        Self {
            max_gas_per_tx: config.max_gas_per_tx,
        }
    }

    /// Difficulty of a block at `number` and `timestamp` following `parent`
    pub fn frontier_difficulty(number: u64, timestamp: u64, parent: &BlockHeader) -> U256 {
        let step = parent.difficulty / U256::from(DIFFICULTY_BOUND_DIVISOR);
        let mut difficulty = if timestamp < parent.timestamp.saturating_add(DURATION_LIMIT) {
            parent.difficulty.saturating_add(step)
        } else {
            parent.difficulty.saturating_sub(step)
        };
        difficulty = difficulty.max(U256::from(MINIMUM_DIFFICULTY));

        let period = number / EXP_DIFF_PERIOD;
        if period > 1 {
            let exponent = (period - 2).min(255) as usize;
            difficulty = difficulty.saturating_add(U256::one() << exponent);
        }
        difficulty
    }

    /// Largest seal value that satisfies `difficulty`
    pub fn target(difficulty: U256) -> U256 {
        if difficulty.is_zero() {
            U256::zero()
        } else {
            U256::MAX / difficulty
        }
    }

    /// `keccak(seal_hash ++ be(nonce))` as an integer
    pub fn seal_value(header: &BlockHeader, nonce: u64) -> U256 {
        keccak256_concat(&[header.seal_hash().as_bytes(), &nonce.to_be_bytes()]).to_u256()
    }

    /// Check the header's nonce against its difficulty
    pub fn verify_seal(header: &BlockHeader) -> bool {
        !header.difficulty.is_zero()
            && Self::seal_value(header, header.nonce) <= Self::target(header.difficulty)
    }

    /// Search for a nonce satisfying the header's difficulty
    pub fn mine_nonce(header: &BlockHeader) -> ConsensusResult<u64> {
        let target = Self::target(header.difficulty);
        let seal_hash = header.seal_hash();
        (0..MAX_SEAL_ATTEMPTS)
            .find(|nonce| {
                keccak256_concat(&[seal_hash.as_bytes(), &nonce.to_be_bytes()]).to_u256() <= target
            })
            .ok_or(ConsensusError::SealNotFound(MAX_SEAL_ATTEMPTS))
    }
}

impl ConsensusModel for LegacyModel {
    fn kind(&self) -> ModelKind {
        ModelKind::Legacy
    }

    fn validate_perm(&self, _: &Address, _: Role, _: &dyn StateReader) -> ConsensusResult<()> {
        Ok(())
    }

    fn validate_block(
        &self,
        block: &Block,
        _parent: &BlockHeader,
        _state: &dyn StateReader,
    ) -> ConsensusResult<()> {
        self.verify_header(&block.header)
    }

    fn verify_header(&self, header: &BlockHeader) -> ConsensusResult<()> {
        if Self::verify_seal(header) {
            Ok(())
        } else {
            Err(ConsensusError::InvalidSeal(header.hash()))
        }
    }

    fn difficulty(
        &self,
        header: &BlockHeader,
        parent: &BlockHeader,
        _state: &dyn StateReader,
    ) -> ConsensusResult<U256> {
        Ok(Self::frontier_difficulty(header.number, header.timestamp, parent))
    }

    fn participate(&self, _: &Address, _: &BlockHeader, _: &dyn StateReader) -> bool {
        true
    }

    fn max_gas_per_tx(&self, _state: &dyn StateReader) -> Gas {
        self.max_gas_per_tx
    }

    fn seal(&self, header: &mut BlockHeader) -> ConsensusResult<()> {
        header.nonce = Self::mine_nonce(header)?;
        tracing::debug!(number = header.number, nonce = header.nonce, "sealed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canon_storage::WorldState;
    use canon_types::BlockBody;

    fn parent(difficulty: u64, timestamp: u64) -> BlockHeader {
        BlockHeader {
            difficulty: U256::from(difficulty),
            timestamp,
            ..Default::default()
        }
    }

    // ==================== Difficulty ====================

    #[test]
    fn test_fast_block_raises_difficulty() {
        let p = parent(2_048_000, 1_000);
        let d = LegacyModel::frontier_difficulty(1, 1_005, &p);
        assert_eq!(d, U256::from(2_049_000u64));
    }

    #[test]
    fn test_slow_block_lowers_difficulty() {
        let p = parent(2_048_000, 1_000);
        let d = LegacyModel::frontier_difficulty(1, 1_013, &p);
        assert_eq!(d, U256::from(2_047_000u64));
    }

    #[test]
    fn test_minimum_difficulty() {
        let p = parent(MINIMUM_DIFFICULTY, 1_000);
        let d = LegacyModel::frontier_difficulty(1, 2_000, &p);
        assert_eq!(d, U256::from(MINIMUM_DIFFICULTY));
    }

    #[test]
    fn test_difficulty_bomb() {
        let p = parent(2_048_000, 1_000);
        // Period 3 adds 2^1
        let d = LegacyModel::frontier_difficulty(300_000, 1_013, &p);
        assert_eq!(d, U256::from(2_047_002u64));
        // Period 1 adds nothing
        let d = LegacyModel::frontier_difficulty(100_000, 1_013, &p);
        assert_eq!(d, U256::from(2_047_000u64));
    }

    // ==================== Seal ====================

    #[test]
    fn test_mine_then_verify() {
        let model = LegacyModel::new(&ModelConfig::new(ModelKind::Legacy));
        let mut header = BlockHeader {
            number: 1,
            difficulty: U256::from(64u64),
            ..Default::default()
        };
        model.seal(&mut header).unwrap();
        assert!(LegacyModel::verify_seal(&header));

        let block = Block::new(header, BlockBody::default());
        assert!(model
            .validate_block(&block, &BlockHeader::default(), &WorldState::new())
            .is_ok());
    }

    #[test]
    fn test_unsealed_block_rejected() {
        let model = LegacyModel::new(&ModelConfig::new(ModelKind::Legacy));
        let mut header = BlockHeader {
            number: 1,
            difficulty: U256::MAX,
            ..Default::default()
        };
        // With the maximum difficulty only a zero hash would pass
        header.nonce = 0;
        let block = Block::new(header, BlockBody::default());
        assert!(matches!(
            model.validate_block(&block, &BlockHeader::default(), &WorldState::new()),
            Err(ConsensusError::InvalidSeal(_))
        ));
    }

    #[test]
    fn test_verify_header_checks_seal() {
        let model = LegacyModel::new(&ModelConfig::new(ModelKind::Legacy));
        let mut header = BlockHeader {
            number: 2,
            difficulty: U256::from(64u64),
            ..Default::default()
        };
        model.seal(&mut header).unwrap();
        assert!(model.verify_header(&header).is_ok());

        header.difficulty = U256::MAX;
        assert!(matches!(
            model.verify_header(&header),
            Err(ConsensusError::InvalidSeal(_))
        ));
    }

    #[test]
    fn test_seal_hash_ignores_nonce() {
        let mut header = BlockHeader {
            difficulty: U256::from(2u64),
            ..Default::default()
        };
        let before = header.seal_hash();
        header.nonce = 99;
        assert_eq!(header.seal_hash(), before);
        assert_ne!(LegacyModel::seal_value(&header, 1), LegacyModel::seal_value(&header, 2));
    }

    #[test]
    fn test_ignores_permissions() {
        let model = LegacyModel::new(&ModelConfig::new(ModelKind::Legacy));
        let state = WorldState::new();
        for role in Role::ALL {
            assert!(model
                .validate_perm(&Address::from_low_u64_be(1), role, &state)
                .is_ok());
        }
    }
}
