//! Model that grants every role

use crate::error::ConsensusResult;
use crate::model::{ConsensusModel, ModelConfig, ModelKind, Role};
use canon_primitives::{Address, Gas, U256};
use canon_storage::StateReader;
use canon_types::{Block, BlockHeader};

/// Grants everything; difficulty is a fixed power of two
#[derive(Debug, Clone)]
pub struct PermissiveModel {
    difficulty: U256,
    max_gas_per_tx: Gas,
}

impl PermissiveModel {
    /// Create from configuration
    pub fn new(config: &ModelConfig) -> Self {
        Self {
            difficulty: config.fixed_difficulty(),
            max_gas_per_tx: config.max_gas_per_tx,
        }
    }
}

impl ConsensusModel for PermissiveModel {
    fn kind(&self) -> ModelKind {
        ModelKind::Permissive
    }

    fn validate_perm(&self, _: &Address, _: Role, _: &dyn StateReader) -> ConsensusResult<()> {
        Ok(())
    }

    fn validate_block(&self, _: &Block, _: &BlockHeader, _: &dyn StateReader) -> ConsensusResult<()> {
        Ok(())
    }

    fn difficulty(
        &self,
        _header: &BlockHeader,
        _parent: &BlockHeader,
        _state: &dyn StateReader,
    ) -> ConsensusResult<U256> {
        Ok(self.difficulty)
    }

    fn participate(&self, _: &Address, _: &BlockHeader, _: &dyn StateReader) -> bool {
        true
    }

    fn max_gas_per_tx(&self, _state: &dyn StateReader) -> Gas {
        self.max_gas_per_tx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canon_storage::WorldState;

    #[test]
    fn test_grants_every_role() {
        let model = PermissiveModel::new(&ModelConfig::default());
        let state = WorldState::new();
        for role in Role::ALL {
            assert!(model
                .validate_perm(&Address::from_low_u64_be(9), role, &state)
                .is_ok());
        }
        assert!(model.participate(&Address::ZERO, &BlockHeader::default(), &state));
    }

    #[test]
    fn test_difficulty_is_fixed() {
        let model = PermissiveModel::new(&ModelConfig::default().with_difficulty_bits(3));
        let state = WorldState::new();
        let parent = BlockHeader {
            difficulty: U256::from(1_000_000u64),
            ..Default::default()
        };
        let header = BlockHeader {
            number: 1,
            timestamp: 100,
            ..Default::default()
        };
        assert_eq!(
            model.difficulty(&header, &parent, &state).unwrap(),
            U256::from(8u64)
        );
    }
}
