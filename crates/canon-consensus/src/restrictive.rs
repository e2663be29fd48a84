//! Model that denies every role

use crate::error::ConsensusResult;
use crate::model::{denied, ConsensusModel, ModelConfig, ModelKind, Role};
use canon_primitives::{Address, Gas, U256};
use canon_storage::StateReader;
use canon_types::BlockHeader;

/// Denies everything; no block past genesis validates under it
#[derive(Debug, Clone)]
pub struct RestrictiveModel {
    difficulty: U256,
    max_gas_per_tx: Gas,
}

impl RestrictiveModel {
    /// Create from configuration
    pub fn new(config: &ModelConfig) -> Self {
        Self {
            difficulty: config.fixed_difficulty(),
            max_gas_per_tx: config.max_gas_per_tx,
        }
    }
}

impl ConsensusModel for RestrictiveModel {
    fn kind(&self) -> ModelKind {
        ModelKind::Restrictive
    }

    fn validate_perm(
        &self,
        address: &Address,
        role: Role,
        _state: &dyn StateReader,
    ) -> ConsensusResult<()> {
        Err(denied(address, role))
    }

    fn difficulty(
        &self,
        _header: &BlockHeader,
        _parent: &BlockHeader,
        _state: &dyn StateReader,
    ) -> ConsensusResult<U256> {
        Ok(self.difficulty)
    }

    fn max_gas_per_tx(&self, _state: &dyn StateReader) -> Gas {
        self.max_gas_per_tx
    }
}
