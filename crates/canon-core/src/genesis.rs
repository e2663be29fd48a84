//! Genesis block construction

use crate::error::ChainResult;
use bytes::Bytes;
use canon_consensus::{ConsensusModel, Role};
use canon_primitives::{Address, Gas, H256, U256};
use canon_storage::{ChainStore, StateWriter, WorldState};
use canon_types::{Block, BlockBody, BlockHeader, BlockInfo};

/// Genesis block together with the state it commits to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Genesis {
    /// Block zero
    pub block: Block,
    /// Initial world state
    pub state: WorldState,
}

impl Genesis {
    /// Block hash
    pub fn hash(&self) -> H256 {
        self.block.hash()
    }

    /// Write genesis into an empty store and make it the head.
    ///
    /// Total difficulty counts mined work only, so genesis starts at zero.
    pub fn apply(&self, store: &ChainStore) -> ChainResult<()> {
        let difficulty = U256::zero();
        let hash = self.block.hash();
        let mut batch = store.batch();
        batch
            .put_state(&self.state)
            .put_block(&self.block)
            .put_info(&BlockInfo::for_block(&self.block, difficulty))
            .put_receipts(&hash, &[])
            .set_canonical(0, &hash)
            .set_head(&self.block, difficulty);
        store.commit(batch)?;
        tracing::info!(%hash, state_root = %self.state.root(), "genesis written");
        Ok(())
    }
}

/// Builds the genesis state through the model's bootstrap entry points
#[derive(Debug, Clone)]
pub struct GenesisBuilder {
    alloc: Vec<(Address, U256)>,
    code: Vec<(Address, Bytes)>,
    permissions: Vec<(Address, Role, bool)>,
    values: Vec<(String, U256)>,
    difficulty: U256,
    gas_limit: Gas,
    timestamp: u64,
    extra_data: Bytes,
}

impl Default for GenesisBuilder {
    fn default() -> Self {
        Self {
            alloc: Vec::new(),
            code: Vec::new(),
            permissions: Vec::new(),
            values: Vec::new(),
            difficulty: U256::from(1024u64),
            gas_limit: 8_000_000,
            timestamp: 0,
            extra_data: Bytes::new(),
        }
    }
}

impl GenesisBuilder {
    /// Empty genesis
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `balance` to `address`
    pub fn alloc(mut self, address: Address, balance: U256) -> Self {
        self.alloc.push((address, balance));
        self
    }

    /// Deploy `code` at `address`
    pub fn code(mut self, address: Address, code: Bytes) -> Self {
        self.code.push((address, code));
        self
    }

    /// Grant `role` to `address`
    pub fn grant(mut self, address: Address, role: Role) -> Self {
        self.permissions.push((address, role, true));
        self
    }

    /// Store a model tunable
    pub fn value(mut self, key: impl Into<String>, value: U256) -> Self {
        self.values.push((key.into(), value));
        self
    }

    /// Genesis difficulty
    pub fn difficulty(mut self, difficulty: U256) -> Self {
        self.difficulty = difficulty;
        self
    }

    /// Block gas limit inherited by the first blocks
    pub fn gas_limit(mut self, gas_limit: Gas) -> Self {
        self.gas_limit = gas_limit;
        self
    }

    /// Genesis timestamp
    pub fn timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Free-form extra data
    pub fn extra_data(mut self, extra_data: Bytes) -> Self {
        self.extra_data = extra_data;
        self
    }

    /// Build the genesis state and block
    pub fn build(&self, model: &dyn ConsensusModel) -> ChainResult<Genesis> {
        let mut state = WorldState::new();
        for (address, balance) in &self.alloc {
            state.add_balance(address, *balance);
        }
        for (address, code) in &self.code {
            state.set_code(*address, code.clone());
        }
        for (address, role, granted) in &self.permissions {
            model.set_permission(address, *role, *granted, &mut state)?;
        }
        for (key, value) in &self.values {
            model.set_value(key, *value, &mut state)?;
        }

        let mut block = Block::new(
            BlockHeader {
                state_root: state.root(),
                difficulty: self.difficulty,
                gas_limit: self.gas_limit,
                timestamp: self.timestamp,
                extra_data: self.extra_data.clone(),
                ..Default::default()
            },
            BlockBody::default(),
        );
        block.seal_body();
        Ok(Genesis { block, state })
    }
}
