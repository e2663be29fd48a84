//! The consensus model trait, roles and model configuration

use crate::error::{ConsensusError, ConsensusResult};
use crate::interpreter::InterpreterModel;
use crate::legacy::LegacyModel;
use crate::permissive::PermissiveModel;
use crate::registry::{RegistryModel, DEFAULT_REGISTRY_ADDRESS};
use crate::restrictive::RestrictiveModel;
use canon_primitives::{Address, Gas, U256};
use canon_storage::{StateReader, StateWriter};
use canon_types::{Block, BlockHeader, SignedTransaction};
use canon_vm::CodeExecutor;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Capability an address may hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Send transactions
    Transact,
    /// Produce blocks
    Mine,
    /// Deploy contracts
    Create,
}

impl Role {
    /// Every role
    pub const ALL: [Role; 3] = [Role::Transact, Role::Mine, Role::Create];

    /// Tag byte used in registry slot keys
    pub fn as_byte(&self) -> u8 {
        match self {
            Role::Transact => 0,
            Role::Mine => 1,
            Role::Create => 2,
        }
    }

    /// Lowercase name
    pub fn name(&self) -> &'static str {
        match self {
            Role::Transact => "transact",
            Role::Mine => "mine",
            Role::Create => "create",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which consensus model a node runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// Grants everything
    #[default]
    Permissive,
    /// Denies everything
    Restrictive,
    /// Permissions and tunables read from an on-chain registry account
    Registry,
    /// Questions answered by on-chain programs
    Interpreter,
    /// Proof-of-work compatibility mode
    Legacy,
}

impl ModelKind {
    /// Every variant
    pub const ALL: [ModelKind; 5] = [
        ModelKind::Permissive,
        ModelKind::Restrictive,
        ModelKind::Registry,
        ModelKind::Interpreter,
        ModelKind::Legacy,
    ];

    /// Lowercase name
    pub fn name(&self) -> &'static str {
        match self {
            ModelKind::Permissive => "permissive",
            ModelKind::Restrictive => "restrictive",
            ModelKind::Registry => "registry",
            ModelKind::Interpreter => "interpreter",
            ModelKind::Legacy => "legacy",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelKind {
    type Err = ConsensusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == name)
            .ok_or(ConsensusError::UnknownModel(s.to_string()))
    }
}

/// Addresses of the programs the interpreter model calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterpreterConfig {
    /// Answers `(address, role) -> bool`
    #[serde(default = "default_permission_program")]
    pub permission: Address,
    /// Answers `(header, parent) -> bool`
    #[serde(default = "default_block_program")]
    pub block: Address,
    /// Answers `(sender, tx) -> bool`
    #[serde(default = "default_transaction_program")]
    pub transaction: Address,
    /// Answers `(header, parent) -> U256`
    #[serde(default = "default_difficulty_program")]
    pub difficulty: Address,
}

fn default_permission_program() -> Address {
    Address::from_low_u64_be(0xf1)
}

fn default_block_program() -> Address {
    Address::from_low_u64_be(0xf2)
}

fn default_transaction_program() -> Address {
    Address::from_low_u64_be(0xf3)
}

fn default_difficulty_program() -> Address {
    Address::from_low_u64_be(0xf4)
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            permission: default_permission_program(),
            block: default_block_program(),
            transaction: default_transaction_program(),
            difficulty: default_difficulty_program(),
        }
    }
}

/// Model selection and tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model variant
    #[serde(default)]
    pub kind: ModelKind,
    /// Fixed difficulty exponent for the permissive and restrictive models
    #[serde(default = "default_difficulty_bits")]
    pub difficulty_bits: u32,
    /// Floor for retargeted difficulty
    #[serde(default = "default_min_difficulty")]
    pub min_difficulty: u64,
    /// Administrative account holding the registry
    #[serde(default = "default_registry_address")]
    pub registry_address: Address,
    /// Per-transaction gas cap when the registry holds none
    #[serde(default = "default_max_gas_per_tx")]
    pub max_gas_per_tx: Gas,
    /// Target block interval in seconds when the registry holds none
    #[serde(default = "default_block_time")]
    pub block_time: u64,
    /// Gas budget for each consensus program call
    #[serde(default = "default_call_gas")]
    pub call_gas: Gas,
    /// Program addresses for the interpreter model
    #[serde(default)]
    pub interpreter: InterpreterConfig,
}

fn default_difficulty_bits() -> u32 {
    10
}

fn default_min_difficulty() -> u64 {
    1024
}

fn default_registry_address() -> Address {
    DEFAULT_REGISTRY_ADDRESS
}

fn default_max_gas_per_tx() -> Gas {
    10_000_000
}

fn default_block_time() -> u64 {
    5
}

fn default_call_gas() -> Gas {
    1_000_000
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            kind: ModelKind::default(),
            difficulty_bits: default_difficulty_bits(),
            min_difficulty: default_min_difficulty(),
            registry_address: default_registry_address(),
            max_gas_per_tx: default_max_gas_per_tx(),
            block_time: default_block_time(),
            call_gas: default_call_gas(),
            interpreter: InterpreterConfig::default(),
        }
    }
}

impl ModelConfig {
    /// Default configuration for `kind`
    pub fn new(kind: ModelKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    /// Set the fixed difficulty exponent
    pub fn with_difficulty_bits(mut self, bits: u32) -> Self {
        self.difficulty_bits = bits;
        self
    }

    /// Set the difficulty floor
    pub fn with_min_difficulty(mut self, min: u64) -> Self {
        self.min_difficulty = min;
        self
    }

    /// Set the default per-transaction gas cap
    pub fn with_max_gas_per_tx(mut self, gas: Gas) -> Self {
        self.max_gas_per_tx = gas;
        self
    }

    /// Set the default target block interval
    pub fn with_block_time(mut self, seconds: u64) -> Self {
        self.block_time = seconds;
        self
    }

    /// `2^difficulty_bits`, saturating at the top bit
    pub fn fixed_difficulty(&self) -> U256 {
        U256::one() << self.difficulty_bits.min(255)
    }
}

/// Permission and difficulty policy consulted by block processing.
///
/// Every method reads from the state snapshot under validation and never
/// from canonical state, so concurrent attempts on different forks see
/// their own registries. `set_permission` and `set_value` are bootstrap
/// entry points: genesis calls them once and normal processing never does.
pub trait ConsensusModel: Send + Sync {
    /// Which variant this is
    fn kind(&self) -> ModelKind;

    /// Check that `address` holds `role`
    fn validate_perm(
        &self,
        address: &Address,
        role: Role,
        state: &dyn StateReader,
    ) -> ConsensusResult<()>;

    /// Model-specific block checks; the coinbase must be allowed to mine
    fn validate_block(
        &self,
        block: &Block,
        _parent: &BlockHeader,
        state: &dyn StateReader,
    ) -> ConsensusResult<()> {
        self.validate_perm(&block.header.coinbase, Role::Mine, state)
    }

    /// Model-specific transaction checks; creations need the create role,
    /// everything else the transact role
    fn validate_tx(
        &self,
        tx: &SignedTransaction,
        sender: &Address,
        state: &dyn StateReader,
    ) -> ConsensusResult<()> {
        let role = if tx.tx.is_create() {
            Role::Create
        } else {
            Role::Transact
        };
        self.validate_perm(sender, role, state)
    }

    /// Checks a header must pass on its own, for blocks and uncles alike
    fn verify_header(&self, _header: &BlockHeader) -> ConsensusResult<()> {
        Ok(())
    }

    /// Difficulty `header` must carry given its parent
    fn difficulty(
        &self,
        header: &BlockHeader,
        parent: &BlockHeader,
        state: &dyn StateReader,
    ) -> ConsensusResult<U256>;

    /// Whether `coinbase` may produce the next block on top of `parent`
    fn participate(
        &self,
        coinbase: &Address,
        _parent: &BlockHeader,
        state: &dyn StateReader,
    ) -> bool {
        self.validate_perm(coinbase, Role::Mine, state).is_ok()
    }

    /// Gas cap for a single transaction
    fn max_gas_per_tx(&self, state: &dyn StateReader) -> Gas;

    /// Grant or revoke a role at bootstrap
    fn set_permission(
        &self,
        address: &Address,
        role: Role,
        granted: bool,
        _state: &mut dyn StateWriter,
    ) -> ConsensusResult<()> {
        tracing::debug!(model = %self.kind(), %address, %role, granted, "permission ignored");
        Ok(())
    }

    /// Store a tunable at bootstrap
    fn set_value(&self, key: &str, value: U256, _state: &mut dyn StateWriter) -> ConsensusResult<()> {
        tracing::debug!(model = %self.kind(), key, %value, "value ignored");
        Ok(())
    }

    /// Seal a finished header before it is hashed and published
    fn seal(&self, _header: &mut BlockHeader) -> ConsensusResult<()> {
        Ok(())
    }
}

/// Build the configured model.
///
/// `executor` is only used by the interpreter model.
pub fn build_model(config: &ModelConfig, executor: Arc<dyn CodeExecutor>) -> Arc<dyn ConsensusModel> {
    tracing::info!(kind = %config.kind, "consensus model selected");
    match config.kind {
        ModelKind::Permissive => Arc::new(PermissiveModel::new(config)),
        ModelKind::Restrictive => Arc::new(RestrictiveModel::new(config)),
        ModelKind::Registry => Arc::new(RegistryModel::new(config)),
        ModelKind::Interpreter => Arc::new(InterpreterModel::new(config, executor)),
        ModelKind::Legacy => Arc::new(LegacyModel::new(config)),
    }
}

/// Shorthand for a permission failure
pub(crate) fn denied(address: &Address, role: Role) -> ConsensusError {
    ConsensusError::PermissionDenied {
        address: *address,
        role,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canon_storage::WorldState;
    use canon_vm::NullExecutor;

    #[test]
    fn test_role_bytes_are_distinct() {
        let bytes: Vec<u8> = Role::ALL.iter().map(Role::as_byte).collect();
        assert_eq!(bytes, vec![0, 1, 2]);
        assert_eq!(Role::Create.to_string(), "create");
    }

    #[test]
    fn test_model_kind_serde() {
        let kind: ModelKind = serde_json::from_str("\"registry\"").unwrap();
        assert_eq!(kind, ModelKind::Registry);
        assert_eq!(serde_json::to_string(&ModelKind::Legacy).unwrap(), "\"legacy\"");
    }

    #[test]
    fn test_model_kind_from_str() {
        for kind in ModelKind::ALL {
            assert_eq!(kind.name().parse::<ModelKind>().unwrap(), kind);
        }
        assert_eq!("Registry".parse::<ModelKind>().unwrap(), ModelKind::Registry);
        assert_eq!(
            "pow".parse::<ModelKind>(),
            Err(ConsensusError::UnknownModel("pow".into()))
        );
    }

    #[test]
    fn test_config_defaults_fill_missing_fields() {
        let config: ModelConfig = serde_json::from_str(r#"{"kind":"registry"}"#).unwrap();
        assert_eq!(config.kind, ModelKind::Registry);
        assert_eq!(config.min_difficulty, 1024);
        assert_eq!(config.registry_address, DEFAULT_REGISTRY_ADDRESS);
        assert_eq!(config.interpreter, InterpreterConfig::default());
    }

    #[test]
    fn test_fixed_difficulty() {
        let config = ModelConfig::default().with_difficulty_bits(4);
        assert_eq!(config.fixed_difficulty(), U256::from(16u64));
        let config = config.with_difficulty_bits(1000);
        assert_eq!(config.fixed_difficulty(), U256::one() << 255);
    }

    #[test]
    fn test_factory_builds_each_kind() {
        let executor: Arc<dyn CodeExecutor> = Arc::new(NullExecutor);
        for kind in [
            ModelKind::Permissive,
            ModelKind::Restrictive,
            ModelKind::Registry,
            ModelKind::Interpreter,
            ModelKind::Legacy,
        ] {
            let model = build_model(&ModelConfig::new(kind), executor.clone());
            assert_eq!(model.kind(), kind);
        }
    }

    #[test]
    fn test_default_admin_entry_points_are_noops() {
        let model = build_model(&ModelConfig::new(ModelKind::Permissive), Arc::new(NullExecutor));
        let mut state = WorldState::new();
        model
            .set_permission(&Address::from_low_u64_be(1), Role::Mine, true, &mut state)
            .unwrap();
        model.set_value("blocktime", U256::from(3u64), &mut state).unwrap();
        assert!(state.is_empty());
    }
}
