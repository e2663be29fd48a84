//! Registry-backed model.
//!
//! Permissions and tunables live in the storage of a reserved
//! administrative account. Slot layout:
//!
//! - `keccak("perm" ++ role_byte ++ address)` → non-zero if granted
//! - `keccak("value" ++ key)` → big-endian tunable
//!
//! Tunable keys are listed in [`keys`].

use crate::error::{ConsensusError, ConsensusResult};
use crate::model::{denied, ConsensusModel, ModelConfig, ModelKind, Role};
use canon_crypto::keccak256_concat;
use canon_primitives::{Address, Gas, H256, U256};
use canon_storage::{StateReader, StateWriter};
use canon_types::BlockHeader;

/// Default administrative account: `0x00…0100`
pub const DEFAULT_REGISTRY_ADDRESS: Address = {
    let mut bytes = [0u8; 20];
    bytes[18] = 0x01;
    Address::from_bytes(bytes)
};

/// Registry tunable keys
pub mod keys {
    use crate::model::Role;

    /// Per-transaction gas cap
    pub const MAX_GAS_TX: &str = "maxgastx";
    /// Target block interval in seconds
    pub const BLOCK_TIME: &str = "blocktime";
    /// Anyone may transact when non-zero
    pub const PUBLIC_TX: &str = "public:tx";
    /// Anyone may mine when non-zero
    pub const PUBLIC_MINE: &str = "public:mine";
    /// Anyone may deploy contracts when non-zero
    pub const PUBLIC_CREATE: &str = "public:create";

    /// Every recognised key
    pub const ALL: [&str; 5] = [MAX_GAS_TX, BLOCK_TIME, PUBLIC_TX, PUBLIC_MINE, PUBLIC_CREATE];

    /// Flag that opens `role` to every address
    pub fn public_flag(role: Role) -> &'static str {
        match role {
            Role::Transact => PUBLIC_TX,
            Role::Mine => PUBLIC_MINE,
            Role::Create => PUBLIC_CREATE,
        }
    }
}

/// Slot holding the grant of `role` to `address`
pub fn permission_slot(role: Role, address: &Address) -> H256 {
    keccak256_concat(&[b"perm", &[role.as_byte()], address.as_bytes()])
}

/// Slot holding the tunable `key`
pub fn value_slot(key: &str) -> H256 {
    keccak256_concat(&[b"value", key.as_bytes()])
}

/// Read a tunable; unset reads as zero
pub fn read_value(state: &dyn StateReader, registry: &Address, key: &str) -> U256 {
    state.get_storage(registry, &value_slot(key)).to_u256()
}

/// Check a grant, honouring the public flag for the role
pub fn has_permission(
    state: &dyn StateReader,
    registry: &Address,
    address: &Address,
    role: Role,
) -> bool {
    !read_value(state, registry, keys::public_flag(role)).is_zero()
        || !state
            .get_storage(registry, &permission_slot(role, address))
            .is_zero()
}

/// Write a grant
pub fn write_permission(
    state: &mut dyn StateWriter,
    registry: &Address,
    address: &Address,
    role: Role,
    granted: bool,
) {
    let word = if granted {
        H256::from_low_u64_be(1)
    } else {
        H256::ZERO
    };
    state.set_storage(*registry, permission_slot(role, address), word);
}

/// Write a tunable, rejecting unknown keys
pub fn write_value(
    state: &mut dyn StateWriter,
    registry: &Address,
    key: &str,
    value: U256,
) -> ConsensusResult<()> {
    if !keys::ALL.contains(&key) {
        return Err(ConsensusError::UnknownKey(key.to_string()));
    }
    state.set_storage(*registry, value_slot(key), H256::from_u256(value));
    Ok(())
}

/// Reads permissions and tunables from the registry account of the state
/// under validation
#[derive(Debug, Clone)]
pub struct RegistryModel {
    registry: Address,
    min_difficulty: U256,
    default_max_gas: Gas,
    default_block_time: u64,
}

impl RegistryModel {
    /// Create from configuration
    pub fn new(config: &ModelConfig) -> Self {
        Self {
            registry: config.registry_address,
            min_difficulty: U256::from(config.min_difficulty),
            default_max_gas: config.max_gas_per_tx,
            default_block_time: config.block_time,
        }
    }

    /// Registry account
    pub fn registry(&self) -> &Address {
        &self.registry
    }

    /// Target block interval in seconds
    pub fn block_time(&self, state: &dyn StateReader) -> u64 {
        let stored = read_value(state, &self.registry, keys::BLOCK_TIME);
        if stored.is_zero() {
            self.default_block_time
        } else {
            saturating_u64(stored)
        }
    }
}

fn saturating_u64(value: U256) -> u64 {
    if value > U256::from(u64::MAX) {
        u64::MAX
    } else {
        value.low_u64()
    }
}

impl ConsensusModel for RegistryModel {
    fn kind(&self) -> ModelKind {
        ModelKind::Registry
    }

    fn validate_perm(
        &self,
        address: &Address,
        role: Role,
        state: &dyn StateReader,
    ) -> ConsensusResult<()> {
        if has_permission(state, &self.registry, address, role) {
            Ok(())
        } else {
            Err(denied(address, role))
        }
    }

    /// Moves the parent difficulty by `parent >> 8` toward the target
    /// interval: up when the block came early, down when late.
    fn difficulty(
        &self,
        header: &BlockHeader,
        parent: &BlockHeader,
        state: &dyn StateReader,
    ) -> ConsensusResult<U256> {
        let target = self.block_time(state);
        let elapsed = header.timestamp.saturating_sub(parent.timestamp);
        let step = parent.difficulty >> 8;

        let next = match elapsed.cmp(&target) {
            std::cmp::Ordering::Less => parent.difficulty.saturating_add(step),
            std::cmp::Ordering::Greater => parent.difficulty.saturating_sub(step),
            std::cmp::Ordering::Equal => parent.difficulty,
        };
        Ok(next.max(self.min_difficulty))
    }

    fn max_gas_per_tx(&self, state: &dyn StateReader) -> Gas {
        let stored = read_value(state, &self.registry, keys::MAX_GAS_TX);
        if stored.is_zero() {
            self.default_max_gas
        } else {
            saturating_u64(stored)
        }
    }

    fn set_permission(
        &self,
        address: &Address,
        role: Role,
        granted: bool,
        state: &mut dyn StateWriter,
    ) -> ConsensusResult<()> {
        tracing::debug!(%address, %role, granted, "registry permission");
        write_permission(state, &self.registry, address, role, granted);
        Ok(())
    }

    fn set_value(&self, key: &str, value: U256, state: &mut dyn StateWriter) -> ConsensusResult<()> {
        tracing::debug!(key, %value, "registry value");
        write_value(state, &self.registry, key, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canon_storage::WorldState;
    use canon_types::{Block, BlockBody};

    fn model() -> RegistryModel {
        RegistryModel::new(&ModelConfig::new(ModelKind::Registry).with_min_difficulty(1000))
    }

    fn addr(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    fn parent(difficulty: u64, timestamp: u64) -> BlockHeader {
        BlockHeader {
            difficulty: U256::from(difficulty),
            timestamp,
            ..Default::default()
        }
    }

    fn child_at(timestamp: u64) -> BlockHeader {
        BlockHeader {
            number: 1,
            timestamp,
            ..Default::default()
        }
    }

    // ==================== Slot layout ====================

    #[test]
    fn test_default_registry_address() {
        assert_eq!(DEFAULT_REGISTRY_ADDRESS, addr(0x100));
    }

    #[test]
    fn test_slots_are_namespaced() {
        let a = addr(1);
        assert_ne!(permission_slot(Role::Mine, &a), permission_slot(Role::Transact, &a));
        assert_ne!(permission_slot(Role::Mine, &a), permission_slot(Role::Mine, &addr(2)));
        assert_ne!(value_slot(keys::BLOCK_TIME), value_slot(keys::MAX_GAS_TX));
    }

    // ==================== Permissions ====================

    #[test]
    fn test_denied_until_granted() {
        let model = model();
        let mut state = WorldState::new();
        assert!(model.validate_perm(&addr(1), Role::Transact, &state).is_err());

        model
            .set_permission(&addr(1), Role::Transact, true, &mut state)
            .unwrap();
        assert!(model.validate_perm(&addr(1), Role::Transact, &state).is_ok());
        assert!(model.validate_perm(&addr(1), Role::Mine, &state).is_err());
        assert!(model.validate_perm(&addr(2), Role::Transact, &state).is_err());

        model
            .set_permission(&addr(1), Role::Transact, false, &mut state)
            .unwrap();
        assert!(model.validate_perm(&addr(1), Role::Transact, &state).is_err());
    }

    #[test]
    fn test_public_flag_opens_role() {
        let model = model();
        let mut state = WorldState::new();
        model
            .set_value(keys::PUBLIC_MINE, U256::one(), &mut state)
            .unwrap();
        assert!(model.validate_perm(&addr(42), Role::Mine, &state).is_ok());
        assert!(model.participate(&addr(42), &BlockHeader::default(), &state));
        assert!(model.validate_perm(&addr(42), Role::Create, &state).is_err());
    }

    #[test]
    fn test_block_requires_mine_role() {
        let model = model();
        let mut state = WorldState::new();
        let block = Block::new(
            BlockHeader {
                coinbase: addr(5),
                ..Default::default()
            },
            BlockBody::default(),
        );
        let parent = BlockHeader::default();
        assert!(model.validate_block(&block, &parent, &state).is_err());

        model.set_permission(&addr(5), Role::Mine, true, &mut state).unwrap();
        assert!(model.validate_block(&block, &parent, &state).is_ok());
    }

    #[test]
    fn test_unknown_key_rejected() {
        let mut state = WorldState::new();
        let err = model()
            .set_value("bogus", U256::one(), &mut state)
            .unwrap_err();
        assert_eq!(err, ConsensusError::UnknownKey("bogus".into()));
        assert!(state.is_empty());
    }

    // ==================== Tunables ====================

    #[test]
    fn test_max_gas_per_tx_falls_back_to_config() {
        let model = model();
        let mut state = WorldState::new();
        assert_eq!(model.max_gas_per_tx(&state), 10_000_000);
        model
            .set_value(keys::MAX_GAS_TX, U256::from(50_000u64), &mut state)
            .unwrap();
        assert_eq!(model.max_gas_per_tx(&state), 50_000);
    }

    // ==================== Difficulty retargeting ====================

    #[test]
    fn test_early_block_raises_difficulty() {
        let model = model();
        let mut state = WorldState::new();
        model
            .set_value(keys::BLOCK_TIME, U256::from(10u64), &mut state)
            .unwrap();
        let d = model
            .difficulty(&child_at(103), &parent(25_600, 100), &state)
            .unwrap();
        assert_eq!(d, U256::from(25_700u64));
    }

    #[test]
    fn test_late_block_lowers_difficulty() {
        let model = model();
        let mut state = WorldState::new();
        model
            .set_value(keys::BLOCK_TIME, U256::from(10u64), &mut state)
            .unwrap();
        let d = model
            .difficulty(&child_at(130), &parent(25_600, 100), &state)
            .unwrap();
        assert_eq!(d, U256::from(25_500u64));
    }

    #[test]
    fn test_on_target_block_keeps_difficulty() {
        let model = model();
        let state = WorldState::new();
        let d = model
            .difficulty(&child_at(105), &parent(25_600, 100), &state)
            .unwrap();
        assert_eq!(d, U256::from(25_600u64));
    }

    #[test]
    fn test_difficulty_floor() {
        let model = model();
        let state = WorldState::new();
        let d = model
            .difficulty(&child_at(1_000), &parent(1_000, 100), &state)
            .unwrap();
        assert_eq!(d, U256::from(1_000u64));
    }
}
