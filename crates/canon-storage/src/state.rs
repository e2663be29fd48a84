//! In-memory world state with a deterministic root commitment

use crate::traits::{Account, StateReader, StateWriter};
use bytes::Bytes;
use canon_crypto::keccak256;
use canon_primitives::{Address, H256};
use canon_types::{DecodeError, EMPTY_LIST_HASH};
use rlp::{Rlp, RlpStream};
use std::collections::BTreeMap;
use std::sync::OnceLock;

#[derive(Clone, Debug, Default)]
struct AccountEntry {
    account: Account,
    storage: BTreeMap<H256, H256>,
    // cleared on every storage write
    storage_root: OnceLock<H256>,
}

impl PartialEq for AccountEntry {
    fn eq(&self, other: &Self) -> bool {
        self.account == other.account && self.storage == other.storage
    }
}

impl Eq for AccountEntry {}

impl AccountEntry {
    fn new(account: Account, storage: BTreeMap<H256, H256>) -> Self {
        Self {
            account,
            storage,
            storage_root: OnceLock::new(),
        }
    }

    fn storage_root(&self) -> H256 {
        *self.storage_root.get_or_init(|| {
            if self.storage.is_empty() {
                return EMPTY_LIST_HASH;
            }
            let mut s = RlpStream::new_list(self.storage.len());
            for (key, value) in &self.storage {
                s.begin_list(2);
                s.append(key);
                s.append(value);
            }
            keccak256(&s.out())
        })
    }
}

/// Snapshot of every account, storage slot and code blob.
///
/// Sorted maps make [`WorldState::root`] independent of insertion order.
/// Each validation attempt works on its own clone, so a rejected block
/// never touches the snapshot it started from.
///
/// Computing the root hashes every account, which makes it linear in the
/// size of the state. Block processing asks for it after each transaction
/// (receipt post-state), so the result is memoized until the next write and
/// per-account storage roots are memoized until that account's storage
/// changes. Writes touching balances or nonces still cost a full pass over
/// the account list on the next [`WorldState::root`].
#[derive(Clone, Debug, Default)]
pub struct WorldState {
    accounts: BTreeMap<Address, AccountEntry>,
    code: BTreeMap<H256, Bytes>,
    // cleared on every write
    root: OnceLock<H256>,
}

impl PartialEq for WorldState {
    fn eq(&self, other: &Self) -> bool {
        self.accounts == other.accounts && self.code == other.code
    }
}

impl Eq for WorldState {}

impl WorldState {
    /// Empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of accounts
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Check if there are no accounts
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Addresses of all accounts, in order
    pub fn addresses(&self) -> impl Iterator<Item = &Address> {
        self.accounts.keys()
    }

    /// Root commitment: keccak256 over `[address, nonce, balance, code_hash,
    /// storage_root]` for every account in address order
    pub fn root(&self) -> H256 {
        *self.root.get_or_init(|| {
            let mut s = RlpStream::new_list(self.accounts.len());
            for (address, entry) in &self.accounts {
                s.begin_list(5);
                s.append(address);
                s.append(&entry.account.nonce);
                s.append(&entry.account.balance);
                s.append(&entry.account.code_hash);
                s.append(&entry.storage_root());
            }
            keccak256(&s.out())
        })
    }

    fn entry_mut(&mut self, address: Address) -> &mut AccountEntry {
        self.root = OnceLock::new();
        self.accounts.entry(address).or_default()
    }

    /// Full encoding used for persistence
    pub fn encode(&self) -> Vec<u8> {
        let mut s = RlpStream::new_list(2);
        s.begin_list(self.accounts.len());
        for (address, entry) in &self.accounts {
            s.begin_list(5);
            s.append(address);
            s.append(&entry.account.nonce);
            s.append(&entry.account.balance);
            s.append(&entry.account.code_hash);
            s.begin_list(entry.storage.len());
            for (key, value) in &entry.storage {
                s.begin_list(2);
                s.append(key);
                s.append(value);
            }
        }
        s.begin_list(self.code.len());
        for (hash, code) in &self.code {
            s.begin_list(2);
            s.append(hash);
            s.append(&code.to_vec());
        }
        s.out().to_vec()
    }

    /// Inverse of [`WorldState::encode`]
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let rlp = Rlp::new(bytes);
        let mut state = WorldState::new();

        for item in rlp.at(0)?.iter() {
            let address: Address = item.val_at(0)?;
            let mut storage = BTreeMap::new();
            for slot in item.at(4)?.iter() {
                storage.insert(slot.val_at(0)?, slot.val_at(1)?);
            }
            let account = Account {
                nonce: item.val_at(1)?,
                balance: item.val_at(2)?,
                code_hash: item.val_at(3)?,
            };
            state
                .accounts
                .insert(address, AccountEntry::new(account, storage));
        }

        for item in rlp.at(1)?.iter() {
            let code: Vec<u8> = item.val_at(1)?;
            state.code.insert(item.val_at(0)?, Bytes::from(code));
        }
        Ok(state)
    }
}

impl StateReader for WorldState {
    fn get_account(&self, address: &Address) -> Option<Account> {
        self.accounts.get(address).map(|e| e.account.clone())
    }

    fn get_storage(&self, address: &Address, key: &H256) -> H256 {
        self.accounts
            .get(address)
            .and_then(|e| e.storage.get(key).copied())
            .unwrap_or(H256::ZERO)
    }

    fn get_code(&self, code_hash: &H256) -> Option<Bytes> {
        self.code.get(code_hash).cloned()
    }
}

impl StateWriter for WorldState {
    fn set_account(&mut self, address: Address, account: Account) {
        self.entry_mut(address).account = account;
    }

    fn delete_account(&mut self, address: &Address) {
        self.root = OnceLock::new();
        self.accounts.remove(address);
    }

    fn set_storage(&mut self, address: Address, key: H256, value: H256) {
        let entry = self.entry_mut(address);
        entry.storage_root = OnceLock::new();
        if value.is_zero() {
            entry.storage.remove(&key);
        } else {
            entry.storage.insert(key, value);
        }
    }

    fn set_code(&mut self, address: Address, code: Bytes) {
        let hash = keccak256(&code);
        self.code.insert(hash, code);
        self.entry_mut(address).account.code_hash = hash;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::EMPTY_CODE_HASH;
    use canon_primitives::U256;

    fn addr(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    // ==================== Root commitment ====================

    #[test]
    fn test_empty_state_root() {
        assert_eq!(WorldState::new().root(), EMPTY_LIST_HASH);
    }

    #[test]
    fn test_root_independent_of_insertion_order() {
        let mut a = WorldState::new();
        a.add_balance(&addr(1), U256::from(10u64));
        a.add_balance(&addr(2), U256::from(20u64));

        let mut b = WorldState::new();
        b.add_balance(&addr(2), U256::from(20u64));
        b.add_balance(&addr(1), U256::from(10u64));

        assert_eq!(a.root(), b.root());
    }

    #[test]
    fn test_root_tracks_storage() {
        let mut state = WorldState::new();
        state.add_balance(&addr(1), U256::from(1u64));
        let before = state.root();

        state.set_storage(addr(1), H256::from_low_u64_be(1), H256::from_low_u64_be(9));
        assert_ne!(state.root(), before);

        // Clearing the slot restores the original commitment
        state.set_storage(addr(1), H256::from_low_u64_be(1), H256::ZERO);
        assert_eq!(state.root(), before);
    }

    #[test]
    fn test_root_follows_writes_after_being_read() {
        let mut state = WorldState::new();
        state.set_storage(addr(1), H256::from_low_u64_be(1), H256::from_low_u64_be(2));
        let first = state.root();
        assert_eq!(state.root(), first);

        state.add_balance(&addr(2), U256::from(1u64));
        let second = state.root();
        assert_ne!(second, first);

        state.set_storage(addr(1), H256::from_low_u64_be(1), H256::from_low_u64_be(3));
        assert_ne!(state.root(), second);

        state.delete_account(&addr(2));
        state.set_storage(addr(1), H256::from_low_u64_be(1), H256::from_low_u64_be(2));
        assert_eq!(state.root(), first);

        // A copy with a warm cache still compares equal to a cold rebuild
        let rebuilt = WorldState::decode(&state.encode()).unwrap();
        assert_eq!(rebuilt, state);
        assert_eq!(rebuilt.root(), first);
    }

    // ==================== Account operations ====================

    #[test]
    fn test_balance_operations() {
        let mut state = WorldState::new();
        state.add_balance(&addr(1), U256::from(100u64));
        assert!(state.sub_balance(&addr(1), U256::from(40u64)));
        assert!(!state.sub_balance(&addr(1), U256::from(61u64)));
        assert_eq!(state.get_balance(&addr(1)), U256::from(60u64));

        assert!(state.transfer(&addr(1), &addr(2), U256::from(60u64)));
        assert_eq!(state.get_balance(&addr(1)), U256::zero());
        assert_eq!(state.get_balance(&addr(2)), U256::from(60u64));
    }

    #[test]
    fn test_nonce_increment() {
        let mut state = WorldState::new();
        assert_eq!(state.get_nonce(&addr(1)), 0);
        assert_eq!(state.increment_nonce(&addr(1)), 1);
        assert_eq!(state.increment_nonce(&addr(1)), 2);
    }

    #[test]
    fn test_code_storage() {
        let mut state = WorldState::new();
        assert!(state.code_at(&addr(7)).is_none());
        state.set_code(addr(7), Bytes::from_static(&[0x60, 0x01]));
        assert_eq!(state.code_at(&addr(7)), Some(Bytes::from_static(&[0x60, 0x01])));
        assert_ne!(state.get_account(&addr(7)).unwrap().code_hash, EMPTY_CODE_HASH);
    }

    #[test]
    fn test_clone_is_isolated() {
        let mut original = WorldState::new();
        original.add_balance(&addr(1), U256::from(5u64));
        let mut copy = original.clone();
        copy.add_balance(&addr(1), U256::from(5u64));
        assert_eq!(original.get_balance(&addr(1)), U256::from(5u64));
        assert_eq!(copy.get_balance(&addr(1)), U256::from(10u64));
    }

    // ==================== Persistence encoding ====================

    #[test]
    fn test_encode_decode_preserves_root() {
        let mut state = WorldState::new();
        state.add_balance(&addr(1), U256::from(123u64));
        state.increment_nonce(&addr(1));
        state.set_storage(addr(2), H256::from_low_u64_be(3), H256::from_low_u64_be(4));
        state.set_code(addr(2), Bytes::from_static(b"code"));

        let decoded = WorldState::decode(&state.encode()).unwrap();
        assert_eq!(decoded, state);
        assert_eq!(decoded.root(), state.root());
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(WorldState::decode(&[0x01, 0x02]).is_err());
    }
}
