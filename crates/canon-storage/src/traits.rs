//! Account model and state access traits

use bytes::Bytes;
use canon_primitives::{Address, H256, U256};

/// keccak256 of empty code
pub const EMPTY_CODE_HASH: H256 = H256::from_bytes([
    0xc5, 0xd2, 0x46, 0x01, 0x86, 0xf7, 0x23, 0x3c,
    0x92, 0x7e, 0x7d, 0xb2, 0xdc, 0xc7, 0x03, 0xc0,
    0xe5, 0x00, 0xb6, 0x53, 0xca, 0x82, 0x27, 0x3b,
    0x7b, 0xfa, 0xd8, 0x04, 0x5d, 0x85, 0xa4, 0x70,
]);

/// Account data
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    /// Account nonce
    pub nonce: u64,
    /// Account balance
    pub balance: U256,
    /// keccak256 of the account code, [`EMPTY_CODE_HASH`] if none
    pub code_hash: H256,
}

impl Default for Account {
    fn default() -> Self {
        Self {
            nonce: 0,
            balance: U256::zero(),
            code_hash: EMPTY_CODE_HASH,
        }
    }
}

impl Account {
    /// Account holding `balance`
    pub fn with_balance(balance: U256) -> Self {
        Self {
            balance,
            ..Self::default()
        }
    }

    /// Check if account is empty (no nonce, balance or code)
    pub fn is_empty(&self) -> bool {
        self.nonce == 0 && self.balance.is_zero() && self.code_hash == EMPTY_CODE_HASH
    }

    /// Check if account has code
    pub fn has_code(&self) -> bool {
        self.code_hash != EMPTY_CODE_HASH
    }
}

/// Read access to a state snapshot
pub trait StateReader {
    /// Get account by address
    fn get_account(&self, address: &Address) -> Option<Account>;

    /// Get a storage word; unset slots read as zero
    fn get_storage(&self, address: &Address, key: &H256) -> H256;

    /// Get code by hash
    fn get_code(&self, code_hash: &H256) -> Option<Bytes>;

    /// Check if account exists
    fn account_exists(&self, address: &Address) -> bool {
        self.get_account(address).is_some()
    }

    /// Account nonce, zero if absent
    fn get_nonce(&self, address: &Address) -> u64 {
        self.get_account(address).map(|a| a.nonce).unwrap_or(0)
    }

    /// Account balance, zero if absent
    fn get_balance(&self, address: &Address) -> U256 {
        self.get_account(address)
            .map(|a| a.balance)
            .unwrap_or_default()
    }

    /// Code deployed at `address`, if any
    fn code_at(&self, address: &Address) -> Option<Bytes> {
        let account = self.get_account(address)?;
        if !account.has_code() {
            return None;
        }
        self.get_code(&account.code_hash)
    }
}

/// Write access to a state snapshot
pub trait StateWriter: StateReader {
    /// Set account
    fn set_account(&mut self, address: Address, account: Account);

    /// Delete account and its storage
    fn delete_account(&mut self, address: &Address);

    /// Set a storage word; writing zero clears the slot
    fn set_storage(&mut self, address: Address, key: H256, value: H256);

    /// Store code and point the account at it
    fn set_code(&mut self, address: Address, code: Bytes);

    /// Increment nonce, returning the new value
    fn increment_nonce(&mut self, address: &Address) -> u64 {
        let mut account = self.get_account(address).unwrap_or_default();
        account.nonce = account.nonce.saturating_add(1);
        let nonce = account.nonce;
        self.set_account(*address, account);
        nonce
    }

    /// Add to balance
    fn add_balance(&mut self, address: &Address, amount: U256) {
        let mut account = self.get_account(address).unwrap_or_default();
        account.balance = account.balance.saturating_add(amount);
        self.set_account(*address, account);
    }

    /// Subtract from balance; returns false and leaves state untouched if
    /// the balance is insufficient
    fn sub_balance(&mut self, address: &Address, amount: U256) -> bool {
        let mut account = self.get_account(address).unwrap_or_default();
        if account.balance < amount {
            return false;
        }
        account.balance -= amount;
        self.set_account(*address, account);
        true
    }

    /// Move `amount` between accounts; false if `from` cannot cover it
    fn transfer(&mut self, from: &Address, to: &Address, amount: U256) -> bool {
        if !self.sub_balance(from, amount) {
            return false;
        }
        self.add_balance(to, amount);
        true
    }
}
