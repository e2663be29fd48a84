//! Applying a single transaction to a state snapshot

use crate::error::{GasScope, TxError};
use canon_consensus::ConsensusModel;
use canon_crypto::keccak256;
use canon_primitives::{Address, Gas, U256};
use canon_storage::{StateReader, StateWriter, WorldState};
use canon_types::{BlockHeader, Receipt, SignedTransaction, Transaction};
use canon_vm::{BlockEnv, CallContext, CallOutcome, CodeExecutor};
use rlp::RlpStream;

/// Base cost of every transaction
pub const TX_GAS: Gas = 21_000;

/// Surcharge for deploying a contract
pub const TX_CREATE_GAS: Gas = 32_000;

/// Cost per zero byte of payload
pub const TX_DATA_ZERO_GAS: Gas = 4;

/// Cost per non-zero byte of payload
pub const TX_DATA_NON_ZERO_GAS: Gas = 68;

/// Gas charged before any code runs
pub fn intrinsic_gas(tx: &Transaction) -> Gas {
    let zeros = tx.data.iter().filter(|b| **b == 0).count() as Gas;
    let non_zeros = tx.data.len() as Gas - zeros;
    let base = if tx.is_create() {
        TX_GAS + TX_CREATE_GAS
    } else {
        TX_GAS
    };
    base.saturating_add(zeros.saturating_mul(TX_DATA_ZERO_GAS))
        .saturating_add(non_zeros.saturating_mul(TX_DATA_NON_ZERO_GAS))
}

/// Address of a contract created by `sender` at `nonce`:
/// `keccak256(rlp([sender, nonce]))[12..]`
pub fn contract_address(sender: &Address, nonce: u64) -> Address {
    let mut stream = RlpStream::new_list(2);
    stream.append(sender);
    stream.append(&nonce);
    let hash = keccak256(&stream.out());
    Address::from_word(&hash)
}

/// Gas still available to the transactions of one block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasPool {
    remaining: Gas,
}

impl GasPool {
    /// Pool holding the block gas limit
    pub fn new(limit: Gas) -> Self {
        Self { remaining: limit }
    }

    /// Gas left
    pub fn remaining(&self) -> Gas {
        self.remaining
    }

    /// Take `amount`, failing if the pool cannot cover it
    pub fn sub_gas(&mut self, amount: Gas) -> Result<(), TxError> {
        if amount > self.remaining {
            return Err(TxError::GasLimitExceeded {
                scope: GasScope::Block,
                requested: amount,
                available: self.remaining,
            });
        }
        self.remaining -= amount;
        Ok(())
    }

    /// Return unused gas
    pub fn add_gas(&mut self, amount: Gas) {
        self.remaining = self.remaining.saturating_add(amount);
    }
}

/// Applies transactions of one block.
///
/// Order of checks: sender recovery, model permission, nonce, gas caps,
/// block gas pool, balance. Any failure leaves `state` untouched.
pub struct StateTransition<'a> {
    model: &'a dyn ConsensusModel,
    executor: &'a dyn CodeExecutor,
    header: &'a BlockHeader,
}

impl<'a> StateTransition<'a> {
    /// Transition for transactions of the block headed by `header`
    pub fn new(
        model: &'a dyn ConsensusModel,
        executor: &'a dyn CodeExecutor,
        header: &'a BlockHeader,
    ) -> Self {
        Self {
            model,
            executor,
            header,
        }
    }

    /// Apply `tx`, returning its receipt.
    ///
    /// `cumulative_gas` is the gas used by earlier transactions of the
    /// block. A failing executor still yields a receipt (marked failed);
    /// only pre-execution checks return an error.
    pub fn apply(
        &self,
        tx: &SignedTransaction,
        state: &mut WorldState,
        gas_pool: &mut GasPool,
        cumulative_gas: Gas,
    ) -> Result<Receipt, TxError> {
        let sender = tx.sender()?;

        self.model
            .validate_tx(tx, &sender, state)
            .map_err(TxError::PermissionDenied)?;

        let nonce = state.get_nonce(&sender);
        if tx.nonce() != nonce {
            return Err(TxError::NonceMismatch {
                expected: nonce,
                got: tx.nonce(),
            });
        }

        let intrinsic = intrinsic_gas(&tx.tx);
        let max_gas = self.model.max_gas_per_tx(state);
        if tx.gas_limit() > max_gas {
            return Err(TxError::GasLimitExceeded {
                scope: GasScope::Transaction,
                requested: tx.gas_limit(),
                available: max_gas,
            });
        }
        if tx.gas_limit() < intrinsic {
            return Err(TxError::IntrinsicGasTooLow {
                required: intrinsic,
                provided: tx.gas_limit(),
            });
        }

        gas_pool.sub_gas(tx.gas_limit())?;

        let gas_cost = U256::from(tx.gas_limit()).saturating_mul(tx.gas_price());
        let required = gas_cost.saturating_add(tx.value());
        let available = state.get_balance(&sender);
        if available < required {
            gas_pool.add_gas(tx.gas_limit());
            return Err(TxError::InsufficientBalance {
                required,
                available,
            });
        }

        // Buy gas
        state.increment_nonce(&sender);
        state.sub_balance(&sender, gas_cost);

        let checkpoint = state.clone();
        let outcome = self.execute(tx, &sender, nonce, tx.gas_limit() - intrinsic, state);
        let (success, contract, logs) = match outcome.error {
            None => (true, outcome.contract, outcome.logs),
            Some(err) => {
                tracing::debug!(tx = %tx.hash(), error = %err, "execution failed, reverting");
                *state = checkpoint;
                (false, None, Vec::new())
            }
        };

        // Refund unused gas and pay the coinbase for the rest
        let gas_remaining = outcome.gas_remaining.min(tx.gas_limit() - intrinsic);
        let gas_used = tx.gas_limit() - gas_remaining;
        state.add_balance(
            &sender,
            U256::from(gas_remaining).saturating_mul(tx.gas_price()),
        );
        gas_pool.add_gas(gas_remaining);
        state.add_balance(
            &self.header.coinbase,
            U256::from(gas_used).saturating_mul(tx.gas_price()),
        );

        Ok(Receipt::new(
            success,
            state.root(),
            cumulative_gas + gas_used,
            gas_used,
            logs,
            contract,
        ))
    }

    /// Transfer value and run code, if any
    fn execute(
        &self,
        tx: &SignedTransaction,
        sender: &Address,
        nonce: u64,
        gas: Gas,
        state: &mut WorldState,
    ) -> Execution {
        let ctx = |address: Address| CallContext {
            address,
            caller: *sender,
            origin: *sender,
            value: tx.value(),
            input: tx.data().clone(),
            gas,
            is_static: false,
            block: BlockEnv::from(self.header),
        };

        match tx.to() {
            None => {
                let address = contract_address(sender, nonce);
                state.transfer(sender, &address, tx.value());
                let outcome = self.executor.create(&ctx(address), tx.data(), state);
                if outcome.is_success() && !outcome.output.is_empty() {
                    state.set_code(address, outcome.output.clone());
                }
                Execution::from_outcome(outcome, Some(address))
            }
            Some(to) => {
                state.transfer(sender, &to, tx.value());
                match state.code_at(&to) {
                    Some(code) => {
                        let outcome = self.executor.call(&ctx(to), &code, state);
                        Execution::from_outcome(outcome, None)
                    }
                    None => Execution::from_outcome(CallOutcome::success(Default::default(), gas), None),
                }
            }
        }
    }
}

struct Execution {
    gas_remaining: Gas,
    logs: Vec<canon_types::Log>,
    contract: Option<Address>,
    error: Option<TxError>,
}

impl Execution {
    fn from_outcome(outcome: CallOutcome, contract: Option<Address>) -> Self {
        Self {
            gas_remaining: outcome.gas_remaining,
            logs: outcome.logs,
            contract,
            error: outcome.error.map(TxError::Execution),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use canon_consensus::{
        build_model, registry, ConsensusModel, ModelConfig, ModelKind, Role,
    };
    use canon_crypto::{private_key_from_seed, public_key_to_address, PrivateKey};
    use canon_primitives::H256;
    use canon_vm::{FnExecutor, NullExecutor, VmError};
    use std::sync::Arc;

    const ETHER: u64 = 1_000_000_000_000_000_000;

    fn key(seed: &str) -> (PrivateKey, Address) {
        let key = private_key_from_seed(seed.as_bytes()).unwrap();
        let address = public_key_to_address(key.verifying_key());
        (key, address)
    }

    fn transfer(key: &PrivateKey, nonce: u64, to: Address, value: u64) -> SignedTransaction {
        Transaction {
            nonce,
            gas_price: U256::from(1u64),
            gas_limit: 21_000,
            to: Some(to),
            value: U256::from(value),
            data: Bytes::new(),
        }
        .sign(key)
        .unwrap()
    }

    fn permissive() -> Arc<dyn ConsensusModel> {
        build_model(&ModelConfig::new(ModelKind::Permissive), Arc::new(NullExecutor))
    }

    fn header() -> BlockHeader {
        BlockHeader {
            number: 1,
            coinbase: Address::from_low_u64_be(0xc0),
            gas_limit: 1_000_000,
            ..Default::default()
        }
    }

    fn funded(address: Address) -> WorldState {
        let mut state = WorldState::new();
        state.add_balance(&address, U256::from(ETHER));
        state
    }

    // ==================== Intrinsic gas ====================

    #[test]
    fn test_intrinsic_gas() {
        let mut tx = Transaction {
            to: Some(Address::ZERO),
            ..Default::default()
        };
        assert_eq!(intrinsic_gas(&tx), 21_000);

        tx.data = Bytes::from_static(&[0, 1, 0, 2]);
        assert_eq!(intrinsic_gas(&tx), 21_000 + 2 * 4 + 2 * 68);

        tx.to = None;
        assert_eq!(intrinsic_gas(&tx), 53_000 + 2 * 4 + 2 * 68);
    }

    #[test]
    fn test_contract_address_depends_on_nonce() {
        let sender = Address::from_bytes([0x42; 20]);
        assert_ne!(contract_address(&sender, 0), contract_address(&sender, 1));
        assert_ne!(contract_address(&sender, 0), Address::ZERO);
    }

    #[test]
    fn test_gas_pool() {
        let mut pool = GasPool::new(100);
        pool.sub_gas(60).unwrap();
        assert!(pool.sub_gas(41).unwrap_err().exhausts_block());
        pool.add_gas(10);
        assert_eq!(pool.remaining(), 50);
    }

    // ==================== Value transfer ====================

    #[test]
    fn test_simple_transfer() {
        let (key, sender) = key("alice");
        let to = Address::from_low_u64_be(7);
        let model = permissive();
        let header = header();
        let transition = StateTransition::new(model.as_ref(), &NullExecutor, &header);
        let mut state = funded(sender);
        let mut pool = GasPool::new(header.gas_limit);

        let receipt = transition
            .apply(&transfer(&key, 0, to, 1000), &mut state, &mut pool, 0)
            .unwrap();

        assert!(receipt.success);
        assert_eq!(receipt.gas_used, 21_000);
        assert_eq!(receipt.cumulative_gas_used, 21_000);
        assert_eq!(receipt.post_state, state.root());
        assert_eq!(state.get_balance(&to), U256::from(1000u64));
        assert_eq!(state.get_nonce(&sender), 1);
        assert_eq!(state.get_balance(&header.coinbase), U256::from(21_000u64));
        assert_eq!(
            state.get_balance(&sender),
            U256::from(ETHER - 1000 - 21_000)
        );
        assert_eq!(pool.remaining(), header.gas_limit - 21_000);
    }

    #[test]
    fn test_nonce_mismatch_leaves_state() {
        let (key, sender) = key("alice");
        let model = permissive();
        let header = header();
        let transition = StateTransition::new(model.as_ref(), &NullExecutor, &header);
        let mut state = funded(sender);
        let root = state.root();
        let mut pool = GasPool::new(header.gas_limit);

        let err = transition
            .apply(&transfer(&key, 5, Address::ZERO, 1), &mut state, &mut pool, 0)
            .unwrap_err();
        assert_eq!(err, TxError::NonceMismatch { expected: 0, got: 5 });
        assert_eq!(state.root(), root);
        assert_eq!(pool.remaining(), header.gas_limit);
    }

    #[test]
    fn test_insufficient_balance_returns_gas() {
        let (key, _) = key("pauper");
        let model = permissive();
        let header = header();
        let transition = StateTransition::new(model.as_ref(), &NullExecutor, &header);
        let mut state = WorldState::new();
        let mut pool = GasPool::new(header.gas_limit);

        let err = transition
            .apply(&transfer(&key, 0, Address::ZERO, 1), &mut state, &mut pool, 0)
            .unwrap_err();
        assert!(matches!(err, TxError::InsufficientBalance { .. }));
        assert_eq!(pool.remaining(), header.gas_limit);
    }

    #[test]
    fn test_per_tx_gas_cap() {
        let (key, sender) = key("alice");
        let model = build_model(
            &ModelConfig::new(ModelKind::Permissive).with_max_gas_per_tx(20_000),
            Arc::new(NullExecutor),
        );
        let header = header();
        let transition = StateTransition::new(model.as_ref(), &NullExecutor, &header);
        let mut state = funded(sender);
        let mut pool = GasPool::new(header.gas_limit);

        let err = transition
            .apply(&transfer(&key, 0, Address::ZERO, 1), &mut state, &mut pool, 0)
            .unwrap_err();
        assert_eq!(
            err,
            TxError::GasLimitExceeded {
                scope: GasScope::Transaction,
                requested: 21_000,
                available: 20_000,
            }
        );
    }

    #[test]
    fn test_block_gas_pool_exhausted() {
        let (key, sender) = key("alice");
        let model = permissive();
        let header = header();
        let transition = StateTransition::new(model.as_ref(), &NullExecutor, &header);
        let mut state = funded(sender);
        let mut pool = GasPool::new(30_000);

        transition
            .apply(&transfer(&key, 0, Address::ZERO, 1), &mut state, &mut pool, 0)
            .unwrap();
        let err = transition
            .apply(&transfer(&key, 1, Address::ZERO, 1), &mut state, &mut pool, 21_000)
            .unwrap_err();
        assert!(err.exhausts_block());
    }

    #[test]
    fn test_registry_denies_sender() {
        let (key, sender) = key("alice");
        let model = build_model(&ModelConfig::new(ModelKind::Registry), Arc::new(NullExecutor));
        let header = header();
        let transition = StateTransition::new(model.as_ref(), &NullExecutor, &header);
        let mut state = funded(sender);
        let mut pool = GasPool::new(header.gas_limit);

        let err = transition
            .apply(&transfer(&key, 0, Address::ZERO, 1), &mut state, &mut pool, 0)
            .unwrap_err();
        assert!(matches!(err, TxError::PermissionDenied(_)));

        model
            .set_permission(&sender, Role::Transact, true, &mut state)
            .unwrap();
        assert!(transition
            .apply(&transfer(&key, 0, Address::ZERO, 1), &mut state, &mut pool, 0)
            .is_ok());
        assert_ne!(
            state.get_storage(
                &registry::DEFAULT_REGISTRY_ADDRESS,
                &registry::permission_slot(Role::Transact, &sender)
            ),
            H256::ZERO
        );
    }

    // ==================== Code execution ====================

    #[test]
    fn test_create_deploys_code() {
        let (key, sender) = key("deployer");
        let model = permissive();
        let header = header();
        let transition = StateTransition::new(model.as_ref(), &NullExecutor, &header);
        let mut state = funded(sender);
        let mut pool = GasPool::new(header.gas_limit);

        let tx = Transaction {
            nonce: 0,
            gas_price: U256::from(1u64),
            gas_limit: 100_000,
            to: None,
            value: U256::zero(),
            data: Bytes::from_static(&[0x60, 0x01]),
        }
        .sign(&key)
        .unwrap();
        let receipt = transition.apply(&tx, &mut state, &mut pool, 0).unwrap();

        let address = contract_address(&sender, 0);
        assert_eq!(receipt.contract_address, Some(address));
        assert_eq!(receipt.gas_used, intrinsic_gas(&tx.tx));
        assert_eq!(state.code_at(&address), Some(Bytes::from_static(&[0x60, 0x01])));
    }

    #[test]
    fn test_failed_execution_reverts_but_charges_gas() {
        let (key, sender) = key("alice");
        let target = Address::from_low_u64_be(0xaa);
        let executor = FnExecutor::new(|ctx, _code, state| {
            state.set_storage(ctx.address, H256::ZERO, H256::from_low_u64_be(1));
            CallOutcome::failure(VmError::Reverted, ctx.gas - 500)
        });
        let model = permissive();
        let header = header();
        let transition = StateTransition::new(model.as_ref(), &executor, &header);
        let mut state = funded(sender);
        state.set_code(target, Bytes::from_static(b"code"));
        let mut pool = GasPool::new(header.gas_limit);

        let tx = Transaction {
            nonce: 0,
            gas_price: U256::from(2u64),
            gas_limit: 50_000,
            to: Some(target),
            value: U256::from(10u64),
            data: Bytes::new(),
        }
        .sign(&key)
        .unwrap();
        let receipt = transition.apply(&tx, &mut state, &mut pool, 0).unwrap();

        assert!(!receipt.success);
        assert_eq!(receipt.gas_used, 21_500);
        assert_eq!(state.get_storage(&target, &H256::ZERO), H256::ZERO);
        assert_eq!(state.get_balance(&target), U256::zero());
        assert_eq!(state.get_nonce(&sender), 1);
        assert_eq!(
            state.get_balance(&sender),
            U256::from(ETHER - 2 * 21_500)
        );
        assert_eq!(state.get_balance(&header.coinbase), U256::from(2 * 21_500u64));
    }
}
