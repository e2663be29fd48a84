//! Interpreter-backed model: every question is a static call into an
//! on-chain program.
//!
//! Call data layouts:
//!
//! | program     | input                                   | output     |
//! |-------------|-----------------------------------------|------------|
//! | permission  | `word(address) ++ word(role)`           | bool word  |
//! | block       | `rlp([header, parent])`                 | bool word  |
//! | transaction | `word(sender) ++ rlp(tx)`               | bool word  |
//! | difficulty  | `rlp([header, parent])`                 | U256 word  |
//!
//! A missing program, an executor error or a malformed result denies.

use crate::error::{ConsensusError, ConsensusResult};
use crate::model::{denied, ConsensusModel, InterpreterConfig, ModelConfig, ModelKind, Role};
use crate::registry;
use bytes::Bytes;
use canon_primitives::{Address, Gas, H256, U256};
use canon_storage::{Account, StateReader, StateWriter};
use canon_types::{encode, Block, BlockHeader, SignedTransaction};
use canon_vm::{BlockEnv, CallContext, CodeExecutor};
use rlp::RlpStream;
use std::collections::HashMap;
use std::sync::Arc;

/// Delegates consensus decisions to programs run by a [`CodeExecutor`]
pub struct InterpreterModel {
    programs: InterpreterConfig,
    executor: Arc<dyn CodeExecutor>,
    call_gas: Gas,
    max_gas_per_tx: Gas,
}

impl std::fmt::Debug for InterpreterModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterpreterModel")
            .field("programs", &self.programs)
            .field("call_gas", &self.call_gas)
            .finish()
    }
}

impl InterpreterModel {
    /// Create from configuration
    pub fn new(config: &ModelConfig, executor: Arc<dyn CodeExecutor>) -> Self {
        Self {
            programs: config.interpreter.clone(),
            executor,
            call_gas: config.call_gas,
            max_gas_per_tx: config.max_gas_per_tx,
        }
    }

    /// Run `program` read-only against `state` and return its 32-byte word
    fn query(
        &self,
        program: &Address,
        input: Vec<u8>,
        env: BlockEnv,
        state: &dyn StateReader,
    ) -> ConsensusResult<H256> {
        let failure = |reason: String| ConsensusError::Program {
            address: *program,
            reason,
        };

        let code = state
            .code_at(program)
            .ok_or_else(|| failure("no code".into()))?;
        let ctx = CallContext::query(*program, Bytes::from(input), self.call_gas, env);
        let mut scratch = ScratchState::new(state);
        let outcome = self.executor.call(&ctx, &code, &mut scratch);

        if let Some(err) = outcome.error {
            return Err(failure(err.to_string()));
        }
        H256::from_slice(&outcome.output)
            .map_err(|_| failure(format!("expected 32-byte word, got {} bytes", outcome.output.len())))
    }

    fn query_bool(
        &self,
        program: &Address,
        input: Vec<u8>,
        env: BlockEnv,
        state: &dyn StateReader,
    ) -> ConsensusResult<bool> {
        self.query(program, input, env, state).map(|word| !word.is_zero())
    }
}

fn header_pair(header: &BlockHeader, parent: &BlockHeader) -> Vec<u8> {
    let mut s = RlpStream::new_list(2);
    s.append(header);
    s.append(parent);
    s.out().to_vec()
}

fn address_word(address: &Address) -> [u8; 32] {
    *H256::from(*address).as_bytes()
}

impl ConsensusModel for InterpreterModel {
    fn kind(&self) -> ModelKind {
        ModelKind::Interpreter
    }

    fn validate_perm(
        &self,
        address: &Address,
        role: Role,
        state: &dyn StateReader,
    ) -> ConsensusResult<()> {
        let mut input = address_word(address).to_vec();
        input.extend_from_slice(H256::from_low_u64_be(role.as_byte() as u64).as_bytes());

        match self.query_bool(&self.programs.permission, input, BlockEnv::default(), state) {
            Ok(true) => Ok(()),
            Ok(false) => Err(denied(address, role)),
            Err(err) => {
                tracing::debug!(%address, %role, error = %err, "permission program failed");
                Err(denied(address, role))
            }
        }
    }

    fn validate_block(
        &self,
        block: &Block,
        parent: &BlockHeader,
        state: &dyn StateReader,
    ) -> ConsensusResult<()> {
        self.validate_perm(&block.header.coinbase, Role::Mine, state)?;

        let env = BlockEnv::from(&block.header);
        let input = header_pair(&block.header, parent);
        if self.query_bool(&self.programs.block, input, env, state)? {
            Ok(())
        } else {
            Err(ConsensusError::BlockRejected(format!(
                "block program refused {}",
                block.hash()
            )))
        }
    }

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
        self.validate_perm(sender, role, state)?;

        let mut input = address_word(sender).to_vec();
        input.extend_from_slice(&encode(tx));
        match self.query_bool(&self.programs.transaction, input, BlockEnv::default(), state) {
            Ok(true) => Ok(()),
            Ok(false) => Err(denied(sender, role)),
            Err(err) => {
                tracing::debug!(%sender, tx = %tx.hash(), error = %err, "transaction program failed");
                Err(denied(sender, role))
            }
        }
    }

    fn difficulty(
        &self,
        header: &BlockHeader,
        parent: &BlockHeader,
        state: &dyn StateReader,
    ) -> ConsensusResult<U256> {
        let env = BlockEnv::from(header);
        let word = self.query(&self.programs.difficulty, header_pair(header, parent), env, state)?;
        Ok(word.to_u256())
    }

    fn max_gas_per_tx(&self, _state: &dyn StateReader) -> Gas {
        self.max_gas_per_tx
    }

    /// Grants are written into the permission program's storage using the
    /// registry slot layout, where the program is expected to look them up
    fn set_permission(
        &self,
        address: &Address,
        role: Role,
        granted: bool,
        state: &mut dyn StateWriter,
    ) -> ConsensusResult<()> {
        registry::write_permission(state, &self.programs.permission, address, role, granted);
        Ok(())
    }

    fn set_value(&self, key: &str, value: U256, state: &mut dyn StateWriter) -> ConsensusResult<()> {
        registry::write_value(state, &self.programs.permission, key, value)
    }
}

/// Write overlay over a read-only snapshot. Programs run static, so
/// anything they manage to write is discarded with the overlay.
struct ScratchState<'a> {
    base: &'a dyn StateReader,
    accounts: HashMap<Address, Option<Account>>,
    storage: HashMap<(Address, H256), H256>,
    code: HashMap<H256, Bytes>,
}

impl<'a> ScratchState<'a> {
    fn new(base: &'a dyn StateReader) -> Self {
        Self {
            base,
            accounts: HashMap::new(),
            storage: HashMap::new(),
            code: HashMap::new(),
        }
    }
}

impl StateReader for ScratchState<'_> {
    fn get_account(&self, address: &Address) -> Option<Account> {
        match self.accounts.get(address) {
            Some(overlay) => overlay.clone(),
            None => self.base.get_account(address),
        }
    }

    fn get_storage(&self, address: &Address, key: &H256) -> H256 {
        if matches!(self.accounts.get(address), Some(None)) {
            return H256::ZERO;
        }
        self.storage
            .get(&(*address, *key))
            .copied()
            .unwrap_or_else(|| self.base.get_storage(address, key))
    }

    fn get_code(&self, code_hash: &H256) -> Option<Bytes> {
        self.code
            .get(code_hash)
            .cloned()
            .or_else(|| self.base.get_code(code_hash))
    }
}

impl StateWriter for ScratchState<'_> {
    fn set_account(&mut self, address: Address, account: Account) {
        self.accounts.insert(address, Some(account));
    }

    fn delete_account(&mut self, address: &Address) {
        self.accounts.insert(*address, None);
        self.storage.retain(|(owner, _), _| owner != address);
    }

    fn set_storage(&mut self, address: Address, key: H256, value: H256) {
        self.storage.insert((address, key), value);
    }

    fn set_code(&mut self, address: Address, code: Bytes) {
        let hash = canon_crypto::keccak256(&code);
        self.code.insert(hash, code);
        let mut account = self.get_account(&address).unwrap_or_default();
        account.code_hash = hash;
        self.set_account(address, account);
    }
}
