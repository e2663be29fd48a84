//! Execution context handed to a code executor

use crate::error::VmError;
use bytes::Bytes;
use canon_primitives::{Address, BlockNumber, Gas, U256};
use canon_types::{BlockHeader, Log};

/// Block environment visible to executing code
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockEnv {
    /// Block number
    pub number: BlockNumber,
    /// Block timestamp
    pub timestamp: u64,
    /// Block coinbase
    pub coinbase: Address,
    /// Block difficulty
    pub difficulty: U256,
    /// Block gas limit
    pub gas_limit: Gas,
}

impl From<&BlockHeader> for BlockEnv {
    fn from(header: &BlockHeader) -> Self {
        Self {
            number: header.number,
            timestamp: header.timestamp,
            coinbase: header.coinbase,
            difficulty: header.difficulty,
            gas_limit: header.gas_limit,
        }
    }
}

/// One call into code
#[derive(Clone, Debug)]
pub struct CallContext {
    /// Account whose code runs
    pub address: Address,
    /// Immediate caller
    pub caller: Address,
    /// Transaction sender
    pub origin: Address,
    /// Value transferred with the call
    pub value: U256,
    /// Call data
    pub input: Bytes,
    /// Gas budget
    pub gas: Gas,
    /// Whether state writes are forbidden
    pub is_static: bool,
    /// Enclosing block
    pub block: BlockEnv,
}

impl CallContext {
    /// Read-only query with no value attached, as issued by consensus programs
    pub fn query(address: Address, input: Bytes, gas: Gas, block: BlockEnv) -> Self {
        Self {
            address,
            caller: Address::ZERO,
            origin: Address::ZERO,
            value: U256::zero(),
            input,
            gas,
            is_static: true,
            block,
        }
    }
}

/// What an executor reports back
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallOutcome {
    /// Return data; for creations, the runtime code to deploy
    pub output: Bytes,
    /// Unused gas
    pub gas_remaining: Gas,
    /// Logs emitted
    pub logs: Vec<Log>,
    /// Failure, if any
    pub error: Option<VmError>,
}

impl CallOutcome {
    /// Successful outcome
    pub fn success(output: Bytes, gas_remaining: Gas) -> Self {
        Self {
            output,
            gas_remaining,
            logs: Vec::new(),
            error: None,
        }
    }

    /// Failed outcome
    pub fn failure(error: VmError, gas_remaining: Gas) -> Self {
        Self {
            output: Bytes::new(),
            gas_remaining,
            logs: Vec::new(),
            error: Some(error),
        }
    }

    /// Check whether execution succeeded
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
