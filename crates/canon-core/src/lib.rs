//! # canon-core
//!
//! Block processing and chain management for the Canon chain core.
//!
//! This crate ties the lower layers together:
//! - [`StateTransition`]: applies one transaction to a world state
//! - [`BlockProcessor`]: validates and executes a block against its parent
//! - [`ChainManager`]: owns the canonical chain, validates candidate chains
//!   and commits them when their total difficulty wins
//! - [`GenesisBuilder`]: builds block zero and its initial state

#![warn(missing_docs)]
#![warn(clippy::all)]

mod chain;
mod error;
mod genesis;
mod processor;
mod transition;

pub use chain::{ChainLink, ChainManager, ValidatedChain};
pub use error::{ChainError, ChainResult, GasScope, TxError};
pub use genesis::{Genesis, GenesisBuilder};
pub use processor::{
    BlockProcessor, ChainReader, ProcessOutcome, BLOCK_REWARD, MAX_UNCLES, MAX_UNCLE_DEPTH,
};
pub use transition::{contract_address, intrinsic_gas, GasPool, StateTransition, TX_GAS};
