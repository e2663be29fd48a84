//! # canon-storage
//!
//! Storage layer for the Canon chain core.
//!
//! - [`KeyValueStore`]: column-partitioned byte store, with an in-memory
//!   backend ([`MemoryStore`]) and a RocksDB backend ([`RocksStore`])
//! - [`ChainStore`]: typed access to blocks, [`BlockInfo`] records, the
//!   canonical index and the `LastBlock` / `LTD` head pointers
//! - [`WorldState`]: account snapshot with a deterministic root commitment,
//!   persisted content-addressed by that root
//!
//! [`BlockInfo`]: canon_types::BlockInfo

#![warn(missing_docs)]
#![warn(clippy::all)]

mod chain;
mod db;
mod error;
mod kv;
mod state;
mod traits;

pub use chain::{keys, ChainBatch, ChainStore};
pub use db::{DbConfig, RocksStore};
pub use error::{StorageError, StorageResult};
pub use kv::{Column, KeyValueStore, MemoryStore, WriteBatch};
pub use state::WorldState;
pub use traits::{Account, StateReader, StateWriter, EMPTY_CODE_HASH};
