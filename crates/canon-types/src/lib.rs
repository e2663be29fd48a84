//! # canon-types
//!
//! Chain data types and their canonical RLP encoding.
//!
//! - [`Block`] / [`BlockHeader`] / [`BlockBody`]
//! - [`Transaction`] / [`SignedTransaction`]
//! - [`Receipt`] / [`Log`] / [`Bloom`]
//! - [`BlockInfo`] - the per-block record carrying total difficulty
//!
//! A block's identity is the keccak-256 of its RLP header; the header commits
//! to the body through `transactions_root` and `uncles_hash`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod block;
pub mod codec;
pub mod info;
pub mod receipt;
pub mod transaction;

pub use block::{
    receipts_root, transactions_root, uncles_hash, Block, BlockBody, BlockHeader, Bloom,
    EMPTY_LIST_HASH,
};
pub use codec::{decode, encode, DecodeError};
pub use info::BlockInfo;
pub use receipt::{Log, Receipt};
pub use transaction::{SignedTransaction, Transaction};
