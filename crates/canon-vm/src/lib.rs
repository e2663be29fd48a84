//! # canon-vm
//!
//! The chain core never interprets bytecode itself. It hands code, input and
//! a gas budget to a [`CodeExecutor`] and gets back output, remaining gas
//! and an optional error.
//!
//! - [`CallContext`] / [`BlockEnv`]: what the executor may observe
//! - [`CallOutcome`]: what it reports back
//! - [`NullExecutor`]: default for nodes without an interpreter
//! - [`FnExecutor`]: host-implemented programs behind the same interface

#![warn(missing_docs)]
#![warn(clippy::all)]

mod context;
mod error;
mod executor;

pub use context::{BlockEnv, CallContext, CallOutcome};
pub use error::VmError;
pub use executor::{CodeExecutor, FnExecutor, NullExecutor};
