//! # canon-consensus
//!
//! Permission and difficulty policy for the Canon chain core.
//!
//! This crate provides:
//! - The [`ConsensusModel`] trait consulted by block processing
//! - Five interchangeable models selected by [`ModelKind`]
//! - The registry slot layout shared by the registry and interpreter models
//! - Bootstrap entry points used when building genesis state

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod interpreter;
pub mod legacy;
mod model;
mod permissive;
pub mod registry;
mod restrictive;

pub use error::{ConsensusError, ConsensusResult};
pub use interpreter::InterpreterModel;
pub use legacy::LegacyModel;
pub use model::{build_model, ConsensusModel, InterpreterConfig, ModelConfig, ModelKind, Role};
pub use permissive::PermissiveModel;
pub use registry::RegistryModel;
pub use restrictive::RestrictiveModel;
