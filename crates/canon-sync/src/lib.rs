//! # canon-sync
//!
//! Chain synchronization for the Canon chain core.
//!
//! Peers announce block hashes; the [`BlockPool`] requests the bodies,
//! queues unknown parents as they arrive, and periodically assembles
//! hash-linked runs rooted on the local chain for the [`ChainSink`] to
//! validate. [`SyncService`] drives the two periodic tasks.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod config;
mod peer;
mod pool;
mod service;
mod sink;

pub use config::SyncConfig;
pub use peer::{PeerId, PeerNetwork, PeerStatus};
pub use pool::{BlockPool, PoolEntry, PoolStats, RequestState, SyncOutcome};
pub use service::SyncService;
pub use sink::ChainSink;
