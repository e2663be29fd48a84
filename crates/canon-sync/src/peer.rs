//! Peer identity and the network collaborator

use canon_primitives::H256;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Peer identifier (32 bytes)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId([u8; 32]);

impl PeerId {
    /// Create from bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Generate random peer ID
    pub fn random() -> Self {
        let mut bytes = [0u8; 32];
        rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
        Self(bytes)
    }

    /// Get as bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", hex::encode(&self.0[..8]))
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

/// Liveness snapshot of one peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerStatus {
    /// Peer ID
    pub id: PeerId,
    /// Connected and answering requests
    pub active: bool,
    /// Peer is itself still catching up
    pub syncing: bool,
}

impl PeerStatus {
    /// An active peer that is not syncing
    pub fn active(id: PeerId) -> Self {
        Self {
            id,
            active: true,
            syncing: false,
        }
    }
}

/// What the block pool needs from the peer layer.
///
/// Block bodies requested through [`PeerNetwork::fetch_blocks`] come back
/// asynchronously through [`BlockPool::add`](crate::BlockPool::add).
pub trait PeerNetwork: Send + Sync {
    /// Currently known peers
    fn peers(&self) -> Vec<PeerStatus>;

    /// Ask `peer` for the given blocks; fire-and-forget
    fn fetch_blocks(&self, peer: &PeerId, hashes: Vec<H256>);

    /// Report a peer that served invalid data
    fn penalize(&self, peer: &PeerId, reason: &str);
}
