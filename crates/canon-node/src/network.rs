//! Peer layer of a node without transport

use canon_primitives::H256;
use canon_sync::{PeerId, PeerNetwork, PeerStatus};

/// A node with no peers; the block pool stays idle
#[derive(Debug, Default, Clone, Copy)]
pub struct StandaloneNetwork;

impl PeerNetwork for StandaloneNetwork {
    fn peers(&self) -> Vec<PeerStatus> {
        Vec::new()
    }

    fn fetch_blocks(&self, peer: &PeerId, hashes: Vec<H256>) {
        tracing::debug!(%peer, count = hashes.len(), "no transport, dropping block request");
    }

    fn penalize(&self, peer: &PeerId, reason: &str) {
        tracing::warn!(%peer, reason, "peer penalized");
    }
}
