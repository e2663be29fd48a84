//! Block pool: announced hashes, fetch scheduling and chain assembly

use crate::config::SyncConfig;
use crate::peer::{PeerId, PeerNetwork};
use crate::sink::ChainSink;
use canon_core::ChainError;
use canon_primitives::{H256, U256};
use canon_types::{Block, BlockInfo};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Fetch progress of a pooled hash
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// Announced, never requested
    Unrequested,
    /// Request outstanding
    Requested,
    /// Last request went unanswered
    TimedOut,
    /// Out of attempts; removed at the end of the pass
    Abandoned,
    /// Block received
    Fulfilled,
}

/// One announced block
#[derive(Debug, Clone)]
pub struct PoolEntry {
    /// Block hash
    pub hash: H256,
    /// Peer that announced it
    pub source: PeerId,
    /// Peer currently asked for it, or that delivered it
    pub owner: Option<PeerId>,
    /// Block payload once received
    pub block: Option<Block>,
    /// Fetch progress
    pub state: RequestState,
    /// When the last request went out
    pub last_request: Option<Instant>,
    /// Requests sent so far
    pub attempts: u32,
}

impl PoolEntry {
    fn new(hash: H256, source: PeerId) -> Self {
        Self {
            hash,
            source,
            owner: None,
            block: None,
            state: RequestState::Unrequested,
            last_request: None,
            attempts: 0,
        }
    }

    fn fulfill(&mut self, block: Block, peer: PeerId) {
        self.block = Some(block);
        self.owner = Some(peer);
        self.state = RequestState::Fulfilled;
    }
}

/// Pool counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Pooled hashes
    pub entries: usize,
    /// Requests outstanding
    pub requested: usize,
    /// Blocks held
    pub fulfilled: usize,
    /// Blocks handed to [`BlockPool::add`]
    pub blocks_received: u64,
    /// Hash requests sent
    pub requests_sent: u64,
    /// Hashes given up on
    pub abandoned: u64,
    /// Times the pool was wiped
    pub resets: u64,
    /// Blocks committed to the chain
    pub imported: u64,
}

/// Result of one [`BlockPool::sync_once`] pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Nothing to submit
    Idle,
    /// A run was committed; carries the new head
    Imported(BlockInfo),
    /// Every run was valid but lighter than the canonical chain
    TooLight,
    /// A run's parent went missing and has been queued
    AwaitingParent(H256),
    /// A run was rejected and the pool wiped
    Reset {
        /// Peer blamed for the bad block
        peer: Option<PeerId>,
        /// Rejection reason
        reason: String,
    },
    /// Local failure; blocks kept for the next pass
    Failed(String),
}

#[derive(Default)]
struct PoolInner {
    order: Vec<H256>,
    entries: HashMap<H256, PoolEntry>,
    // tip hash -> canonical TD it lost against
    too_light: HashMap<H256, U256>,
    blocks_received: u64,
    requests_sent: u64,
    abandoned: u64,
    resets: u64,
    imported: u64,
}

impl PoolInner {
    fn insert(&mut self, hash: H256, source: PeerId) -> bool {
        if self.entries.contains_key(&hash) {
            return false;
        }
        self.order.push(hash);
        self.entries.insert(hash, PoolEntry::new(hash, source));
        true
    }

    /// Drop abandoned hashes and every pooled block descending from them.
    /// Returns how many entries went.
    fn prune_abandoned(&mut self) -> usize {
        let mut dropped: Vec<H256> = self
            .entries
            .values()
            .filter(|entry| entry.state == RequestState::Abandoned)
            .map(|entry| entry.hash)
            .collect();
        if dropped.is_empty() {
            return 0;
        }

        let mut children: HashMap<H256, Vec<H256>> = HashMap::new();
        for entry in self.entries.values() {
            if let Some(block) = &entry.block {
                children.entry(block.parent_hash()).or_default().push(entry.hash);
            }
        }
        let mut cursor = 0;
        while cursor < dropped.len() {
            if let Some(kids) = children.remove(&dropped[cursor]) {
                dropped.extend(kids);
            }
            cursor += 1;
        }

        for hash in &dropped {
            if let Some(entry) = self.entries.remove(hash) {
                tracing::debug!(%hash, source = %entry.source, state = ?entry.state, "hash abandoned");
            }
            self.too_light.remove(hash);
        }
        let entries = &self.entries;
        self.order.retain(|h| entries.contains_key(h));
        dropped.len()
    }

    fn remove(&mut self, hash: &H256) {
        if self.entries.remove(hash).is_some() {
            self.order.retain(|h| h != hash);
        }
        self.too_light.remove(hash);
    }
}

/// Collects announced blocks, fetches them from peers and feeds contiguous
/// runs to the chain.
///
/// A single mutex covers the hash list and the entry map. It is only held
/// for in-memory bookkeeping: chain lookups, chain imports and network
/// calls all happen with the lock released.
pub struct BlockPool {
    config: SyncConfig,
    chain: Arc<dyn ChainSink>,
    network: Arc<dyn PeerNetwork>,
    inner: Mutex<PoolInner>,
}

impl BlockPool {
    /// Create an empty pool
    pub fn new(config: SyncConfig, chain: Arc<dyn ChainSink>, network: Arc<dyn PeerNetwork>) -> Self {
        Self {
            config,
            chain,
            network,
            inner: Mutex::new(PoolInner::default()),
        }
    }

    /// Pool configuration
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Register an announced hash. Returns false if it is already pooled or
    /// stored.
    pub fn add_hash(&self, hash: H256, source: PeerId) -> bool {
        if self.stored(&hash) {
            return false;
        }
        let added = self.inner.lock().insert(hash, source);
        if added {
            tracing::debug!(%hash, peer = %source, "hash announced");
        }
        added
    }

    /// Record a delivered block, queueing its parent if nothing knows it
    pub fn add(&self, block: Block, peer: PeerId) {
        let hash = block.hash();
        let parent = block.parent_hash();
        let stored = self.stored(&hash);
        let parent_known = stored || self.stored(&parent);

        let mut inner = self.inner.lock();
        inner.blocks_received += 1;
        if stored {
            return;
        }
        inner.insert(hash, peer);
        if let Some(entry) = inner.entries.get_mut(&hash) {
            if entry.block.is_none() {
                entry.fulfill(block, peer);
            }
        }
        if !parent_known && inner.insert(parent, peer) {
            tracing::debug!(%parent, child = %hash, "queued unknown parent");
        }
    }

    /// Hand out requests for unfetched hashes, at most `window_per_peer`
    /// outstanding per active peer. Returns the number of hashes requested.
    pub fn distribute_hashes(&self, now: Instant) -> usize {
        let active: Vec<PeerId> = self
            .network
            .peers()
            .into_iter()
            .filter(|p| p.active)
            .map(|p| p.id)
            .collect();
        let timeout = self.config.request_timeout();
        let per_peer = self.config.window_per_peer;
        let window = per_peer * active.len();

        let mut batches: HashMap<PeerId, Vec<H256>> = HashMap::new();
        {
            let mut inner = self.inner.lock();
            let inner = &mut *inner;

            let mut load: HashMap<PeerId, usize> = HashMap::new();
            for entry in inner.entries.values_mut() {
                if entry.state != RequestState::Requested {
                    continue;
                }
                let expired = entry
                    .last_request
                    .map_or(true, |at| now.saturating_duration_since(at) >= timeout);
                if expired {
                    entry.state = RequestState::TimedOut;
                    tracing::debug!(hash = %entry.hash, attempts = entry.attempts, "request timed out");
                } else if let Some(owner) = entry.owner {
                    *load.entry(owner).or_default() += 1;
                }
            }
            let mut outstanding: usize = load.values().sum();

            for hash in &inner.order {
                let Some(entry) = inner.entries.get_mut(hash) else {
                    continue;
                };
                if !matches!(entry.state, RequestState::Unrequested | RequestState::TimedOut) {
                    continue;
                }
                if entry.attempts >= self.config.max_attempts {
                    entry.state = RequestState::Abandoned;
                    continue;
                }
                if outstanding >= window {
                    continue;
                }
                let Some(peer) = self.pick_peer(entry, &active, &load) else {
                    continue;
                };
                entry.state = RequestState::Requested;
                entry.owner = Some(peer);
                entry.last_request = Some(now);
                entry.attempts += 1;
                *load.entry(peer).or_default() += 1;
                outstanding += 1;
                batches.entry(peer).or_default().push(*hash);
            }

            let abandoned = inner.prune_abandoned();
            inner.abandoned += abandoned as u64;
            inner.requests_sent += batches.values().map(|b| b.len() as u64).sum::<u64>();
        }

        let mut requested = 0;
        for (peer, hashes) in batches {
            requested += hashes.len();
            tracing::debug!(peer = %peer, count = hashes.len(), "requesting blocks");
            self.network.fetch_blocks(&peer, hashes);
        }
        requested
    }

    /// The announcing peer gets the first `source_retry_limit` attempts;
    /// after that the least loaded other peer with spare capacity
    fn pick_peer(
        &self,
        entry: &PoolEntry,
        active: &[PeerId],
        load: &HashMap<PeerId, usize>,
    ) -> Option<PeerId> {
        let per_peer = self.config.window_per_peer;
        let used = |peer: &PeerId| load.get(peer).copied().unwrap_or(0);

        if entry.attempts < self.config.source_retry_limit && active.contains(&entry.source) {
            return (used(&entry.source) < per_peer).then_some(entry.source);
        }
        active
            .iter()
            .filter(|peer| used(*peer) < per_peer)
            .min_by_key(|peer| (**peer == entry.source, used(*peer)))
            .copied()
    }

    /// Walk pooled blocks in number order, passing each one whose parent is
    /// canonical to `visitor` and dropping it from the pool. Stops at the
    /// first block whose parent is not canonical.
    pub fn process_canonical<F>(&self, mut visitor: F) -> usize
    where
        F: FnMut(&Block),
    {
        let mut visited = 0;
        for block in self.sorted_blocks() {
            if !self.canonical(&block.parent_hash()) {
                break;
            }
            visitor(&block);
            self.inner.lock().remove(&block.hash());
            visited += 1;
        }
        visited
    }

    /// Every hash-linked run of pooled blocks rooted on a stored block,
    /// heaviest first.
    ///
    /// Where pooled blocks fork, a run follows the heaviest branch.
    pub fn assemble_chains(&self) -> Vec<Vec<Block>> {
        let mut blocks = self.sorted_blocks();
        if blocks.is_empty() {
            return Vec::new();
        }

        // Blocks the chain already holds are done
        let stale: Vec<H256> = blocks
            .iter()
            .map(Block::hash)
            .filter(|hash| self.stored(hash))
            .collect();
        if !stale.is_empty() {
            let mut inner = self.inner.lock();
            for hash in &stale {
                inner.remove(hash);
            }
            drop(inner);
            blocks.retain(|b| !stale.contains(&b.hash()));
        }

        let index: HashMap<H256, &Block> = blocks.iter().map(|b| (b.hash(), b)).collect();
        let mut children: HashMap<H256, Vec<&Block>> = HashMap::new();
        for block in &blocks {
            children.entry(block.parent_hash()).or_default().push(block);
        }

        // Heaviest continuation from each block, highest numbers first
        let mut best: HashMap<H256, (U256, Option<H256>)> = HashMap::new();
        for block in blocks.iter().rev() {
            let mut tail = U256::zero();
            let mut next = None;
            for child in children.get(&block.hash()).into_iter().flatten() {
                if child.number() != block.number() + 1 {
                    continue;
                }
                let hash = child.hash();
                if let Some((weight, _)) = best.get(&hash) {
                    if next.is_none() || *weight > tail {
                        tail = *weight;
                        next = Some(hash);
                    }
                }
            }
            best.insert(block.hash(), (block.difficulty_weight().saturating_add(tail), next));
        }

        let mut runs: Vec<(U256, Vec<Block>)> = Vec::new();
        for root in &blocks {
            let parent = root.parent_hash();
            if index.contains_key(&parent) || !self.stored(&parent) {
                continue;
            }
            let mut run = Vec::new();
            let mut cursor = Some(root.hash());
            while let Some(hash) = cursor {
                let Some(block) = index.get(&hash) else {
                    break;
                };
                run.push((*block).clone());
                cursor = best.get(&hash).and_then(|(_, next)| *next);
            }
            let weight = best.get(&root.hash()).map(|(w, _)| *w).unwrap_or_default();
            runs.push((weight, run));
        }
        runs.sort_by(|a, b| b.0.cmp(&a.0));
        runs.into_iter().map(|(_, run)| run).collect()
    }

    /// Heaviest run, or empty
    pub fn assemble_chain(&self) -> Vec<Block> {
        self.assemble_chains().into_iter().next().unwrap_or_default()
    }

    /// Submit assembled runs to the chain, heaviest first, until one is
    /// committed or one poisons the pool
    pub fn sync_once(&self) -> SyncOutcome {
        let runs = self.assemble_chains();
        if runs.is_empty() {
            return SyncOutcome::Idle;
        }

        let canonical_td = self.chain.total_difficulty();
        let mut outcome = SyncOutcome::TooLight;
        for run in runs {
            let Some(tip) = run.last().map(Block::hash) else {
                continue;
            };
            if self.inner.lock().too_light.get(&tip) == Some(&canonical_td) {
                continue;
            }

            match self.chain.process_chain(&run) {
                Ok(info) => {
                    let mut inner = self.inner.lock();
                    for block in &run {
                        inner.remove(&block.hash());
                    }
                    inner.imported += run.len() as u64;
                    drop(inner);
                    tracing::info!(
                        number = info.number,
                        hash = %info.hash,
                        blocks = run.len(),
                        "imported chain from pool"
                    );
                    return SyncOutcome::Imported(info);
                }
                Err(ChainError::TotalDifficultyTooLow { td, canonical }) => {
                    tracing::debug!(tip = %tip, %td, %canonical, "pooled chain too light");
                    self.inner.lock().too_light.insert(tip, canonical);
                }
                Err(ChainError::ParentUnknown { parent, hash }) => {
                    let source = self.source_of(&hash);
                    if let Some(source) = source {
                        self.add_hash(parent, source);
                    }
                    outcome = SyncOutcome::AwaitingParent(parent);
                }
                Err(err) if err.is_fatal_for_pool() => {
                    let peer = self.culprit(&err, &run);
                    let reason = err.to_string();
                    tracing::warn!(peer = ?peer, error = %err, "pooled chain rejected, resetting pool");
                    if let Some(peer) = &peer {
                        self.network.penalize(peer, &reason);
                    }
                    self.reset();
                    return SyncOutcome::Reset { peer, reason };
                }
                Err(err) => {
                    tracing::warn!(tip = %tip, error = %err, "chain import failed");
                    outcome = SyncOutcome::Failed(err.to_string());
                }
            }
        }
        outcome
    }

    /// Drop everything
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        let dropped = inner.entries.len();
        inner.order.clear();
        inner.entries.clear();
        inner.too_light.clear();
        inner.resets += 1;
        tracing::warn!(dropped, "block pool reset");
    }

    /// Number of pooled hashes
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Check if the pool is empty
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Whether `hash` is pooled
    pub fn contains(&self, hash: &H256) -> bool {
        self.inner.lock().entries.contains_key(hash)
    }

    /// Snapshot of one entry
    pub fn entry(&self, hash: &H256) -> Option<PoolEntry> {
        self.inner.lock().entries.get(hash).cloned()
    }

    /// Counters
    pub fn stats(&self) -> PoolStats {
        let inner = self.inner.lock();
        let mut stats = PoolStats {
            entries: inner.entries.len(),
            blocks_received: inner.blocks_received,
            requests_sent: inner.requests_sent,
            abandoned: inner.abandoned,
            resets: inner.resets,
            imported: inner.imported,
            ..Default::default()
        };
        for entry in inner.entries.values() {
            match entry.state {
                RequestState::Requested => stats.requested += 1,
                RequestState::Fulfilled => stats.fulfilled += 1,
                _ => {}
            }
        }
        stats
    }

    fn sorted_blocks(&self) -> Vec<Block> {
        let inner = self.inner.lock();
        let mut blocks: Vec<Block> = inner
            .entries
            .values()
            .filter_map(|e| e.block.clone())
            .collect();
        drop(inner);
        blocks.sort_by_key(|b| (b.number(), b.hash()));
        blocks
    }

    fn source_of(&self, hash: &H256) -> Option<PeerId> {
        self.inner
            .lock()
            .entries
            .get(hash)
            .map(|e| e.owner.unwrap_or(e.source))
    }

    /// Peer that delivered the block an error points at
    fn culprit(&self, err: &ChainError, run: &[Block]) -> Option<PeerId> {
        let hash = match err {
            ChainError::ValidationFailed { hash, .. }
            | ChainError::PermissionDenied { hash, .. }
            | ChainError::LocalBlockRejected { hash, .. } => Some(*hash),
            ChainError::ChainBroken { number, .. } => {
                run.iter().find(|b| b.number() == *number).map(Block::hash)
            }
            _ => None,
        }
        .or_else(|| run.first().map(Block::hash))?;
        self.source_of(&hash)
    }

    fn stored(&self, hash: &H256) -> bool {
        self.chain.has_block(hash).unwrap_or_else(|err| {
            tracing::warn!(%hash, error = %err, "chain lookup failed");
            false
        })
    }

    fn canonical(&self, hash: &H256) -> bool {
        self.chain.is_canonical(hash).unwrap_or_else(|err| {
            tracing::warn!(%hash, error = %err, "chain lookup failed");
            false
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::PeerStatus;
    use canon_core::ChainResult;
    use canon_types::{BlockBody, BlockHeader};
    use std::collections::HashSet;
    use std::time::Duration;

    /// Chain stub: a fixed set of known hashes, never accepts anything
    #[derive(Default)]
    struct KnownBlocks(parking_lot::RwLock<HashSet<H256>>);

    impl ChainSink for KnownBlocks {
        fn has_block(&self, hash: &H256) -> ChainResult<bool> {
            Ok(self.0.read().contains(hash))
        }

        fn is_canonical(&self, hash: &H256) -> ChainResult<bool> {
            Ok(self.0.read().contains(hash))
        }

        fn total_difficulty(&self) -> U256 {
            U256::zero()
        }

        fn process_chain(&self, _: &[Block]) -> ChainResult<BlockInfo> {
            Err(ChainError::TotalDifficultyTooLow {
                td: U256::zero(),
                canonical: U256::zero(),
            })
        }
    }

    #[derive(Default)]
    struct RecordingNetwork {
        peers: parking_lot::RwLock<Vec<PeerStatus>>,
        requests: parking_lot::Mutex<Vec<(PeerId, Vec<H256>)>>,
    }

    impl RecordingNetwork {
        fn with_peers(ids: &[PeerId]) -> Self {
            let net = Self::default();
            *net.peers.write() = ids.iter().copied().map(PeerStatus::active).collect();
            net
        }

        fn take(&self) -> Vec<(PeerId, Vec<H256>)> {
            std::mem::take(&mut *self.requests.lock())
        }
    }

    impl PeerNetwork for RecordingNetwork {
        fn peers(&self) -> Vec<PeerStatus> {
            self.peers.read().clone()
        }

        fn fetch_blocks(&self, peer: &PeerId, hashes: Vec<H256>) {
            self.requests.lock().push((*peer, hashes));
        }

        fn penalize(&self, _: &PeerId, _: &str) {}
    }

    fn peer(n: u8) -> PeerId {
        PeerId::from_bytes([n; 32])
    }

    fn hash(n: u64) -> H256 {
        H256::from_low_u64_be(n)
    }

    fn block(parent: H256, number: u64, difficulty: u64) -> Block {
        Block::new(
            BlockHeader {
                parent_hash: parent,
                number,
                difficulty: U256::from(difficulty),
                ..Default::default()
            },
            BlockBody::default(),
        )
    }

    fn pool_with(config: SyncConfig, peers: &[PeerId]) -> (BlockPool, Arc<KnownBlocks>, Arc<RecordingNetwork>) {
        let chain = Arc::new(KnownBlocks::default());
        let net = Arc::new(RecordingNetwork::with_peers(peers));
        let pool = BlockPool::new(config, chain.clone(), net.clone());
        (pool, chain, net)
    }

    #[test]
    fn test_add_hash_idempotent() {
        let (pool, chain, _) = pool_with(SyncConfig::default(), &[peer(1)]);
        assert!(pool.add_hash(hash(1), peer(1)));
        assert!(!pool.add_hash(hash(1), peer(2)));
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.entry(&hash(1)).unwrap().source, peer(1));

        chain.0.write().insert(hash(2));
        assert!(!pool.add_hash(hash(2), peer(1)));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_add_queues_unknown_parent() {
        let (pool, chain, _) = pool_with(SyncConfig::default(), &[peer(1)]);
        let orphan = block(hash(99), 5, 1);
        pool.add(orphan.clone(), peer(3));

        assert_eq!(pool.len(), 2);
        let parent = pool.entry(&hash(99)).unwrap();
        assert_eq!(parent.source, peer(3));
        assert_eq!(parent.state, RequestState::Unrequested);
        let entry = pool.entry(&orphan.hash()).unwrap();
        assert_eq!(entry.state, RequestState::Fulfilled);
        assert_eq!(pool.stats().blocks_received, 1);

        // A known parent is not queued
        chain.0.write().insert(hash(7));
        pool.add(block(hash(7), 1, 1), peer(3));
        assert!(!pool.contains(&hash(7)));
    }

    #[test]
    fn test_window_limits_requests() {
        let config = SyncConfig::default().with_window_per_peer(2);
        let (pool, _, net) = pool_with(config, &[peer(1), peer(2)]);
        for n in 0..3 {
            pool.add_hash(hash(n), peer(1));
        }
        for n in 3..6 {
            pool.add_hash(hash(n), peer(2));
        }

        let now = Instant::now();
        assert_eq!(pool.distribute_hashes(now), 4);
        let mut requests = net.take();
        requests.sort();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].1, vec![hash(0), hash(1)]);
        assert_eq!(requests[1].1, vec![hash(3), hash(4)]);

        // Nothing timed out yet, the window is full
        assert_eq!(pool.distribute_hashes(now), 0);
        assert_eq!(pool.stats().requested, 4);
    }

    #[test]
    fn test_no_active_peers() {
        let (pool, _, net) = pool_with(SyncConfig::default(), &[]);
        pool.add_hash(hash(1), peer(1));
        assert_eq!(pool.distribute_hashes(Instant::now()), 0);
        assert!(net.take().is_empty());
        assert_eq!(pool.entry(&hash(1)).unwrap().state, RequestState::Unrequested);
    }

    #[test]
    fn test_retry_source_then_others_then_abandon() {
        let config = SyncConfig::default()
            .with_request_timeout(Duration::from_secs(1))
            .with_source_retry_limit(2)
            .with_max_attempts(4);
        let (pool, _, net) = pool_with(config, &[peer(1), peer(2)]);
        pool.add_hash(hash(1), peer(1));

        let start = Instant::now();
        let mut asked = Vec::new();
        for tick in 0..5u64 {
            pool.distribute_hashes(start + Duration::from_secs(tick * 2));
            for (peer, hashes) in net.take() {
                assert_eq!(hashes, vec![hash(1)]);
                asked.push(peer);
            }
        }
        assert_eq!(asked, vec![peer(1), peer(1), peer(2), peer(2)]);
        assert!(!pool.contains(&hash(1)));
        assert_eq!(pool.stats().abandoned, 1);
        assert_eq!(pool.stats().requests_sent, 4);
    }

    #[test]
    fn test_abandoned_parent_takes_descendants() {
        let config = SyncConfig::default()
            .with_request_timeout(Duration::from_secs(1))
            .with_window_per_peer(500)
            .with_max_attempts(2);
        let (pool, _, net) = pool_with(config, &[peer(1)]);
        let mut orphans = Vec::new();
        for n in 0..100 {
            let orphan = block(hash(1_000 + n), 10, 1);
            pool.add(orphan.clone(), peer(1));
            orphans.push(orphan);
        }
        // Second generation, waiting on a pooled orphan
        let grandchild = block(orphans[0].hash(), 11, 1);
        pool.add(grandchild.clone(), peer(1));
        assert_eq!(pool.len(), 201);

        let start = Instant::now();
        for tick in 0..10u64 {
            pool.distribute_hashes(start + Duration::from_secs(tick * 2));
            net.take();
        }
        assert!(pool.is_empty());
        assert!(!pool.contains(&grandchild.hash()));
        assert_eq!(pool.stats().abandoned, 201);
        assert!(pool.assemble_chains().is_empty());
    }

    #[test]
    fn test_inactive_source_falls_back() {
        let (pool, _, net) = pool_with(SyncConfig::default(), &[peer(2)]);
        pool.add_hash(hash(1), peer(1));
        pool.distribute_hashes(Instant::now());
        assert_eq!(net.take(), vec![(peer(2), vec![hash(1)])]);
    }

    #[test]
    fn test_fulfilled_entries_not_requested() {
        let (pool, chain, net) = pool_with(SyncConfig::default(), &[peer(1)]);
        chain.0.write().insert(hash(0));
        let b = block(hash(0), 1, 1);
        pool.add_hash(b.hash(), peer(1));
        pool.add(b, peer(1));
        assert_eq!(pool.distribute_hashes(Instant::now()), 0);
        assert!(net.take().is_empty());
    }

    #[test]
    fn test_assemble_prefers_heaviest_branch() {
        let (pool, chain, _) = pool_with(SyncConfig::default(), &[peer(1)]);
        chain.0.write().insert(hash(0));

        let a1 = block(hash(0), 1, 10);
        let a2 = block(a1.hash(), 2, 10);
        let b2 = block(a1.hash(), 2, 30);
        let orphan = block(hash(50), 7, 100);
        for b in [&a1, &a2, &b2, &orphan] {
            pool.add(b.clone(), peer(1));
        }

        let runs = pool.assemble_chains();
        assert_eq!(runs.len(), 1);
        let hashes: Vec<H256> = runs[0].iter().map(Block::hash).collect();
        assert_eq!(hashes, vec![a1.hash(), b2.hash()]);
        assert_eq!(pool.assemble_chain().len(), 2);
    }

    #[test]
    fn test_assemble_orders_runs_by_weight() {
        let (pool, chain, _) = pool_with(SyncConfig::default(), &[peer(1)]);
        chain.0.write().insert(hash(0));
        chain.0.write().insert(hash(1));

        let light = block(hash(0), 1, 5);
        let heavy = block(hash(1), 2, 50);
        pool.add(light.clone(), peer(1));
        pool.add(heavy.clone(), peer(1));

        let runs = pool.assemble_chains();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0][0].hash(), heavy.hash());
        assert_eq!(runs[1][0].hash(), light.hash());
    }

    #[test]
    fn test_assemble_breaks_at_gap() {
        let (pool, chain, _) = pool_with(SyncConfig::default(), &[peer(1)]);
        chain.0.write().insert(hash(0));
        let b1 = block(hash(0), 1, 1);
        let b2 = block(b1.hash(), 2, 1);
        let b4 = block(hash(33), 4, 1);
        for b in [&b1, &b2, &b4] {
            pool.add(b.clone(), peer(1));
        }
        let run = pool.assemble_chain();
        assert_eq!(run.len(), 2);
        assert!(run.windows(2).all(|w| w[1].parent_hash() == w[0].hash()));
    }

    #[test]
    fn test_process_canonical_stops_at_gap() {
        let (pool, chain, _) = pool_with(SyncConfig::default(), &[peer(1)]);
        chain.0.write().insert(hash(0));
        let b1 = block(hash(0), 1, 1);
        let b2 = block(b1.hash(), 2, 1);
        let b5 = block(hash(44), 5, 1);
        for b in [&b1, &b2, &b5] {
            pool.add(b.clone(), peer(1));
        }

        let mut seen = Vec::new();
        let visited = pool.process_canonical(|b| {
            chain.0.write().insert(b.hash());
            seen.push(b.number());
        });
        assert_eq!(visited, 2);
        assert_eq!(seen, vec![1, 2]);
        assert!(pool.contains(&b5.hash()));
        assert!(!pool.contains(&b1.hash()));
    }

    #[test]
    fn test_too_light_is_memoized() {
        let (pool, chain, _) = pool_with(SyncConfig::default(), &[peer(1)]);
        chain.0.write().insert(hash(0));
        let b1 = block(hash(0), 1, 1);
        pool.add(b1.clone(), peer(1));

        assert_eq!(pool.sync_once(), SyncOutcome::TooLight);
        assert_eq!(pool.sync_once(), SyncOutcome::TooLight);
        assert!(pool.contains(&b1.hash()));
        assert_eq!(pool.inner.lock().too_light.len(), 1);
    }

    #[test]
    fn test_reset_clears_everything() {
        let (pool, _, _) = pool_with(SyncConfig::default(), &[peer(1)]);
        pool.add_hash(hash(1), peer(1));
        pool.add(block(hash(5), 3, 1), peer(1));
        pool.reset();
        assert!(pool.is_empty());
        assert_eq!(pool.stats().resets, 1);
        assert_eq!(pool.sync_once(), SyncOutcome::Idle);
    }
}
