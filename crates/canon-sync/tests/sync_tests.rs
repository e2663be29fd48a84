//! Block pool against a real chain

use canon_consensus::{build_model, ConsensusModel, ModelConfig, ModelKind, Role};
use canon_core::{ChainManager, Genesis, GenesisBuilder};
use canon_primitives::{Address, H256, U256};
use canon_storage::MemoryStore;
use canon_sync::{
    BlockPool, PeerId, PeerNetwork, PeerStatus, SyncConfig, SyncOutcome, SyncService,
};
use canon_types::{Block, BlockBody, BlockHeader};
use canon_vm::NullExecutor;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

fn model() -> Arc<dyn ConsensusModel> {
    build_model(&ModelConfig::new(ModelKind::Registry), Arc::new(NullExecutor))
}

fn genesis(model: &dyn ConsensusModel) -> Genesis {
    GenesisBuilder::new()
        .difficulty(U256::from(25_600u64))
        .timestamp(1_000)
        .grant(Address::from_low_u64_be(1), Role::Mine)
        .grant(Address::from_low_u64_be(2), Role::Mine)
        .build(model)
        .unwrap()
}

fn node() -> Arc<ChainManager> {
    let model = model();
    let genesis = genesis(model.as_ref());
    Arc::new(
        ChainManager::new(Arc::new(MemoryStore::new()), &genesis, model, Arc::new(NullExecutor))
            .unwrap(),
    )
}

/// Mine `count` blocks on a peer's own chain
fn mine(chain: &ChainManager, coinbase: u64, delay: u64, count: usize) -> Vec<Block> {
    let mut blocks = Vec::new();
    for _ in 0..count {
        let parent = chain.current_block();
        let state = chain.state_at(&parent.header.state_root).unwrap();
        let mut header = BlockHeader {
            parent_hash: parent.hash(),
            coinbase: Address::from_low_u64_be(coinbase),
            number: parent.number() + 1,
            gas_limit: parent.header.gas_limit,
            timestamp: parent.header.timestamp + delay,
            ..Default::default()
        };
        header.difficulty = chain
            .model()
            .difficulty(&header, &parent.header, &state)
            .unwrap();
        let block = chain.finalize_block(Block::new(header, BlockBody::default())).unwrap();
        chain.insert_local_block(block.clone()).unwrap();
        blocks.push(block);
    }
    blocks
}

#[derive(Default)]
struct RecordingNetwork {
    peers: Vec<PeerStatus>,
    requests: Mutex<Vec<(PeerId, Vec<H256>)>>,
    penalized: Mutex<Vec<(PeerId, String)>>,
}

impl RecordingNetwork {
    fn new(peers: &[PeerId]) -> Self {
        Self {
            peers: peers.iter().copied().map(PeerStatus::active).collect(),
            ..Default::default()
        }
    }
}

impl PeerNetwork for RecordingNetwork {
    fn peers(&self) -> Vec<PeerStatus> {
        self.peers.clone()
    }

    fn fetch_blocks(&self, peer: &PeerId, hashes: Vec<H256>) {
        self.requests.lock().push((*peer, hashes));
    }

    fn penalize(&self, peer: &PeerId, reason: &str) {
        self.penalized.lock().push((*peer, reason.to_string()));
    }
}

fn peer(n: u8) -> PeerId {
    PeerId::from_bytes([n; 32])
}

#[test]
fn test_competing_forks_heaviest_wins() {
    let local = node();
    let fast = mine(&node(), 1, 1, 3);
    let slow = mine(&node(), 2, 10, 3);
    let net = Arc::new(RecordingNetwork::new(&[peer(1), peer(2)]));
    let pool = BlockPool::new(SyncConfig::default(), local.clone(), net);

    for block in &slow {
        pool.add(block.clone(), peer(2));
    }
    for block in &fast {
        pool.add(block.clone(), peer(1));
    }

    match pool.sync_once() {
        SyncOutcome::Imported(info) => assert_eq!(info.hash, fast[2].hash()),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(local.current_block().hash(), fast[2].hash());
    let expected_td = fast
        .iter()
        .fold(U256::zero(), |td, b| td + b.header.difficulty);
    assert_eq!(local.total_difficulty(), expected_td);

    // The lighter fork stays pooled and is never committed
    assert_eq!(pool.sync_once(), SyncOutcome::TooLight);
    assert_eq!(pool.len(), 3);
    for block in &slow {
        assert!(pool.contains(&block.hash()));
        assert!(!local.has_block(&block.hash()).unwrap());
    }
    assert_eq!(pool.stats().imported, 3);
}

#[test]
fn test_invalid_block_resets_and_penalizes() {
    let local = node();
    let mut blocks = mine(&node(), 1, 1, 2);
    blocks[1].header.state_root = H256::from_low_u64_be(0xbad);

    let net = Arc::new(RecordingNetwork::new(&[peer(1), peer(2)]));
    let pool = BlockPool::new(SyncConfig::default(), local.clone(), net.clone());
    pool.add(blocks[0].clone(), peer(1));
    pool.add(blocks[1].clone(), peer(2));

    match pool.sync_once() {
        SyncOutcome::Reset { peer: blamed, .. } => assert_eq!(blamed, Some(peer(2))),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(pool.is_empty());
    assert_eq!(pool.stats().resets, 1);
    let penalized = net.penalized.lock();
    assert_eq!(penalized.len(), 1);
    assert_eq!(penalized[0].0, peer(2));
    assert_eq!(local.current_block().number(), 0);
}

#[test]
fn test_orphans_wait_for_parents() {
    let local = node();
    let blocks = mine(&node(), 1, 1, 3);
    let net = Arc::new(RecordingNetwork::new(&[peer(1)]));
    let pool = BlockPool::new(SyncConfig::default(), local.clone(), net);

    pool.add(blocks[2].clone(), peer(1));
    assert!(pool.contains(&blocks[1].hash()));
    assert_eq!(pool.sync_once(), SyncOutcome::Idle);

    pool.add(blocks[1].clone(), peer(1));
    pool.add(blocks[0].clone(), peer(1));
    assert!(matches!(pool.sync_once(), SyncOutcome::Imported(_)));
    assert_eq!(local.current_block().hash(), blocks[2].hash());
    assert!(pool.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_service_fetches_announced_chain() {
    let local = node();
    let remote = node();
    let blocks = mine(&remote, 1, 1, 5);
    let served: HashMap<H256, Block> = blocks.iter().map(|b| (b.hash(), b.clone())).collect();

    let config = SyncConfig::default()
        .with_intervals(Duration::from_millis(10), Duration::from_millis(20));
    let net = Arc::new(RecordingNetwork::new(&[peer(1)]));
    let pool = Arc::new(BlockPool::new(config, local.clone(), net.clone()));
    let service = SyncService::start(pool.clone());

    // Only the tip is announced; parents are discovered one by one
    pool.add_hash(blocks[4].hash(), peer(1));

    let tip = blocks[4].hash();
    for _ in 0..500 {
        let requests = std::mem::take(&mut *net.requests.lock());
        for (from, hashes) in requests {
            for hash in hashes {
                if let Some(block) = served.get(&hash) {
                    pool.add(block.clone(), from);
                }
            }
        }
        if local.current_block().hash() == tip {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    service.stop().await;

    assert_eq!(local.current_block().hash(), tip);
    assert_eq!(local.total_difficulty(), remote.total_difficulty());
    assert!(pool.stats().requests_sent >= 5);
}
