//! Node orchestration for canon-node

use crate::config::{NodeConfig, StoreKind};
use canon_consensus::build_model;
use canon_core::{ChainError, ChainManager};
use canon_primitives::Address;
use canon_storage::{DbConfig, KeyValueStore, MemoryStore, RocksStore};
use canon_sync::{BlockPool, PeerNetwork, SyncService};
use canon_types::BlockInfo;
use canon_vm::{CodeExecutor, NullExecutor};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::interval;

/// Node error types
#[derive(Debug, Error)]
pub enum NodeError {
    /// Chain error
    #[error("chain error: {0}")]
    Chain(#[from] ChainError),
    /// Storage error
    #[error("storage error: {0}")]
    Storage(#[from] canon_storage::StorageError),
    /// Invalid configuration
    #[error("invalid config: {0}")]
    Config(String),
    /// Config file could not be parsed
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for node operations
pub type NodeResult<T> = Result<T, NodeError>;

/// Canon node: chain, block pool and the optional block producer
pub struct Node {
    config: NodeConfig,
    chain: Arc<ChainManager>,
    pool: Arc<BlockPool>,
}

impl Node {
    /// Open storage, write genesis if needed and wire the block pool
    pub fn new(config: NodeConfig, network: Arc<dyn PeerNetwork>) -> NodeResult<Self> {
        let kv: Arc<dyn KeyValueStore> = match config.store {
            StoreKind::Memory => Arc::new(MemoryStore::new()),
            StoreKind::Rocksdb => {
                std::fs::create_dir_all(&config.datadir)?;
                Arc::new(RocksStore::open(config.datadir.join("db"), DbConfig::default())?)
            }
        };

        let executor: Arc<dyn CodeExecutor> = Arc::new(NullExecutor);
        let model = build_model(&config.model, executor.clone());
        let genesis = config.genesis.builder()?.build(model.as_ref())?;
        let chain = Arc::new(ChainManager::new(kv, &genesis, model, executor)?);
        let pool = Arc::new(BlockPool::new(config.sync.clone(), chain.clone(), network));

        tracing::info!(
            model = %config.model.kind,
            genesis = %chain.genesis_hash(),
            head = chain.current_block().number(),
            "node initialized"
        );
        Ok(Self {
            config,
            chain,
            pool,
        })
    }

    /// The chain
    pub fn chain(&self) -> &Arc<ChainManager> {
        &self.chain
    }

    /// Run until `shutdown` flips to true or block production halts
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> NodeResult<()> {
        tracing::info!(datadir = ?self.config.datadir, mine = self.config.mine, "starting node");
        let sync = SyncService::start(self.pool.clone());

        let result = if self.config.mine {
            self.mine_loop(&mut shutdown).await
        } else {
            while shutdown.changed().await.is_ok() {
                if *shutdown.borrow() {
                    break;
                }
            }
            Ok(())
        };

        sync.stop().await;
        tracing::info!("node stopped");
        result
    }

    async fn mine_loop(&self, shutdown: &mut watch::Receiver<bool>) -> NodeResult<()> {
        let coinbase = self
            .config
            .coinbase
            .ok_or_else(|| NodeError::Config("mining requires a coinbase".into()))?;
        let mut ticker = interval(self.config.block_interval());

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.produce_block(coinbase).await {
                        Ok(_) => {}
                        Err(NodeError::Chain(err @ ChainError::LocalBlockRejected { .. })) => {
                            tracing::error!(error = %err, "halting block production");
                            return Err(err.into());
                        }
                        Err(err) => tracing::warn!(error = %err, "block production failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Build, seal and commit one block on the current head.
    ///
    /// Returns `None` when the model does not let `coinbase` produce or a
    /// heavier chain arrived first.
    pub async fn produce_block(&self, coinbase: Address) -> NodeResult<Option<BlockInfo>> {
        let chain = self.chain.clone();
        tokio::task::spawn_blocking(move || produce(&chain, coinbase))
            .await
            .map_err(|err| NodeError::Internal(err.to_string()))?
    }
}

fn produce(chain: &ChainManager, coinbase: Address) -> NodeResult<Option<BlockInfo>> {
    let parent = chain.current_block();
    let state = chain.state_at(&parent.header.state_root)?;
    if !chain.model().participate(&coinbase, &parent.header, &state) {
        tracing::debug!(%coinbase, "not allowed to produce on this head");
        return Ok(None);
    }

    let template = chain.new_block(coinbase)?;
    let block = chain.finalize_block(template)?;
    match chain.insert_local_block(block) {
        Ok(info) => {
            tracing::info!(number = info.number, hash = %info.hash, "produced block");
            Ok(Some(info))
        }
        Err(ChainError::TotalDifficultyTooLow { .. }) => {
            tracing::debug!("head moved while producing");
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}
