//! CLI argument parsing for canon-node

use crate::config::{parse_address, GenesisConfig, NodeConfig, StoreKind};
use crate::node::NodeResult;
use canon_consensus::ModelKind;
use canon_primitives::Address;
use clap::Parser;
use std::path::PathBuf;

/// Canon chain node
#[derive(Parser, Debug, Clone)]
#[command(name = "canon")]
#[command(about = "Canon chain node")]
#[command(version)]
pub struct Cli {
    /// JSON config file; flags below override it
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Data directory for blockchain storage
    #[arg(long)]
    pub datadir: Option<PathBuf>,

    /// Storage backend
    #[arg(long, value_enum)]
    pub store: Option<StoreKind>,

    /// Genesis file path (replaces the genesis section of the config)
    #[arg(long)]
    pub genesis: Option<PathBuf>,

    /// Consensus model (permissive, restrictive, registry, interpreter, legacy)
    #[arg(long)]
    pub model: Option<ModelKind>,

    /// Coinbase address for produced blocks
    #[arg(long, value_parser = parse_address)]
    pub coinbase: Option<Address>,

    /// Produce blocks
    #[arg(long)]
    pub mine: bool,

    /// Seconds between production attempts
    #[arg(long)]
    pub block_time: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    pub log_json: bool,
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Load the config file, if any, and apply the flags on top
    pub fn node_config(&self) -> NodeResult<NodeConfig> {
        let mut config = match &self.config {
            Some(path) => NodeConfig::load(path)?,
            None => NodeConfig::default(),
        };
        if let Some(path) = &self.genesis {
            config.genesis = GenesisConfig::load(path)?;
        }
        if let Some(datadir) = &self.datadir {
            config.datadir = datadir.clone();
        }
        if let Some(store) = self.store {
            config.store = store;
        }
        if let Some(kind) = self.model {
            config.model.kind = kind;
        }
        if let Some(coinbase) = self.coinbase {
            config.coinbase = Some(coinbase);
        }
        if self.mine {
            config.mine = true;
        }
        if let Some(block_time) = self.block_time {
            config.block_time = block_time;
        }
        Ok(config)
    }
}
