//! Configuration types for canon-node

use crate::node::{NodeError, NodeResult};
use bytes::Bytes;
use canon_consensus::{ModelConfig, Role};
use canon_core::GenesisBuilder;
use canon_primitives::{Address, U256};
use canon_sync::SyncConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Storage backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Lost on exit
    Memory,
    /// RocksDB under the data directory
    #[default]
    Rocksdb,
}

/// Node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Data directory
    pub datadir: PathBuf,
    /// Storage backend
    pub store: StoreKind,
    /// Beneficiary of produced blocks
    pub coinbase: Option<Address>,
    /// Produce blocks
    pub mine: bool,
    /// Seconds between production attempts
    pub block_time: u64,
    /// Consensus model
    pub model: ModelConfig,
    /// Block pool tuning
    pub sync: SyncConfig,
    /// Genesis block
    pub genesis: GenesisConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            datadir: PathBuf::from("./data"),
            store: StoreKind::default(),
            coinbase: None,
            mine: false,
            block_time: 5,
            model: ModelConfig::default(),
            sync: SyncConfig::default(),
            genesis: GenesisConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Load from a JSON file; missing fields take their defaults
    pub fn load(path: &Path) -> NodeResult<Self> {
        tracing::info!(?path, "loading config");
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Interval between production attempts
    pub fn block_interval(&self) -> Duration {
        Duration::from_secs(self.block_time.max(1))
    }
}

/// Genesis configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisConfig {
    /// Initial balances and code
    #[serde(default)]
    pub alloc: BTreeMap<Address, GenesisAccount>,
    /// Roles granted through the consensus model
    #[serde(default)]
    pub permissions: Vec<GenesisPermission>,
    /// Model tunables (decimal or 0x-hex)
    #[serde(default)]
    pub values: BTreeMap<String, String>,
    /// Genesis timestamp
    #[serde(default)]
    pub timestamp: u64,
    /// Genesis extra data (hex)
    #[serde(default)]
    pub extra_data: String,
    /// Initial difficulty
    #[serde(default = "default_difficulty")]
    pub difficulty: u64,
    /// Block gas limit
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
}

fn default_difficulty() -> u64 {
    1024
}

fn default_gas_limit() -> u64 {
    8_000_000
}

impl Default for GenesisConfig {
    fn default() -> Self {
        Self {
            alloc: BTreeMap::new(),
            permissions: Vec::new(),
            values: BTreeMap::new(),
            timestamp: 0,
            extra_data: String::new(),
            difficulty: default_difficulty(),
            gas_limit: default_gas_limit(),
        }
    }
}

/// Genesis account allocation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAccount {
    /// Balance (decimal or 0x-hex)
    #[serde(default)]
    pub balance: String,
    /// Contract code (hex)
    #[serde(default)]
    pub code: Option<String>,
}

/// Roles granted to one address at genesis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisPermission {
    /// Grantee
    pub address: Address,
    /// Granted roles
    pub roles: Vec<Role>,
}

impl GenesisConfig {
    /// Load from a JSON file
    pub fn load(path: &Path) -> NodeResult<Self> {
        tracing::info!(?path, "loading genesis");
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Translate into a [`GenesisBuilder`]
    pub fn builder(&self) -> NodeResult<GenesisBuilder> {
        let mut builder = GenesisBuilder::new()
            .difficulty(U256::from(self.difficulty))
            .gas_limit(self.gas_limit)
            .timestamp(self.timestamp)
            .extra_data(parse_hex(&self.extra_data)?);

        for (address, account) in &self.alloc {
            builder = builder.alloc(*address, parse_u256(&account.balance)?);
            if let Some(code) = &account.code {
                builder = builder.code(*address, parse_hex(code)?);
            }
        }
        for permission in &self.permissions {
            for role in &permission.roles {
                builder = builder.grant(permission.address, *role);
            }
        }
        for (key, value) in &self.values {
            builder = builder.value(key.clone(), parse_u256(value)?);
        }
        Ok(builder)
    }
}

/// Parse a decimal or 0x-prefixed hex number; empty means zero
pub fn parse_u256(s: &str) -> NodeResult<U256> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(U256::zero());
    }
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => U256::from_str_radix(hex, 16).ok(),
        None => U256::from_dec_str(s).ok(),
    };
    parsed.ok_or_else(|| NodeError::Config(format!("invalid number: {s}")))
}

fn parse_hex(s: &str) -> NodeResult<Bytes> {
    let s = s.trim();
    let s = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(s)
        .map(Bytes::from)
        .map_err(|err| NodeError::Config(format!("invalid hex: {err}")))
}

/// Parse a hex address
pub fn parse_address(s: &str) -> Result<Address, String> {
    Address::from_hex(s.trim()).map_err(|err| err.to_string())
}
