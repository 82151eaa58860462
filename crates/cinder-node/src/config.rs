//! Node configuration with programmatic defaults.

use std::path::PathBuf;

use cinder_core::constants::DEFAULT_MAX_BLOCK_TXS;
use cinder_core::genesis::GenesisParams;
use cinder_core::types::Address;

pub const DEFAULT_API_PORT: u16 = 9345;

/// Configuration for a full node instance.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Root directory for persistent data.
    pub data_dir: PathBuf,
    /// Bind address for the HTTP API.
    pub api_bind: String,
    /// Port for the HTTP API.
    pub api_port: u16,
    /// Genesis parameters, used only on first open.
    pub genesis: GenesisParams,
    /// Whether to run the built-in miner.
    pub mine: bool,
    /// Recipient of mining rewards.
    pub miner_address: Address,
    /// Maximum transactions per assembled block, coinbase included.
    pub max_block_txs: usize,
    /// Log filter string (e.g. "info", "cinder_node_lib=debug").
    pub log_level: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("cinder-data"),
            api_bind: "127.0.0.1".to_string(),
            api_port: DEFAULT_API_PORT,
            genesis: GenesisParams::default(),
            mine: false,
            miner_address: Address::ZERO,
            max_block_txs: DEFAULT_MAX_BLOCK_TXS,
            log_level: "info".to_string(),
        }
    }
}

impl NodeConfig {
    /// Path to the chain database directory.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("chaindata")
    }

    /// Socket address string for the API server.
    pub fn api_addr(&self) -> String {
        format!("{}:{}", self.api_bind, self.api_port)
    }
}
