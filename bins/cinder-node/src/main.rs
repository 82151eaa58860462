//! Cinder full node binary.
//!
//! Opens chain state on RocksDB, serves the HTTP API, and optionally runs
//! the built-in miner on a blocking thread.

use std::path::PathBuf;
use std::process;
use std::sync::atomic::Ordering;

use clap::Parser;
use tracing::{error, info};

use cinder_core::types::Address;
use cinder_node_lib::{config::DEFAULT_API_PORT, Miner, Node, NodeConfig};

/// Cinder full node.
#[derive(Parser, Debug)]
#[command(name = "cinder-node", version, about = "Cinder proof-of-work full node")]
struct Args {
    /// Data directory for chain storage
    #[arg(long, default_value = "cinder-data")]
    data_dir: PathBuf,

    /// API server bind address
    #[arg(long, default_value = "127.0.0.1")]
    api_bind: String,

    /// API server port
    #[arg(long, default_value_t = DEFAULT_API_PORT)]
    api_port: u16,

    /// Initial difficulty, used only when creating genesis
    #[arg(long, default_value_t = 10)]
    initial_difficulty: u32,

    /// Run the built-in miner
    #[arg(long)]
    mine: bool,

    /// Mining reward address (40 hex characters)
    #[arg(long)]
    miner_address: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn into_config(self) -> Result<NodeConfig, String> {
        let mut config = NodeConfig {
            data_dir: self.data_dir,
            api_bind: self.api_bind,
            api_port: self.api_port,
            mine: self.mine,
            log_level: self.log_level,
            ..NodeConfig::default()
        };
        config.genesis.initial_difficulty = self.initial_difficulty;

        if let Some(hex) = self.miner_address {
            config.miner_address = Address::from_hex(&hex)
                .ok_or_else(|| format!("invalid miner address: {hex}"))?;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config = match args.into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            process::exit(2);
        }
    };

    init_logging(&config.log_level);

    info!("cinder-node v{}", env!("CARGO_PKG_VERSION"));
    info!("data_dir: {:?}", config.data_dir);
    info!("api_addr: {}", config.api_addr());

    if let Err(e) = std::fs::create_dir_all(&config.data_dir) {
        error!("failed to create data_dir: {e}");
        process::exit(1);
    }

    let node = match Node::open(&config) {
        Ok(node) => node,
        Err(e) => {
            error!("failed to open chain state: {e}");
            process::exit(1);
        }
    };

    let (height, hash) = node.tip();
    info!(height, %hash, "node initialized");

    // Miner runs on a dedicated blocking thread so the PoW loop never
    // touches the async runtime.
    let miner_cancel = if config.mine {
        let miner = Miner::new(node.clone(), config.miner_address, config.max_block_txs);
        let cancel = miner.cancel_flag();
        tokio::task::spawn_blocking(move || miner.run());
        Some(cancel)
    } else {
        None
    };

    let api_addr = config.api_addr();
    let api_node = node.clone();
    let api = tokio::spawn(async move {
        if let Err(e) = cinder_node_lib::rpc::serve(&api_addr, api_node).await {
            error!("API server failed: {e}");
        }
    });

    info!("node running (Ctrl+C to stop)");
    tokio::select! {
        _ = api => {
            error!("API server exited");
        }
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("failed to install Ctrl+C handler: {e}");
            }
            info!("shutdown signal received");
        }
    }

    if let Some(cancel) = miner_cancel {
        cancel.store(true, Ordering::Relaxed);
    }
    info!("cinder-node shutdown complete");
}

fn init_logging(level: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_level(true))
        .init();
}
