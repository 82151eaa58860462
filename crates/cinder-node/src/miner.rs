//! Block assembly and the proof-of-work search loop.
//!
//! The miner reads the tip and drains the mempool under the chain's read
//! path, then releases everything before the CPU-bound nonce search; the
//! chain lock is never held while hashing. The search aborts at the next
//! nonce boundary once the cancel flag is set.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{info, warn};

use cinder_core::constants::BLOCK_SUBSIDY;
use cinder_core::types::{Address, Block, Hash256, Header, Transaction, TxInput, TxOutput, Work};
use cinder_core::{difficulty, merkle, pow};

use crate::node::Node;

pub struct Miner {
    node: Arc<Node>,
    /// Recipient of block subsidies.
    address: Address,
    /// Maximum transactions per block, coinbase included.
    max_block_txs: usize,
    cancel: Arc<AtomicBool>,
}

impl Miner {
    pub fn new(node: Arc<Node>, address: Address, max_block_txs: usize) -> Self {
        Self {
            node,
            address,
            max_block_txs,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared flag that stops the mining loop at the next nonce boundary.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Assemble an unmined candidate block on top of the current tip.
    pub fn build_template(&self) -> Block {
        let parent = self.node.chain().head();
        let txs = self
            .node
            .mempool_take(self.max_block_txs.saturating_sub(1));
        let timestamp = unix_now();
        let (difficulty, ema_block_time) = difficulty::next_difficulty(&parent, timestamp);

        // The coinbase marks the height in its outpoint index so coinbases
        // at different heights never collide on a txid.
        let height = parent.height + 1;
        let coinbase = Transaction {
            inputs: vec![TxInput {
                prev_tx_hash: Hash256::ZERO,
                prev_out_index: height,
                public_key: vec![],
                signature: vec![],
            }],
            outputs: vec![TxOutput {
                value: BLOCK_SUBSIDY,
                address: self.address,
            }],
        };

        let mut transactions = vec![coinbase];
        transactions.extend(txs);
        let tx_hashes: Vec<Hash256> = transactions.iter().map(Transaction::hash).collect();

        let header = Header {
            version: 1,
            prev_hash: parent.hash(),
            height,
            merkle_root: merkle::merkle_root(&tx_hashes),
            timestamp,
            difficulty,
            nonce: 0,
            ema_block_time,
            cumulative_work: Work::zero(),
        };

        Block {
            header,
            transactions,
        }
    }

    /// Assemble and mine one block. `None` when cancelled mid-search.
    pub fn mine_once(&self) -> Option<Block> {
        let mut block = self.build_template();
        pow::mine_cancellable(&mut block.header, &self.cancel)?;
        Some(block)
    }

    /// Mine and submit blocks until cancelled. Intended for a dedicated
    /// blocking thread.
    pub fn run(&self) {
        info!(address = %self.address, "miner started");
        while !self.cancel.load(Ordering::Relaxed) {
            let Some(block) = self.mine_once() else {
                break;
            };
            let hash = block.header.hash();
            let height = block.header.height;
            let tx_count = block.transactions.len();
            match self.node.submit_block(block) {
                Ok(outcome) => {
                    info!(height, %hash, tx_count, ?outcome, "mined block");
                }
                Err(e) => {
                    // Usually a stale template after a competing block
                    // arrived; back off briefly and rebuild.
                    warn!(height, %hash, "mined block rejected: {e}");
                    std::thread::sleep(Duration::from_millis(200));
                }
            }
        }
        info!("miner stopped");
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
