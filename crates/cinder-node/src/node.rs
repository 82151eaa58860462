//! Full node composition: chain state over RocksDB plus a mempool.
//!
//! The chain manager serializes writers internally; the mempool sits
//! behind its own mutex. The node is the single entry point the API and
//! the miner go through.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use cinder_core::chain::{BlockOutcome, Chain};
use cinder_core::error::ChainError;
use cinder_core::mempool::Mempool;
use cinder_core::types::{Address, Block, Hash256, Transaction, UtxoRef};

use crate::config::NodeConfig;
use crate::storage::RocksStore;

pub struct Node {
    chain: Chain<RocksStore>,
    mempool: Mutex<Mempool>,
}

impl Node {
    /// Open storage and chain state. Creates genesis on first run.
    pub fn open(config: &NodeConfig) -> Result<Arc<Self>, ChainError> {
        let store = Arc::new(RocksStore::open(config.db_path())?);
        let chain = Chain::open(store, &config.genesis)?;
        let (height, hash) = {
            let head = chain.head();
            (head.height, head.hash())
        };
        info!(height, %hash, "chain state loaded");

        Ok(Arc::new(Self {
            chain,
            mempool: Mutex::new(Mempool::with_defaults()),
        }))
    }

    pub fn chain(&self) -> &Chain<RocksStore> {
        &self.chain
    }

    /// Validate and integrate a block, then evict confirmed and conflicting
    /// transactions from the mempool.
    pub fn submit_block(&self, block: Block) -> Result<BlockOutcome, ChainError> {
        let outcome = self.chain.add_block(block.clone())?;
        match outcome {
            BlockOutcome::Connected | BlockOutcome::Reorganized => {
                self.mempool.lock().remove_confirmed(&block);
            }
            BlockOutcome::SideChain | BlockOutcome::AlreadyKnown => {}
        }
        Ok(outcome)
    }

    /// Validate a transaction against chain state and enqueue it.
    pub fn submit_transaction(&self, tx: Transaction) -> Result<Hash256, ChainError> {
        self.chain.validate_transaction(&tx)?;
        let hash = self.mempool.lock().insert(tx)?;
        debug!(%hash, "transaction added to mempool");
        Ok(hash)
    }

    /// Current tip as `(height, hash)`.
    pub fn tip(&self) -> (u32, Hash256) {
        let head = self.chain.head();
        (head.height, head.hash())
    }

    pub fn find_utxos(&self, address: &Address) -> Result<Vec<UtxoRef>, ChainError> {
        self.chain.find_utxos(address)
    }

    /// Up to `max` mempool transactions for block assembly.
    pub fn mempool_take(&self, max: usize) -> Vec<Transaction> {
        self.mempool.lock().take(max)
    }

    pub fn mempool_len(&self) -> usize {
        self.mempool.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinder_core::constants::BLOCK_SUBSIDY;
    use cinder_core::crypto::{self, KeyPair};
    use cinder_core::genesis::GenesisParams;
    use cinder_core::types::{TxInput, TxOutput};
    use cinder_core::{difficulty, merkle, pow};

    fn miner_key() -> KeyPair {
        KeyPair::from_seed([0x21; 32])
    }

    fn test_node(dir: &tempfile::TempDir) -> Arc<Node> {
        let config = NodeConfig {
            data_dir: dir.path().to_path_buf(),
            genesis: GenesisParams {
                coinbase_address: miner_key().address(),
                initial_supply: 1000,
                initial_difficulty: 8,
            },
            ..NodeConfig::default()
        };
        Node::open(&config).unwrap()
    }

    /// Mine a valid child of the current tip carrying `txs`.
    fn mine_next(node: &Node, txs: Vec<Transaction>) -> Block {
        let parent = node.chain().head();
        let timestamp = parent.timestamp + 15;
        let (difficulty, ema_block_time) = difficulty::next_difficulty(&parent, timestamp);
        let mut transactions = vec![Transaction {
            inputs: vec![TxInput {
                prev_tx_hash: Hash256::ZERO,
                prev_out_index: parent.height + 1,
                public_key: vec![],
                signature: vec![],
            }],
            outputs: vec![TxOutput {
                value: BLOCK_SUBSIDY,
                address: Address([0xEE; 20]),
            }],
        }];
        transactions.extend(txs);
        let hashes: Vec<Hash256> = transactions.iter().map(Transaction::hash).collect();
        let mut header = cinder_core::types::Header {
            version: 1,
            prev_hash: parent.hash(),
            height: parent.height + 1,
            merkle_root: merkle::merkle_root(&hashes),
            timestamp,
            difficulty,
            nonce: 0,
            ema_block_time,
            cumulative_work: cinder_core::types::Work::zero(),
        };
        pow::mine(&mut header);
        Block {
            header,
            transactions,
        }
    }

    #[test]
    fn open_creates_genesis() {
        let dir = tempfile::tempdir().unwrap();
        let node = test_node(&dir);
        let (height, _) = node.tip();
        assert_eq!(height, 0);
        assert_eq!(node.mempool_len(), 0);
    }

    #[test]
    fn submit_block_advances_tip() {
        let dir = tempfile::tempdir().unwrap();
        let node = test_node(&dir);
        let block = mine_next(&node, vec![]);
        assert_eq!(node.submit_block(block).unwrap(), BlockOutcome::Connected);
        assert_eq!(node.tip().0, 1);
    }

    #[test]
    fn submit_transaction_validates_and_enqueues() {
        let dir = tempfile::tempdir().unwrap();
        let node = test_node(&dir);
        let key = miner_key();
        let genesis = node.chain().get_block(&node.tip().1).unwrap().unwrap();
        let genesis_cb = genesis.transactions[0].hash();

        let mut tx = Transaction {
            inputs: vec![TxInput {
                prev_tx_hash: genesis_cb,
                prev_out_index: 0,
                public_key: vec![],
                signature: vec![],
            }],
            outputs: vec![TxOutput {
                value: 900,
                address: Address([0x05; 20]),
            }],
        };
        crypto::sign_transaction(&mut tx, &key);

        let hash = node.submit_transaction(tx).unwrap();
        assert_eq!(node.mempool_len(), 1);
        assert_eq!(node.mempool_take(10)[0].hash(), hash);
    }

    #[test]
    fn invalid_transaction_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let node = test_node(&dir);
        let tx = Transaction {
            inputs: vec![TxInput {
                prev_tx_hash: Hash256([0x13; 32]),
                prev_out_index: 0,
                public_key: vec![0; 32],
                signature: vec![0; 64],
            }],
            outputs: vec![],
        };
        assert!(node.submit_transaction(tx).is_err());
        assert_eq!(node.mempool_len(), 0);
    }

    #[test]
    fn confirmed_transaction_leaves_mempool() {
        let dir = tempfile::tempdir().unwrap();
        let node = test_node(&dir);
        let key = miner_key();
        let genesis = node.chain().get_block(&node.tip().1).unwrap().unwrap();
        let genesis_cb = genesis.transactions[0].hash();

        let mut tx = Transaction {
            inputs: vec![TxInput {
                prev_tx_hash: genesis_cb,
                prev_out_index: 0,
                public_key: vec![],
                signature: vec![],
            }],
            outputs: vec![TxOutput {
                value: 1000,
                address: Address([0x06; 20]),
            }],
        };
        crypto::sign_transaction(&mut tx, &key);
        node.submit_transaction(tx.clone()).unwrap();
        assert_eq!(node.mempool_len(), 1);

        let block = mine_next(&node, vec![tx]);
        node.submit_block(block).unwrap();
        assert_eq!(node.mempool_len(), 0);
    }

    #[test]
    fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let tip_hash = {
            let node = test_node(&dir);
            let block = mine_next(&node, vec![]);
            node.submit_block(block).unwrap();
            node.tip().1
        };

        let node = test_node(&dir);
        assert_eq!(node.tip(), (1, tip_hash));
    }
}
